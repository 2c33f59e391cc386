// Copyright (C) 2022 Nitrokey GmbH
// SPDX-License-Identifier: CC0-1.0

// Runs the harness against a virtual reader that keeps plugging in cards.  Fixtures are loaded
// from `fixtures/` in the working directory.
//
// Set `RUST_LOG=cardcheck=debug` to see presence changes and card operations.

use std::{io, process::ExitCode};

use cardcheck::{harness, virt::VirtualReader, Harness, Interrupt};

fn main() -> ExitCode {
    env_logger::init();

    let interrupt = match Interrupt::install() {
        Ok(interrupt) => interrupt,
        Err(err) => {
            log::error!("Failed to install interrupt handler: {err}");
            return ExitCode::FAILURE;
        }
    };

    let mut harness = Harness::new(VirtualReader::demo(), io::stdout(), interrupt);
    let err = match harness.run() {
        Ok(never) => match never {},
        Err(err) => err,
    };
    if let Err(report_err) = harness::report_failure(&err, &mut io::stdout()) {
        log::error!("Failed to report failure: {report_err}");
    }
    ExitCode::from(err.exit_code())
}
