// Copyright (C) 2022 Nitrokey GmbH
// SPDX-License-Identifier: CC0-1.0

use arbitrary::Arbitrary;

#[derive(Arbitrary, Clone, Debug)]
pub enum Operation {
    Write(Vec<u8>),
    WriteLong(Vec<u8>),
    Read,
    ReadLong,
    OverrideProtection,
    SetWriteEnabled(bool),
    Release,
    Reconnect,
}

#[derive(Arbitrary, Debug)]
pub struct Input {
    pub write_protected: bool,
    pub operations: Vec<Operation>,
}

/// Sets up logging for a fuzz target if the `log` feature is enabled.
pub fn init_logging() {
    #[cfg(feature = "log")]
    let _ = env_logger::builder().is_test(true).try_init();
}
