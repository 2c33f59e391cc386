// Copyright (C) 2022 Nitrokey GmbH
// SPDX-License-Identifier: LGPL-3.0-only

//! The test cycle: acquire a card, verify it, release it, repeat.

use std::{
    convert::Infallible,
    io::{self, Write},
    path::PathBuf,
    thread,
    time::Duration,
};

use crate::{
    channel::CardChannel,
    presence::{PresenceMonitor, POLL_INTERVAL},
    protection::{self, Protection},
    verify::IntegrityVerifier,
    Error, Interrupt,
};

/// Options for the [`Harness`].
#[derive(Clone, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub struct Options {
    /// The interval between two presence polls.
    pub poll_interval: Duration,
    /// The delay before the first cycle starts.
    pub startup_delay: Duration,
    /// The length of the random short value.
    pub short_random_len: usize,
    /// The length of the random long value.
    pub long_random_len: usize,
    /// The directory containing the fixtures.
    pub fixtures: PathBuf,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            poll_interval: POLL_INTERVAL,
            startup_delay: Duration::from_secs(1),
            short_random_len: 61,
            long_random_len: 3500,
            fixtures: PathBuf::from("fixtures"),
        }
    }
}

/// Runs test cycles against the cards inserted into a reader.
///
/// Progress is written line by line to `console`.
#[derive(Debug)]
pub struct Harness<C: CardChannel, W: Write> {
    channel: C,
    console: W,
    options: Options,
    interrupt: Interrupt,
    monitor: PresenceMonitor,
    verifier: IntegrityVerifier,
}

impl<C: CardChannel, W: Write> Harness<C, W> {
    /// Creates a harness with the default options.
    pub fn new(channel: C, console: W, interrupt: Interrupt) -> Self {
        Self::with_options(channel, console, interrupt, Options::default())
    }

    /// Creates a harness with the given options.
    pub fn with_options(channel: C, console: W, interrupt: Interrupt, options: Options) -> Self {
        let monitor = PresenceMonitor::new(options.poll_interval, interrupt.clone());
        let verifier = IntegrityVerifier::new(&options).with_interrupt(interrupt.clone());
        Self {
            channel,
            console,
            options,
            interrupt,
            monitor,
            verifier,
        }
    }

    /// Runs test cycles until one of them fails or the harness is interrupted.
    pub fn run(&mut self) -> Result<Infallible, Error> {
        info!("Starting harness with {:?}", self.options);
        thread::sleep(self.options.startup_delay);
        self.interrupt.check()?;
        let mut cycle = 0u64;
        loop {
            cycle += 1;
            debug!("Starting cycle {cycle}");
            self.run_once()?;
        }
    }

    /// Runs a single test cycle.
    ///
    /// Returns once the card passed all checks and the reader has been unplugged.  Any failure
    /// after the interrupt flag has been raised is reported as [`Error::Interrupted`].
    pub fn run_once(&mut self) -> Result<(), Error> {
        let result = self.cycle();
        match result {
            Err(err) if self.interrupt.is_raised() && !matches!(err, Error::Interrupted) => {
                info!("Interrupted, discarding error: {err}");
                Err(Error::Interrupted)
            }
            result => result,
        }
    }

    fn cycle(&mut self) -> Result<(), Error> {
        let console = &mut self.console;
        self.monitor
            .await_reader_connected(&mut self.channel, console)?;
        let mut card = self.monitor.await_card_ready(&mut self.channel, console)?;
        if protection::ensure_writable(&mut card)? == Protection::Overridden {
            writeln!(console, "Overrode write protection")?;
        }
        self.verifier.run(&mut card, console)?;
        self.monitor.await_reader_disconnected(card, console)?;
        writeln!(console)?;
        Ok(())
    }

    /// Returns the channel.
    pub fn channel(&self) -> &C {
        &self.channel
    }

    /// Returns the channel.
    pub fn channel_mut(&mut self) -> &mut C {
        &mut self.channel
    }

    /// Returns the console.
    pub fn console(&self) -> &W {
        &self.console
    }

    /// Returns the options.
    pub fn options(&self) -> &Options {
        &self.options
    }
}

/// Writes the failure report for `err` to `out`.
///
/// A mismatch is reported with the hex encoding of the bytes written and read.  Nothing is
/// reported for an interrupt.
pub fn report_failure<W: Write>(err: &Error, out: &mut W) -> io::Result<()> {
    match err {
        Error::Interrupted => return Ok(()),
        Error::Mismatch(mismatch) => {
            writeln!(out, "{mismatch}")?;
            writeln!(out, "Wrote: {}", hex::encode(mismatch.wrote()))?;
            writeln!(out, "Read : {}", hex::encode(mismatch.read()))?;
        }
        err => writeln!(out, "{err}")?,
    }
    writeln!(out, "\u{274c} Test failed")
}
