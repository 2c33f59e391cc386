// Copyright (C) 2022 Nitrokey GmbH
// SPDX-License-Identifier: LGPL-3.0-only

use std::io;

use iso7816::Status;

use crate::{fixture::FixtureError, verify::Mismatch};

/// The card operation that failed with a status word.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Operation {
    /// Writing the short value.
    Write,
    /// Writing the long value.
    WriteLong,
    /// Reading the short value.
    Read,
    /// Reading the long value.
    ReadLong,
    /// Lifting the write protection.
    OverrideProtection,
}

impl core::fmt::Display for Operation {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let to_write = match self {
            Operation::Write => "write short value",
            Operation::WriteLong => "write long value",
            Operation::Read => "read short value",
            Operation::ReadLong => "read long value",
            Operation::OverrideProtection => "override write protection",
        };
        f.write_str(to_write)
    }
}

/// Errors that end a test run.
///
/// Only [`Error::Interrupted`] is a regular way out of [`Harness::run`][`crate::Harness::run`];
/// every other variant is fatal.
#[derive(Debug)]
pub enum Error {
    /// The process received an interrupt signal.
    Interrupted,
    /// A value read back from the card differs from the value written to it.
    Mismatch(Mismatch),
    /// The card rejected an operation.
    Channel {
        /// The rejected operation.
        operation: Operation,
        /// The status word returned by the card.
        status: Status,
    },
    /// The card still refuses writes after the protection was overridden.
    WriteProtected,
    /// The admin fixture could not be loaded.
    Fixture(FixtureError),
    /// Writing to the console failed.
    Console(io::Error),
}

impl Error {
    /// Returns the process exit code for this error.
    ///
    /// An interrupt is the expected way to stop the harness and maps to `0`, everything else to
    /// `1`.
    pub fn exit_code(&self) -> u8 {
        match self {
            Error::Interrupted => 0,
            _ => 1,
        }
    }

    pub(crate) fn channel(operation: Operation) -> impl FnOnce(Status) -> Self {
        move |status| Error::Channel { operation, status }
    }
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Error::Interrupted => f.write_str("Interrupted"),
            Error::Mismatch(mismatch) => write!(f, "{} mismatch", mismatch.class()),
            Error::Channel { operation, status } => {
                let sw: [u8; 2] = (*status).into();
                write!(
                    f,
                    "Failed to {operation}: {status:?} ({})",
                    hex::encode_upper(sw)
                )
            }
            Error::WriteProtected => f.write_str("Card is still write protected after override"),
            Error::Fixture(err) => write!(f, "Failed to load fixture: {err}"),
            Error::Console(err) => write!(f, "Failed to write to console: {err}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Fixture(err) => Some(err),
            Error::Console(err) => Some(err),
            _ => None,
        }
    }
}

impl From<Mismatch> for Error {
    fn from(mismatch: Mismatch) -> Self {
        Error::Mismatch(mismatch)
    }
}

impl From<FixtureError> for Error {
    fn from(err: FixtureError) -> Self {
        Error::Fixture(err)
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Console(err)
    }
}
