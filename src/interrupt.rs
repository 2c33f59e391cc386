// Copyright (C) 2022 Nitrokey GmbH
// SPDX-License-Identifier: LGPL-3.0-only

use std::{
    io,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use crate::Error;

/// Flag raised when the process is asked to stop.
///
/// Polling loops check the flag on every tick and stop with [`Error::Interrupted`].  Clones share
/// the same flag.
#[derive(Clone, Debug, Default)]
pub struct Interrupt(Arc<AtomicBool>);

impl Interrupt {
    /// Creates a flag that is only raised by [`Interrupt::raise`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a flag that is raised when the process receives `SIGINT`.
    pub fn install() -> io::Result<Self> {
        let interrupt = Self::new();
        signal_hook::flag::register(signal_hook::consts::SIGINT, interrupt.0.clone())?;
        Ok(interrupt)
    }

    /// Raises the flag.
    pub fn raise(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// Returns whether the flag has been raised.
    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    pub(crate) fn check(&self) -> Result<(), Error> {
        if self.is_raised() {
            info!("Interrupted");
            Err(Error::Interrupted)
        } else {
            Ok(())
        }
    }
}
