// Copyright (C) 2022 Nitrokey GmbH
// SPDX-License-Identifier: LGPL-3.0-only
#![allow(unused)]

use std::{
    io,
    path::PathBuf,
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use cardcheck::{
    channel::{CardChannel, CardHandle, MemoryCard, ShortValue},
    presence::PresenceMonitor,
    Interrupt, Options,
};
use iso7816::Status;

/// A [`MemoryCard`] that can be shared with a thread playing the user.
#[derive(Clone, Debug, Default)]
pub struct SharedCard(Arc<Mutex<MemoryCard>>);

impl SharedCard {
    pub fn new(card: MemoryCard) -> Self {
        Self(Arc::new(Mutex::new(card)))
    }

    pub fn lock(&self) -> MutexGuard<'_, MemoryCard> {
        self.0.lock().expect("failed to lock card")
    }
}

impl CardChannel for SharedCard {
    fn is_reader_connected(&mut self) -> bool {
        self.lock().is_reader_connected()
    }

    fn is_card_present(&mut self) -> bool {
        self.lock().is_card_present()
    }

    fn is_card_ready(&mut self) -> bool {
        self.lock().is_card_ready()
    }

    fn is_write_enabled(&mut self) -> bool {
        self.lock().is_write_enabled()
    }

    fn override_protection(&mut self) -> Result<(), Status> {
        self.lock().override_protection()
    }

    fn write(&mut self, data: &[u8]) -> Result<(), Status> {
        self.lock().write(data)
    }

    fn write_long(&mut self, data: &[u8]) -> Result<(), Status> {
        self.lock().write_long(data)
    }

    fn read(&mut self) -> Result<ShortValue, Status> {
        self.lock().read()
    }

    fn read_long(&mut self) -> Result<Vec<u8>, Status> {
        self.lock().read_long()
    }

    fn release_card(&mut self) {
        self.lock().release_card()
    }
}

pub const POLL_INTERVAL: Duration = Duration::from_millis(1);

pub fn fixtures() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures")
}

pub fn options() -> Options {
    let mut options = Options::default();
    options.poll_interval = POLL_INTERVAL;
    options.startup_delay = Duration::ZERO;
    options.fixtures = fixtures();
    options
}

pub fn lines(console: &[u8]) -> Vec<&str> {
    std::str::from_utf8(console)
        .expect("console output is not UTF-8")
        .lines()
        .collect()
}

/// Acquires the card the way the harness does and passes the handle to `f`.
pub fn with_card<F: FnOnce(&mut CardHandle<'_, MemoryCard>) -> R, R>(
    card: &mut MemoryCard,
    f: F,
) -> R {
    let monitor = PresenceMonitor::new(Duration::ZERO, Interrupt::new());
    let mut handle = monitor
        .await_card_ready(card, &mut io::sink())
        .expect("failed to acquire card");
    let result = f(&mut handle);
    let _ = handle.release();
    result
}
