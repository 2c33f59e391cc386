// Copyright (C) 2022 Nitrokey GmbH
// SPDX-License-Identifier: LGPL-3.0-only

//! Writing payloads to a card and checking that they read back unchanged.

use std::{io::Write, path::PathBuf};

use rand::{rngs::OsRng, RngCore};

use crate::{
    channel::{CardChannel, CardHandle},
    fixture::{self, FixtureRecord},
    Error, Interrupt, Options,
};

/// The value written to the short value to clear the card: an empty JSON object.
pub const EMPTY_RECORD: &[u8] = b"{}";

/// The two storage slots of a card.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PayloadClass {
    /// The fixed-capacity short value.
    Short,
    /// The chunked long value.
    Long,
}

impl core::fmt::Display for PayloadClass {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let to_write = match self {
            PayloadClass::Short => "Short value",
            PayloadClass::Long => "Long value",
        };
        f.write_str(to_write)
    }
}

/// A value that did not survive the round trip.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Mismatch {
    class: PayloadClass,
    wrote: Vec<u8>,
    read: Vec<u8>,
}

impl Mismatch {
    /// Creates a mismatch report.
    pub fn new(class: PayloadClass, wrote: Vec<u8>, read: Vec<u8>) -> Self {
        Self { class, wrote, read }
    }

    /// The slot that did not read back correctly.
    pub fn class(&self) -> PayloadClass {
        self.class
    }

    /// The bytes written to the card.
    pub fn wrote(&self) -> &[u8] {
        &self.wrote
    }

    /// The bytes read from the card.
    pub fn read(&self) -> &[u8] {
        &self.read
    }
}

impl core::fmt::Display for Mismatch {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{} mismatch", self.class)
    }
}

/// Compares the bytes written to a slot with the bytes read from it.
pub fn compare(class: PayloadClass, wrote: &[u8], read: &[u8]) -> Result<(), Mismatch> {
    if wrote == read {
        Ok(())
    } else {
        error!(
            "{class} mismatch: wrote {} bytes, read {} bytes",
            wrote.len(),
            read.len()
        );
        Err(Mismatch::new(class, wrote.to_vec(), read.to_vec()))
    }
}

/// Returns `len` bytes from the operating system's secure random source.
pub fn random_payload(len: usize) -> Vec<u8> {
    let mut payload = vec![0; len];
    OsRng.fill_bytes(&mut payload);
    payload
}

/// Runs the read/write checks on an acquired card.
#[derive(Clone, Debug)]
pub struct IntegrityVerifier {
    short_random_len: usize,
    long_random_len: usize,
    fixtures: PathBuf,
    interrupt: Interrupt,
}

impl IntegrityVerifier {
    /// Creates a verifier using the payload lengths and fixtures configured in `options`.
    pub fn new(options: &Options) -> Self {
        Self {
            short_random_len: options.short_random_len,
            long_random_len: options.long_random_len,
            fixtures: options.fixtures.clone(),
            interrupt: Interrupt::new(),
        }
    }

    /// Stops the checks with [`Error::Interrupted`] when `interrupt` is raised.  The flag is
    /// checked before each step.
    pub fn with_interrupt(mut self, interrupt: Interrupt) -> Self {
        self.interrupt = interrupt;
        self
    }

    /// Runs all checks in order and stops at the first mismatch.
    pub fn run<C, W>(&self, card: &mut CardHandle<'_, C>, console: &mut W) -> Result<(), Error>
    where
        C: CardChannel,
        W: Write,
    {
        self.interrupt.check()?;
        writeln!(console, "Clearing card")?;
        self.clear(card)?;

        self.interrupt.check()?;
        writeln!(console, "Testing random bytes")?;
        let short = random_payload(self.short_random_len);
        let long = random_payload(self.long_random_len);
        self.round_trip(card, &short, &long)?;

        self.interrupt.check()?;
        writeln!(console, "Testing admin card")?;
        let admin = FixtureRecord::load(&self.fixtures, fixture::ADMIN)?;
        self.round_trip(card, &admin.short, &admin.long)?;

        info!("All checks passed");
        writeln!(console, "\u{2705} Test passed")?;
        Ok(())
    }

    /// Writes an empty record, which also clears the long value, and checks both slots.
    pub fn clear<C: CardChannel>(&self, card: &mut CardHandle<'_, C>) -> Result<(), Error> {
        card.write(EMPTY_RECORD)?;
        compare(PayloadClass::Short, EMPTY_RECORD, &card.read()?.data)?;
        compare(PayloadClass::Long, &[], &card.read_long()?)?;
        Ok(())
    }

    /// Writes the short value, then the long value, and reads both back in the same order.
    pub fn round_trip<C: CardChannel>(
        &self,
        card: &mut CardHandle<'_, C>,
        short: &[u8],
        long: &[u8],
    ) -> Result<(), Error> {
        card.write(short)?;
        card.write_long(long)?;
        compare(PayloadClass::Short, short, &card.read()?.data)?;
        compare(PayloadClass::Long, long, &card.read_long()?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::channel::{Fault, MemoryCard};

    fn verifier(fixtures: PathBuf) -> IntegrityVerifier {
        let mut options = Options::default();
        options.fixtures = fixtures;
        IntegrityVerifier::new(&options)
    }

    fn write_admin_fixture(dir: &std::path::Path) {
        let admin = dir.join(fixture::ADMIN);
        fs::create_dir_all(&admin).unwrap();
        fs::write(
            admin.join(fixture::LONG_FILE),
            r#"{"title": "Mock", "seal": "x"}"#,
        )
        .unwrap();
        fs::write(
            admin.join(fixture::SHORT_FILE),
            r#"{"t":"admin","h":"{{hash(long)}}"}"#,
        )
        .unwrap();
    }

    #[test]
    fn compare_labels() {
        assert_eq!(compare(PayloadClass::Short, b"{}", b"{}"), Ok(()));
        let mismatch = compare(PayloadClass::Long, b"abc", b"abd").unwrap_err();
        assert_eq!(mismatch.class(), PayloadClass::Long);
        assert_eq!(mismatch.wrote(), b"abc");
        assert_eq!(mismatch.read(), b"abd");
        assert_eq!(mismatch.to_string(), "Long value mismatch");
    }

    #[test]
    fn random_payloads() {
        assert!(random_payload(0).is_empty());
        let a = random_payload(3500);
        let b = random_payload(3500);
        assert_eq!(a.len(), 3500);
        assert_ne!(a, b);
    }

    #[test]
    fn clear_removes_long_value() {
        let mut card = MemoryCard::new();
        card.write_long(&[1; 1000]).unwrap();
        let mut handle = CardHandle::acquire(&mut card);
        verifier(PathBuf::new()).clear(&mut handle).unwrap();
        assert_eq!(card.short_value(), EMPTY_RECORD);
        assert_eq!(card.long_value_chunks(), 0);
    }

    #[test]
    fn run_passes_on_working_card() {
        let dir = tempfile::tempdir().unwrap();
        write_admin_fixture(dir.path());
        let mut card = MemoryCard::new();
        let mut handle = CardHandle::acquire(&mut card);
        let mut console = Vec::new();
        verifier(dir.path().to_owned())
            .run(&mut handle, &mut console)
            .unwrap();
        assert_eq!(
            String::from_utf8(console).unwrap(),
            "Clearing card\nTesting random bytes\nTesting admin card\n\u{2705} Test passed\n"
        );
        let long = br#"{"title": "Mock"}"#;
        assert_eq!(
            card.short_value(),
            format!(r#"{{"t":"admin","h":"{}"}}"#, fixture::digest(long)).as_bytes()
        );
    }

    #[test]
    fn run_stops_at_first_mismatch() {
        let mut card = MemoryCard::new().with_fault(Fault::CorruptLongRead);
        let mut handle = CardHandle::acquire(&mut card);
        let mut console = Vec::new();
        let err = verifier(PathBuf::from("/nonexistent"))
            .run(&mut handle, &mut console)
            .unwrap_err();
        match err {
            Error::Mismatch(mismatch) => {
                assert_eq!(mismatch.class(), PayloadClass::Long);
                assert_eq!(mismatch.wrote(), b"");
                assert_eq!(mismatch.read(), [0]);
            }
            err => panic!("Unexpected error {err}"),
        }
        assert_eq!(String::from_utf8(console).unwrap(), "Clearing card\n");
    }

    #[test]
    fn missing_fixture_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let mut card = MemoryCard::new();
        let mut handle = CardHandle::acquire(&mut card);
        let err = verifier(dir.path().to_owned())
            .run(&mut handle, &mut std::io::sink())
            .unwrap_err();
        assert!(matches!(err, Error::Fixture(fixture::FixtureError::Io { .. })));
    }

    #[test]
    fn interrupt_between_steps() {
        let interrupt = Interrupt::new();
        let verifier = verifier(PathBuf::from("/nonexistent")).with_interrupt(interrupt.clone());
        let mut card = MemoryCard::new();
        let mut handle = CardHandle::acquire(&mut card);
        verifier.clear(&mut handle).unwrap();
        interrupt.raise();
        let mut console = Vec::new();
        let err = verifier.run(&mut handle, &mut console).unwrap_err();
        assert!(matches!(err, Error::Interrupted));
        assert!(console.is_empty());
        assert_eq!(card.short_value(), EMPTY_RECORD);
    }
}
