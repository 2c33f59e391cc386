// Copyright (C) 2022 Nitrokey GmbH
// SPDX-License-Identifier: LGPL-3.0-only

use iso7816::Status;

use super::{CardChannel, ShortValue, ShortValueMetadata};

/// Maximum length of the short value.
pub const SHORT_VALUE_CAPACITY: usize = 250;
/// Length of one chunk of the long value.
pub const LONG_VALUE_CHUNK_LEN: usize = 250;
/// Maximum number of chunks of the long value.
pub const LONG_VALUE_MAX_CHUNKS: usize = 128;
/// Maximum length of the long value.
pub const LONG_VALUE_CAPACITY: usize = LONG_VALUE_CHUNK_LEN * LONG_VALUE_MAX_CHUNKS;

type Chunk = heapless::Vec<u8, LONG_VALUE_CHUNK_LEN>;

/// Faults that can be injected into a [`MemoryCard`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Fault {
    /// Reads of the short value return different bytes than stored.
    CorruptShortRead,
    /// Reads of the long value return different bytes than stored.
    CorruptLongRead,
    /// The card rejects the protection override.
    RefuseOverride,
    /// The card accepts the protection override but stays write protected.
    StickyProtection,
}

/// In-memory card and reader.
///
/// A new card is connected to a plugged-in reader, ready, writable and empty.  The presence of
/// reader and card can be changed to simulate a user, and [`Fault`]s can be injected to simulate
/// broken hardware.
#[derive(Clone, Debug)]
pub struct MemoryCard {
    reader_connected: bool,
    card_present: bool,
    card_ready: bool,
    connected: bool,
    write_enabled: bool,
    short: heapless::Vec<u8, SHORT_VALUE_CAPACITY>,
    long: Vec<Chunk>,
    faults: Vec<Fault>,
}

impl Default for MemoryCard {
    fn default() -> Self {
        Self {
            reader_connected: true,
            card_present: true,
            card_ready: true,
            connected: true,
            write_enabled: true,
            short: heapless::Vec::new(),
            long: Vec::new(),
            faults: Vec::new(),
        }
    }
}

impl MemoryCard {
    /// Creates a new empty card inserted into a connected reader.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the card write protected.
    pub fn with_write_protection(mut self) -> Self {
        self.write_enabled = false;
        self
    }

    /// Injects a fault.
    pub fn with_fault(mut self, fault: Fault) -> Self {
        self.inject(fault);
        self
    }

    /// Injects a fault.
    pub fn inject(&mut self, fault: Fault) {
        if !self.faults.contains(&fault) {
            self.faults.push(fault);
        }
    }

    /// Removes all injected faults.
    pub fn clear_faults(&mut self) {
        self.faults.clear();
    }

    /// Connects the reader.
    pub fn plug_reader(&mut self) {
        self.reader_connected = true;
    }

    /// Disconnects the reader.  A card left in the reader is no longer visible.
    pub fn unplug_reader(&mut self) {
        self.reader_connected = false;
        self.connected = false;
    }

    /// Inserts the card.  It is ready immediately.
    pub fn insert_card(&mut self) {
        self.card_present = true;
        self.card_ready = true;
    }

    /// Removes the card.
    pub fn remove_card(&mut self) {
        self.card_present = false;
        self.card_ready = false;
        self.connected = false;
    }

    /// Sets whether the inserted card has finished initializing.
    pub fn set_ready(&mut self, ready: bool) {
        self.card_ready = ready;
    }

    /// Sets whether the card accepts writes.
    pub fn set_write_enabled(&mut self, write_enabled: bool) {
        self.write_enabled = write_enabled;
    }

    /// Returns whether a logical connection to the card is held.
    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Returns the stored short value, bypassing faults.
    pub fn short_value(&self) -> &[u8] {
        &self.short
    }

    /// Returns the number of chunks used by the long value.
    pub fn long_value_chunks(&self) -> usize {
        self.long.len()
    }

    fn long_value_len(&self) -> usize {
        self.long.iter().map(|chunk| chunk.len()).sum()
    }

    fn has_fault(&self, fault: Fault) -> bool {
        self.faults.contains(&fault)
    }

    fn check_connection(&self) -> Result<(), Status> {
        if self.reader_connected && self.card_present && self.card_ready && self.connected {
            Ok(())
        } else {
            warn!("Card accessed without connection");
            Err(Status::ConditionsOfUseNotSatisfied)
        }
    }

    fn check_writable(&self) -> Result<(), Status> {
        self.check_connection()?;
        if self.write_enabled {
            Ok(())
        } else {
            Err(Status::SecurityStatusNotSatisfied)
        }
    }
}

fn corrupt(mut data: Vec<u8>) -> Vec<u8> {
    match data.first_mut() {
        Some(byte) => *byte ^= 0xFF,
        None => data.push(0),
    }
    data
}

impl CardChannel for MemoryCard {
    fn is_reader_connected(&mut self) -> bool {
        self.reader_connected
    }

    fn is_card_present(&mut self) -> bool {
        self.reader_connected && self.card_present
    }

    fn is_card_ready(&mut self) -> bool {
        let ready = self.reader_connected && self.card_present && self.card_ready;
        if ready && !self.connected {
            debug!("Reconnecting to card");
            self.connected = true;
        }
        ready
    }

    fn is_write_enabled(&mut self) -> bool {
        self.write_enabled
    }

    fn override_protection(&mut self) -> Result<(), Status> {
        self.check_connection()?;
        if self.has_fault(Fault::RefuseOverride) {
            return Err(Status::SecurityStatusNotSatisfied);
        }
        if !self.has_fault(Fault::StickyProtection) {
            self.write_enabled = true;
        }
        Ok(())
    }

    fn write(&mut self, data: &[u8]) -> Result<(), Status> {
        self.check_writable()?;
        self.short = heapless::Vec::from_slice(data).map_err(|_| Status::WrongLength)?;
        self.long.clear();
        Ok(())
    }

    fn write_long(&mut self, data: &[u8]) -> Result<(), Status> {
        self.check_writable()?;
        if data.len() > LONG_VALUE_CAPACITY {
            return Err(Status::NotEnoughMemory);
        }
        self.long = data
            .chunks(LONG_VALUE_CHUNK_LEN)
            .map(Chunk::from_slice)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| Status::UnspecifiedPersistentExecutionError)?;
        Ok(())
    }

    fn read(&mut self) -> Result<ShortValue, Status> {
        self.check_connection()?;
        let mut data = self.short.to_vec();
        if self.has_fault(Fault::CorruptShortRead) {
            data = corrupt(data);
        }
        Ok(ShortValue {
            data,
            metadata: ShortValueMetadata {
                long_value_len: self.long_value_len(),
                write_enabled: self.write_enabled,
            },
        })
    }

    fn read_long(&mut self) -> Result<Vec<u8>, Status> {
        self.check_connection()?;
        let data: Vec<u8> = self.long.iter().flatten().copied().collect();
        if self.has_fault(Fault::CorruptLongRead) {
            Ok(corrupt(data))
        } else {
            Ok(data)
        }
    }

    fn release_card(&mut self) {
        self.connected = false;
    }
}
