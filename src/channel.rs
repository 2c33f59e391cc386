// Copyright (C) 2022 Nitrokey GmbH
// SPDX-License-Identifier: LGPL-3.0-only

//! Channels providing access to a card reader and the card inserted into it.
//!
//! The harness does not implement a card protocol.  Instead, it is generic over a [`CardChannel`]
//! that takes care of talking to the reader, and only ever touches the card through a
//! [`CardHandle`] obtained from
//! [`PresenceMonitor::await_card_ready`][`crate::presence::PresenceMonitor::await_card_ready`].

mod memory;

pub use memory::{
    Fault, MemoryCard, LONG_VALUE_CAPACITY, LONG_VALUE_CHUNK_LEN, LONG_VALUE_MAX_CHUNKS,
    SHORT_VALUE_CAPACITY,
};

use core::fmt::Debug;

use iso7816::Status;

use crate::error::{Error, Operation};

/// A connection to a card reader.
///
/// Presence queries take `&mut self` because answering them usually means polling the reader.
/// Operations on the card report failures as ISO 7816 status words.
pub trait CardChannel: Debug {
    /// Checks whether a reader is connected.
    fn is_reader_connected(&mut self) -> bool;

    /// Checks whether a card is inserted into the reader.
    fn is_card_present(&mut self) -> bool;

    /// Checks whether the inserted card is initialized and can be read.
    fn is_card_ready(&mut self) -> bool;

    /// Checks whether the card accepts writes.
    fn is_write_enabled(&mut self) -> bool;

    /// Lifts the write protection of the card.
    fn override_protection(&mut self) -> Result<(), Status>;

    /// Writes the short value.  This also clears the long value.
    fn write(&mut self, data: &[u8]) -> Result<(), Status>;

    /// Writes the long value.
    fn write_long(&mut self, data: &[u8]) -> Result<(), Status>;

    /// Reads the short value.
    fn read(&mut self) -> Result<ShortValue, Status>;

    /// Reads the long value.  Returns an empty vector if no long value is set.
    fn read_long(&mut self) -> Result<Vec<u8>, Status>;

    /// Drops the logical connection to the card so that the hardware can be removed.
    fn release_card(&mut self);
}

impl<C: CardChannel + ?Sized> CardChannel for &mut C {
    fn is_reader_connected(&mut self) -> bool {
        (**self).is_reader_connected()
    }

    fn is_card_present(&mut self) -> bool {
        (**self).is_card_present()
    }

    fn is_card_ready(&mut self) -> bool {
        (**self).is_card_ready()
    }

    fn is_write_enabled(&mut self) -> bool {
        (**self).is_write_enabled()
    }

    fn override_protection(&mut self) -> Result<(), Status> {
        (**self).override_protection()
    }

    fn write(&mut self, data: &[u8]) -> Result<(), Status> {
        (**self).write(data)
    }

    fn write_long(&mut self, data: &[u8]) -> Result<(), Status> {
        (**self).write_long(data)
    }

    fn read(&mut self) -> Result<ShortValue, Status> {
        (**self).read()
    }

    fn read_long(&mut self) -> Result<Vec<u8>, Status> {
        (**self).read_long()
    }

    fn release_card(&mut self) {
        (**self).release_card()
    }
}

/// The content of the short value slot.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ShortValue {
    /// The stored bytes.
    pub data: Vec<u8>,
    /// Information about the card returned together with the short value.
    pub metadata: ShortValueMetadata,
}

/// Information returned together with the short value.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ShortValueMetadata {
    /// The length of the long value, `0` if it is not set.
    pub long_value_len: usize,
    /// Whether the card accepts writes.
    pub write_enabled: bool,
}

/// An acquired card.
///
/// The handle is created once a card is ready and borrows the channel for as long as the card is
/// in use.  [`CardHandle::release`] drops the logical connection and hands the channel back, which
/// has to happen before the reader is unplugged.
///
/// Dropping a handle does not release the card.  The harness only releases it after a successful
/// verification; after a failure the card stays connected until the process exits or the next
/// presence poll finds it gone.
#[derive(Debug)]
#[must_use = "the card has to be released before the reader is unplugged"]
pub struct CardHandle<'a, C: CardChannel> {
    channel: &'a mut C,
}

impl<'a, C: CardChannel> CardHandle<'a, C> {
    pub(crate) fn acquire(channel: &'a mut C) -> Self {
        debug!("Acquired card");
        Self { channel }
    }

    /// Checks whether the card accepts writes.
    pub fn is_write_enabled(&mut self) -> bool {
        self.channel.is_write_enabled()
    }

    /// Lifts the write protection of the card.
    pub fn override_protection(&mut self) -> Result<(), Error> {
        self.channel
            .override_protection()
            .map_err(Error::channel(Operation::OverrideProtection))
    }

    /// Writes the short value, clearing the long value.
    pub fn write(&mut self, data: &[u8]) -> Result<(), Error> {
        trace!("Writing {} bytes to short value", data.len());
        self.channel
            .write(data)
            .map_err(Error::channel(Operation::Write))
    }

    /// Writes the long value.
    pub fn write_long(&mut self, data: &[u8]) -> Result<(), Error> {
        trace!("Writing {} bytes to long value", data.len());
        self.channel
            .write_long(data)
            .map_err(Error::channel(Operation::WriteLong))
    }

    /// Reads the short value and its metadata.
    pub fn read(&mut self) -> Result<ShortValue, Error> {
        let value = self.channel.read().map_err(Error::channel(Operation::Read))?;
        trace!(
            "Read {} bytes from short value, {:?}",
            value.data.len(),
            value.metadata
        );
        Ok(value)
    }

    /// Reads the long value.
    pub fn read_long(&mut self) -> Result<Vec<u8>, Error> {
        let data = self
            .channel
            .read_long()
            .map_err(Error::channel(Operation::ReadLong))?;
        trace!("Read {} bytes from long value", data.len());
        Ok(data)
    }

    /// Releases the card and returns the channel.
    pub fn release(self) -> &'a mut C {
        self.channel.release_card();
        debug!("Released card");
        self.channel
    }
}
