// Copyright (C) 2022 Nitrokey GmbH
// SPDX-License-Identifier: LGPL-3.0-only

//! Virtual reader (mostly for testing)
//!
//! [`VirtualReader`] plays a script of [`Event`]s against a [`MemoryCard`], simulating a user who
//! plugs in a reader, inserts a card and unplugs the reader again.  Time is counted in presence
//! polls: every call to one of the presence queries of [`CardChannel`] is a tick, and the next
//! event happens once enough ticks have passed since the previous one.  Card operations do not
//! count as ticks, so nothing happens to the card while a verification is running.

use iso7816::Status;

use crate::channel::{CardChannel, MemoryCard, ShortValue};

/// A change to the reader or card made by the simulated user.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Event {
    /// Plugs in the reader.
    PlugReader,
    /// Removes the card and unplugs the reader.
    UnplugReader,
    /// Inserts a writable card.
    InsertCard,
    /// Inserts a write protected card.
    InsertProtectedCard,
    /// Removes the card.
    RemoveCard,
    /// Finishes initializing the inserted card.
    CardReady,
}

/// An event and the number of ticks to wait for it.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Step {
    /// Ticks since the previous event.
    pub after: u32,
    /// The event.
    pub event: Event,
}

impl Step {
    /// Creates a step that happens on the `after`th tick after the previous one.
    pub fn after(after: u32, event: Event) -> Self {
        Self { after, event }
    }
}

/// Ticks between two events of [`VirtualReader::demo`].
const DEMO_DELAY: u32 = 5;

/// A [`MemoryCard`] driven by a script.
#[derive(Clone, Debug)]
pub struct VirtualReader {
    card: MemoryCard,
    script: Vec<Step>,
    next: usize,
    ticks: u32,
    repeat: bool,
}

impl VirtualReader {
    /// Creates a reader that plays `script` once.
    pub fn new(card: MemoryCard, script: impl IntoIterator<Item = Step>) -> Self {
        Self {
            card,
            script: script.into_iter().collect(),
            next: 0,
            ticks: 0,
            repeat: false,
        }
    }

    /// Restarts the script whenever it is finished.
    pub fn repeating(mut self) -> Self {
        self.repeat = true;
        self
    }

    /// Creates a reader that repeatedly goes through a full test cycle.
    ///
    /// The reader starts unplugged.  Every second card is write protected.
    pub fn demo() -> Self {
        let mut card = MemoryCard::new();
        card.remove_card();
        card.unplug_reader();
        let script = [
            Event::PlugReader,
            Event::InsertCard,
            Event::UnplugReader,
            Event::PlugReader,
            Event::InsertProtectedCard,
            Event::UnplugReader,
        ]
        .into_iter()
        .map(|event| Step::after(DEMO_DELAY, event));
        Self::new(card, script).repeating()
    }

    /// Returns the simulated card.
    pub fn card(&self) -> &MemoryCard {
        &self.card
    }

    /// Returns the simulated card.
    pub fn card_mut(&mut self) -> &mut MemoryCard {
        &mut self.card
    }

    /// Returns whether all events of a non-repeating script have happened.
    pub fn is_finished(&self) -> bool {
        !self.repeat && self.next >= self.script.len()
    }

    fn tick(&mut self) {
        self.ticks = self.ticks.saturating_add(1);
        if self.repeat && self.next >= self.script.len() {
            self.next = 0;
        }
        let Some(step) = self.script.get(self.next).copied() else {
            return;
        };
        if self.ticks >= step.after {
            debug!("Virtual reader event: {:?}", step.event);
            self.apply(step.event);
            self.ticks = 0;
            self.next += 1;
        }
    }

    fn apply(&mut self, event: Event) {
        let card = &mut self.card;
        match event {
            Event::PlugReader => card.plug_reader(),
            Event::UnplugReader => {
                card.remove_card();
                card.unplug_reader();
            }
            Event::InsertCard => {
                card.insert_card();
                card.set_write_enabled(true);
            }
            Event::InsertProtectedCard => {
                card.insert_card();
                card.set_write_enabled(false);
            }
            Event::RemoveCard => card.remove_card(),
            Event::CardReady => card.set_ready(true),
        }
    }
}

impl CardChannel for VirtualReader {
    fn is_reader_connected(&mut self) -> bool {
        self.tick();
        self.card.is_reader_connected()
    }

    fn is_card_present(&mut self) -> bool {
        self.tick();
        self.card.is_card_present()
    }

    fn is_card_ready(&mut self) -> bool {
        self.tick();
        self.card.is_card_ready()
    }

    fn is_write_enabled(&mut self) -> bool {
        self.card.is_write_enabled()
    }

    fn override_protection(&mut self) -> Result<(), Status> {
        self.card.override_protection()
    }

    fn write(&mut self, data: &[u8]) -> Result<(), Status> {
        self.card.write(data)
    }

    fn write_long(&mut self, data: &[u8]) -> Result<(), Status> {
        self.card.write_long(data)
    }

    fn read(&mut self) -> Result<ShortValue, Status> {
        self.card.read()
    }

    fn read_long(&mut self) -> Result<Vec<u8>, Status> {
        self.card.read_long()
    }

    fn release_card(&mut self) {
        self.card.release_card()
    }
}
