// Copyright (C) 2022 Nitrokey GmbH
// SPDX-License-Identifier: LGPL-3.0-only

//! Waiting for readers and cards to come and go.
//!
//! Presence is only ever observed by polling the [`CardChannel`] at a fixed interval.  An absent
//! reader or card is not an error, it is a state to wait for.  The waits have no timeout; the only
//! way out of a wait other than the awaited state is the [`Interrupt`] flag.

use std::{io::Write, thread, time::Duration};

use crate::{
    channel::{CardChannel, CardHandle},
    Error, Interrupt,
};

/// Presence of reader and card as observed by a single poll.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CardPresenceState {
    /// No reader is connected.
    ReaderAbsent,
    /// A reader is connected.
    ReaderPresent,
    /// No card is inserted.
    CardAbsent,
    /// A card is inserted but not initialized yet.
    CardPresent,
    /// A card is inserted and can be read.
    CardReady,
}

impl CardPresenceState {
    /// Observes the presence of the reader.
    pub fn of_reader<C: CardChannel>(channel: &mut C) -> Self {
        if channel.is_reader_connected() {
            Self::ReaderPresent
        } else {
            Self::ReaderAbsent
        }
    }

    /// Observes the presence of the card.
    pub fn of_card<C: CardChannel>(channel: &mut C) -> Self {
        if !channel.is_card_present() {
            Self::CardAbsent
        } else if channel.is_card_ready() {
            Self::CardReady
        } else {
            Self::CardPresent
        }
    }
}

/// Default interval between two polls.
pub const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Blocks until readers and cards reach a given state.
#[derive(Clone, Debug)]
pub struct PresenceMonitor {
    poll_interval: Duration,
    interrupt: Interrupt,
}

impl PresenceMonitor {
    /// Creates a monitor polling at the given interval and stopping when `interrupt` is raised.
    pub fn new(poll_interval: Duration, interrupt: Interrupt) -> Self {
        Self {
            poll_interval,
            interrupt,
        }
    }

    /// Waits until a reader is connected.
    pub fn await_reader_connected<C, W>(
        &self,
        channel: &mut C,
        console: &mut W,
    ) -> Result<(), Error>
    where
        C: CardChannel,
        W: Write,
    {
        let initial = CardPresenceState::of_reader(channel);
        if initial == CardPresenceState::ReaderAbsent {
            writeln!(console, "Insert card reader")?;
        }
        self.poll_until(
            channel,
            CardPresenceState::of_reader,
            CardPresenceState::ReaderPresent,
            initial,
        )?;
        writeln!(console, "Card reader connected")?;
        Ok(())
    }

    /// Waits until a card is inserted and ready, and acquires it.
    pub fn await_card_ready<'a, C, W>(
        &self,
        channel: &'a mut C,
        console: &mut W,
    ) -> Result<CardHandle<'a, C>, Error>
    where
        C: CardChannel,
        W: Write,
    {
        let initial = CardPresenceState::of_card(channel);
        if initial == CardPresenceState::CardAbsent {
            writeln!(console, "Insert card")?;
        }
        self.poll_until(
            channel,
            CardPresenceState::of_card,
            CardPresenceState::CardReady,
            initial,
        )?;
        writeln!(console, "Card inserted")?;
        Ok(CardHandle::acquire(channel))
    }

    /// Releases the card and waits until the reader is disconnected.
    pub fn await_reader_disconnected<C, W>(
        &self,
        card: CardHandle<'_, C>,
        console: &mut W,
    ) -> Result<(), Error>
    where
        C: CardChannel,
        W: Write,
    {
        writeln!(console, "Disconnect card reader")?;
        let channel = card.release();
        self.poll_until(
            channel,
            CardPresenceState::of_reader,
            CardPresenceState::ReaderAbsent,
            CardPresenceState::ReaderPresent,
        )?;
        writeln!(console, "Card reader disconnected")?;
        Ok(())
    }

    /// Sleeps for one interval, then observes.  The first observation always happens after a
    /// sleep, even if `initial` is already the target.
    fn poll_until<C: CardChannel>(
        &self,
        channel: &mut C,
        observe: fn(&mut C) -> CardPresenceState,
        target: CardPresenceState,
        initial: CardPresenceState,
    ) -> Result<(), Error> {
        let mut last = initial;
        loop {
            thread::sleep(self.poll_interval);
            self.interrupt.check()?;
            let state = observe(channel);
            if state != last {
                debug!("Presence changed: {:?} -> {:?}", last, state);
                last = state;
            }
            if state == target {
                return Ok(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        channel::MemoryCard,
        virt::{Event, Step, VirtualReader},
    };

    fn monitor() -> PresenceMonitor {
        PresenceMonitor::new(Duration::ZERO, Interrupt::new())
    }

    fn lines(console: &[u8]) -> Vec<&str> {
        std::str::from_utf8(console).unwrap().lines().collect()
    }

    #[test]
    fn states() {
        let mut card = MemoryCard::new();
        assert_eq!(
            CardPresenceState::of_reader(&mut card),
            CardPresenceState::ReaderPresent
        );
        assert_eq!(
            CardPresenceState::of_card(&mut card),
            CardPresenceState::CardReady
        );
        card.set_ready(false);
        assert_eq!(
            CardPresenceState::of_card(&mut card),
            CardPresenceState::CardPresent
        );
        card.remove_card();
        assert_eq!(
            CardPresenceState::of_card(&mut card),
            CardPresenceState::CardAbsent
        );
        card.unplug_reader();
        assert_eq!(
            CardPresenceState::of_reader(&mut card),
            CardPresenceState::ReaderAbsent
        );
    }

    #[test]
    fn no_prompt_when_present() {
        let mut card = MemoryCard::new();
        let mut console = Vec::new();
        let monitor = monitor();
        monitor
            .await_reader_connected(&mut card, &mut console)
            .unwrap();
        let handle = monitor.await_card_ready(&mut card, &mut console).unwrap();
        let _ = handle.release();
        assert_eq!(lines(&console), ["Card reader connected", "Card inserted"]);
    }

    #[test]
    fn prompts_once_while_waiting() {
        let mut card = MemoryCard::new();
        card.remove_card();
        card.unplug_reader();
        let mut reader = VirtualReader::new(
            card,
            [
                Step::after(4, Event::PlugReader),
                Step::after(6, Event::InsertCard),
            ],
        );
        let mut console = Vec::new();
        let monitor = monitor();
        monitor
            .await_reader_connected(&mut reader, &mut console)
            .unwrap();
        let handle = monitor.await_card_ready(&mut reader, &mut console).unwrap();
        let _ = handle.release();
        assert_eq!(
            lines(&console),
            [
                "Insert card reader",
                "Card reader connected",
                "Insert card",
                "Card inserted"
            ]
        );
    }

    #[test]
    fn waits_for_card_to_become_ready() {
        let mut card = MemoryCard::new();
        card.set_ready(false);
        let mut reader = VirtualReader::new(card, [Step::after(3, Event::CardReady)]);
        let mut console = Vec::new();
        let handle = monitor()
            .await_card_ready(&mut reader, &mut console)
            .unwrap();
        let _ = handle.release();
        assert_eq!(lines(&console), ["Card inserted"]);
        assert!(reader.is_finished());
    }

    #[test]
    fn disconnect_releases_card_first() {
        let mut reader =
            VirtualReader::new(MemoryCard::new(), [Step::after(10, Event::UnplugReader)]);
        let mut console = Vec::new();
        let monitor = monitor();
        let handle = monitor.await_card_ready(&mut reader, &mut console).unwrap();
        monitor
            .await_reader_disconnected(handle, &mut console)
            .unwrap();
        assert!(!reader.card().is_connected());
        assert_eq!(
            lines(&console),
            [
                "Card inserted",
                "Disconnect card reader",
                "Card reader disconnected"
            ]
        );
    }

    #[test]
    fn interrupt_stops_waiting() {
        let mut card = MemoryCard::new();
        card.unplug_reader();
        let interrupt = Interrupt::new();
        interrupt.raise();
        let monitor = PresenceMonitor::new(Duration::ZERO, interrupt);
        let mut console = Vec::new();
        let result = monitor.await_reader_connected(&mut card, &mut console);
        assert!(matches!(result, Err(Error::Interrupted)));
        assert_eq!(lines(&console), ["Insert card reader"]);
    }
}
