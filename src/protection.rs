// Copyright (C) 2022 Nitrokey GmbH
// SPDX-License-Identifier: LGPL-3.0-only

//! Lifting the write protection of a card before writing to it.

use crate::{
    channel::{CardChannel, CardHandle},
    Error,
};

/// Outcome of [`ensure_writable`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Protection {
    /// The card accepted writes already.
    AlreadyWritable,
    /// The write protection was lifted.
    Overridden,
}

/// Makes sure that the card accepts writes, overriding its write protection if necessary.
///
/// A rejected override is fatal.  So is a card that accepts the override but keeps rejecting
/// writes.
pub fn ensure_writable<C: CardChannel>(card: &mut CardHandle<'_, C>) -> Result<Protection, Error> {
    if card.is_write_enabled() {
        return Ok(Protection::AlreadyWritable);
    }
    info!("Card is write protected, overriding");
    card.override_protection()?;
    if !card.is_write_enabled() {
        error!("Card is still write protected after override");
        return Err(Error::WriteProtected);
    }
    Ok(Protection::Overridden)
}
