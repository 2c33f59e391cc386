// Copyright (C) 2022 Nitrokey GmbH
// SPDX-License-Identifier: LGPL-3.0-only

//! This crate implements a manual read/write verification harness for smart card readers.
//!
//! # Channels
//!
//! The harness does not talk to hardware itself.  It requires a
//! [`CardChannel`][`channel::CardChannel`] implementation that provides presence detection,
//! write protection handling and access to the two storage slots of a card:
//!
//! - the *short value*, a small fixed-capacity slot, and
//! - the *long value*, a larger value stored in chunks.
//!
//! `cardcheck` provides these `CardChannel` implementations:
//!
//! - [`MemoryCard`][`channel::MemoryCard`] keeps both slots in memory and can inject faults.
//! - [`VirtualReader`][`virt::VirtualReader`] wraps a `MemoryCard` and simulates a user plugging
//!   in a reader, inserting a card and unplugging the reader again.
//!
//! The `cardcheck` binary runs the harness against a [`VirtualReader`][`virt::VirtualReader`]
//! (requires the `virt` feature).
//!
//! # Test runs
//!
//! The [`Harness`] struct is the main entry point for this crate.  It waits for a reader and a
//! card, lifts write protection if necessary, writes and reads back a fixed sequence of payloads
//! and waits for the reader to be unplugged before starting over.  It can be configured using
//! [`Options`].
//!
//! Any byte mismatch aborts the run with [`Error::Mismatch`].  The caller decides how to report
//! it and which exit code to use, see [`Error::exit_code`] and [`harness::report_failure`].

#![warn(
    missing_copy_implementations,
    missing_debug_implementations,
    missing_docs,
    non_ascii_idents,
    trivial_casts,
    unused,
    unused_qualifications,
    clippy::expect_used,
    clippy::unwrap_used
)]
#![deny(unsafe_code)]

#[macro_use]
extern crate log;

pub mod channel;
mod error;
pub mod fixture;
pub mod harness;
mod interrupt;
pub mod presence;
pub mod protection;
pub mod verify;
pub mod virt;

pub use error::{Error, Operation};
pub use harness::{Harness, Options};
pub use interrupt::Interrupt;
