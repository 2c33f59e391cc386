// Copyright (C) 2022 Nitrokey GmbH
// SPDX-License-Identifier: CC0-1.0

#![no_main]
use cardcheck::channel::{
    CardChannel, MemoryCard, LONG_VALUE_CAPACITY, SHORT_VALUE_CAPACITY,
};
use cardcheck_fuzz::{Input, Operation};
use iso7816::Status;
use libfuzzer_sys::fuzz_target;

// Checks the card against a plain model of the two slots.
fuzz_target!(|input: Input| {
    cardcheck_fuzz::init_logging();
    let mut card = MemoryCard::new();
    card.set_write_enabled(!input.write_protected);
    let mut write_enabled = !input.write_protected;
    let mut connected = true;
    let mut short = Vec::new();
    let mut long = Vec::new();

    for operation in input.operations {
        match operation {
            Operation::Write(data) => {
                let result = card.write(&data);
                if !connected {
                    assert_eq!(result, Err(Status::ConditionsOfUseNotSatisfied));
                } else if !write_enabled {
                    assert_eq!(result, Err(Status::SecurityStatusNotSatisfied));
                } else if data.len() > SHORT_VALUE_CAPACITY {
                    assert_eq!(result, Err(Status::WrongLength));
                } else {
                    assert_eq!(result, Ok(()));
                    short = data;
                    long.clear();
                }
            }
            Operation::WriteLong(data) => {
                let result = card.write_long(&data);
                if !connected {
                    assert_eq!(result, Err(Status::ConditionsOfUseNotSatisfied));
                } else if !write_enabled {
                    assert_eq!(result, Err(Status::SecurityStatusNotSatisfied));
                } else if data.len() > LONG_VALUE_CAPACITY {
                    assert_eq!(result, Err(Status::NotEnoughMemory));
                } else {
                    assert_eq!(result, Ok(()));
                    long = data;
                }
            }
            Operation::Read => match card.read() {
                Ok(value) => {
                    assert!(connected);
                    assert_eq!(value.data, short);
                    assert_eq!(value.metadata.long_value_len, long.len());
                    assert_eq!(value.metadata.write_enabled, write_enabled);
                }
                Err(status) => {
                    assert!(!connected);
                    assert_eq!(status, Status::ConditionsOfUseNotSatisfied);
                }
            },
            Operation::ReadLong => match card.read_long() {
                Ok(data) => {
                    assert!(connected);
                    assert_eq!(data, long);
                }
                Err(status) => {
                    assert!(!connected);
                    assert_eq!(status, Status::ConditionsOfUseNotSatisfied);
                }
            },
            Operation::OverrideProtection => {
                let result = card.override_protection();
                if connected {
                    assert_eq!(result, Ok(()));
                    write_enabled = true;
                } else {
                    assert_eq!(result, Err(Status::ConditionsOfUseNotSatisfied));
                }
            }
            Operation::SetWriteEnabled(enabled) => {
                card.set_write_enabled(enabled);
                write_enabled = enabled;
            }
            Operation::Release => {
                card.release_card();
                connected = false;
            }
            Operation::Reconnect => {
                assert!(card.is_card_ready());
                connected = true;
            }
        }
        assert_eq!(card.is_write_enabled(), write_enabled);
        assert_eq!(card.short_value(), short.as_slice());
    }
});
