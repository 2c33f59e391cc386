// Copyright (C) 2022 Nitrokey GmbH
// SPDX-License-Identifier: CC0-1.0

#![no_main]
use cardcheck::fixture::{self, FixtureRecord, HASH_PLACEHOLDER};
use libfuzzer_sys::fuzz_target;

// Arbitrary long values must either be rejected or resolve to a consistent record.
fuzz_target!(|long: &[u8]| {
    cardcheck_fuzz::init_logging();
    let template = format!("{{\"h\":\"{HASH_PLACEHOLDER}\"}}");
    if let Ok(record) = FixtureRecord::from_documents(long, &template) {
        assert_eq!(record.long_hash, fixture::digest(&record.long));
        assert_eq!(
            record.short,
            format!("{{\"h\":\"{}\"}}", record.long_hash).into_bytes()
        );
        assert!(record.long.is_ascii());
        // Re-encoding an already encoded value is stable
        let reencoded: serde_json::Value = serde_json::from_slice(&record.long).unwrap();
        assert_eq!(fixture::to_python_json(&reencoded).unwrap(), record.long);
    }
});
