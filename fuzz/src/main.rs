// Copyright (C) 2022 Nitrokey GmbH
// SPDX-License-Identifier: CC0-1.0

// Writes the seed corpus for fuzz_target_2 from the bundled fixtures.

use std::fs;
use std::path::Path;

fn main() {
    let fixtures = Path::new(env!("CARGO_MANIFEST_DIR")).join("../fixtures");
    let corpus = Path::new("corpus").join("fuzz_target_2");
    fs::create_dir_all(&corpus).unwrap();
    for entry in fs::read_dir(&fixtures).unwrap() {
        let entry = entry.unwrap();
        let long = entry.path().join(cardcheck::fixture::LONG_FILE);
        if let Ok(data) = fs::read(&long) {
            let name = entry.file_name();
            fs::write(corpus.join(&name), data).unwrap();
            println!("Wrote {}", name.to_string_lossy());
        }
    }
}
