// Copyright (C) 2022 Nitrokey GmbH
// SPDX-License-Identifier: LGPL-3.0-only

//! Fixture payloads modelled on real card contents.
//!
//! A fixture is a directory containing two JSON documents:
//!
//! - `long.json` is the long value.  Its top-level `seal` field is a signature applied after the
//!   content was hashed, so it is removed and the rest is re-encoded before use.
//! - `short.json` is the short value.  It refers to the long value by hash: every occurrence of
//!   [`HASH_PLACEHOLDER`] is replaced by the lowercase hex SHA-256 digest of the re-encoded long
//!   value.  The rest of the file is used as it is.

mod encoding;

pub use encoding::to_python_json;

use std::{
    borrow::Cow,
    fs, io,
    path::{Path, PathBuf},
    string::FromUtf8Error,
    sync::OnceLock,
};

use regex::{NoExpand, Regex};
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Name of the admin card fixture.
pub const ADMIN: &str = "admin";
/// File name of the long value.
pub const LONG_FILE: &str = "long.json";
/// File name of the short value.
pub const SHORT_FILE: &str = "short.json";
/// Placeholder for the hash of the long value in the short value.
pub const HASH_PLACEHOLDER: &str = "{{hash(long)}}";
/// Field of the long value that is not part of the payload.
pub const SEAL_FIELD: &str = "seal";

/// Errors while loading a fixture.
#[derive(Debug)]
pub enum FixtureError {
    /// A fixture file could not be read.
    Io {
        /// The file.
        path: PathBuf,
        /// The underlying error.
        source: io::Error,
    },
    /// The short value template is not valid UTF-8.
    Encoding {
        /// The file.
        path: PathBuf,
        /// The underlying error.
        source: FromUtf8Error,
    },
    /// The long value is not valid JSON.
    Json(serde_json::Error),
    /// The long value is not a JSON object.
    NotAnObject,
    /// The long value has no seal.
    MissingSeal,
}

impl core::fmt::Display for FixtureError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Io { path, source } => write!(f, "{}: {source}", path.display()),
            Self::Encoding { path, source } => write!(f, "{}: {source}", path.display()),
            Self::Json(err) => write!(f, "Invalid long value: {err}"),
            Self::NotAnObject => f.write_str("Long value is not an object"),
            Self::MissingSeal => write!(f, "Long value has no {SEAL_FIELD:?} field"),
        }
    }
}

impl std::error::Error for FixtureError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Encoding { source, .. } => Some(source),
            Self::Json(err) => Some(err),
            _ => None,
        }
    }
}

/// A resolved short and long value pair.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FixtureRecord {
    /// The short value with the hash placeholder resolved.
    pub short: Vec<u8>,
    /// The long value without its seal.
    pub long: Vec<u8>,
    /// Lowercase hex SHA-256 digest of [`FixtureRecord::long`].
    pub long_hash: String,
}

impl FixtureRecord {
    /// Loads the fixture `name` from the directory `fixtures`.
    pub fn load(fixtures: impl AsRef<Path>, name: &str) -> Result<Self, FixtureError> {
        let dir = fixtures.as_ref().join(name);
        let long = read(&dir.join(LONG_FILE))?;
        let short_path = dir.join(SHORT_FILE);
        let short = String::from_utf8(read(&short_path)?).map_err(|source| {
            FixtureError::Encoding {
                path: short_path,
                source,
            }
        })?;
        // Text mode newline handling, the template is a text file
        let short = short.replace("\r\n", "\n").replace('\r', "\n");
        let record = Self::from_documents(&long, &short)?;
        debug!(
            "Loaded fixture {name}: {} bytes short, {} bytes long, hash {}",
            record.short.len(),
            record.long.len(),
            record.long_hash
        );
        Ok(record)
    }

    /// Resolves a fixture from the content of its long value and its short value template.
    pub fn from_documents(long: &[u8], short_template: &str) -> Result<Self, FixtureError> {
        let long = strip_seal(long)?;
        let long_hash = digest(&long);
        let short = resolve_placeholder(short_template, &long_hash)
            .into_owned()
            .into_bytes();
        Ok(Self {
            short,
            long,
            long_hash,
        })
    }
}

fn read(path: &Path) -> Result<Vec<u8>, FixtureError> {
    fs::read(path).map_err(|source| FixtureError::Io {
        path: path.to_owned(),
        source,
    })
}

/// Removes the seal from a long value and re-encodes it.
pub fn strip_seal(long: &[u8]) -> Result<Vec<u8>, FixtureError> {
    let mut value: Value = serde_json::from_slice(long).map_err(FixtureError::Json)?;
    let object = value.as_object_mut().ok_or(FixtureError::NotAnObject)?;
    object
        .shift_remove(SEAL_FIELD)
        .ok_or(FixtureError::MissingSeal)?;
    to_python_json(&value).map_err(FixtureError::Json)
}

/// Returns the lowercase hex SHA-256 digest of `data`.
pub fn digest(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

fn placeholder() -> &'static Regex {
    static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();
    // The pattern is a constant, unwrap is OK
    #[allow(clippy::unwrap_used)]
    PLACEHOLDER.get_or_init(|| Regex::new(&regex::escape(HASH_PLACEHOLDER)).unwrap())
}

/// Replaces every hash placeholder in `template` with `hash`.
pub fn resolve_placeholder<'a>(template: &'a str, hash: &str) -> Cow<'a, str> {
    let resolved = placeholder().replace_all(template, NoExpand(hash));
    if let Cow::Borrowed(_) = resolved {
        warn!("Short value template has no {HASH_PLACEHOLDER} placeholder");
    }
    resolved
}

#[cfg(test)]
mod tests {
    use super::*;

    const LONG: &str = r#"{"title": "Mock Election", "seal": "<svg/>", "ballotStyles": []}"#;

    #[test]
    fn digest_is_lowercase_hex() {
        assert_eq!(
            digest(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn seal_is_removed_in_place() {
        assert_eq!(
            strip_seal(LONG.as_bytes()).unwrap(),
            br#"{"title": "Mock Election", "ballotStyles": []}"#
        );
        assert!(matches!(
            strip_seal(br#"{"title": "x"}"#),
            Err(FixtureError::MissingSeal)
        ));
        assert!(matches!(
            strip_seal(br#"["seal"]"#),
            Err(FixtureError::NotAnObject)
        ));
        assert!(matches!(strip_seal(b"{"), Err(FixtureError::Json(_))));
    }

    #[test]
    fn nested_seals_are_kept() {
        assert_eq!(
            strip_seal(br#"{"seal": 1, "county": {"seal": 2}}"#).unwrap(),
            br#"{"county": {"seal": 2}}"#
        );
    }

    #[test]
    fn placeholder_is_resolved() {
        assert_eq!(
            resolve_placeholder(r#"{"h":"{{hash(long)}}","x":"{{hash(long)}}"}"#, "ab$1"),
            r#"{"h":"ab$1","x":"ab$1"}"#
        );
        assert_eq!(
            resolve_placeholder(r#"{"h":"{{hash(short)}}"}"#, "ab"),
            r#"{"h":"{{hash(short)}}"}"#
        );
    }

    #[test]
    fn short_template_must_be_utf8() {
        let dir = tempfile::tempdir().unwrap();
        let admin = dir.path().join(ADMIN);
        fs::create_dir_all(&admin).unwrap();
        fs::write(admin.join(LONG_FILE), LONG).unwrap();
        fs::write(admin.join(SHORT_FILE), b"{\"h\":\"\xff{{hash(long)}}\"}").unwrap();
        let err = FixtureRecord::load(dir.path(), ADMIN).unwrap_err();
        match err {
            FixtureError::Encoding { path, .. } => assert_eq!(path, admin.join(SHORT_FILE)),
            err => panic!("Unexpected error {err}"),
        }

        fs::write(admin.join(SHORT_FILE), "{\"h\":\"{{hash(long)}}\"}\r\n").unwrap();
        let record = FixtureRecord::load(dir.path(), ADMIN).unwrap();
        assert!(record.short.ends_with(b"\"}\n"));
    }

    #[test]
    fn record_hash_matches_long_value() {
        let record =
            FixtureRecord::from_documents(LONG.as_bytes(), r#"{"t":"admin","h":"{{hash(long)}}"}"#)
                .unwrap();
        assert_eq!(record.long_hash, digest(&record.long));
        assert_eq!(
            record.short,
            format!(r#"{{"t":"admin","h":"{}"}}"#, record.long_hash).into_bytes()
        );
    }
}
