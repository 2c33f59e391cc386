// Copyright (C) 2022 Nitrokey GmbH
// SPDX-License-Identifier: LGPL-3.0-only

use std::{
    borrow::Cow,
    io::{self, Write},
};

use serde::Serialize;
use serde_json::{ser::Formatter, Value};

/// Encodes a JSON value the way Python's `json.dumps` does with default arguments.
///
/// Key order is kept, items are separated by `", "` and keys by `": "`, everything outside of
/// printable ASCII is escaped and floats use Python's `repr`.  Integers keep all of their digits.
/// Floats that overflow to infinity are rejected, as Python would write them as `Infinity`, which
/// is not JSON.
pub fn to_python_json(value: &Value) -> serde_json::Result<Vec<u8>> {
    let mut out = Vec::new();
    let mut serializer = serde_json::Serializer::with_formatter(&mut out, PythonFormatter);
    value.serialize(&mut serializer)?;
    Ok(out)
}

#[derive(Clone, Copy, Debug, Default)]
struct PythonFormatter;

impl Formatter for PythonFormatter {
    fn begin_array_value<W: ?Sized + Write>(
        &mut self,
        writer: &mut W,
        first: bool,
    ) -> io::Result<()> {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_key<W: ?Sized + Write>(
        &mut self,
        writer: &mut W,
        first: bool,
    ) -> io::Result<()> {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_value<W: ?Sized + Write>(&mut self, writer: &mut W) -> io::Result<()> {
        writer.write_all(b": ")
    }

    // Quotes, backslashes and C0 controls never reach this point, serde_json escapes them the
    // same way Python does.
    fn write_string_fragment<W: ?Sized + Write>(
        &mut self,
        writer: &mut W,
        fragment: &str,
    ) -> io::Result<()> {
        let mut start = 0;
        for (index, ch) in fragment.char_indices() {
            if (' '..='~').contains(&ch) {
                continue;
            }
            writer.write_all(fragment[start..index].as_bytes())?;
            let mut units = [0; 2];
            for unit in ch.encode_utf16(&mut units).iter() {
                write!(writer, "\\u{unit:04x}")?;
            }
            start = index + ch.len_utf8();
        }
        writer.write_all(fragment[start..].as_bytes())
    }

    // Numbers arrive as the literal from the parsed document
    fn write_number_str<W: ?Sized + Write>(
        &mut self,
        writer: &mut W,
        value: &str,
    ) -> io::Result<()> {
        writer.write_all(number_repr(value)?.as_bytes())
    }
}

/// Formats a JSON number literal the way Python writes the `int` or `float` it parses to.
fn number_repr(literal: &str) -> io::Result<Cow<'_, str>> {
    if !literal.contains(['.', 'e', 'E']) {
        let repr = if literal == "-0" {
            Cow::Borrowed("0")
        } else {
            Cow::Borrowed(literal)
        };
        return Ok(repr);
    }
    let value: f64 = literal
        .parse()
        .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;
    if !value.is_finite() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("Number out of range: {literal}"),
        ));
    }
    Ok(Cow::Owned(float_repr(value)))
}

/// Formats a finite float like Python's `repr`.
///
/// Both Rust and Python print the shortest digit string that round-trips; they only differ in
/// where the decimal point goes and when to switch to exponent notation.
fn float_repr(value: f64) -> String {
    let scientific = format!("{value:e}");
    let (mantissa, exponent) = scientific
        .split_once('e')
        .unwrap_or((scientific.as_str(), "0"));
    let exponent: i32 = exponent.parse().unwrap_or_default();
    let (sign, mantissa) = match mantissa.strip_prefix('-') {
        Some(mantissa) => ("-", mantissa),
        None => ("", mantissa),
    };
    let digits: String = mantissa.chars().filter(|c| *c != '.').collect();

    if !(-4..16).contains(&exponent) {
        let (first, rest) = digits.split_at(1);
        let fraction = if rest.is_empty() {
            String::new()
        } else {
            format!(".{rest}")
        };
        let exponent_sign = if exponent < 0 { '-' } else { '+' };
        return format!(
            "{sign}{first}{fraction}e{exponent_sign}{:02}",
            exponent.unsigned_abs()
        );
    }

    if exponent < 0 {
        let zeros = "0".repeat(exponent.unsigned_abs() as usize - 1);
        return format!("{sign}0.{zeros}{digits}");
    }

    let int_len = exponent as usize + 1;
    if digits.len() > int_len {
        let (int, fraction) = digits.split_at(int_len);
        format!("{sign}{int}.{fraction}")
    } else {
        let zeros = "0".repeat(int_len - digits.len());
        format!("{sign}{digits}{zeros}.0")
    }
}
