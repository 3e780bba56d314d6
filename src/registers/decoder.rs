// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the nibe-exporter project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Register value decoding
//!
//! Pure functions turning the raw big-endian bytes returned by the device into
//! scaled floating point values. The scale factor is applied as a plain `f64`
//! division, so a zero factor yields `inf` or `NaN`; configuration validation
//! rejects such factors before they reach this module.

use super::{Encoding, RegisterDescriptor};
use crate::error::ExporterError;

/// Interpret the leading bytes of `raw` as an integer of the given encoding
///
/// Extra trailing bytes are ignored. Fewer bytes than the encoding requires is a
/// [`ExporterError::MalformedResponse`] (reported for address 0, callers that
/// know the register address should use [`decode`]).
pub fn decode_raw(raw: &[u8], encoding: Encoding) -> Result<i64, ExporterError> {
    decode_at(raw, encoding, 0)
}

/// Decode and scale the value of `descriptor` from the raw device bytes
///
/// # Example
///
/// ```
/// use nibe_exporter::registers::{decode, Encoding, RegisterDescriptor, RegisterMode};
///
/// let descriptor = RegisterDescriptor {
///     address: 1,
///     encoding: Encoding::S16,
///     factor: 10.0,
///     unit: "°C".to_string(),
///     name: "outdoor_temperature".to_string(),
///     description: String::new(),
///     mode: RegisterMode::Read,
/// };
/// assert_eq!(decode(&[0xFF, 0x38], &descriptor).unwrap(), -20.0);
/// ```
pub fn decode(raw: &[u8], descriptor: &RegisterDescriptor) -> Result<f64, ExporterError> {
    let value = decode_at(raw, descriptor.encoding, descriptor.address)?;
    Ok(value as f64 / descriptor.factor)
}

fn decode_at(raw: &[u8], encoding: Encoding, address: u16) -> Result<i64, ExporterError> {
    let expected = encoding.byte_len();
    if raw.len() < expected {
        return Err(ExporterError::MalformedResponse {
            address,
            expected,
            actual: raw.len(),
        });
    }

    let value = match encoding {
        Encoding::U16 => u16::from_be_bytes([raw[0], raw[1]]) as i64,
        Encoding::S16 => i16::from_be_bytes([raw[0], raw[1]]) as i64,
        Encoding::U32 => u32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]]) as i64,
    };
    Ok(value)
}

/// Convert Modbus register words into the big-endian byte layout the decoder expects
pub fn words_to_bytes(words: &[u16]) -> Vec<u8> {
    words.iter().flat_map(|word| word.to_be_bytes()).collect()
}
