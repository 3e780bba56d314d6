// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the nibe-exporter project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Register descriptors and the register catalog
//!
//! A register descriptor tells the poller where a value lives on the device
//! (`address`), how it is laid out on the wire (`encoding`) and how to turn the
//! raw integer into a physical value (`factor`). The catalog is the ordered list
//! of descriptors polled on every pass.
//!
//! ## Default Register Map (NIBE heat pump input registers)
//!
//! - Register 1: Outdoor temperature (s16, °C × 10)
//! - Register 5: Supply temperature (s16, °C × 10)
//! - Register 7: Return temperature (s16, °C × 10)
//! - Register 8: Hot water top (u16, °C × 10)
//! - Register 9: Hot water charging (u16, °C × 10)
//! - Register 2166-2167: Power usage (u32, W × 10)

pub mod catalog;
pub mod decoder;

pub use catalog::{default_registers, Catalog};
pub use decoder::{decode, decode_raw};

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ExporterError;

/// Wire layout of a register value
///
/// All encodings are big-endian. 32-bit values span two consecutive words,
/// high word first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Encoding {
    /// Unsigned 16-bit integer, one word
    U16,
    /// Signed 16-bit integer (two's complement), one word
    S16,
    /// Unsigned 32-bit integer, two words
    U32,
}

impl Encoding {
    /// Number of 16-bit words to request from the device
    pub fn word_count(self) -> u16 {
        match self {
            Encoding::U16 | Encoding::S16 => 1,
            Encoding::U32 => 2,
        }
    }

    /// Number of bytes the decoder consumes
    pub fn byte_len(self) -> usize {
        self.word_count() as usize * 2
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Encoding::U16 => "u16",
            Encoding::S16 => "s16",
            Encoding::U32 => "u32",
        }
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Encoding {
    type Err = ExporterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "u16" => Ok(Encoding::U16),
            "s16" => Ok(Encoding::S16),
            "u32" => Ok(Encoding::U32),
            _ => Err(ExporterError::UnsupportedEncoding(s.to_string())),
        }
    }
}

impl TryFrom<String> for Encoding {
    type Error = ExporterError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Encoding> for String {
    fn from(encoding: Encoding) -> Self {
        encoding.as_str().to_string()
    }
}

/// Access mode of a register
///
/// Only readable registers are polled. Write mode is accepted in the
/// configuration but the exporter never writes to the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RegisterMode {
    #[default]
    #[serde(rename = "r")]
    Read,
    #[serde(rename = "w")]
    Write,
}

/// Description of a single device register
///
/// # Example
///
/// ```
/// use nibe_exporter::registers::{Encoding, RegisterDescriptor, RegisterMode};
///
/// let outdoor = RegisterDescriptor {
///     address: 1,
///     encoding: Encoding::S16,
///     factor: 10.0,
///     unit: "°C".to_string(),
///     name: "outdoor_temperature".to_string(),
///     description: "Outdoor temperature in °C".to_string(),
///     mode: RegisterMode::Read,
/// };
/// assert_eq!(outdoor.encoding.word_count(), 1);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisterDescriptor {
    /// Input register offset on the device
    pub address: u16,

    /// Wire width and signedness
    pub encoding: Encoding,

    /// Divisor applied to the raw integer to obtain the physical value
    pub factor: f64,

    /// Physical unit, informative only
    #[serde(default)]
    pub unit: String,

    /// Metric identifier, unique within a catalog
    pub name: String,

    /// Help text of the exposed gauge
    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub mode: RegisterMode,
}

impl RegisterDescriptor {
    /// Number of words requested for this register
    pub fn word_count(&self) -> u16 {
        self.encoding.word_count()
    }

    pub fn is_readable(&self) -> bool {
        self.mode == RegisterMode::Read
    }

    /// Help text for the gauge, falling back to the register name
    pub fn help(&self) -> String {
        if self.description.is_empty() {
            format!("Register {} ({})", self.address, self.name)
        } else {
            self.description.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_word_counts() {
        assert_eq!(Encoding::U16.word_count(), 1);
        assert_eq!(Encoding::S16.word_count(), 1);
        assert_eq!(Encoding::U32.word_count(), 2);
        assert_eq!(Encoding::U32.byte_len(), 4);
    }

    #[test]
    fn test_encoding_parsing() {
        assert_eq!("u16".parse::<Encoding>().unwrap(), Encoding::U16);
        assert_eq!("S16".parse::<Encoding>().unwrap(), Encoding::S16);
        assert_eq!(" u32 ".parse::<Encoding>().unwrap(), Encoding::U32);

        match "f32".parse::<Encoding>() {
            Err(ExporterError::UnsupportedEncoding(tag)) => assert_eq!(tag, "f32"),
            other => panic!("expected UnsupportedEncoding, got {:?}", other),
        }
    }

    #[test]
    fn test_descriptor_yaml_round_trip_uses_short_tags() {
        let yaml = r#"
address: 2166
encoding: u32
factor: 10
unit: W
name: power_usage
description: Power usage in Watt
mode: r
"#;
        let descriptor: RegisterDescriptor = serde_yml::from_str(yaml).unwrap();
        assert_eq!(descriptor.address, 2166);
        assert_eq!(descriptor.encoding, Encoding::U32);
        assert_eq!(descriptor.mode, RegisterMode::Read);

        let serialized = serde_yml::to_string(&descriptor).unwrap();
        assert!(serialized.contains("encoding: u32"));
        assert!(serialized.contains("mode: r"));
    }

    #[test]
    fn test_unknown_encoding_is_rejected_at_deserialization() {
        let yaml = "address: 3\nencoding: s32\nfactor: 1\nname: foo\n";
        let err = serde_yml::from_str::<RegisterDescriptor>(yaml).unwrap_err();
        assert!(err.to_string().contains("Unsupported register encoding 's32'"));
    }

    #[test]
    fn test_mode_defaults_to_read() {
        let yaml = "address: 3\nencoding: u16\nfactor: 1\nname: foo\n";
        let descriptor: RegisterDescriptor = serde_yml::from_str(yaml).unwrap();
        assert!(descriptor.is_readable());
        assert_eq!(descriptor.help(), "Register 3 (foo)");
    }
}
