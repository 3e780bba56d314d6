// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the nibe-exporter project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Ordered, validated register catalog

use std::collections::HashSet;

use super::{Encoding, RegisterDescriptor, RegisterMode};
use crate::error::ExporterError;

/// Names of the series the exporter publishes about the polling itself
///
/// They share the metric prefix with the register gauges, so a register cannot
/// take one of these names.
pub const RESERVED_NAMES: [&str; 5] = [
    "register_up",
    "register_last_success_timestamp_seconds",
    "register_read_errors_total",
    "poll_passes_total",
    "poll_duration_seconds",
];

/// Immutable ordered list of register descriptors
///
/// Insertion order is the poll order. Names are unique. The catalog is built
/// once at startup and shared read-only between the poller and the metric sink.
#[derive(Debug, Clone, PartialEq)]
pub struct Catalog {
    registers: Vec<RegisterDescriptor>,
}

impl Catalog {
    /// Build a catalog, rejecting duplicate names, invalid or reserved names,
    /// non-positive factors and address ranges running past the end of the
    /// register space
    pub fn new(registers: Vec<RegisterDescriptor>) -> Result<Self, ExporterError> {
        if registers.is_empty() {
            return Err(ExporterError::Configuration(
                "register catalog is empty".to_string(),
            ));
        }

        let mut names = HashSet::new();
        for register in &registers {
            if !is_valid_metric_fragment(&register.name) {
                return Err(ExporterError::Configuration(format!(
                    "register name '{}' is not a valid metric name",
                    register.name
                )));
            }
            if RESERVED_NAMES.contains(&register.name.as_str()) {
                return Err(ExporterError::Configuration(format!(
                    "register name '{}' is reserved for the exporter's own metrics",
                    register.name
                )));
            }
            if !names.insert(register.name.as_str()) {
                return Err(ExporterError::Configuration(format!(
                    "duplicate register name '{}'",
                    register.name
                )));
            }
            if !register.factor.is_finite() || register.factor <= 0.0 {
                return Err(ExporterError::Configuration(format!(
                    "register '{}' has invalid scale factor {}",
                    register.name, register.factor
                )));
            }
            let last_word = register.address as u32 + register.word_count() as u32 - 1;
            if last_word > u16::MAX as u32 {
                return Err(ExporterError::Configuration(format!(
                    "register '{}' at address {} runs past the end of the register space",
                    register.name, register.address
                )));
            }
        }

        Ok(Self { registers })
    }

    /// Catalog of the NIBE heat pump registers exported by default
    pub fn nibe_default() -> Self {
        Self {
            registers: default_registers(),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &RegisterDescriptor> {
        self.registers.iter()
    }

    /// Registers the poller reads, in catalog order
    pub fn readable(&self) -> impl Iterator<Item = &RegisterDescriptor> {
        self.registers.iter().filter(|r| r.is_readable())
    }

    pub fn get(&self, name: &str) -> Option<&RegisterDescriptor> {
        self.registers.iter().find(|r| r.name == name)
    }

    pub fn len(&self) -> usize {
        self.registers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registers.is_empty()
    }

    pub fn descriptors(&self) -> &[RegisterDescriptor] {
        &self.registers
    }
}

/// Check that `name` can be used as (part of) a Prometheus metric name
pub fn is_valid_metric_fragment(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn register(
    address: u16,
    encoding: Encoding,
    unit: &str,
    name: &str,
    description: &str,
) -> RegisterDescriptor {
    RegisterDescriptor {
        address,
        encoding,
        factor: 10.0,
        unit: unit.to_string(),
        name: name.to_string(),
        description: description.to_string(),
        mode: RegisterMode::Read,
    }
}

/// Descriptors of the default NIBE register map
pub fn default_registers() -> Vec<RegisterDescriptor> {
    vec![
        register(1, Encoding::S16, "°C", "outdoor_temperature", "Outdoor temperature in °C"),
        register(5, Encoding::S16, "°C", "supply_temperature", "Supply temperature in °C"),
        register(7, Encoding::S16, "°C", "return_temperature", "Return temperature in °C"),
        register(8, Encoding::U16, "°C", "hotwater_temperature", "Hot water top in °C"),
        register(9, Encoding::U16, "°C", "hotwater_charging", "Hot water charging in °C"),
        register(2166, Encoding::U32, "W", "power_usage", "Power usage in Watt"),
    ]
}
