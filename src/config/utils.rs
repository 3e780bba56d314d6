// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the nibe-exporter project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Configuration utilities
//!
//! This module provides utility functions for working with configuration
//! settings, including validation, interval parsing and schema management.

use std::time::Duration;

use anyhow::{Context, Result};
use base64::Engine;
use log::{debug, warn};

use super::Config;
use crate::error::ExporterError;
use crate::registers::catalog::is_valid_metric_fragment;
use crate::registers::Catalog;

/// Output the embedded JSON schema to the console.
///
/// This function is called when the `--show-config-schema` flag is provided
/// on the command line.
///
/// # Example
///
/// ```bash
/// ./nibe_exporter --show-config-schema > config_schema.json
/// ```
pub fn output_config_schema() -> Result<()> {
    let schema_str = include_str!("../../resources/config.schema.json");

    let schema: serde_json::Value =
        serde_json::from_str(schema_str).context("Failed to parse JSON schema")?;

    let formatted_schema =
        serde_json::to_string_pretty(&schema).context("Failed to format JSON schema")?;

    println!("{}", formatted_schema);

    Ok(())
}

/// Check if a string is a valid IP address
///
/// Validates that a string represents a valid IPv4 or IPv6 address,
/// or is one of the special values like "localhost" or "0.0.0.0".
pub fn is_valid_ip_address(addr: &str) -> bool {
    if addr.parse::<std::net::IpAddr>().is_ok() {
        return true;
    }

    matches!(addr, "localhost" | "::" | "::0" | "0.0.0.0")
}

/// Parse a poll interval given on the command line
///
/// A bare number is a count of seconds. A number followed by `ms`, `s`, `m` or
/// `h` uses that unit. The interval must be positive.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use nibe_exporter::config::parse_interval;
///
/// assert_eq!(parse_interval("30").unwrap(), Duration::from_secs(30));
/// assert_eq!(parse_interval("500ms").unwrap(), Duration::from_millis(500));
/// assert_eq!(parse_interval("2m").unwrap(), Duration::from_secs(120));
/// assert!(parse_interval("soon").is_err());
/// ```
pub fn parse_interval(input: &str) -> Result<Duration, ExporterError> {
    let input = input.trim();
    let invalid = || ExporterError::Configuration(format!("invalid poll interval '{}'", input));

    let split = input
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(input.len());
    let (number, unit) = input.split_at(split);
    let value: u64 = number.parse().map_err(|_| invalid())?;

    let millis_per_unit = match unit {
        "" | "s" => 1_000,
        "ms" => 1,
        "m" => 60_000,
        "h" => 3_600_000,
        _ => return Err(invalid()),
    };

    let millis = value.checked_mul(millis_per_unit).ok_or_else(invalid)?;
    if millis == 0 {
        return Err(ExporterError::Configuration(format!(
            "poll interval '{}' must be positive",
            input
        )));
    }
    Ok(Duration::from_millis(millis))
}

/// Validates the configuration against additional rules that aren't covered by the JSON schema.
///
/// # Validation Rules
///
/// - **SSL Configuration**: a certificate requires a key and vice versa, both Base64 encoded
/// - **Port Range**: metrics and device ports must not be 0
/// - **Metrics path**: must start with `/`
/// - **Metric prefix**: empty, or a valid Prometheus metric name fragment
/// - **Timing**: poll interval and request timeout must be positive
/// - **Registers**: the catalog must build (unique valid names, positive factors)
pub fn validate_specific_rules(config: &Config) -> Result<()> {
    debug!("Performing additional validation checks");

    if let Some(cert) = &config.metrics.cert {
        if config.metrics.key.is_none() {
            anyhow::bail!("SSL certificate provided without a key");
        }
        let _ = base64::engine::general_purpose::STANDARD
            .decode(cert)
            .context("SSL certificate is not valid base64")?;
    }

    if let Some(key) = &config.metrics.key {
        if config.metrics.cert.is_none() {
            anyhow::bail!("SSL key provided without a certificate");
        }
        let _ = base64::engine::general_purpose::STANDARD
            .decode(key)
            .context("SSL key is not valid base64")?;
    }

    if config.metrics.port == 0 {
        anyhow::bail!("Invalid metrics port number: {}", config.metrics.port);
    }
    if config.device.port == 0 {
        anyhow::bail!("Invalid device port number: {}", config.device.port);
    }

    if !is_valid_ip_address(&config.metrics.address) {
        // Hostnames are accepted by the server, only warn
        warn!(
            "Potentially invalid metrics address format: {}",
            config.metrics.address
        );
    }

    if !config.metrics.path.starts_with('/') {
        anyhow::bail!(
            "Metrics path '{}' must start with '/'",
            config.metrics.path
        );
    }

    if !config.metrics.prefix.is_empty() && !is_valid_metric_fragment(&config.metrics.prefix) {
        anyhow::bail!(
            "Metric prefix '{}' is not a valid metric name",
            config.metrics.prefix
        );
    }

    if config.poller.interval_ms == 0 {
        anyhow::bail!("Poll interval must be positive");
    }
    if config.device.timeout_ms == 0 {
        anyhow::bail!("Device request timeout must be positive");
    }

    Catalog::new(config.registers.clone()).context("Invalid register catalog")?;

    Ok(())
}
