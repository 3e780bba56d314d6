// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the nibe-exporter project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Modbus device configuration
//!
//! This module defines where the heat pump is reached and how patient the
//! exporter is with it.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration of the Modbus TCP device being polled.
///
/// # Fields
///
/// * `host` - Hostname or IP address of the device (default: 0.0.0.0)
/// * `port` - Modbus TCP port of the device (default: 502)
/// * `slave_id` - Modbus unit identifier (default: 1)
/// * `timeout_ms` - Deadline of a single request, connection included (default: 5000)
/// * `retries` - Additional attempts after a failed read (default: 1)
///
/// # Example
///
/// ```
/// use nibe_exporter::config::DeviceConfig;
///
/// let device = DeviceConfig {
///     host: "192.168.1.50".to_string(),
///     ..DeviceConfig::default()
/// };
/// assert_eq!(device.port, 502);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Hostname or IP address of the device.
    ///
    /// The default `0.0.0.0` only makes sense when the device runs on the
    /// same host; set it to the heat pump's address in production.
    pub host: String,

    /// Modbus TCP port of the device. Default is 502.
    pub port: u16,

    /// Modbus unit identifier the requests are addressed to.
    pub slave_id: u8,

    /// Per-request deadline in milliseconds.
    ///
    /// Applies to connecting as well as to each register read. An elapsed
    /// deadline is reported as a timeout for the register being read.
    pub timeout_ms: u64,

    /// Number of times a failed read is retried before the register is
    /// reported as failed for the current pass.
    pub retries: u8,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 502,
            slave_id: 1,
            timeout_ms: 5000,
            retries: 1,
        }
    }
}

impl DeviceConfig {
    /// Upper bound of a complete read of one register, retries included
    ///
    /// Every attempt may spend `timeout_ms` connecting and `timeout_ms`
    /// waiting for the answer; one more period covers name resolution.
    ///
    /// ```
    /// use std::time::Duration;
    /// use nibe_exporter::config::DeviceConfig;
    ///
    /// let device = DeviceConfig {
    ///     timeout_ms: 300,
    ///     retries: 1,
    ///     ..DeviceConfig::default()
    /// };
    /// assert_eq!(device.read_budget(), Duration::from_millis(1500));
    /// ```
    pub fn read_budget(&self) -> Duration {
        let periods = 2 * (u32::from(self.retries) + 1) + 1;
        Duration::from_millis(self.timeout_ms).saturating_mul(periods)
    }
}
