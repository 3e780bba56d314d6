// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the nibe-exporter project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Configuration management for the exporter
//!
//! This module provides functionality for loading, validating, and applying
//! configuration settings. The configuration is backed by a YAML file and
//! validated against a JSON schema for robustness.
//!
//! ## Configuration Structure
//!
//! The configuration is organized as a nested structure with sections:
//! - `device`: Modbus TCP device to poll
//! - `metrics`: HTTP server exposing the Prometheus metrics
//! - `poller`: Poll loop timing and failure policy
//! - `registers`: Register catalog, defaults to the NIBE register map
//!
//! ## Usage
//!
//! ```no_run
//! use nibe_exporter::config::Config;
//! use std::path::Path;
//! use std::time::Duration;
//!
//! // Load config from file, creates a default if not found
//! let mut config = Config::from_file(Path::new("config.yaml")).unwrap();
//!
//! // Apply command line overrides if needed
//! config.apply_args(
//!     Some("192.168.1.50".to_string()), // Device host
//!     None,                             // Device port
//!     None,                             // Slave id
//!     Some(9100),                       // Metrics port
//!     None,                             // Metrics path
//!     Some(Duration::from_secs(10)),    // Poll interval
//!     None,                             // Metric prefix
//! );
//!
//! println!("Polling {}:{}", config.device.host, config.device.port);
//! ```

pub mod device;
pub mod metrics;
pub mod poller;
pub mod utils;

use std::fs::{self, File};
use std::io::Write;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use log::{debug, error};
use serde::{Deserialize, Serialize};

use crate::error::ExporterError;
use crate::registers::{default_registers, Catalog, RegisterDescriptor};

pub use device::DeviceConfig;
pub use metrics::MetricsConfig;
pub use poller::PollerConfig;
pub use utils::{is_valid_ip_address, output_config_schema, parse_interval};

/// Root configuration structure of the exporter.
///
/// # Default Values
///
/// Each section uses default values when not explicitly specified in the
/// configuration file, so an empty file polls the default NIBE registers on
/// `0.0.0.0:502` and exposes them on `0.0.0.0:2112/metrics`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Modbus TCP device settings.
    #[serde(default)]
    pub device: DeviceConfig,

    /// Metrics exposition server settings.
    #[serde(default)]
    pub metrics: MetricsConfig,

    /// Poll loop settings.
    #[serde(default)]
    pub poller: PollerConfig,

    /// Registers polled on every pass, in poll order.
    ///
    /// Each entry gives the register's address, encoding (`u16`, `s16` or
    /// `u32`), scale factor and metric name.
    #[serde(default = "default_registers")]
    pub registers: Vec<RegisterDescriptor>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            device: DeviceConfig::default(),
            metrics: MetricsConfig::default(),
            poller: PollerConfig::default(),
            registers: default_registers(),
        }
    }
}

impl Config {
    /// Helper method to create a sample config file when validation fails
    fn create_sample_config<P: AsRef<Path>>(path: P) -> Result<()> {
        let path = path.as_ref();
        let sample_path = path.with_extension("sample.yaml");
        debug!("Config path: {:?}, sample path: {:?}", path, sample_path);

        if let Some(parent) = sample_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                debug!("Creating parent directory: {:?}", parent);
                fs::create_dir_all(parent).with_context(|| {
                    format!(
                        "Failed to create parent directory for sample config at {:?}",
                        parent
                    )
                })?;
            }
        }

        Self::default()
            .save_to_file(&sample_path)
            .with_context(|| format!("Failed to save sample config to {:?}", sample_path))?;

        error!(
            "Sample configuration file created at {:?}\nPlease edit and rename it",
            sample_path
        );
        Ok(())
    }

    /// Load configuration from a file
    ///
    /// A missing file is created with the default configuration. An invalid
    /// file is left untouched; a `.sample.yaml` sibling holding the defaults is
    /// written next to it and the validation error is returned.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            debug!(
                "Configuration file not found at {:?}, creating default",
                path
            );
            let default_config = Self::default();
            default_config.save_to_file(path)?;
            return Ok(default_config);
        }

        debug!("Loading configuration from {:?}", path);
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration file at {:?}", path))?;

        let yaml_value: serde_yml::Value = serde_yml::from_str(&contents)
            .with_context(|| format!("Failed to parse YAML configuration from {:?}", path))?;

        // An empty document parses to null, which means "all defaults"
        let yaml_value = if yaml_value.is_null() {
            serde_yml::Value::Mapping(serde_yml::Mapping::new())
        } else {
            yaml_value
        };

        let json_value = serde_json::to_value(&yaml_value).with_context(|| {
            format!("Failed to convert YAML to JSON for validation: {:?}", path)
        })?;

        let schema_str = include_str!("../../resources/config.schema.json");
        let schema: serde_json::Value =
            serde_json::from_str(schema_str).context("Failed to parse JSON schema")?;

        let validator = jsonschema::draft202012::options()
            .should_validate_formats(true)
            .build(&schema)?;

        debug!("Validating {} configuration against schema", path.display());
        if let Err(error) = validator.validate(&json_value) {
            error!("Configuration validation error before deserialization");
            Self::create_sample_config(path)?;
            anyhow::bail!("Configuration validation failed: {}", error);
        }

        debug!("Schema validation passed, deserializing into Config structure");
        let config: Config = match serde_json::from_value(json_value) {
            Ok(config) => config,
            Err(err) => {
                error!("Configuration deserialization error: {}", err);
                if let Err(e) = Self::create_sample_config(path) {
                    error!("Failed to create sample config: {}", e);
                }
                return Err(anyhow::anyhow!(
                    "Failed to deserialize configuration from {}: {}",
                    path.display(),
                    err
                ));
            }
        };

        if let Err(err) = utils::validate_specific_rules(&config) {
            error!("Configuration specific validation error: {}", err);
            Self::create_sample_config(path)?;
            return Err(err);
        }

        Ok(config)
    }

    /// Save the configuration to a file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let yaml =
            serde_yml::to_string(self).context("Failed to serialize configuration to YAML")?;

        let mut file = File::create(path.as_ref())
            .with_context(|| format!("Failed to create config file at {:?}", path.as_ref()))?;

        file.write_all(yaml.as_bytes())
            .with_context(|| format!("Failed to write configuration to {:?}", path.as_ref()))?;

        Ok(())
    }

    /// Apply command line arguments to override configuration values.
    ///
    /// Only explicitly provided values override the existing configuration.
    ///
    /// # Parameters
    ///
    /// * `host` - Hostname or IP address of the Modbus device
    /// * `device_port` - Modbus TCP port of the device
    /// * `slave_id` - Modbus unit identifier of the device
    /// * `metrics_port` - TCP port of the metrics server
    /// * `metrics_path` - HTTP path of the metrics route
    /// * `interval` - Idle time between two poll passes
    /// * `prefix` - Prefix of the exposed metric names
    pub fn apply_args(
        &mut self,
        host: Option<String>,
        device_port: Option<u16>,
        slave_id: Option<u8>,
        metrics_port: Option<u16>,
        metrics_path: Option<String>,
        interval: Option<Duration>,
        prefix: Option<String>,
    ) {
        if let Some(host) = host {
            debug!("Overriding device host from command line: {}", host);
            self.device.host = host;
        }
        if let Some(port) = device_port {
            debug!("Overriding device port from command line: {}", port);
            self.device.port = port;
        }
        if let Some(slave_id) = slave_id {
            debug!("Overriding slave id from command line: {}", slave_id);
            self.device.slave_id = slave_id;
        }
        if let Some(port) = metrics_port {
            debug!("Overriding metrics port from command line: {}", port);
            self.metrics.port = port;
        }
        if let Some(path) = metrics_path {
            debug!("Overriding metrics path from command line: {}", path);
            self.metrics.path = path;
        }
        if let Some(interval) = interval {
            debug!("Overriding poll interval from command line: {:?}", interval);
            self.poller.interval_ms = interval.as_millis() as u64;
        }
        if let Some(prefix) = prefix {
            debug!("Overriding metric prefix from command line: {}", prefix);
            self.metrics.prefix = prefix;
        }
    }

    /// Build the validated register catalog from the `registers` section
    pub fn catalog(&self) -> Result<Catalog, ExporterError> {
        Catalog::new(self.registers.clone())
    }
}
