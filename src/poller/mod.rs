// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the nibe-exporter project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Register poll loop
//!
//! A pass walks the readable registers of the catalog in order, reads each one
//! through a [`DeviceClient`], decodes it and publishes the value to a
//! [`MetricSink`]. Passes repeat forever with a fixed idle interval between the
//! end of one pass and the start of the next.
//!
//! ```text
//!        +---------+  pass done   +------+
//!  ----> | Polling | -----------> | Idle |
//!        +---------+ <----------- +------+
//!                     interval elapsed
//! ```
//!
//! Registers are read strictly one after the other through a single `&mut`
//! client, so two requests are never outstanding on the device connection, and
//! pass N+1 never overlaps pass N. A scrape running concurrently may observe a
//! partially updated pass.
//!
//! ## Failure policy
//!
//! By default a failed register is logged, counted by the sink and skipped; its
//! gauge keeps the last published value and the other registers are still
//! read. With [`PollerSettings::fail_fast`] the first failure ends the pass and
//! the loop with that error instead.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use log::{debug, info, trace, warn};
use tokio::time;
use tokio_util::sync::CancellationToken;

use crate::config::{Config, DeviceConfig};
use crate::error::ExporterError;
use crate::metrics::MetricSink;
use crate::modbus::DeviceClient;
use crate::registers::{decode, decode_raw, Catalog, RegisterDescriptor};

/// Timing and failure policy of the poll loop
#[derive(Debug, Clone, PartialEq)]
pub struct PollerSettings {
    /// Idle time between the end of a pass and the start of the next
    pub interval: Duration,
    /// Deadline of a whole register read, client retries included
    ///
    /// It must leave room for the device client's own timeouts and retries:
    /// a read cancelled by this deadline never reaches its next attempt.
    pub request_timeout: Duration,
    /// End the pass and the loop on the first failed register
    pub fail_fast: bool,
}

impl Default for PollerSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            request_timeout: DeviceConfig::default().read_budget(),
            fail_fast: false,
        }
    }
}

impl From<&Config> for PollerSettings {
    fn from(config: &Config) -> Self {
        Self {
            interval: config.poller.interval(),
            request_timeout: config.device.read_budget(),
            fail_fast: config.poller.fail_fast,
        }
    }
}

/// A decoded register value
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub register: String,
    pub address: u16,
    /// Integer read from the device, before scaling
    pub raw: i64,
    /// Scaled physical value
    pub value: f64,
    pub timestamp: DateTime<Utc>,
}

/// A register whose read or decode failed during a pass
#[derive(Debug)]
pub struct RegisterFailure {
    pub register: String,
    pub address: u16,
    pub error: ExporterError,
}

/// Outcome of one pass over the catalog
#[derive(Debug, Default)]
pub struct PassReport {
    /// Successful reads, in catalog order
    pub samples: Vec<Sample>,
    /// Failed reads, in catalog order
    pub failures: Vec<RegisterFailure>,
    pub duration: Duration,
}

impl PassReport {
    /// True when every readable register was read successfully
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    /// Value decoded for `register` during this pass
    pub fn value(&self, register: &str) -> Option<f64> {
        self.samples
            .iter()
            .find(|sample| sample.register == register)
            .map(|sample| sample.value)
    }
}

/// Periodic reader of the catalog registers
pub struct Poller {
    catalog: Arc<Catalog>,
    settings: PollerSettings,
}

impl Poller {
    pub fn new(catalog: Arc<Catalog>, settings: PollerSettings) -> Self {
        Self { catalog, settings }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn settings(&self) -> &PollerSettings {
        &self.settings
    }

    /// Read every readable register once, in catalog order
    ///
    /// Returns the pass report, or with `fail_fast` the first register error.
    pub async fn poll_pass(
        &self,
        client: &mut dyn DeviceClient,
        sink: &dyn MetricSink,
    ) -> Result<PassReport, ExporterError> {
        let started = Instant::now();
        let mut report = PassReport::default();

        for descriptor in self.catalog.readable() {
            match self.read_register(client, descriptor).await {
                Ok(sample) => {
                    trace!(
                        "Register {} ({}) = {} (raw {})",
                        descriptor.name,
                        descriptor.address,
                        sample.value,
                        sample.raw
                    );
                    if let Err(err) = sink.set(&descriptor.name, sample.value) {
                        warn!("Cannot publish register {}: {}", descriptor.name, err);
                    }
                    report.samples.push(sample);
                }
                Err(err) => {
                    warn!(
                        "Failed to read register {} at address {}: {}",
                        descriptor.name, descriptor.address, err
                    );
                    sink.record_failure(&descriptor.name, &err);
                    if self.settings.fail_fast {
                        return Err(err);
                    }
                    report.failures.push(RegisterFailure {
                        register: descriptor.name.clone(),
                        address: descriptor.address,
                        error: err,
                    });
                }
            }
        }

        report.duration = started.elapsed();
        sink.record_pass(report.duration);
        debug!(
            "Poll pass done in {:?}: {} ok, {} failed",
            report.duration,
            report.samples.len(),
            report.failures.len()
        );
        Ok(report)
    }

    async fn read_register(
        &self,
        client: &mut dyn DeviceClient,
        descriptor: &RegisterDescriptor,
    ) -> Result<Sample, ExporterError> {
        let count = descriptor.word_count();
        let bytes = time::timeout(
            self.settings.request_timeout,
            client.read_words(descriptor.address, count),
        )
        .await
        .map_err(|_| ExporterError::Timeout {
            address: descriptor.address,
            timeout: self.settings.request_timeout,
        })??;

        let value = decode(&bytes, descriptor)?;
        let raw = decode_raw(&bytes, descriptor.encoding)?;
        Ok(Sample {
            register: descriptor.name.clone(),
            address: descriptor.address,
            raw,
            value,
            timestamp: Utc::now(),
        })
    }

    /// Poll until `shutdown` is cancelled
    ///
    /// Cancellation interrupts an outstanding request as well as the idle
    /// wait. Returns the number of completed passes.
    pub async fn run(
        &self,
        client: &mut dyn DeviceClient,
        sink: &dyn MetricSink,
        shutdown: CancellationToken,
    ) -> Result<u64, ExporterError> {
        self.run_loop(None, client, sink, shutdown).await
    }

    /// Poll `count` passes, without idling after the last one
    pub async fn run_passes(
        &self,
        count: u64,
        client: &mut dyn DeviceClient,
        sink: &dyn MetricSink,
        shutdown: CancellationToken,
    ) -> Result<u64, ExporterError> {
        self.run_loop(Some(count), client, sink, shutdown).await
    }

    async fn run_loop(
        &self,
        limit: Option<u64>,
        client: &mut dyn DeviceClient,
        sink: &dyn MetricSink,
        shutdown: CancellationToken,
    ) -> Result<u64, ExporterError> {
        info!(
            "Polling {} registers every {:?}",
            self.catalog.readable().count(),
            self.settings.interval
        );
        let mut passes = 0u64;

        loop {
            if limit.is_some_and(|limit| passes >= limit) {
                break;
            }

            trace!("Poller state: Polling");
            tokio::select! {
                _ = shutdown.cancelled() => {
                    debug!("Poller cancelled during pass {}", passes + 1);
                    break;
                }
                result = self.poll_pass(client, sink) => {
                    result?;
                    passes += 1;
                }
            }

            if limit.is_some_and(|limit| passes >= limit) {
                break;
            }

            trace!("Poller state: Idle");
            tokio::select! {
                _ = shutdown.cancelled() => {
                    debug!("Poller cancelled while idle");
                    break;
                }
                _ = time::sleep(self.settings.interval) => {}
            }
        }

        info!("Poller stopped after {} passes", passes);
        Ok(passes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_from_config() {
        let mut config = Config::default();
        config.poller.interval_ms = 1500;
        config.device.timeout_ms = 250;
        config.device.retries = 2;
        config.poller.fail_fast = true;

        let settings = PollerSettings::from(&config);
        assert_eq!(settings.interval, Duration::from_millis(1500));
        // Three attempts of connect and read, plus name resolution
        assert_eq!(settings.request_timeout, Duration::from_millis(1750));
        assert!(settings.fail_fast);
        assert_eq!(
            PollerSettings::from(&Config::default()),
            PollerSettings::default()
        );
    }

    #[test]
    fn test_pass_report_lookup() {
        let report = PassReport {
            samples: vec![Sample {
                register: "power_usage".to_string(),
                address: 2166,
                raw: 1000,
                value: 100.0,
                timestamp: Utc::now(),
            }],
            failures: Vec::new(),
            duration: Duration::ZERO,
        };
        assert!(report.is_complete());
        assert_eq!(report.value("power_usage"), Some(100.0));
        assert_eq!(report.value("outdoor_temperature"), None);
    }
}
