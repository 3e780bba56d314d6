// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the nibe-exporter project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Metric sink backed by a Prometheus registry
//!
//! One gauge per readable catalog register, named `<prefix>_<register name>`,
//! is created once at startup. The poller only ever calls `set` on these
//! gauges; the HTTP server only ever renders the registry. Gauges are atomic, so
//! no lock is shared between the two.
//!
//! Besides the register gauges the sink exposes a few series describing the
//! health of the polling itself (label `register` holds the register name):
//!
//! - `<prefix>_register_up`: 1 if the last read succeeded, 0 otherwise
//! - `<prefix>_register_last_success_timestamp_seconds`: UNIX time of the last successful read
//! - `<prefix>_register_read_errors_total`: failed reads, by error kind
//! - `<prefix>_poll_passes_total`: completed poll passes
//! - `<prefix>_poll_duration_seconds`: duration of the last poll pass

use std::collections::HashMap;
use std::time::Duration;

use log::debug;
use prometheus::{Encoder, Gauge, GaugeVec, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

use crate::error::ExporterError;
use crate::registers::Catalog;

/// Destination of the decoded register values
pub trait MetricSink: Send + Sync {
    /// Publish the latest value of `register`
    fn set(&self, register: &str, value: f64) -> Result<(), ExporterError>;

    /// Note a failed read; the register's gauge keeps its last value
    fn record_failure(&self, register: &str, error: &ExporterError);

    /// Note the completion of a poll pass
    fn record_pass(&self, duration: Duration);
}

/// [`MetricSink`] exposing gauges through a private Prometheus registry
pub struct PrometheusSink {
    registry: Registry,
    prefix: String,
    gauges: HashMap<String, Gauge>,
    up: GaugeVec,
    last_success: GaugeVec,
    read_errors: IntCounterVec,
    passes: IntCounter,
    pass_duration: Gauge,
}

impl PrometheusSink {
    /// Create the registry and one gauge per readable register of `catalog`
    pub fn new(catalog: &Catalog, prefix: &str) -> Result<Self, ExporterError> {
        let registry = Registry::new();
        let name = |suffix: &str| metric_name(prefix, suffix);

        let up = GaugeVec::new(
            Opts::new(
                name("register_up"),
                "Whether the last read of the register succeeded (1) or failed (0)",
            ),
            &["register"],
        )?;
        let last_success = GaugeVec::new(
            Opts::new(
                name("register_last_success_timestamp_seconds"),
                "UNIX timestamp of the last successful read of the register",
            ),
            &["register"],
        )?;
        let read_errors = IntCounterVec::new(
            Opts::new(
                name("register_read_errors_total"),
                "Number of failed register reads",
            ),
            &["register", "kind"],
        )?;
        let passes = IntCounter::new(name("poll_passes_total"), "Number of completed poll passes")?;
        let pass_duration = Gauge::new(
            name("poll_duration_seconds"),
            "Duration of the last poll pass in seconds",
        )?;

        registry.register(Box::new(up.clone()))?;
        registry.register(Box::new(last_success.clone()))?;
        registry.register(Box::new(read_errors.clone()))?;
        registry.register(Box::new(passes.clone()))?;
        registry.register(Box::new(pass_duration.clone()))?;

        let mut sink = Self {
            registry,
            prefix: prefix.to_string(),
            gauges: HashMap::new(),
            up,
            last_success,
            read_errors,
            passes,
            pass_duration,
        };

        for register in catalog.readable() {
            sink.get_or_create_gauge(&register.name, &register.help())?;
            sink.up.with_label_values(&[register.name.as_str()]).set(0.0);
        }

        Ok(sink)
    }

    /// Return the gauge of `register`, creating and registering it on first use
    pub fn get_or_create_gauge(
        &mut self,
        register: &str,
        description: &str,
    ) -> Result<Gauge, ExporterError> {
        if let Some(gauge) = self.gauges.get(register) {
            return Ok(gauge.clone());
        }

        let name = self.metric_name(register);
        debug!("Registering gauge {}", name);
        let gauge = Gauge::with_opts(Opts::new(name, description))?;
        self.registry.register(Box::new(gauge.clone()))?;
        self.gauges.insert(register.to_string(), gauge.clone());
        Ok(gauge)
    }

    /// Exposed metric name of `register`
    pub fn metric_name(&self, register: &str) -> String {
        metric_name(&self.prefix, register)
    }

    pub fn gauge(&self, register: &str) -> Option<&Gauge> {
        self.gauges.get(register)
    }

    /// Current value of the gauge of `register`
    pub fn value(&self, register: &str) -> Option<f64> {
        self.gauges.get(register).map(|gauge| gauge.get())
    }

    /// Current value of the `register_up` series of `register`
    pub fn is_up(&self, register: &str) -> bool {
        self.up.with_label_values(&[register]).get() > 0.0
    }

    /// Number of failed reads of `register`, all error kinds together
    ///
    /// Querying materializes zero-valued series for the kinds never seen.
    pub fn error_count(&self, register: &str) -> u64 {
        ExporterError::KINDS
            .iter()
            .map(|kind| self.read_errors.with_label_values(&[register, *kind]).get())
            .sum()
    }

    pub fn passes(&self) -> u64 {
        self.passes.get()
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Render every metric of the registry in the Prometheus text format
    pub fn render(&self) -> Result<String, ExporterError> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| {
            ExporterError::Metrics(prometheus::Error::Msg(format!(
                "metrics output is not valid UTF-8: {}",
                e
            )))
        })
    }
}

impl MetricSink for PrometheusSink {
    fn set(&self, register: &str, value: f64) -> Result<(), ExporterError> {
        let gauge = self.gauges.get(register).ok_or_else(|| {
            ExporterError::Configuration(format!("no gauge registered for register '{}'", register))
        })?;
        gauge.set(value);
        self.up.with_label_values(&[register]).set(1.0);
        self.last_success
            .with_label_values(&[register])
            .set(chrono::Utc::now().timestamp_millis() as f64 / 1000.0);
        Ok(())
    }

    fn record_failure(&self, register: &str, error: &ExporterError) {
        self.up.with_label_values(&[register]).set(0.0);
        self.read_errors
            .with_label_values(&[register, error.kind()])
            .inc();
    }

    fn record_pass(&self, duration: Duration) {
        self.passes.inc();
        self.pass_duration.set(duration.as_secs_f64());
    }
}

/// `<prefix>_<name>`, or the bare name when the prefix is empty
pub fn metric_name(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{}_{}", prefix, name)
    }
}
