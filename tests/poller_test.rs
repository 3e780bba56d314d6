// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the nibe-exporter project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Poll pass behavior against an in-memory device

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use approx::assert_relative_eq;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use nibe_exporter::error::ExporterError;
use nibe_exporter::metrics::{MetricSink, PrometheusSink};
use nibe_exporter::modbus::DeviceClient;
use nibe_exporter::poller::{Poller, PollerSettings};
use nibe_exporter::registers::Catalog;

/// Device answering from a word map, recording every request
#[derive(Default)]
struct StubDevice {
    words: HashMap<u16, u16>,
    failing: HashSet<u16>,
    hanging: HashSet<u16>,
    calls: Arc<Mutex<Vec<(u16, u16)>>>,
}

impl StubDevice {
    fn with_words(words: &[(u16, u16)]) -> Self {
        Self {
            words: words.iter().copied().collect(),
            ..Self::default()
        }
    }

    /// Words of the default catalog: -20.0 °C outdoor, 100 W power, 25.5 °C elsewhere
    fn nibe() -> Self {
        Self::with_words(&[
            (1, 0xFF38),
            (5, 255),
            (7, 255),
            (8, 255),
            (9, 255),
            (2166, 0x0000),
            (2167, 0x03E8),
        ])
    }

    fn calls(&self) -> Vec<(u16, u16)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl DeviceClient for StubDevice {
    async fn read_words(&mut self, address: u16, count: u16) -> Result<Vec<u8>, ExporterError> {
        self.calls.lock().unwrap().push((address, count));
        if self.hanging.contains(&address) {
            std::future::pending::<()>().await;
        }
        if self.failing.contains(&address) {
            return Err(ExporterError::Transport {
                address,
                count,
                reason: "connection reset by peer".to_string(),
            });
        }
        let mut bytes = Vec::with_capacity(count as usize * 2);
        for offset in 0..count {
            let word = self.words.get(&(address + offset)).copied().ok_or(
                ExporterError::Transport {
                    address,
                    count,
                    reason: "Modbus exception IllegalDataAddress".to_string(),
                },
            )?;
            bytes.extend_from_slice(&word.to_be_bytes());
        }
        Ok(bytes)
    }
}

fn poller(settings: PollerSettings) -> Poller {
    Poller::new(Arc::new(Catalog::nibe_default()), settings)
}

fn sink() -> PrometheusSink {
    PrometheusSink::new(&Catalog::nibe_default(), "nibe").unwrap()
}

#[tokio::test]
async fn test_requests_follow_catalog_order() {
    let poller = poller(PollerSettings::default());
    let sink = sink();
    let mut device = StubDevice::nibe();

    poller.poll_pass(&mut device, &sink).await.unwrap();

    assert_eq!(
        device.calls(),
        vec![(1, 1), (5, 1), (7, 1), (8, 1), (9, 1), (2166, 2)]
    );
}

#[tokio::test]
async fn test_end_to_end_values() {
    let poller = poller(PollerSettings::default());
    let sink = sink();
    let mut device = StubDevice::nibe();

    let report = poller.poll_pass(&mut device, &sink).await.unwrap();
    assert!(report.is_complete());
    assert_eq!(report.samples.len(), 6);

    assert_relative_eq!(sink.value("outdoor_temperature").unwrap(), -20.0);
    assert_relative_eq!(sink.value("supply_temperature").unwrap(), 25.5);
    assert_relative_eq!(sink.value("power_usage").unwrap(), 100.0);

    let outdoor = &report.samples[0];
    assert_eq!(outdoor.register, "outdoor_temperature");
    assert_eq!(outdoor.raw, -200);
    assert_eq!(report.value("power_usage"), Some(100.0));
    assert_eq!(sink.passes(), 1);

    let output = sink.render().unwrap();
    assert!(output.contains("nibe_outdoor_temperature -20"));
    assert!(output.contains("nibe_power_usage 100"));
}

#[tokio::test]
async fn test_identical_responses_give_identical_gauges() {
    let poller = poller(PollerSettings::default());
    let sink = sink();
    let mut device = StubDevice::nibe();
    let catalog = Catalog::nibe_default();

    poller.poll_pass(&mut device, &sink).await.unwrap();
    let first: Vec<Option<f64>> = catalog.iter().map(|r| sink.value(&r.name)).collect();
    poller.poll_pass(&mut device, &sink).await.unwrap();
    let second: Vec<Option<f64>> = catalog.iter().map(|r| sink.value(&r.name)).collect();

    assert_eq!(first, second);
    assert_eq!(sink.passes(), 2);
}

#[tokio::test]
async fn test_failure_is_isolated_to_its_register() {
    let poller = poller(PollerSettings::default());
    let sink = sink();

    // First pass succeeds everywhere
    let mut device = StubDevice::nibe();
    poller.poll_pass(&mut device, &sink).await.unwrap();

    // Then register 7 starts failing and the others change
    let mut device = StubDevice::with_words(&[
        (1, 0xFF9C),
        (5, 300),
        (8, 400),
        (9, 410),
        (2166, 0x0001),
        (2167, 0x0000),
    ]);
    device.failing.insert(7);
    let report = poller.poll_pass(&mut device, &sink).await.unwrap();

    assert_eq!(report.samples.len(), 5);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].register, "return_temperature");
    assert_eq!(report.failures[0].address, 7);
    assert_eq!(report.failures[0].error.kind(), "transport");

    // The other registers are updated, the failed one keeps its last value
    assert_relative_eq!(sink.value("outdoor_temperature").unwrap(), -10.0);
    assert_relative_eq!(sink.value("supply_temperature").unwrap(), 30.0);
    assert_relative_eq!(sink.value("power_usage").unwrap(), 6553.6);
    assert_relative_eq!(sink.value("return_temperature").unwrap(), 25.5);

    assert!(!sink.is_up("return_temperature"));
    assert!(sink.is_up("power_usage"));
    assert_eq!(sink.error_count("return_temperature"), 1);
    assert_eq!(sink.error_count("power_usage"), 0);
}

#[tokio::test]
async fn test_fail_fast_stops_the_pass() {
    let poller = poller(PollerSettings {
        fail_fast: true,
        ..PollerSettings::default()
    });
    let sink = sink();
    let mut device = StubDevice::nibe();
    device.failing.insert(7);

    let err = poller.poll_pass(&mut device, &sink).await.unwrap_err();
    assert!(matches!(err, ExporterError::Transport { address: 7, .. }));

    // Nothing after the failed register was requested
    assert_eq!(device.calls(), vec![(1, 1), (5, 1), (7, 1)]);
    assert_eq!(sink.passes(), 0);
    assert_eq!(sink.error_count("return_temperature"), 1);

    let err = poller
        .run(&mut device, &sink, CancellationToken::new())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "transport");
}

#[tokio::test]
async fn test_short_response_is_malformed() {
    /// Device returning a single byte whatever is asked
    struct Truncating;

    #[async_trait]
    impl DeviceClient for Truncating {
        async fn read_words(&mut self, _address: u16, _count: u16) -> Result<Vec<u8>, ExporterError> {
            Ok(vec![0x01])
        }
    }

    let poller = poller(PollerSettings::default());
    let sink = sink();
    let report = poller.poll_pass(&mut Truncating, &sink).await.unwrap();

    assert!(report.samples.is_empty());
    assert_eq!(report.failures.len(), 6);
    let power = report.failures.last().unwrap();
    assert!(matches!(
        power.error,
        ExporterError::MalformedResponse {
            address: 2166,
            expected: 4,
            actual: 1
        }
    ));
}

#[tokio::test(start_paused = true)]
async fn test_hanging_request_times_out() {
    let poller = poller(PollerSettings {
        request_timeout: Duration::from_secs(2),
        ..PollerSettings::default()
    });
    let sink = sink();
    let mut device = StubDevice::nibe();
    device.hanging.insert(5);

    let report = poller.poll_pass(&mut device, &sink).await.unwrap();
    assert_eq!(report.samples.len(), 5);
    assert!(matches!(
        report.failures[0].error,
        ExporterError::Timeout { address: 5, .. }
    ));
    assert_eq!(device.calls().len(), 6);
}

#[tokio::test(start_paused = true)]
async fn test_run_passes_sleeps_between_passes_only() {
    let poller = poller(PollerSettings {
        interval: Duration::from_secs(30),
        ..PollerSettings::default()
    });
    let sink = sink();
    let mut device = StubDevice::nibe();

    let started = tokio::time::Instant::now();
    let passes = poller
        .run_passes(3, &mut device, &sink, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(passes, 3);
    assert_eq!(sink.passes(), 3);
    assert_eq!(device.calls().len(), 18);
    // Two idle periods, none after the last pass
    assert_eq!(started.elapsed(), Duration::from_secs(60));
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_during_idle() {
    let poller = poller(PollerSettings {
        interval: Duration::from_secs(30),
        ..PollerSettings::default()
    });
    let sink = Arc::new(sink());
    let shutdown = CancellationToken::new();

    let task = {
        let sink = sink.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            let mut device = StubDevice::nibe();
            poller.run(&mut device, sink.as_ref(), shutdown).await
        })
    };

    // First pass at t=0, second at t=30s, cancelled while idle before the third
    tokio::time::sleep(Duration::from_secs(45)).await;
    shutdown.cancel();

    let passes = task.await.unwrap().unwrap();
    assert_eq!(passes, 2);
    assert_eq!(sink.passes(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_during_request() {
    let poller = poller(PollerSettings {
        request_timeout: Duration::from_secs(3600),
        ..PollerSettings::default()
    });
    let sink = sink();
    let mut device = StubDevice::nibe();
    device.hanging.insert(1);
    let shutdown = CancellationToken::new();

    let cancel = shutdown.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(1)).await;
        cancel.cancel();
    });

    let passes = poller.run(&mut device, &sink, shutdown).await.unwrap();
    assert_eq!(passes, 0);
    assert_eq!(device.calls(), vec![(1, 1)]);
    assert_eq!(sink.passes(), 0);
}

#[tokio::test]
async fn test_sink_trait_object() {
    // The poller only needs the trait, any sink works
    struct Recording(Mutex<Vec<(String, f64)>>);

    impl MetricSink for Recording {
        fn set(&self, register: &str, value: f64) -> Result<(), ExporterError> {
            self.0.lock().unwrap().push((register.to_string(), value));
            Ok(())
        }
        fn record_failure(&self, _register: &str, _error: &ExporterError) {}
        fn record_pass(&self, _duration: Duration) {}
    }

    let poller = poller(PollerSettings::default());
    let sink = Recording(Mutex::new(Vec::new()));
    let mut device = StubDevice::nibe();
    poller.poll_pass(&mut device, &sink).await.unwrap();

    let names: Vec<String> = sink.0.lock().unwrap().iter().map(|(n, _)| n.clone()).collect();
    assert_eq!(
        names,
        vec![
            "outdoor_temperature",
            "supply_temperature",
            "return_temperature",
            "hotwater_temperature",
            "hotwater_charging",
            "power_usage"
        ]
    );
}
