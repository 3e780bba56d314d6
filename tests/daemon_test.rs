// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the nibe-exporter project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Daemon lifecycle tests against the device simulator

use std::time::Duration;

use tokio::net::TcpListener;

use nibe_exporter::config::Config;
use nibe_exporter::daemon::Daemon;
use nibe_exporter::modbus::simulator::{serve, DeviceSimulator};
use nibe_exporter::registers::Catalog;

fn config_for(port: u16) -> Config {
    let mut config = Config::default();
    config.device.host = "127.0.0.1".to_string();
    config.device.port = port;
    config.device.timeout_ms = 1000;
    config.device.retries = 0;
    config.metrics.enabled = false;
    config.poller.interval_ms = 100;
    config
}

#[tokio::test]
async fn test_daemon_polls_until_shutdown() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let simulator =
        DeviceSimulator::from_values(&Catalog::nibe_default(), &[("outdoor_temperature", 4.5)]);
    let server = tokio::spawn(async move {
        let _ = serve(listener, simulator).await;
    });

    let mut daemon = Daemon::new();
    daemon.launch(&config_for(port)).await.unwrap();
    let sink = daemon.sink().unwrap();

    // Poll passes keep coming
    let mut waited = Duration::ZERO;
    while sink.passes() < 2 && waited < Duration::from_secs(5) {
        tokio::time::sleep(Duration::from_millis(50)).await;
        waited += Duration::from_millis(50);
    }
    assert!(sink.passes() >= 2);
    assert_eq!(sink.value("outdoor_temperature"), Some(4.5));
    // Only the outdoor temperature is mapped on the simulator
    assert!(!sink.is_up("power_usage"));
    assert!(!daemon.is_cancelled());

    daemon.shutdown();
    daemon.join().await.unwrap();
    server.abort();
}

#[tokio::test]
async fn test_fail_fast_cancels_the_daemon() {
    // A port nobody listens on
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let mut config = config_for(port);
    config.poller.fail_fast = true;

    let mut daemon = Daemon::new();
    daemon.launch(&config).await.unwrap();

    tokio::time::timeout(Duration::from_secs(5), daemon.cancelled())
        .await
        .expect("daemon was not cancelled by the failing poller");

    let err = daemon.join().await.unwrap_err();
    assert!(format!("{:#}", err).contains("Register polling failed"));
}

#[tokio::test]
async fn test_invalid_catalog_aborts_launch() {
    let mut config = config_for(502);
    config.registers.clear();

    let mut daemon = Daemon::new();
    assert!(daemon.launch(&config).await.is_err());
}
