// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the nibe-exporter project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! # Daemon Management Module
//!
//! This module runs the exporter's background services and handles their
//! lifecycle:
//!
//! - Metrics exposition server (Rocket)
//! - Register poller (Modbus TCP client)
//! - System health monitoring (heartbeat)
//!
//! ## Architecture
//!
//! Each service runs as an independent Tokio task. All tasks share a
//! [`CancellationToken`]: cancelling it stops the poller (even in the middle of
//! a request), notifies Rocket's graceful shutdown and ends the heartbeat. A
//! task that fails cancels the token itself, so the failure of one service
//! brings the whole daemon down and [`Daemon::join`] reports the error.
//!
//! ## Usage
//!
//! ```no_run
//! use nibe_exporter::{config::Config, daemon::launch_daemon::Daemon};
//!
//! async fn example() -> anyhow::Result<()> {
//!     let config = Config::from_file("config.yaml")?;
//!
//!     let mut daemon = Daemon::new();
//!     daemon.launch(&config).await?;
//!
//!     tokio::select! {
//!         _ = tokio::signal::ctrl_c() => {}
//!         _ = daemon.cancelled() => {}
//!     }
//!
//!     daemon.shutdown();
//!     daemon.join().await
//! }
//! ```

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use log::{debug, error, info, warn};
use tokio::task::JoinHandle;
use tokio::time;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::metrics::PrometheusSink;
use crate::modbus::ModbusDeviceClient;
use crate::poller::{Poller, PollerSettings};
use crate::registers::Catalog;
use crate::server::{build_rocket, metrics_figment};

/// Time each task is given to finish once shutdown has been requested
const JOIN_TIMEOUT: Duration = Duration::from_secs(5);

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(60);

/// Coordinator of the exporter's background tasks
///
/// # Fields
///
/// * `tasks` - Named handles of the running tasks, joined on shutdown
/// * `shutdown` - Token shared with every task to request termination
/// * `sink` - Metric sink shared by the poller and the metrics server
pub struct Daemon {
    tasks: Vec<(&'static str, JoinHandle<Result<()>>)>,
    shutdown: CancellationToken,
    sink: Option<Arc<PrometheusSink>>,
}

impl Default for Daemon {
    fn default() -> Self {
        Self::new()
    }
}

impl Daemon {
    /// Create a new daemon instance with no task started
    pub fn new() -> Self {
        Daemon {
            tasks: Vec::new(),
            shutdown: CancellationToken::new(),
            sink: None,
        }
    }

    /// Launch all the services enabled in `config`
    ///
    /// The register catalog and the metric sink are built first, so an invalid
    /// catalog or prefix aborts the launch before anything is bound.
    ///
    /// # Errors
    ///
    /// This function can fail if:
    /// * The register catalog is invalid
    /// * The metric gauges cannot be registered
    /// * The metrics server cannot be configured or ignited
    pub async fn launch(&mut self, config: &Config) -> Result<()> {
        let catalog = Arc::new(config.catalog().context("Invalid register catalog")?);
        let sink = Arc::new(
            PrometheusSink::new(&catalog, &config.metrics.prefix)
                .context("Failed to register metric gauges")?,
        );
        self.sink = Some(sink.clone());

        if config.metrics.enabled {
            self.start_metrics_server(config, sink.clone()).await?;
        } else {
            warn!("Metrics server disabled, register values are only logged");
        }

        self.start_poller(config, catalog, sink)?;
        self.start_heartbeat()?;

        Ok(())
    }

    /// Start the Rocket server exposing the metrics
    ///
    /// The instance is ignited before being spawned so configuration errors are
    /// reported here. A failure to bind is reported by the spawned task, which
    /// then cancels the daemon.
    async fn start_metrics_server(
        &mut self,
        config: &Config,
        sink: Arc<PrometheusSink>,
    ) -> Result<()> {
        info!(
            "Starting metrics server on {}:{}{}",
            config.metrics.address, config.metrics.port, config.metrics.path
        );

        let figment = metrics_figment(&config.metrics)?;
        let rocket = build_rocket(figment, sink, &config.metrics.path)?;
        let ignited = rocket
            .ignite()
            .await
            .context("Failed to ignite the metrics server")?;

        let notify = ignited.shutdown();
        let shutdown = self.shutdown.clone();
        let watcher = tokio::spawn(async move {
            shutdown.cancelled().await;
            debug!("Notifying metrics server shutdown");
            notify.notify();
            Ok(())
        });
        self.tasks.push(("metrics shutdown watcher", watcher));

        let shutdown = self.shutdown.clone();
        let task = tokio::spawn(async move {
            let result = ignited.launch().await;
            match result {
                Ok(_) => {
                    info!("Metrics server stopped");
                    Ok(())
                }
                Err(e) => {
                    error!("Metrics server failed: {}", e);
                    shutdown.cancel();
                    Err(anyhow::anyhow!("Metrics server failed: {}", e))
                }
            }
        });

        self.tasks.push(("metrics server", task));
        Ok(())
    }

    /// Start the register poller
    ///
    /// The poller owns its Modbus client; the connection is opened on the first
    /// read. When the poller returns an error (only with `fail_fast`), the
    /// daemon is cancelled.
    fn start_poller(
        &mut self,
        config: &Config,
        catalog: Arc<Catalog>,
        sink: Arc<PrometheusSink>,
    ) -> Result<()> {
        info!(
            "Starting poller for Modbus device {}:{} (slave {})",
            config.device.host, config.device.port, config.device.slave_id
        );

        let poller = Poller::new(catalog, PollerSettings::from(config));
        let mut client = ModbusDeviceClient::new(&config.device);
        let shutdown = self.shutdown.clone();

        let task = tokio::spawn(async move {
            match poller
                .run(&mut client, sink.as_ref(), shutdown.clone())
                .await
            {
                Ok(passes) => {
                    debug!("Poller completed {} passes", passes);
                    Ok(())
                }
                Err(e) => {
                    error!("Poller stopped on error: {}", e);
                    shutdown.cancel();
                    Err(anyhow::Error::new(e).context("Register polling failed"))
                }
            }
        });

        self.tasks.push(("poller", task));
        Ok(())
    }

    /// Start a heartbeat task that logs the daemon status periodically
    fn start_heartbeat(&mut self) -> Result<()> {
        info!("Starting heartbeat monitor");

        let shutdown = self.shutdown.clone();
        let sink = self.sink.clone();
        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = time::sleep(HEARTBEAT_INTERVAL) => {
                        let passes = sink.as_ref().map(|sink| sink.passes()).unwrap_or_default();
                        debug!("Daemon heartbeat: running, {} poll passes", passes);
                    }
                }
            }
            Ok(())
        });

        self.tasks.push(("heartbeat", task));
        Ok(())
    }

    /// Metric sink shared by the running services, once launched
    pub fn sink(&self) -> Option<Arc<PrometheusSink>> {
        self.sink.clone()
    }

    /// Resolves once shutdown has been requested or a task has failed
    pub async fn cancelled(&self) {
        self.shutdown.cancelled().await
    }

    pub fn is_cancelled(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Ask every task to stop
    ///
    /// This only signals the tasks; call [`Daemon::join`] to wait for them.
    pub fn shutdown(&self) {
        info!("Shutting down daemon tasks");
        self.shutdown.cancel();
    }

    /// Wait for all tasks to complete
    ///
    /// Each task gets [`JOIN_TIMEOUT`] to finish; a task still running after
    /// that is aborted. Panics are logged.
    ///
    /// # Errors
    ///
    /// Returns the first error a task ended with, after every task has been
    /// joined.
    pub async fn join(self) -> Result<()> {
        let mut first_error = None;

        for (name, mut task) in self.tasks {
            match time::timeout(JOIN_TIMEOUT, &mut task).await {
                Ok(Ok(Ok(()))) => debug!("Task '{}' finished", name),
                Ok(Ok(Err(e))) => {
                    error!("Task '{}' failed: {:#}", name, e);
                    first_error.get_or_insert(e);
                }
                Ok(Err(e)) => error!("Task '{}' panicked: {}", name, e),
                Err(_) => {
                    warn!(
                        "Task '{}' did not complete within {:?}, aborting it",
                        name, JOIN_TIMEOUT
                    );
                    task.abort();
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
