// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the nibe-exporter project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

// Main entry point of the NIBE heat pump Prometheus exporter

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use tokio::signal;

use nibe_exporter::config::{self, parse_interval, Config};
use nibe_exporter::daemon::Daemon;
use nibe_exporter::metrics::PrometheusSink;
use nibe_exporter::modbus::ModbusDeviceClient;
use nibe_exporter::poller::{Poller, PollerSettings};

/// Prometheus exporter for NIBE heat pump registers read over Modbus TCP
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Hostname or IP address of the Modbus device
    #[arg(long)]
    host: Option<String>,

    /// Port of the metrics HTTP server (default: 2112)
    #[arg(long)]
    port: Option<u16>,

    /// HTTP path of the metrics route (default: /metrics)
    #[arg(long)]
    path: Option<String>,

    /// Poll interval, in seconds or with a ms/s/m/h suffix (default: 30s)
    #[arg(long)]
    interval: Option<String>,

    /// Prefix of the exposed metric names (default: nibe)
    #[arg(long)]
    prefix: Option<String>,

    /// Modbus TCP port of the device (default: 502)
    #[arg(long)]
    device_port: Option<u16>,

    /// Modbus unit identifier of the device (default: 1)
    #[arg(long)]
    slave_id: Option<u8>,

    /// Path to configuration file (YAML format)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Path to a configuration to validate and exit
    #[arg(long)]
    validate_config: Option<PathBuf>,

    /// Output the configuration schema as JSON and exit
    #[arg(long)]
    show_config_schema: bool,

    /// Read every register once, print the values and exit
    #[arg(long)]
    once: bool,

    /// Enable verbose logging (debug level)
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,

    /// Disable all logging output
    #[arg(short = 'q', long = "quiet")]
    quiet: bool,
}

#[rocket::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.quiet {
        log::LevelFilter::Off
    } else if args.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };

    env_logger::Builder::new()
        .filter_level(log_level)
        .parse_default_env()
        .init();

    if args.show_config_schema {
        return config::output_config_schema();
    }

    if let Some(validate_path) = args.validate_config {
        if !validate_path.exists() {
            return Err(anyhow::anyhow!(
                "Configuration file does not exist: {}",
                validate_path.display()
            ));
        }

        Config::from_file(&validate_path)
            .map_err(|err| anyhow::anyhow!("Configuration validation failed: {}", err))?;
        println!("Configuration file is valid: {}", validate_path.display());
        return Ok(());
    }

    let interval = args
        .interval
        .as_deref()
        .map(parse_interval)
        .transpose()
        .context("Invalid --interval")?;

    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from("config.yaml"));
    let mut config = Config::from_file(&config_path)?;

    config.apply_args(
        args.host.clone(),
        args.device_port,
        args.slave_id,
        args.port,
        args.path.clone(),
        interval,
        args.prefix.clone(),
    );
    config::utils::validate_specific_rules(&config)
        .context("Invalid command line overrides")?;

    if args.once {
        return read_once(&config).await;
    }

    info!("Starting in daemon mode");
    let mut daemon = Daemon::new();
    daemon.launch(&config).await?;

    tokio::select! {
        result = signal::ctrl_c() => {
            result.context("Error waiting for shutdown signal")?;
            info!("Received shutdown signal, terminating daemon");
        }
        _ = daemon.cancelled() => {
            info!("A daemon task stopped, terminating daemon");
        }
    }

    daemon.shutdown();
    daemon.join().await
}

/// Run a single poll pass and print the decoded values
async fn read_once(config: &Config) -> Result<()> {
    let catalog = Arc::new(config.catalog()?);
    let sink = PrometheusSink::new(&catalog, &config.metrics.prefix)?;
    let poller = Poller::new(catalog, PollerSettings::from(config));
    let mut client = ModbusDeviceClient::new(&config.device);

    let report = poller.poll_pass(&mut client, &sink).await?;
    for sample in &report.samples {
        let unit = poller
            .catalog()
            .get(&sample.register)
            .map(|register| register.unit.as_str())
            .unwrap_or_default();
        println!(
            "{:<24} {:>6} {:>12} {}",
            sample.register, sample.address, sample.value, unit
        );
    }
    for failure in &report.failures {
        println!(
            "{:<24} {:>6} {:>12} {}",
            failure.register, failure.address, "error", failure.error
        );
    }

    if report.is_complete() {
        Ok(())
    } else {
        anyhow::bail!("{} register(s) could not be read", report.failures.len())
    }
}
