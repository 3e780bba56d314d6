// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the nibe-exporter project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use log::{debug, info};
use tokio::net::TcpListener;

use nibe_exporter::modbus::simulator::{serve, DeviceSimulator};
use nibe_exporter::registers::Catalog;

/// Serve the NIBE input registers with demo values over Modbus TCP
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Address to listen on
    #[clap(long, default_value = "127.0.0.1")]
    address: String,

    /// Port to listen on
    #[clap(long, default_value = "5020")]
    port: u16,

    /// Seconds between two updates of the outdoor temperature, 0 to disable
    #[clap(long, default_value = "10")]
    drift: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init_from_env(
        env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, "info"),
    );

    let args = Args::parse();
    let catalog = Catalog::nibe_default();
    let simulator = DeviceSimulator::from_values(
        &catalog,
        &[
            ("outdoor_temperature", -2.5),
            ("supply_temperature", 35.2),
            ("return_temperature", 29.8),
            ("hotwater_temperature", 48.6),
            ("hotwater_charging", 45.1),
            ("power_usage", 1250.0),
        ],
    );

    if args.drift > 0 {
        if let Some(outdoor) = catalog.get("outdoor_temperature").cloned() {
            let simulator = simulator.clone();
            let period = Duration::from_secs(args.drift);
            tokio::spawn(async move {
                let mut value = -2.5;
                loop {
                    tokio::time::sleep(period).await;
                    value = if value > 5.0 { -5.0 } else { value + 0.1 };
                    debug!("Outdoor temperature now {:.1}", value);
                    simulator.set_value(&outdoor, value);
                }
            });
        }
    }

    let listener = TcpListener::bind((args.address.as_str(), args.port))
        .await
        .with_context(|| format!("Failed to bind {}:{}", args.address, args.port))?;
    info!("Serving {} registers", catalog.len());
    serve(listener, simulator).await?;
    Ok(())
}
