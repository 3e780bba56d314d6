// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the nibe-exporter project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

use anyhow::{Context, Result};
use clap::Parser;

use nibe_exporter::config::DeviceConfig;
use nibe_exporter::modbus::{DeviceClient, ModbusDeviceClient};
use nibe_exporter::registers::{decode, Encoding, RegisterDescriptor, RegisterMode};

/// Read input registers from a Modbus device and decode them
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Modbus device address
    #[clap(long, default_value = "127.0.0.1")]
    address: String,

    /// Modbus device port
    #[clap(long, default_value = "502")]
    port: u16,

    /// Modbus unit identifier
    #[clap(long, default_value = "1")]
    slave_id: u8,

    /// Starting input register address
    #[clap(long, default_value = "1")]
    input_register: u16,

    /// Number of values to read
    #[clap(long, default_value = "1")]
    quantity: u16,

    /// Encoding of each value: u16, s16 or u32
    #[clap(long, default_value = "s16")]
    encoding: Encoding,

    /// The raw values are divided by this factor
    #[clap(long, default_value = "10")]
    factor: f64,

    /// Request timeout in milliseconds
    #[clap(long, default_value = "5000")]
    timeout_ms: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init_from_env(
        env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, "info"),
    );

    let args = Args::parse();

    let device = DeviceConfig {
        host: args.address.clone(),
        port: args.port,
        slave_id: args.slave_id,
        timeout_ms: args.timeout_ms,
        retries: 0,
    };
    let mut client = ModbusDeviceClient::new(&device);
    println!("Reading from Modbus device at {}", client.endpoint());

    let words = args.encoding.word_count();
    for index in 0..args.quantity {
        let address = index
            .checked_mul(words)
            .and_then(|offset| args.input_register.checked_add(offset))
            .context("Register range runs past address 65535")?;
        let descriptor = RegisterDescriptor {
            address,
            encoding: args.encoding,
            factor: args.factor,
            unit: String::new(),
            name: format!("register_{}", address),
            description: String::new(),
            mode: RegisterMode::Read,
        };

        let bytes = client
            .read_words(address, words)
            .await
            .with_context(|| format!("Failed to read register {}", address))?;
        let value = decode(&bytes, &descriptor)?;
        println!("{:>6}  raw {:02X?}  value {}", address, bytes, value);
    }

    Ok(())
}
