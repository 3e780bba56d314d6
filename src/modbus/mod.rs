// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the nibe-exporter project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Modbus communication module
//!
//! This module provides the device side of the exporter: a Modbus TCP client
//! reading input registers from the heat pump, and a small Modbus TCP server
//! simulating such a device for tests and local development.
//!
//! For avoiding confusion with the Modbus master/slave terminology, this module
//! uses the terms "server" and "client". The heat pump is the server (slave),
//! the exporter is the client (master).
//!
//! ## Key Components
//!
//! - [`DeviceClient`]: the interface the poller needs from the transport
//! - [`ModbusDeviceClient`]: `tokio-modbus` TCP implementation with request
//!   timeout, reconnection and retries
//! - [`DeviceSimulator`]: `tokio-modbus` server answering input register reads
//!   from an in-memory register map
//!
//! ## Usage
//!
//! ```no_run
//! use nibe_exporter::config::DeviceConfig;
//! use nibe_exporter::modbus::{DeviceClient, ModbusDeviceClient};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let mut client = ModbusDeviceClient::new(&DeviceConfig::default());
//! let bytes = client.read_words(2166, 2).await?;
//! assert_eq!(bytes.len(), 4);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod simulator;

pub use client::{DeviceClient, ModbusDeviceClient};
pub use simulator::{DeviceSimulator, SharedRegisters};
