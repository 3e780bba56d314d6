// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the nibe-exporter project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! NIBE exporter library
//!
//! Polls the input registers of a NIBE heat pump over Modbus TCP, decodes and
//! scales them, and exposes the values as Prometheus gauges over HTTP.
//!
//! - [`registers`]: register descriptors, catalog and value decoding
//! - [`modbus`]: device client and device simulator
//! - [`metrics`]: Prometheus metric sink
//! - [`poller`]: the poll loop
//! - [`server`]: HTTP exposition server
//! - [`daemon`]: task lifecycle
//! - [`config`]: YAML configuration

pub mod config;
pub mod daemon;
pub mod error;
pub mod metrics;
pub mod modbus;
pub mod poller;
pub mod registers;
pub mod server;

pub use error::ExporterError;
