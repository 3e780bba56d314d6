// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the nibe-exporter project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! HTTP exposition server
//!
//! A Rocket instance with a single `GET` route, mounted at the configured
//! metrics path (default `/metrics`), answering with the Prometheus text
//! format rendered from the shared [`PrometheusSink`](crate::metrics::PrometheusSink).
//! Every other path is a 404.
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use nibe_exporter::config::MetricsConfig;
//! use nibe_exporter::metrics::PrometheusSink;
//! use nibe_exporter::registers::Catalog;
//! use nibe_exporter::server;
//!
//! async fn start_server() -> anyhow::Result<()> {
//!     let config = MetricsConfig::default();
//!     let sink = Arc::new(PrometheusSink::new(&Catalog::nibe_default(), &config.prefix)?);
//!     let figment = server::metrics_figment(&config)?;
//!     let rocket = server::build_rocket(figment, sink, &config.path)?;
//!     rocket.launch().await?;
//!     Ok(())
//! }
//! ```

pub mod builder;
pub mod handlers;

pub use builder::{build_rocket, metrics_figment};
