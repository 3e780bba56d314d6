// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the nibe-exporter project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Rocket instance construction

use std::sync::Arc;

use anyhow::Result;
use base64::prelude::*;
use log::{debug, info};
use rocket::config::LogLevel;
use rocket::figment::Figment;
use rocket::http::ext::IntoOwned;
use rocket::http::uri::Origin;
use rocket::{routes, Build, Rocket};

use super::handlers;
use crate::config::MetricsConfig;
use crate::error::ExporterError;
use crate::metrics::PrometheusSink;

/// Build the Rocket configuration of the exposition server
///
/// Binds to `address:port` from `config`. TLS is enabled when both the
/// Base64-encoded certificate and key are present. Rocket's own Ctrl-C handling
/// is disabled; shutdown is driven by the daemon through the `Shutdown` handle.
pub fn metrics_figment(config: &MetricsConfig) -> Result<Figment> {
    let mut figment = rocket::Config::figment()
        .merge(("ident", config.name.clone()))
        .merge(("address", config.address.clone()))
        .merge(("port", config.port))
        .merge(("log_level", LogLevel::Critical))
        .merge(("shutdown.ctrlc", false))
        .merge(("shutdown.grace", 1))
        .merge(("shutdown.mercy", 2));

    if let (Some(cert), Some(key)) = (&config.cert, &config.key) {
        debug!("SSL certificates found in configuration, enabling TLS");

        let cert_data = BASE64_STANDARD.decode(cert)?;
        let key_data = BASE64_STANDARD.decode(key)?;

        figment = figment
            .merge(("tls.certs", cert_data))
            .merge(("tls.key", key_data));

        info!("TLS enabled for metrics server");
    }

    Ok(figment)
}

/// Build a Rocket instance serving the metrics of `sink` at `path`
///
/// # Errors
///
/// Returns [`ExporterError::Configuration`] when `path` is not an absolute URI
/// path.
pub fn build_rocket(
    figment: Figment,
    sink: Arc<PrometheusSink>,
    path: &str,
) -> Result<Rocket<Build>, ExporterError> {
    let base = Origin::parse(path)
        .map_err(|e| ExporterError::Configuration(format!("invalid metrics path '{}': {}", path, e)))?;
    if !base.path().as_str().starts_with('/') || base.query().is_some() {
        return Err(ExporterError::Configuration(format!(
            "invalid metrics path '{}': expected an absolute path without query",
            path
        )));
    }

    debug!("Mounting metrics route at {}", base);
    Ok(rocket::custom(figment)
        .manage(sink)
        .mount(base.into_owned(), routes![handlers::metrics]))
}
