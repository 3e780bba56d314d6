// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the nibe-exporter project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Metrics exposition server configuration

use serde::{Deserialize, Serialize};

/// Configuration for the HTTP server exposing the Prometheus metrics.
///
/// ### TLS Configuration
///
/// For HTTPS scrapes, both `cert` and `key` must be provided as Base64-encoded
/// PEM files. If either is missing, the server operates in plain HTTP.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Flag to enable or disable the exposition server.
    ///
    /// With the server disabled the poller still runs, which is only useful
    /// together with debug logging.
    pub enabled: bool,

    /// The network address the server binds to. Default is "0.0.0.0".
    pub address: String,

    /// The TCP port the server listens on. Default is 2112.
    pub port: u16,

    /// HTTP path of the metrics route. Must start with `/`. Default is "/metrics".
    pub path: String,

    /// Prefix of every exposed metric name, joined with `_`.
    ///
    /// An empty prefix exposes the bare register names.
    pub prefix: String,

    /// Server name reported in HTTP headers and logs.
    pub name: String,

    /// SSL/TLS certificate in PEM format, Base64 encoded.
    pub cert: Option<String>,

    /// SSL/TLS private key in PEM format, Base64 encoded.
    pub key: Option<String>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            address: "0.0.0.0".to_string(),
            port: 2112,
            path: "/metrics".to_string(),
            prefix: "nibe".to_string(),
            name: format!("NibeExporter/{}", env!("CARGO_PKG_VERSION")),
            cert: None,
            key: None,
        }
    }
}
