// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the nibe-exporter project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Error taxonomy shared by the register decoder, the device client and the poller.

use std::time::Duration;

use thiserror::Error;

/// Errors raised while reading, decoding or publishing register values
#[derive(Error, Debug)]
pub enum ExporterError {
    /// The device could not complete the read (connection refused, I/O failure,
    /// Modbus exception response)
    #[error("Transport error reading {count} word(s) at address {address}: {reason}")]
    Transport {
        address: u16,
        count: u16,
        reason: String,
    },

    /// The per-request deadline elapsed before the device answered
    #[error("Request for address {address} timed out after {timeout:?}")]
    Timeout { address: u16, timeout: Duration },

    /// The response does not carry the number of bytes the request implies
    #[error("Malformed response for address {address}: expected {expected} bytes, got {actual}")]
    MalformedResponse {
        address: u16,
        expected: usize,
        actual: usize,
    },

    #[error("Unsupported register encoding '{0}'")]
    UnsupportedEncoding(String),

    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("Metrics registry error: {0}")]
    Metrics(#[from] prometheus::Error),
}

impl ExporterError {
    /// Every value [`ExporterError::kind`] can return
    pub const KINDS: [&'static str; 6] = [
        "transport",
        "timeout",
        "malformed_response",
        "unsupported_encoding",
        "configuration",
        "metrics",
    ];

    /// Short stable label used in logs and error counters
    pub fn kind(&self) -> &'static str {
        match self {
            ExporterError::Transport { .. } => "transport",
            ExporterError::Timeout { .. } => "timeout",
            ExporterError::MalformedResponse { .. } => "malformed_response",
            ExporterError::UnsupportedEncoding(_) => "unsupported_encoding",
            ExporterError::Configuration(_) => "configuration",
            ExporterError::Metrics(_) => "metrics",
        }
    }
}
