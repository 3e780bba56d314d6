// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the nibe-exporter project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Poll loop configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration of the register poll loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollerConfig {
    /// Idle time between the end of a pass and the start of the next one, in
    /// milliseconds. Default is 30000.
    pub interval_ms: u64,

    /// Stop the exporter on the first failed register read instead of
    /// isolating the failure to that register.
    pub fail_fast: bool,
}

impl PollerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval_ms: 30_000,
            fail_fast: false,
        }
    }
}
