// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the nibe-exporter project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! # Daemon Module
//!
//! Runs the exporter's long-lived services: the register poller, the metrics
//! server and a heartbeat, with a shared graceful shutdown. See
//! [`launch_daemon::Daemon`].

pub mod launch_daemon;

pub use launch_daemon::Daemon;
