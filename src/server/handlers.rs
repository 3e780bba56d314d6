// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the nibe-exporter project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Route handlers of the exposition server

use std::sync::Arc;

use log::error;
use rocket::http::{ContentType, Status};
use rocket::{get, State};

use crate::metrics::PrometheusSink;

/// Render the current gauges in the Prometheus text format
///
/// The route is mounted at the configured metrics path, so `/` here is that
/// path itself. Rendering never waits for the poller; a scrape taken during a
/// pass sees the registers updated so far.
#[get("/")]
pub fn metrics(sink: &State<Arc<PrometheusSink>>) -> Result<(ContentType, String), Status> {
    sink.render().map(|body| (ContentType::Plain, body)).map_err(|e| {
        error!("Failed to render metrics: {}", e);
        Status::InternalServerError
    })
}
