// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the nibe-exporter project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Modbus TCP device client

use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info, warn};
use tokio::time;
use tokio_modbus::client::Context;
use tokio_modbus::prelude::*;

use crate::config::DeviceConfig;
use crate::error::ExporterError;
use crate::registers::decoder::words_to_bytes;

/// Read access to the registers of a remote device
///
/// Implementations issue one request at a time; the `&mut self` receiver makes
/// concurrent requests on the same connection impossible.
#[async_trait]
pub trait DeviceClient: Send {
    /// Read `count` 16-bit words starting at `address`
    ///
    /// On success the returned buffer holds exactly `2 * count` bytes, each word
    /// in big-endian order.
    async fn read_words(&mut self, address: u16, count: u16) -> Result<Vec<u8>, ExporterError>;
}

/// Device client reading input registers over Modbus TCP
///
/// The connection is opened lazily on the first read and dropped after any
/// I/O failure or timeout, so the next read reconnects. Failed reads are
/// retried `retries` times before the error is returned.
pub struct ModbusDeviceClient {
    endpoint: String,
    slave: Slave,
    timeout: Duration,
    retries: u8,
    ctx: Option<Context>,
}

impl ModbusDeviceClient {
    pub fn new(config: &DeviceConfig) -> Self {
        Self {
            endpoint: format!("{}:{}", config.host, config.port),
            slave: Slave(config.slave_id),
            timeout: Duration::from_millis(config.timeout_ms),
            retries: config.retries,
            ctx: None,
        }
    }

    /// `host:port` this client talks to
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn is_connected(&self) -> bool {
        self.ctx.is_some()
    }

    async fn resolve(&mut self, address: u16, count: u16) -> Result<SocketAddr, ExporterError> {
        let transport = |reason: String| ExporterError::Transport {
            address,
            count,
            reason,
        };
        let mut addrs = tokio::net::lookup_host(&self.endpoint)
            .await
            .map_err(|e| transport(format!("cannot resolve {}: {}", self.endpoint, e)))?;
        addrs
            .next()
            .ok_or_else(|| transport(format!("no address found for {}", self.endpoint)))
    }

    async fn connect(&mut self, address: u16, count: u16) -> Result<Context, ExporterError> {
        let socket_addr = self.resolve(address, count).await?;
        debug!("Connecting to Modbus device at {}", socket_addr);

        match time::timeout(self.timeout, tcp::connect_slave(socket_addr, self.slave)).await {
            Ok(Ok(ctx)) => {
                info!("Connected to Modbus device at {}", socket_addr);
                Ok(ctx)
            }
            Ok(Err(e)) => Err(ExporterError::Transport {
                address,
                count,
                reason: format!("cannot connect to {}: {}", socket_addr, e),
            }),
            Err(_) => Err(ExporterError::Timeout {
                address,
                timeout: self.timeout,
            }),
        }
    }

    async fn read_once(&mut self, address: u16, count: u16) -> Result<Vec<u8>, ExporterError> {
        if self.ctx.is_none() {
            let ctx = self.connect(address, count).await?;
            self.ctx = Some(ctx);
        }
        let Some(ctx) = self.ctx.as_mut() else {
            return Err(ExporterError::Transport {
                address,
                count,
                reason: "not connected".to_string(),
            });
        };

        let response = time::timeout(self.timeout, ctx.read_input_registers(address, count)).await;
        let words = match response {
            Ok(Ok(Ok(words))) => words,
            Ok(Ok(Err(exception))) => {
                // The device answered, the connection stays usable
                return Err(ExporterError::Transport {
                    address,
                    count,
                    reason: format!("Modbus exception {:?}", exception),
                });
            }
            Ok(Err(e)) => {
                self.ctx = None;
                return Err(ExporterError::Transport {
                    address,
                    count,
                    reason: e.to_string(),
                });
            }
            Err(_) => {
                self.ctx = None;
                return Err(ExporterError::Timeout {
                    address,
                    timeout: self.timeout,
                });
            }
        };

        if words.len() != count as usize {
            return Err(ExporterError::MalformedResponse {
                address,
                expected: count as usize * 2,
                actual: words.len() * 2,
            });
        }

        Ok(words_to_bytes(&words))
    }
}

#[async_trait]
impl DeviceClient for ModbusDeviceClient {
    async fn read_words(&mut self, address: u16, count: u16) -> Result<Vec<u8>, ExporterError> {
        let mut attempt = 0;
        loop {
            match self.read_once(address, count).await {
                Ok(bytes) => return Ok(bytes),
                Err(err) if attempt < self.retries && is_retryable(&err) => {
                    attempt += 1;
                    warn!(
                        "Read of address {} failed ({}), retry {}/{}",
                        address, err, attempt, self.retries
                    );
                }
                Err(err) => return Err(err),
            }
        }
    }
}

fn is_retryable(err: &ExporterError) -> bool {
    matches!(
        err,
        ExporterError::Transport { .. } | ExporterError::Timeout { .. }
    )
}
