// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the nibe-exporter project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Modbus TCP device simulator
//!
//! Answers `Read Input Registers` requests from an in-memory register map, the
//! way the heat pump does. Every other function code is answered with an
//! `IllegalFunction` exception, and reads touching an unmapped address with
//! `IllegalDataAddress`, which makes the simulator handy to exercise the
//! exporter's error isolation.

use std::{
    collections::HashMap,
    future,
    io,
    sync::{Arc, Mutex, MutexGuard},
};

use log::{debug, error, info};
use tokio::net::TcpListener;
use tokio_modbus::{
    prelude::*,
    server::tcp::{accept_tcp_connection, Server},
};

use crate::registers::{Catalog, Encoding, RegisterDescriptor};

/// Input register map shared between the simulator connections and its owner
pub type SharedRegisters = Arc<Mutex<HashMap<u16, u16>>>;

/// A Modbus service exposing a fixed set of input registers
///
/// # Thread Safety
///
/// The register map is protected with a `Mutex` within an `Arc`, so values can
/// be updated from a test or a simulation task while clients are connected.
#[derive(Clone, Default)]
pub struct DeviceSimulator {
    input_registers: SharedRegisters,
}

impl tokio_modbus::server::Service for DeviceSimulator {
    type Request = Request<'static>;
    type Response = Response;
    type Exception = ExceptionCode;
    type Future = future::Ready<Result<Self::Response, Self::Exception>>;

    fn call(&self, req: Self::Request) -> Self::Future {
        debug!("Simulator received Modbus request: {:?}", req);

        let res = match req {
            Request::ReadInputRegisters(addr, cnt) => {
                register_read(&self.registers(), addr, cnt).map(Response::ReadInputRegisters)
            }
            _ => {
                error!(
                    "Exception::IllegalFunction - Unimplemented function code in request: {req:?}"
                );
                Err(ExceptionCode::IllegalFunction)
            }
        };

        future::ready(res)
    }
}

impl DeviceSimulator {
    /// Create a simulator with an empty register map
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a simulator serving an existing shared register map
    pub fn with_registers(input_registers: SharedRegisters) -> Self {
        Self { input_registers }
    }

    /// Create a simulator holding the given physical values for catalog registers
    ///
    /// Values are converted back to raw words with the register's encoding and
    /// scale factor. Registers without a value stay unmapped.
    pub fn from_values(catalog: &Catalog, values: &[(&str, f64)]) -> Self {
        let simulator = Self::new();
        for (name, value) in values {
            if let Some(descriptor) = catalog.get(name) {
                simulator.set_value(descriptor, *value);
            }
        }
        simulator
    }

    /// Handle on the register map, for sharing with other connections or tasks
    pub fn shared_registers(&self) -> SharedRegisters {
        self.input_registers.clone()
    }

    /// Store the raw word at `address`
    pub fn set_word(&self, address: u16, value: u16) {
        self.registers().insert(address, value);
    }

    /// Store a physical value for `descriptor`, spanning as many words as its encoding
    pub fn set_value(&self, descriptor: &RegisterDescriptor, value: f64) {
        let words = encode_words(descriptor, value);
        let mut registers = self.registers();
        for (offset, word) in words.into_iter().enumerate() {
            registers.insert(descriptor.address.wrapping_add(offset as u16), word);
        }
    }

    /// Unmap `address`; subsequent reads touching it fail with `IllegalDataAddress`
    pub fn remove(&self, address: u16) {
        self.registers().remove(&address);
    }

    pub fn word(&self, address: u16) -> Option<u16> {
        self.registers().get(&address).copied()
    }

    fn registers(&self) -> MutexGuard<'_, HashMap<u16, u16>> {
        match self.input_registers.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Serve `simulator` on `listener` until the task is aborted
///
/// All connections share the simulator's register map.
pub async fn serve(listener: TcpListener, simulator: DeviceSimulator) -> io::Result<()> {
    info!("Device simulator listening on {}", listener.local_addr()?);
    let server = Server::new(listener);
    let registers = simulator.shared_registers();

    let on_connected = move |stream, socket_addr| {
        let registers = registers.clone();
        async move {
            accept_tcp_connection(stream, socket_addr, move |_socket_addr| {
                Ok(Some(DeviceSimulator::with_registers(registers.clone())))
            })
        }
    };

    let on_process_error = |err| {
        error!("Simulator connection error: {err}");
    };

    server.serve(&on_connected, on_process_error).await?;
    Ok(())
}

/// Helper function implementing reading registers from a HashMap.
fn register_read(
    registers: &HashMap<u16, u16>,
    addr: u16,
    cnt: u16,
) -> Result<Vec<u16>, ExceptionCode> {
    let mut response_values = vec![0; cnt.into()];
    for i in 0..cnt {
        let reg_addr = addr.wrapping_add(i);
        if let Some(r) = registers.get(&reg_addr) {
            response_values[i as usize] = *r;
        } else {
            error!("Exception::IllegalDataAddress - address {}", reg_addr);
            return Err(ExceptionCode::IllegalDataAddress);
        }
    }

    Ok(response_values)
}

/// Inverse of the decoder: scale and encode a physical value into register words
fn encode_words(descriptor: &RegisterDescriptor, value: f64) -> Vec<u16> {
    let raw = (value * descriptor.factor).round() as i64;
    match descriptor.encoding {
        Encoding::U16 => vec![raw as u16],
        Encoding::S16 => vec![raw as i16 as u16],
        Encoding::U32 => {
            let raw = raw as u32;
            vec![(raw >> 16) as u16, raw as u16]
        }
    }
}
