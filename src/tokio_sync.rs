//! Synchronous `tokio-modbus` TCP transport for the easYgen-1000.
//!
//! [`TcpConnector`] opens a blocking Modbus TCP client context addressed to
//! unit id 1. The `tokio-modbus` synchronous [`Context`] implements
//! [`Transport`]; dropping it closes the socket.
//!
//! # Examples
//!
//! ```no_run
//! use easygen_lib::{catalog::Catalog, session::Session, tokio_sync::TcpConnector};
//! use std::time::Duration;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let connector = TcpConnector::new("192.168.1.50", 502).with_timeout(Duration::from_secs(1));
//!     let mut session = Session::new(connector, Catalog::EASYGEN_1000);
//!
//!     session.connect()?;
//!     session.fetch_all()?;
//!     for (entry, value) in session.readings() {
//!         println!("{}: {}", entry.name, value?);
//!     }
//!     session.disconnect();
//!     Ok(())
//! }
//! ```

use crate::{
    error::TransportError,
    session::{Connector, RegisterKind, Transport},
};
use std::{
    net::{SocketAddr, ToSocketAddrs},
    time::Duration,
};
use tokio_modbus::{
    client::sync::{tcp, Context},
    prelude::SyncReader,
    Address, Quantity, Slave,
};

/// The default Modbus TCP port.
pub const DEFAULT_PORT: u16 = 502;
/// The unit id the controller answers on.
pub const DEFAULT_UNIT_ID: u8 = 0x01;

/// Helper function to map tokio result to our result.
fn map_tokio_result<T>(result: tokio_modbus::Result<T>) -> Result<T, TransportError> {
    match result {
        Ok(Ok(result)) => Ok(result),
        Ok(Err(err)) => Err(err.into()), // Modbus exception
        Err(err) => Err(err.into()),     // IO error
    }
}

impl Transport for Context {
    fn read_registers(
        &mut self,
        kind: RegisterKind,
        address: Address,
        quantity: Quantity,
    ) -> Result<Vec<u16>, TransportError> {
        map_tokio_result(match kind {
            RegisterKind::Holding => self.read_holding_registers(address, quantity),
            RegisterKind::Input => self.read_input_registers(address, quantity),
        })
    }
}

/// Opens blocking Modbus TCP connections to a controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TcpConnector {
    host: String,
    port: u16,
    unit_id: u8,
    timeout: Option<Duration>,
}

impl TcpConnector {
    /// Creates a connector for `host:port`, addressing unit id 1 without a timeout.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            unit_id: DEFAULT_UNIT_ID,
            timeout: None,
        }
    }

    /// Sets the timeout for each Modbus request.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Overrides the unit id, for gateways that remap it.
    pub fn with_unit_id(mut self, unit_id: u8) -> Self {
        self.unit_id = unit_id;
        self
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn unit_id(&self) -> u8 {
        self.unit_id
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    fn resolve(&self) -> std::io::Result<SocketAddr> {
        (self.host.as_str(), self.port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| {
                std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("No address found for host '{}'", self.host),
                )
            })
    }
}

impl Connector for TcpConnector {
    type Transport = Context;

    fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    fn connect(&mut self) -> std::io::Result<Context> {
        let socket_addr = self.resolve()?;
        let mut ctx = tcp::connect_slave(socket_addr, Slave(self.unit_id))?;
        ctx.set_timeout(self.timeout);
        Ok(ctx)
    }
}
