//! A library for reading telemetry from the easYgen-1000 generator controller via Modbus TCP.
//!
//! The controller publishes its measurements at sparse register addresses
//! between 50001 and 50080. This crate reads the whole block with a single
//! request and resolves measurement names and protocol addresses to positions
//! inside that block.
//!
//! ## Building blocks
//!
//! - [`catalog`]: The fixed table of known measurements, ordered by address.
//! - [`mapper`]: Lookup tables from measurement name and address to offset.
//! - [`session`]: The connect, fetch, query and disconnect cycle.
//! - [`tokio_sync`]: The blocking Modbus TCP transport built on `tokio-modbus`.
//!
//! ## Quick Start
//!
//! ```no_run
//! use easygen_lib::{catalog::Catalog, session::Session, tokio_sync::TcpConnector};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut session = Session::new(TcpConnector::new("192.168.1.50", 502), Catalog::EASYGEN_1000);
//!
//!     session.connect()?;
//!     session.fetch_all()?;
//!     println!("Battery voltage: {} x 0.1V", session.get_by_name("Battery voltage (0.1V)")?);
//!     println!("Register 50016: {}", session.get_by_address(50016)?);
//!     session.disconnect();
//!
//!     Ok(())
//! }
//! ```

pub mod catalog;
pub mod error;
pub mod mapper;
pub mod session;

pub use error::{Error, Result};

#[cfg_attr(docsrs, doc(cfg(feature = "tokio-tcp-sync")))]
#[cfg(feature = "tokio-tcp-sync")]
pub mod tokio_sync;
