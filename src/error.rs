//! Error types of the telemetry session.
use tokio_modbus::{Address, Quantity};

/// Failure reported by the Modbus transport while reading registers.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The device answered with a Modbus exception.
    #[error("Modbus exception: {0}")]
    Exception(#[from] tokio_modbus::ExceptionCode),

    /// I/O or protocol failure, including timeouts.
    #[error("Modbus error: {0}")]
    Modbus(#[from] tokio_modbus::Error),
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        TransportError::Modbus(tokio_modbus::Error::Transport(err))
    }
}

/// Represents all possible errors of a [`Session`](crate::session::Session).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The transport could not be opened.
    #[error("Cannot connect to {endpoint}")]
    Connection {
        endpoint: String,
        #[source]
        source: std::io::Error,
    },

    /// A batch read failed after a successful connect.
    #[error("Cannot read {quantity} registers starting at address {address}")]
    Fetch {
        address: Address,
        quantity: Quantity,
        #[source]
        source: TransportError,
    },

    /// A fetch was requested while the session is disconnected.
    #[error("Session is not connected")]
    NotConnected,

    /// A fetch request that cannot be expressed as a single Modbus read.
    #[error("Invalid register range: {quantity} registers starting at address {address}")]
    InvalidRange { address: Address, quantity: Quantity },

    /// A value was queried before any successful fetch.
    #[error("No telemetry has been fetched yet")]
    NotFetched,

    /// The measurement name is not in the catalog.
    #[error("Unknown measurement name '{0}'")]
    UnknownName(String),

    /// The register address is not in the catalog.
    #[error("Unknown register address {0}")]
    UnknownAddress(Address),

    /// The offset lies outside of the fetched batch.
    #[error("Offset {offset} is outside of the fetched batch of {len} registers")]
    OutOfRange { offset: usize, len: usize },
}

/// The result type of session operations.
pub type Result<T> = std::result::Result<T, Error>;
