//! Connect, fetch and query cycle against the controller.
//!
//! A [`Session`] owns a [`Connector`] that opens the transport, the
//! [`Catalog`] and the [`AddressMap`] derived from it. It moves between three
//! states:
//!
//! * **Disconnected**: initial state, no transport is held.
//! * **Connected**: the transport is open, no telemetry is cached.
//! * **Fetched**: the transport is open and a [`TelemetryBatch`] is cached.
//!
//! Values can only be queried in the **Fetched** state. Every fetch replaces
//! the cached batch as a whole; a failed fetch drops it and returns to
//! **Connected**. Disconnecting drops both transport and batch.
//!
//! ## Example
//!
//! ```no_run
//! use easygen_lib::{catalog::Catalog, session::Session, tokio_sync::TcpConnector};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut session = Session::new(TcpConnector::new("192.168.1.50", 502), Catalog::EASYGEN_1000);
//!     let speed = session.connected(|session| {
//!         session.fetch_all()?;
//!         session.get_by_name("Engine speed (RPM)")
//!     })?;
//!     println!("Engine speed: {speed} RPM");
//!     Ok(())
//! }
//! ```

use crate::{
    catalog::{Catalog, RegisterEntry},
    error::{Error, Result, TransportError},
    mapper::AddressMap,
};
use log::*;
use tokio_modbus::{Address, Quantity};

/// The maximum number of registers a single Modbus read request may carry.
pub const MAX_READ_QUANTITY: Quantity = 125;

/// The Modbus table the telemetry block is read from.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RegisterKind {
    /// Holding registers, function code 0x03.
    #[default]
    Holding,
    /// Input registers, function code 0x04.
    Input,
}

impl std::fmt::Display for RegisterKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegisterKind::Holding => write!(f, "holding registers"),
            RegisterKind::Input => write!(f, "input registers"),
        }
    }
}

/// An open connection able to read a block of registers.
///
/// Closing happens when the value is dropped.
pub trait Transport {
    /// Reads `quantity` registers starting at the zero-based `address`.
    fn read_registers(
        &mut self,
        kind: RegisterKind,
        address: Address,
        quantity: Quantity,
    ) -> std::result::Result<Vec<u16>, TransportError>;
}

/// Opens a [`Transport`] to the controller.
pub trait Connector {
    type Transport: Transport;

    /// Human readable description of the remote end, used in errors and logs.
    fn endpoint(&self) -> String;

    /// Opens a new transport.
    fn connect(&mut self) -> std::io::Result<Self::Transport>;
}

/// Raw register values of the most recent successful fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryBatch {
    address: Address,
    values: Vec<u16>,
}

impl TelemetryBatch {
    pub fn new(address: Address, values: Vec<u16>) -> Self {
        Self { address, values }
    }

    /// The 1-based protocol address the batch was read from.
    pub fn address(&self) -> Address {
        self.address
    }

    pub fn values(&self) -> &[u16] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Value at the zero-based `offset`.
    pub fn get(&self, offset: usize) -> Result<u16> {
        self.values
            .get(offset)
            .copied()
            .ok_or(Error::OutOfRange {
                offset,
                len: self.values.len(),
            })
    }
}

/// Observable state of a [`Session`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connected,
    Fetched,
}

enum State<T> {
    Disconnected,
    Connected(T),
    Fetched(T, TelemetryBatch),
}

/// Telemetry session against one controller.
///
/// The session is not meant to be shared between threads; run one session per
/// thread instead. Its [`AddressMap`] can be cloned and shared.
pub struct Session<C: Connector> {
    connector: C,
    catalog: Catalog,
    map: AddressMap,
    kind: RegisterKind,
    state: State<C::Transport>,
}

impl<C: Connector> Session<C> {
    /// Creates a disconnected session and builds the address map of `catalog`.
    pub fn new(connector: C, catalog: Catalog) -> Self {
        Self {
            connector,
            map: AddressMap::build(&catalog),
            catalog,
            kind: RegisterKind::default(),
            state: State::Disconnected,
        }
    }

    /// Selects the register table used by subsequent fetches.
    pub fn with_register_kind(mut self, kind: RegisterKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn register_kind(&self) -> RegisterKind {
        self.kind
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn address_map(&self) -> &AddressMap {
        &self.map
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    pub fn state(&self) -> SessionState {
        match self.state {
            State::Disconnected => SessionState::Disconnected,
            State::Connected(_) => SessionState::Connected,
            State::Fetched(..) => SessionState::Fetched,
        }
    }

    /// The cached batch, if the session is in the fetched state.
    pub fn batch(&self) -> Option<&TelemetryBatch> {
        match &self.state {
            State::Fetched(_, batch) => Some(batch),
            _ => None,
        }
    }

    /// Opens the transport. Does nothing if the session is already connected.
    pub fn connect(&mut self) -> Result<()> {
        if !matches!(self.state, State::Disconnected) {
            debug!("Already connected to {}", self.connector.endpoint());
            return Ok(());
        }
        let endpoint = self.connector.endpoint();
        debug!("Connecting to {endpoint}");
        let transport = self
            .connector
            .connect()
            .map_err(|source| Error::Connection { endpoint, source })?;
        self.state = State::Connected(transport);
        Ok(())
    }

    /// Closes the transport and drops the cached batch.
    ///
    /// Safe to call in any state, including repeatedly.
    pub fn disconnect(&mut self) {
        if !matches!(self.state, State::Disconnected) {
            debug!("Disconnecting from {}", self.connector.endpoint());
        }
        self.state = State::Disconnected;
    }

    /// Connects, runs `f` and disconnects again, also when `f` fails.
    pub fn connected<R, E, F>(&mut self, f: F) -> std::result::Result<R, E>
    where
        E: From<Error>,
        F: FnOnce(&mut Self) -> std::result::Result<R, E>,
    {
        self.connect()?;
        let result = f(self);
        self.disconnect();
        result
    }

    /// Fetches the whole catalog span in one read request.
    pub fn fetch_all(&mut self) -> Result<()> {
        let address = self.catalog.first_address().unwrap_or_default();
        self.fetch_range(address, self.catalog.span())
    }

    /// Fetches `quantity` registers starting at the 1-based protocol `address`.
    ///
    /// The batch is indexed by catalog offset, so a range that does not start
    /// at the first catalog address shifts all lookups.
    pub fn fetch_range(&mut self, address: Address, quantity: Quantity) -> Result<()> {
        let end = u32::from(address) + u32::from(quantity);
        if address == 0
            || quantity == 0
            || quantity > MAX_READ_QUANTITY
            || end - 1 > u32::from(Address::MAX)
        {
            return Err(Error::InvalidRange { address, quantity });
        }

        let mut transport = match std::mem::replace(&mut self.state, State::Disconnected) {
            State::Disconnected => return Err(Error::NotConnected),
            State::Connected(transport) | State::Fetched(transport, _) => transport,
        };

        debug!(
            "Reading {quantity} {} starting at address {address}",
            self.kind
        );
        let result = transport
            .read_registers(self.kind, address - 1, quantity)
            .and_then(|values| {
                if values.len() == usize::from(quantity) {
                    Ok(values)
                } else {
                    Err(std::io::Error::new(
                        std::io::ErrorKind::InvalidData,
                        format!(
                            "Expected {quantity} registers, device returned {}",
                            values.len()
                        ),
                    )
                    .into())
                }
            });

        match result {
            Ok(values) => {
                self.state = State::Fetched(transport, TelemetryBatch::new(address, values));
                Ok(())
            }
            Err(source) => {
                warn!("Reading registers from {} failed: {source}", self.connector.endpoint());
                self.state = State::Connected(transport);
                Err(Error::Fetch {
                    address,
                    quantity,
                    source,
                })
            }
        }
    }

    /// Raw value of the measurement called `name` in the cached batch.
    pub fn get_by_name(&self, name: &str) -> Result<u16> {
        let offset = self
            .map
            .offset_of_name(name)
            .ok_or_else(|| Error::UnknownName(name.to_string()))?;
        trace!("'{name}' resolves to offset {offset}");
        self.value_at(offset)
    }

    /// Raw value of the register at protocol `address` in the cached batch.
    pub fn get_by_address(&self, address: Address) -> Result<u16> {
        let offset = self
            .map
            .offset_of_address(address)
            .ok_or(Error::UnknownAddress(address))?;
        trace!("Address {address} resolves to offset {offset}");
        self.value_at(offset)
    }

    /// Every catalog entry together with its value in the cached batch.
    pub fn readings(&self) -> impl Iterator<Item = (&'static RegisterEntry, Result<u16>)> + '_ {
        self.catalog
            .iter()
            .map(move |entry| (entry, self.get_by_address(entry.address)))
    }

    fn value_at(&self, offset: usize) -> Result<u16> {
        self.batch().ok_or(Error::NotFetched)?.get(offset)
    }
}

impl<C: Connector> Drop for Session<C> {
    fn drop(&mut self) {
        self.disconnect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::{cell::RefCell, rc::Rc};

    /// In-memory stand-in for the controller.
    #[derive(Debug, Default)]
    struct Device {
        /// Zero-based address of `values[0]`.
        pub base: Address,
        pub values: Vec<u16>,
        pub refuse_connect: bool,
        pub fail_read: bool,
        pub truncate: bool,
        pub opened: usize,
        pub closed: usize,
        pub requests: Vec<(RegisterKind, Address, Quantity)>,
    }

    #[derive(Debug, Clone)]
    struct FakeConnector(pub Rc<RefCell<Device>>);

    struct FakeTransport(Rc<RefCell<Device>>);

    impl Connector for FakeConnector {
        type Transport = FakeTransport;

        fn endpoint(&self) -> String {
            "fake:502".to_string()
        }

        fn connect(&mut self) -> std::io::Result<FakeTransport> {
            let mut device = self.0.borrow_mut();
            if device.refuse_connect {
                return Err(std::io::ErrorKind::ConnectionRefused.into());
            }
            device.opened += 1;
            Ok(FakeTransport(self.0.clone()))
        }
    }

    impl Transport for FakeTransport {
        fn read_registers(
            &mut self,
            kind: RegisterKind,
            address: Address,
            quantity: Quantity,
        ) -> std::result::Result<Vec<u16>, TransportError> {
            let mut device = self.0.borrow_mut();
            device.requests.push((kind, address, quantity));
            if device.fail_read {
                return Err(std::io::Error::from(std::io::ErrorKind::TimedOut).into());
            }
            let start = usize::from(address.wrapping_sub(device.base));
            let end = start + usize::from(quantity);
            let mut values = device
                .values
                .get(start..end)
                .ok_or(tokio_modbus::ExceptionCode::IllegalDataAddress)?
                .to_vec();
            if device.truncate {
                values.pop();
            }
            Ok(values)
        }
    }

    impl Drop for FakeTransport {
        fn drop(&mut self) {
            self.0.borrow_mut().closed += 1;
        }
    }

    const SMALL: &[RegisterEntry] = &[
        RegisterEntry::new(100, "A"),
        RegisterEntry::new(103, "B"),
        RegisterEntry::new(104, "C"),
    ];

    /// Device serving value `n` at protocol address `50001 + n`.
    fn easygen_device() -> Rc<RefCell<Device>> {
        Rc::new(RefCell::new(Device {
            base: 50000,
            values: (0..80).collect(),
            ..Default::default()
        }))
    }

    fn easygen_session() -> (Rc<RefCell<Device>>, Session<FakeConnector>) {
        let device = easygen_device();
        let session = Session::new(FakeConnector(device.clone()), Catalog::EASYGEN_1000);
        (device, session)
    }

    #[test]
    fn small_catalog_lookup() {
        let device = Rc::new(RefCell::new(Device {
            base: 99,
            values: vec![10, 20, 30, 40, 50],
            ..Default::default()
        }));
        let mut session = Session::new(
            FakeConnector(device.clone()),
            Catalog::new(SMALL).unwrap(),
        );
        session.connect().unwrap();
        session.fetch_all().unwrap();
        assert_eq!(device.borrow().requests, [(RegisterKind::Holding, 99, 5)]);
        assert_eq!(session.get_by_address(103).unwrap(), 40);
        assert_eq!(session.get_by_name("C").unwrap(), 50);
        assert_eq!(session.get_by_name("A").unwrap(), 10);
    }

    #[test]
    fn fetch_range_maps_addresses_to_offsets() {
        let (device, mut session) = easygen_session();
        session.connect().unwrap();
        session.fetch_range(50001, 80).unwrap();
        assert_eq!(session.state(), SessionState::Fetched);
        assert_eq!(device.borrow().requests, [(RegisterKind::Holding, 50000, 80)]);
        assert_eq!(session.get_by_address(50001).unwrap(), 0);
        assert_eq!(session.get_by_address(50080).unwrap(), 79);
        assert_eq!(session.get_by_name("Engine speed (RPM)").unwrap(), 15);
    }

    #[test]
    fn fetch_all_reads_catalog_span() {
        let (device, mut session) = easygen_session();
        session.connect().unwrap();
        session.fetch_all().unwrap();
        assert_eq!(device.borrow().requests, [(RegisterKind::Holding, 50000, 80)]);
        assert_eq!(session.batch().map(TelemetryBatch::len), Some(80));
        assert_eq!(session.batch().map(TelemetryBatch::address), Some(50001));
    }

    #[test]
    fn input_registers() {
        let (device, session) = easygen_session();
        let mut session = session.with_register_kind(RegisterKind::Input);
        session.connect().unwrap();
        session.fetch_all().unwrap();
        assert_eq!(device.borrow().requests[0].0, RegisterKind::Input);
    }

    #[test]
    fn query_before_fetch() {
        let (_device, mut session) = easygen_session();
        for entry in Catalog::EASYGEN_1000.iter() {
            assert_matches!(session.get_by_name(entry.name), Err(Error::NotFetched));
            assert_matches!(session.get_by_address(entry.address), Err(Error::NotFetched));
        }
        session.connect().unwrap();
        assert_matches!(session.get_by_address(50001), Err(Error::NotFetched));
    }

    #[test]
    fn unknown_keys_in_every_state() {
        let (_device, mut session) = easygen_session();
        assert_matches!(
            session.get_by_name("Unknown Measurement"),
            Err(Error::UnknownName(name)) if name == "Unknown Measurement"
        );
        session.connect().unwrap();
        assert_matches!(
            session.get_by_name("Unknown Measurement"),
            Err(Error::UnknownName(_))
        );
        session.fetch_all().unwrap();
        assert_matches!(
            session.get_by_name("Unknown Measurement"),
            Err(Error::UnknownName(_))
        );
        assert_matches!(session.get_by_address(50003), Err(Error::UnknownAddress(50003)));
    }

    #[test]
    fn narrow_fetch_is_out_of_range() {
        let (_device, mut session) = easygen_session();
        session.connect().unwrap();
        session.fetch_range(50001, 10).unwrap();
        assert_eq!(session.get_by_address(50010).unwrap(), 9);
        assert_matches!(
            session.get_by_address(50011),
            Err(Error::OutOfRange { offset: 10, len: 10 })
        );
        assert_matches!(
            session.get_by_name("External discrete inputs, status"),
            Err(Error::OutOfRange { offset: 79, len: 10 })
        );
    }

    #[test]
    fn fetch_replaces_batch() {
        let (_device, mut session) = easygen_session();
        session.connect().unwrap();
        session.fetch_all().unwrap();
        session.fetch_range(50001, 2).unwrap();
        assert_eq!(session.batch().map(TelemetryBatch::len), Some(2));
        assert_matches!(session.get_by_address(50004), Err(Error::OutOfRange { .. }));
    }

    #[test]
    fn failed_fetch_falls_back_to_connected() {
        let (device, mut session) = easygen_session();
        session.connect().unwrap();
        session.fetch_all().unwrap();
        device.borrow_mut().fail_read = true;
        assert_matches!(
            session.fetch_all(),
            Err(Error::Fetch {
                address: 50001,
                quantity: 80,
                source: TransportError::Modbus(_)
            })
        );
        assert_eq!(session.state(), SessionState::Connected);
        assert_matches!(session.get_by_address(50001), Err(Error::NotFetched));
        assert_eq!(device.borrow().closed, 0);

        device.borrow_mut().fail_read = false;
        session.fetch_all().unwrap();
        assert_eq!(session.state(), SessionState::Fetched);
    }

    #[test]
    fn exception_is_fetch_error() {
        let (_device, mut session) = easygen_session();
        session.connect().unwrap();
        assert_matches!(
            session.fetch_range(50070, 20),
            Err(Error::Fetch {
                source: TransportError::Exception(
                    tokio_modbus::ExceptionCode::IllegalDataAddress
                ),
                ..
            })
        );
        assert_eq!(session.state(), SessionState::Connected);
    }

    #[test]
    fn short_response_is_fetch_error() {
        let (device, mut session) = easygen_session();
        device.borrow_mut().truncate = true;
        session.connect().unwrap();
        assert_matches!(session.fetch_all(), Err(Error::Fetch { .. }));
        assert_eq!(session.state(), SessionState::Connected);
    }

    #[test]
    fn fetch_requires_connection() {
        let (device, mut session) = easygen_session();
        assert_matches!(session.fetch_all(), Err(Error::NotConnected));
        assert_eq!(session.state(), SessionState::Disconnected);
        assert!(device.borrow().requests.is_empty());
    }

    #[test]
    fn invalid_ranges() {
        let (device, mut session) = easygen_session();
        session.connect().unwrap();
        assert_matches!(
            session.fetch_range(0, 10),
            Err(Error::InvalidRange { address: 0, quantity: 10 })
        );
        assert_matches!(session.fetch_range(50001, 0), Err(Error::InvalidRange { .. }));
        assert_matches!(session.fetch_range(50001, 126), Err(Error::InvalidRange { .. }));
        assert_matches!(session.fetch_range(65530, 10), Err(Error::InvalidRange { .. }));
        assert!(device.borrow().requests.is_empty());
        assert_eq!(session.state(), SessionState::Connected);
    }

    #[test]
    fn connection_refused() {
        let (device, mut session) = easygen_session();
        device.borrow_mut().refuse_connect = true;
        assert_matches!(
            session.connect(),
            Err(Error::Connection { endpoint, .. }) if endpoint == "fake:502"
        );
        assert_eq!(session.state(), SessionState::Disconnected);
    }

    #[test]
    fn disconnect_is_idempotent() {
        let (device, mut session) = easygen_session();
        session.disconnect();
        session.disconnect();
        assert_eq!(session.state(), SessionState::Disconnected);

        session.connect().unwrap();
        session.fetch_all().unwrap();
        session.disconnect();
        session.disconnect();
        assert_eq!(device.borrow().opened, 1);
        assert_eq!(device.borrow().closed, 1);
        assert_matches!(session.get_by_address(50001), Err(Error::NotFetched));
    }

    #[test]
    fn connect_twice_keeps_transport() {
        let (device, mut session) = easygen_session();
        session.connect().unwrap();
        session.fetch_all().unwrap();
        session.connect().unwrap();
        assert_eq!(device.borrow().opened, 1);
        assert_eq!(session.state(), SessionState::Fetched);
    }

    #[test]
    fn scoped_connection_closes_on_error() {
        let (device, mut session) = easygen_session();
        device.borrow_mut().fail_read = true;
        let result: Result<()> = session.connected(|session| session.fetch_all());
        assert_matches!(result, Err(Error::Fetch { .. }));
        assert_eq!(session.state(), SessionState::Disconnected);
        assert_eq!(device.borrow().opened, 1);
        assert_eq!(device.borrow().closed, 1);
    }

    #[test]
    fn scoped_connection_returns_value() {
        let (device, mut session) = easygen_session();
        let value = session
            .connected(|session| {
                session.fetch_all()?;
                session.get_by_name("Battery voltage (0.1V)")
            })
            .unwrap();
        assert_eq!(value, 18);
        assert_eq!(device.borrow().closed, 1);
    }

    #[test]
    fn drop_closes_transport() {
        let (device, mut session) = easygen_session();
        session.connect().unwrap();
        drop(session);
        assert_eq!(device.borrow().closed, 1);
    }

    #[test]
    fn readings_cover_catalog() {
        let (_device, mut session) = easygen_session();
        session.connect().unwrap();
        session.fetch_range(50001, 40).unwrap();
        let readings: Vec<_> = session.readings().collect();
        assert_eq!(readings.len(), Catalog::EASYGEN_1000.len());
        let (first, value) = &readings[0];
        assert_eq!(first.name, "Protocol-ID");
        assert_matches!(value, Ok(0));
        let (last, value) = readings.last().unwrap();
        assert_eq!(last.address, 50080);
        assert_matches!(value, Err(Error::OutOfRange { .. }));
    }
}
