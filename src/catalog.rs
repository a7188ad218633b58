//! The register catalog of the easYgen-1000 generator controller.
//!
//! The controller publishes its telemetry at sparse holding register addresses
//! between 50001 and 50080. A [`Catalog`] is an ordered, immutable table of
//! [`RegisterEntry`] values sorted by ascending address; the
//! [`AddressMap`](crate::mapper::AddressMap) relies on this ordering.
//!
//! Addresses are 1-based protocol addresses, as printed in the device manual.

use tokio_modbus::Address;

/// Errors reported by [`Catalog::new`] when a register table is malformed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CatalogError {
    #[error("The register catalog is empty")]
    Empty,
    #[error("Register address {0} is listed more than once")]
    DuplicateAddress(Address),
    #[error("Measurement name '{0}' is listed more than once")]
    DuplicateName(&'static str),
    #[error("Register address {current} follows {previous}, addresses must be strictly ascending")]
    NotAscending { previous: Address, current: Address },
}

/// A single named measurement at an absolute protocol address.
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegisterEntry {
    /// 1-based Modbus protocol address.
    pub address: Address,
    /// Human readable measurement name, including the unit resolution.
    pub name: &'static str,
}

impl RegisterEntry {
    pub const fn new(address: Address, name: &'static str) -> Self {
        Self { address, name }
    }
}

impl std::fmt::Display for RegisterEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.address, self.name)
    }
}

/// An ordered table of register entries, sorted by ascending address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Catalog {
    entries: &'static [RegisterEntry],
}

impl Catalog {
    /// The measurement registers of the easYgen-1000.
    pub const EASYGEN_1000: Catalog = Catalog::new_unchecked(EASYGEN_1000_REGISTERS);

    /// Creates a catalog after checking that it is non-empty, that addresses are
    /// strictly ascending and that neither addresses nor names repeat.
    pub fn new(entries: &'static [RegisterEntry]) -> Result<Self, CatalogError> {
        let catalog = Self::new_unchecked(entries);
        catalog.validate()?;
        Ok(catalog)
    }

    /// Creates a catalog without any checks.
    ///
    /// The caller guarantees ascending and unique addresses and unique names.
    /// Building an [`AddressMap`](crate::mapper::AddressMap) from a malformed
    /// catalog does not fail, but the resulting offsets are meaningless.
    pub const fn new_unchecked(entries: &'static [RegisterEntry]) -> Self {
        Self { entries }
    }

    /// Checks the catalog invariants.
    pub fn validate(&self) -> Result<(), CatalogError> {
        if self.entries.is_empty() {
            return Err(CatalogError::Empty);
        }
        let mut names = std::collections::HashSet::with_capacity(self.entries.len());
        let mut previous: Option<Address> = None;
        for entry in self.entries {
            if let Some(previous) = previous {
                if entry.address == previous {
                    return Err(CatalogError::DuplicateAddress(entry.address));
                }
                if entry.address < previous {
                    return Err(CatalogError::NotAscending {
                        previous,
                        current: entry.address,
                    });
                }
            }
            if !names.insert(entry.name) {
                return Err(CatalogError::DuplicateName(entry.name));
            }
            previous = Some(entry.address);
        }
        Ok(())
    }

    pub fn entries(&self) -> &'static [RegisterEntry] {
        self.entries
    }

    pub fn iter(&self) -> std::slice::Iter<'static, RegisterEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the entry at catalog position `index`.
    pub fn get(&self, index: usize) -> Option<&'static RegisterEntry> {
        self.entries.get(index)
    }

    pub fn find_by_name(&self, name: &str) -> Option<&'static RegisterEntry> {
        self.entries.iter().find(|entry| entry.name == name)
    }

    pub fn find_by_address(&self, address: Address) -> Option<&'static RegisterEntry> {
        self.entries.iter().find(|entry| entry.address == address)
    }

    /// Address of the first entry, `None` for an empty catalog.
    pub fn first_address(&self) -> Option<Address> {
        self.entries.first().map(|entry| entry.address)
    }

    /// Address of the last entry, `None` for an empty catalog.
    pub fn last_address(&self) -> Option<Address> {
        self.entries.last().map(|entry| entry.address)
    }

    /// Number of registers in the contiguous block from the first to the last
    /// catalog address, gaps included.
    pub fn span(&self) -> u16 {
        match (self.first_address(), self.last_address()) {
            (Some(first), Some(last)) => last.wrapping_sub(first).wrapping_add(1),
            _ => 0,
        }
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::EASYGEN_1000
    }
}

impl IntoIterator for Catalog {
    type Item = &'static RegisterEntry;
    type IntoIter = std::slice::Iter<'static, RegisterEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

const fn reg(address: Address, name: &'static str) -> RegisterEntry {
    RegisterEntry::new(address, name)
}

/// Raw register table of the easYgen-1000, see [`Catalog::EASYGEN_1000`].
pub const EASYGEN_1000_REGISTERS: &[RegisterEntry] = &[
    reg(50001, "Protocol-ID"),
    reg(50002, "Generator: Voltage V L12 (0.1V)"),
    reg(50004, "Generator: Frequency (0.01 Hz)"),
    reg(50005, "Generator: Voltage V L1N (0.1V)"),
    reg(50007, "Mains: Frequency f 123 (0.01 Hz)"),
    reg(50008, "Generator: Voltage V L23 (0.1V)"),
    reg(50010, "Generator: Power factor cosφ L1 (0.001)"),
    reg(50011, "Generator: Voltage V L2N (0.1V)"),
    reg(50013, "Mains: Power factor cosφ L1 (0.001)"),
    reg(50014, "Generator: Voltage V L31 (0.1V)"),
    reg(50016, "Engine speed (RPM)"),
    reg(50017, "Generator: Voltage V L3N (0.1V)"),
    reg(50019, "Battery voltage (0.1V)"),
    reg(50020, "Mains: Voltage V L12 (0.1V)"),
    reg(50022, "Analog input [T1]"),
    reg(50023, "Mains: Voltage V L1N (0.1V)"),
    reg(50025, "Analog input [T2]"),
    reg(50026, "Mains: Voltage V L23 (0.1V)"),
    reg(50028, "Discrete inputs, status"),
    reg(50029, "Mains: Voltage V L3N (0.1V)"),
    reg(50031, "Relay outputs, status"),
    reg(50032, "Mains: Voltage V L31 (0.1V)"),
    reg(50034, "System status low"),
    reg(50035, "Mains: Voltage V L2N (0.1V)"),
    reg(50037, "Alarm classes"),
    reg(50038, "Generator: Current I L1 (mA)"),
    reg(50040, "Discrete inputs with alarm class"),
    reg(50041, "Generator: Current I L2 (mA)"),
    reg(50043, "Alarms 1"),
    reg(50044, "Generator: Current I L3 (mA)"),
    reg(50046, "Generator, watchdog 1"),
    reg(50047, "Mains: Current I L1 (mA)"),
    reg(50049, "Mains, watchdog 1"),
    reg(50050, "Generator: Reactive power Q (var)"),
    reg(50052, "Analog inputs, wire break"),
    reg(50053, "Generator: Real power P (W)"),
    reg(50055, "Analog inputs"),
    reg(50056, "Mains: Real power P L1 (W)"),
    reg(50058, "System status high"),
    reg(50059, "Mains: Reactive power Q (Q)"),
    reg(50061, "Generator: power factor cosφ (0.01)"),
    reg(50062, "Mains: power factor cosphi (0.01)"),
    reg(50063, "Mains: reactive power Q (0.1 kvar)"),
    reg(50064, "Generator: real power P (0.1 kW)"),
    reg(50065, "Generator: reactive power Q (0.1 kvar)"),
    reg(50066, "Mains: real power P (0.1 kW)"),
    reg(50067, "Generator, watchdog 2"),
    reg(50068, "Real energy (0.01 MWh)"),
    reg(50070, "Flag of the LogicsManager"),
    reg(50071, "Reactive energy (0.01 Mvarh)"),
    reg(50073, "Parameter 10202"),
    reg(50074, "Generator: Calculated ground current (mA)"),
    reg(50076, "External discrete inputs with alarm class"),
    reg(50077, "Parameter 10308"),
    reg(50079, "External relay outputs, status"),
    reg(50080, "External discrete inputs, status"),
];
