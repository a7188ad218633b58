//! Translation between protocol addresses, measurement names and batch offsets.
//!
//! The whole catalog is fetched with a single read request covering the
//! contiguous block from the first to the last catalog address. An *offset* is
//! the zero-based position of a register inside that block. Addresses missing
//! from the catalog still occupy a slot in the block, they are simply never
//! looked up.

use crate::catalog::Catalog;
use std::collections::HashMap;
use tokio_modbus::Address;

/// Lookup tables from measurement name and from protocol address to offset.
///
/// Built once per [`Session`](crate::session::Session) and never modified
/// afterwards, so it can be shared freely between threads.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddressMap {
    by_name: HashMap<&'static str, usize>,
    by_address: HashMap<Address, usize>,
}

impl AddressMap {
    /// Builds the lookup tables for `catalog`.
    ///
    /// Walks the catalog in order with a running offset that starts at 0 for
    /// the first entry and grows by the address gap to the previous entry for
    /// every following one. For an ascending catalog this yields
    /// `offset = address - first_address`.
    ///
    /// The catalog is expected to be well formed (see [`Catalog::new`]). For a
    /// malformed catalog the offsets are wrong, but building never fails.
    pub fn build(catalog: &Catalog) -> Self {
        let capacity = catalog.len();
        let init = (
            Self {
                by_name: HashMap::with_capacity(capacity),
                by_address: HashMap::with_capacity(capacity),
            },
            0usize,
            None::<Address>,
        );
        let (map, _, _) = catalog
            .iter()
            .fold(init, |(mut map, offset, previous), entry| {
                let offset = match previous {
                    Some(previous) => {
                        offset.wrapping_add(usize::from(entry.address.wrapping_sub(previous)))
                    }
                    None => 0,
                };
                map.by_name.insert(entry.name, offset);
                map.by_address.insert(entry.address, offset);
                (map, offset, Some(entry.address))
            });
        map
    }

    /// Offset of the measurement called `name`.
    pub fn offset_of_name(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).copied()
    }

    /// Offset of the register at protocol `address`.
    pub fn offset_of_address(&self, address: Address) -> Option<usize> {
        self.by_address.get(&address).copied()
    }

    pub fn len(&self) -> usize {
        self.by_address.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_address.is_empty()
    }
}
