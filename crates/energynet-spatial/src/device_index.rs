use std::collections::HashMap;

use energynet_core::{BlockPos, NetworkId};
use parking_lot::RwLock;

/// Reverse map from device position to owning network.
///
/// A position maps to at most one network; inserting over an existing
/// mapping reassigns it and reports the previous owner.
#[derive(Debug, Default)]
pub struct DeviceLocationIndex {
    devices: RwLock<HashMap<BlockPos, NetworkId>>,
}

impl DeviceLocationIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map `pos` to `network`, returning the previous owner if any.
    pub fn insert(&self, pos: BlockPos, network: NetworkId) -> Option<NetworkId> {
        self.devices.write().insert(pos, network)
    }

    /// Map many positions under a single write lock.
    pub fn insert_all(&self, positions: impl IntoIterator<Item = BlockPos>, network: NetworkId) {
        let mut devices = self.devices.write();
        for pos in positions {
            devices.insert(pos, network);
        }
    }

    pub fn remove(&self, pos: BlockPos) -> Option<NetworkId> {
        self.devices.write().remove(&pos)
    }

    /// Remove many positions under a single write lock.
    pub fn remove_all(&self, positions: impl IntoIterator<Item = BlockPos>) {
        let mut devices = self.devices.write();
        for pos in positions {
            devices.remove(&pos);
        }
    }

    /// Remove `pos` only if it is currently owned by `network`.
    pub fn remove_if_owned(&self, pos: BlockPos, network: NetworkId) -> bool {
        let mut devices = self.devices.write();
        if devices.get(&pos) == Some(&network) {
            devices.remove(&pos);
            true
        } else {
            false
        }
    }

    pub fn get(&self, pos: BlockPos) -> Option<NetworkId> {
        self.devices.read().get(&pos).copied()
    }

    pub fn contains(&self, pos: BlockPos) -> bool {
        self.devices.read().contains_key(&pos)
    }

    /// All positions owned by `network`. Linear in the index size; meant for
    /// diagnostics, not hot paths.
    pub fn positions_of(&self, network: NetworkId) -> Vec<BlockPos> {
        let mut positions: Vec<BlockPos> = self
            .devices
            .read()
            .iter()
            .filter(|(_, owner)| **owner == network)
            .map(|(pos, _)| *pos)
            .collect();
        positions.sort();
        positions
    }

    pub fn len(&self) -> usize {
        self.devices.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.read().is_empty()
    }

    pub fn clear(&self) {
        self.devices.write().clear();
    }
}
