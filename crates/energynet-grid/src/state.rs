use std::collections::BTreeMap;

use energynet_core::{NetworkId, SharedNetwork};
use energynet_spatial::{DeviceLocationIndex, SpatialIndex};
use parking_lot::RwLock;

/// State shared between the manager and its tickers.
#[derive(Debug)]
pub(crate) struct GridState {
    pub(crate) networks: RwLock<BTreeMap<NetworkId, SharedNetwork>>,
    pub(crate) spatial: SpatialIndex,
    pub(crate) devices: DeviceLocationIndex,
}

impl GridState {
    pub(crate) fn new(cell_size: u32) -> Self {
        Self {
            networks: RwLock::new(BTreeMap::new()),
            spatial: SpatialIndex::new(cell_size),
            devices: DeviceLocationIndex::new(),
        }
    }

    pub(crate) fn network(&self, id: NetworkId) -> Option<SharedNetwork> {
        self.networks.read().get(&id).cloned()
    }

    /// A point-in-time copy of the network table, so callers can lock
    /// individual networks without holding the table lock.
    pub(crate) fn snapshot(&self) -> Vec<(NetworkId, SharedNetwork)> {
        self.networks
            .read()
            .iter()
            .map(|(id, net)| (*id, net.clone()))
            .collect()
    }
}
