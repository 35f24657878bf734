use std::collections::HashMap;

use energynet_core::{BlockPos, NetworkId, RegionKey, SharedNetwork};
use parking_lot::RwLock;

/// Cells scanned beyond the range-derived radius, so a connection point
/// just across a cell boundary from the hub's cell is still considered.
const CELL_MARGIN: i32 = 2;

#[derive(Debug, Clone)]
struct CellEntry {
    id: NetworkId,
    hub: BlockPos,
    network: SharedNetwork,
}

/// The result of a proximity search.
#[derive(Debug, Clone)]
pub struct Nearest {
    pub id: NetworkId,
    pub network: SharedNetwork,
    /// Squared distance from the query to the closest connection point.
    pub distance_sq: u64,
}

/// Registry of networks keyed by the region cell of their hub.
#[derive(Debug)]
pub struct SpatialIndex {
    cell_size: u32,
    cells: RwLock<HashMap<RegionKey, Vec<CellEntry>>>,
}

impl SpatialIndex {
    /// Create an index whose cells are `cell_size` blocks on a side. Use the
    /// world's native region size.
    pub fn new(cell_size: u32) -> Self {
        Self {
            cell_size: cell_size.max(1),
            cells: RwLock::new(HashMap::new()),
        }
    }

    pub fn cell_size(&self) -> u32 {
        self.cell_size
    }

    /// Register a network under its hub's cell. Registering the same id
    /// twice replaces the earlier entry.
    pub fn register(&self, id: NetworkId, hub: BlockPos, network: SharedNetwork) {
        let key = hub.region(self.cell_size);
        let mut cells = self.cells.write();
        let entries = cells.entry(key).or_default();
        let before = entries.len();
        entries.retain(|e| e.id != id);
        if entries.len() != before {
            tracing::debug!(network = %id, ?hub, "re-registering network");
        }
        entries.push(CellEntry { id, hub, network });
    }

    /// Remove a network. Returns `false` if it was not registered. Cells
    /// left empty are pruned.
    pub fn unregister(&self, id: NetworkId, hub: BlockPos) -> bool {
        let key = hub.region(self.cell_size);
        let mut cells = self.cells.write();
        let Some(entries) = cells.get_mut(&key) else {
            return false;
        };
        let before = entries.len();
        entries.retain(|e| e.id != id);
        let removed = entries.len() != before;
        if !removed {
            tracing::trace!(network = %id, ?hub, "unregister of unknown network");
        }
        if entries.is_empty() {
            cells.remove(&key);
        }
        removed
    }

    /// Find the network with a connection point (hub, extender or storage
    /// module) closest to `pos` within `max_range`.
    ///
    /// Scans a square of cells of radius `ceil(max_range / cell_size) + 2`
    /// around `pos`. Ties go to the older (lower id) network.
    pub fn find_nearest(&self, pos: BlockPos, max_range: u32) -> Option<Nearest> {
        let range_sq = u64::from(max_range) * u64::from(max_range);
        let cells_out = max_range.div_ceil(self.cell_size);
        let radius = i32::try_from(cells_out).unwrap_or(i32::MAX).saturating_add(CELL_MARGIN);
        let center = pos.region(self.cell_size);

        let cells = self.cells.read();
        let mut best: Option<Nearest> = None;
        for key in center.square(radius) {
            let Some(entries) = cells.get(&key) else {
                continue;
            };
            for entry in entries {
                let Some(distance_sq) = closest_point_sq(entry, pos) else {
                    continue;
                };
                if distance_sq > range_sq {
                    continue;
                }
                let better = match &best {
                    None => true,
                    Some(b) => (distance_sq, entry.id) < (b.distance_sq, b.id),
                };
                if better {
                    best = Some(Nearest {
                        id: entry.id,
                        network: entry.network.clone(),
                        distance_sq,
                    });
                }
            }
        }
        best
    }

    /// Ids of networks whose hub lies in the given cell.
    pub fn networks_in(&self, key: RegionKey) -> Vec<NetworkId> {
        self.cells
            .read()
            .get(&key)
            .map(|entries| entries.iter().map(|e| e.id).collect())
            .unwrap_or_default()
    }

    /// Networks whose hub lies within `radius` cells of `key`.
    pub fn networks_near(&self, key: RegionKey, radius: i32) -> Vec<(NetworkId, SharedNetwork)> {
        let cells = self.cells.read();
        key.square(radius)
            .filter_map(|k| cells.get(&k))
            .flatten()
            .map(|e| (e.id, e.network.clone()))
            .collect()
    }

    /// Number of registered networks.
    pub fn len(&self) -> usize {
        self.cells.read().values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.read().is_empty()
    }

    /// Number of non-empty cells.
    pub fn cell_count(&self) -> usize {
        self.cells.read().len()
    }

    pub fn clear(&self) {
        self.cells.write().clear();
    }
}

/// Squared distance from `pos` to the closest connection point of a
/// network, or `None` if it is in another world.
fn closest_point_sq(entry: &CellEntry, pos: BlockPos) -> Option<u64> {
    let hub_sq = entry.hub.distance_sq(&pos)?;
    let network = entry.network.lock();
    let connector_sq = network
        .connectors()
        .filter_map(|(p, _)| p.distance_sq(&pos))
        .min();
    Some(connector_sq.map_or(hub_sq, |c| c.min(hub_sq)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use energynet_core::test_utils::*;
    use energynet_core::{DeviceRole, EnergyNetwork, GridConfig};

    fn make_network(id: u64, hub: BlockPos) -> SharedNetwork {
        EnergyNetwork::new(NetworkId(id), hub, &GridConfig::default(), None).into_shared()
    }

    fn register(index: &SpatialIndex, id: u64, hub: BlockPos) -> SharedNetwork {
        let net = make_network(id, hub);
        index.register(NetworkId(id), hub, net.clone());
        net
    }

    #[test]
    fn finds_hub_within_range() {
        let index = SpatialIndex::new(16);
        register(&index, 1, ground(0, 0));

        let found = index.find_nearest(ground(5, 0), 6).unwrap();
        assert_eq!(found.id, NetworkId(1));
        assert_eq!(found.distance_sq, 25);
    }

    #[test]
    fn huge_cells_still_find_neighbours() {
        let index = SpatialIndex::new(u32::MAX);
        register(&index, 1, ground(-2, 0));
        register(&index, 2, ground(40, 0));

        let found = index.find_nearest(ground(2, 0), 6).unwrap();
        assert_eq!(found.id, NetworkId(1));
    }

    #[test]
    fn ignores_hub_out_of_range() {
        let index = SpatialIndex::new(16);
        register(&index, 1, ground(0, 0));
        assert!(index.find_nearest(ground(7, 0), 6).is_none());
    }

    #[test]
    fn connectors_count_as_connection_points() {
        let index = SpatialIndex::new(16);
        let net = register(&index, 1, ground(0, 0));
        net.lock().connect(DeviceRole::Extender, ground(6, 0));

        let found = index.find_nearest(ground(11, 0), 6).unwrap();
        assert_eq!(found.id, NetworkId(1));
        assert_eq!(found.distance_sq, 25);
    }

    #[test]
    fn leaves_are_not_connection_points() {
        let index = SpatialIndex::new(16);
        let net = register(&index, 1, ground(0, 0));
        net.lock().connect(DeviceRole::Generator, ground(6, 0));

        assert!(index.find_nearest(ground(11, 0), 6).is_none());
    }

    #[test]
    fn picks_closest_network() {
        let index = SpatialIndex::new(16);
        register(&index, 1, ground(0, 0));
        register(&index, 2, ground(8, 0));

        assert_eq!(index.find_nearest(ground(5, 0), 6).unwrap().id, NetworkId(2));
        assert_eq!(index.find_nearest(ground(3, 0), 6).unwrap().id, NetworkId(1));
    }

    #[test]
    fn ties_go_to_older_network() {
        let index = SpatialIndex::new(16);
        register(&index, 7, ground(10, 0));
        register(&index, 3, ground(0, 0));

        assert_eq!(index.find_nearest(ground(5, 0), 6).unwrap().id, NetworkId(3));
    }

    #[test]
    fn finds_across_cell_boundaries() {
        let index = SpatialIndex::new(16);
        register(&index, 1, ground(-1, -1));

        let found = index.find_nearest(ground(2, 2), 6).unwrap();
        assert_eq!(found.id, NetworkId(1));
    }

    #[test]
    fn other_worlds_are_invisible() {
        let index = SpatialIndex::new(16);
        register(&index, 1, pos_in(1, 0, 64, 0));
        assert!(index.find_nearest(ground(1, 0), 6).is_none());
    }

    #[test]
    fn unregister_prunes_empty_cells() {
        let index = SpatialIndex::new(16);
        register(&index, 1, ground(0, 0));
        register(&index, 2, ground(1, 0));
        assert_eq!(index.len(), 2);
        assert_eq!(index.cell_count(), 1);

        assert!(index.unregister(NetworkId(1), ground(0, 0)));
        assert_eq!(index.cell_count(), 1);
        assert!(index.unregister(NetworkId(2), ground(1, 0)));
        assert_eq!(index.cell_count(), 0);
        assert!(index.is_empty());

        assert!(!index.unregister(NetworkId(2), ground(1, 0)));
    }

    #[test]
    fn register_twice_replaces() {
        let index = SpatialIndex::new(16);
        register(&index, 1, ground(0, 0));
        register(&index, 1, ground(0, 0));
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn networks_in_and_near() {
        let index = SpatialIndex::new(16);
        register(&index, 1, ground(0, 0));
        register(&index, 2, ground(20, 0));
        register(&index, 3, ground(100, 0));

        let origin = ground(0, 0).region(16);
        assert_eq!(index.networks_in(origin), vec![NetworkId(1)]);

        let mut near: Vec<_> = index.networks_near(origin, 1).into_iter().map(|(id, _)| id).collect();
        near.sort();
        assert_eq!(near, vec![NetworkId(1), NetworkId(2)]);
    }

    #[test]
    fn concurrent_readers() {
        let index = std::sync::Arc::new(SpatialIndex::new(16));
        for i in 0..64 {
            register(&index, i, ground(i as i32 * 20, 0));
        }

        let handles: Vec<_> = (0..4)
            .map(|t| {
                let index = index.clone();
                std::thread::spawn(move || {
                    (0..64)
                        .filter(|i| (i + t) % 2 == 0)
                        .filter(|i| index.find_nearest(ground(*i as i32 * 20 + 3, 0), 6).is_some())
                        .count()
                })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap(), 32);
        }
    }
}
