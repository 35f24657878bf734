//! Reachability check for a single network.
//!
//! There are no stored edges. Two positions are linked when the second is
//! within its own role's range of the first, which is the same rule used
//! when a device is first attached. Validation walks this implicit graph
//! breadth-first from the hub and prunes whatever it cannot reach.

use std::collections::VecDeque;

use energynet_core::{BlockPos, DeviceRole, EnergyNetwork, GridConfig};

/// Finds and removes devices that can no longer reach their hub.
#[derive(Debug, Clone, Copy)]
pub struct ConnectivityValidator<'a> {
    config: &'a GridConfig,
}

impl<'a> ConnectivityValidator<'a> {
    pub fn new(config: &'a GridConfig) -> Self {
        Self { config }
    }

    /// Devices of `network` not transitively reachable from its hub.
    ///
    /// Connectors are reached through the hub and other reached connectors.
    /// Leaves are kept if any reached connection point is within their range.
    /// O(V²) in the number of connectors.
    pub fn unreachable(&self, network: &EnergyNetwork) -> Vec<(BlockPos, DeviceRole)> {
        let connectors: Vec<(BlockPos, DeviceRole)> = network.connectors().collect();
        let mut visited = vec![false; connectors.len()];
        let mut remaining = connectors.len();
        let mut reached = vec![network.hub()];
        let mut queue = VecDeque::from([network.hub()]);

        while remaining > 0 {
            let Some(current) = queue.pop_front() else {
                break;
            };
            for (i, (pos, role)) in connectors.iter().enumerate() {
                if visited[i] || !current.within_range(pos, role.range(self.config)) {
                    continue;
                }
                visited[i] = true;
                remaining -= 1;
                reached.push(*pos);
                queue.push_back(*pos);
            }
        }

        let mut lost: Vec<(BlockPos, DeviceRole)> = connectors
            .iter()
            .zip(&visited)
            .filter(|(_, seen)| !**seen)
            .map(|(entry, _)| *entry)
            .collect();

        for role in [DeviceRole::Generator, DeviceRole::Consumer] {
            let range = role.range(self.config);
            for pos in network.devices(role) {
                if !reached.iter().any(|point| point.within_range(pos, range)) {
                    lost.push((*pos, role));
                }
            }
        }
        lost
    }

    /// Remove unreachable devices from `network` and return them so the
    /// caller can clean up the device index.
    pub fn prune(&self, network: &mut EnergyNetwork) -> Vec<(BlockPos, DeviceRole)> {
        let lost = self.unreachable(network);
        for (pos, role) in &lost {
            network.disconnect(*role, *pos);
        }
        if !lost.is_empty() {
            tracing::debug!(network = %network.id(), pruned = lost.len(), "pruned unreachable devices");
        }
        lost
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use energynet_core::NetworkId;
    use energynet_core::test_utils::*;

    fn network_at(hub: BlockPos) -> EnergyNetwork {
        EnergyNetwork::new(NetworkId(1), hub, &GridConfig::default(), None)
    }

    #[test]
    fn intact_chain_is_kept() {
        let config = GridConfig::default();
        let mut net = network_at(ground(0, 0));
        for p in chain_along_x(ground(0, 0), 5, 4) {
            net.connect(DeviceRole::Extender, p);
        }
        assert!(ConnectivityValidator::new(&config).prune(&mut net).is_empty());
        assert_eq!(net.extenders().len(), 4);
    }

    #[test]
    fn removing_bridge_orphans_downstream() {
        let config = GridConfig::default();
        let mut net = network_at(ground(0, 0));
        let a = ground(5, 0);
        let b = ground(10, 0);
        net.connect(DeviceRole::Extender, a);
        net.connect(DeviceRole::Extender, b);

        net.disconnect(DeviceRole::Extender, a);
        let pruned = ConnectivityValidator::new(&config).prune(&mut net);

        assert_eq!(pruned, vec![(b, DeviceRole::Extender)]);
        assert!(net.extenders().is_empty());
    }

    #[test]
    fn storage_module_uses_its_own_range() {
        let config = GridConfig::default();
        let mut net = network_at(ground(0, 0));
        // 7 away: only a storage module reaches that far.
        net.connect(DeviceRole::StorageModule, ground(7, 0));
        net.connect(DeviceRole::Extender, ground(0, 7));

        let pruned = ConnectivityValidator::new(&config).prune(&mut net);
        assert_eq!(pruned, vec![(ground(0, 7), DeviceRole::Extender)]);
        assert_eq!(net.storage_modules().len(), 1);
    }

    #[test]
    fn stranded_leaves_are_pruned() {
        let config = GridConfig::default();
        let mut net = network_at(ground(0, 0));
        let a = ground(5, 0);
        net.connect(DeviceRole::Extender, a);
        net.connect(DeviceRole::Generator, ground(10, 0));
        net.connect(DeviceRole::Consumer, ground(0, 3));

        net.disconnect(DeviceRole::Extender, a);
        let pruned = ConnectivityValidator::new(&config).prune(&mut net);

        assert_eq!(pruned, vec![(ground(10, 0), DeviceRole::Generator)]);
        assert_eq!(net.consumers().len(), 1);
    }

    #[test]
    fn lost_storage_module_reduces_capacity() {
        let config = GridConfig::default();
        let mut net = network_at(ground(0, 0));
        net.connect(DeviceRole::Extender, ground(5, 0));
        net.connect(DeviceRole::StorageModule, ground(11, 0));
        assert_eq!(net.capacity(), config.base_capacity + config.storage_bonus);

        net.disconnect(DeviceRole::Extender, ground(5, 0));
        ConnectivityValidator::new(&config).prune(&mut net);
        assert_eq!(net.capacity(), config.base_capacity);
    }

    #[test]
    fn branching_network_only_loses_cut_branch() {
        let config = GridConfig::default();
        let mut net = network_at(ground(0, 0));
        let east = chain_along_x(ground(0, 0), 5, 3);
        let west = chain_along_x(ground(0, 0), -5, 3);
        for p in east.iter().chain(&west) {
            net.connect(DeviceRole::Extender, *p);
        }

        net.disconnect(DeviceRole::Extender, east[0]);
        let mut pruned: Vec<_> = ConnectivityValidator::new(&config)
            .prune(&mut net)
            .into_iter()
            .map(|(p, _)| p)
            .collect();
        pruned.sort();

        assert_eq!(pruned, vec![east[1], east[2]]);
        assert_eq!(net.extenders().len(), 3);
    }
}
