//! Network lifecycle orchestration.
//!
//! [`NetworkManager`] is the only place device membership changes. It
//! owns the network table and both indices, reacts to device placement and
//! removal, reconciles orphaned devices when regions become active, and
//! restores networks from storage.
//!
//! Structural methods take `&mut self`, so whoever owns the manager is the
//! single structural context. Background energy updates go through a
//! [`GridTicker`] obtained from [`NetworkManager::ticker`].
//!
//! Locking rules: a network lock is never held while calling into either
//! index, and at most one network lock is held at a time.

use std::collections::BTreeMap;
use std::sync::Arc;

use energynet_core::{
    BlockPos, DeviceRole, EnergyNetwork, EnergyTransaction, GridConfig, MetadataStore,
    NetworkId, NetworkMetadata, PersistRequest, PersistSender, RegionKey, SharedNetwork, WorldId,
};
use serde::{Deserialize, Serialize};

use crate::state::GridState;
use crate::ticker::GridTicker;
use crate::validator::ConnectivityValidator;

// ---------------------------------------------------------------------------
// Records and reports
// ---------------------------------------------------------------------------

/// A device known to exist in the world, as reported by the host on load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceRecord {
    pub pos: BlockPos,
    pub role: DeviceRole,
}

impl DeviceRecord {
    pub fn new(pos: BlockPos, role: DeviceRole) -> Self {
        Self { pos, role }
    }
}

/// Result of [`NetworkManager::place_device`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// A hub was placed and a new network created.
    Created(NetworkId),
    /// The device joined an existing network.
    Joined(NetworkId),
    /// No network in range; the device is tracked as an orphan.
    Orphaned,
    /// Something is already registered at this position.
    AlreadyPlaced,
}

impl Placement {
    pub fn network(&self) -> Option<NetworkId> {
        match self {
            Placement::Created(id) | Placement::Joined(id) => Some(*id),
            Placement::Orphaned | Placement::AlreadyPlaced => None,
        }
    }
}

/// Result of [`NetworkManager::remove_device`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Removal {
    /// Network the device belonged to, if any.
    pub network: Option<NetworkId>,
    /// Role of the removed device, if it was known.
    pub role: Option<DeviceRole>,
    /// The device was a hub and its network was destroyed.
    pub destroyed: bool,
    /// Devices released by the removal that found another network.
    pub rehomed: Vec<BlockPos>,
    /// Devices released by the removal that are now orphans.
    pub orphaned: Vec<BlockPos>,
}

/// Outcome of offering released devices to other networks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Rehoming {
    rehomed: Vec<BlockPos>,
    orphaned: Vec<BlockPos>,
}

/// Result of [`NetworkManager::load`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadReport {
    /// Networks created from hub records.
    pub networks: usize,
    /// Non-hub devices connected to a network.
    pub connected: usize,
    /// Non-hub devices left as orphans.
    pub orphaned: usize,
    /// Networks whose energy was restored from storage.
    pub restored: usize,
    /// Stored records rejected as corrupt or invalid.
    pub discarded: usize,
    /// Reconciliation passes used for the batch.
    pub passes: u32,
}

/// Aggregate counters across the whole grid.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GridStats {
    pub networks: usize,
    /// Indexed devices, hubs included.
    pub devices: usize,
    pub orphans: usize,
    pub stored: u64,
    pub capacity: u64,
}

// ---------------------------------------------------------------------------
// NetworkManager
// ---------------------------------------------------------------------------

/// Owns every network and keeps the indices in lockstep with membership.
#[derive(Debug)]
pub struct NetworkManager {
    config: GridConfig,
    state: Arc<GridState>,
    orphans: BTreeMap<BlockPos, DeviceRole>,
    next_id: u64,
    persist: Option<PersistSender>,
}

impl NetworkManager {
    /// Create a manager. Networks it creates forward significant energy
    /// changes to `persist`; pass `None` to run without persistence.
    pub fn new(config: GridConfig, persist: Option<PersistSender>) -> Self {
        let state = Arc::new(GridState::new(config.cell_size));
        Self {
            config,
            state,
            orphans: BTreeMap::new(),
            next_id: 0,
            persist,
        }
    }

    pub fn config(&self) -> &GridConfig {
        &self.config
    }

    /// A handle for the background energy worker.
    pub fn ticker(&self) -> GridTicker {
        GridTicker::new(self.state.clone())
    }

    // -- Queries --

    pub fn network(&self, id: NetworkId) -> Option<SharedNetwork> {
        self.state.network(id)
    }

    /// Network owning the device (or hub) at `pos`.
    pub fn network_at(&self, pos: BlockPos) -> Option<NetworkId> {
        self.state.devices.get(pos)
    }

    pub fn network_ids(&self) -> Vec<NetworkId> {
        self.state.networks.read().keys().copied().collect()
    }

    pub fn network_count(&self) -> usize {
        self.state.networks.read().len()
    }

    /// Indexed devices, hubs included.
    pub fn device_count(&self) -> usize {
        self.state.devices.len()
    }

    pub fn orphans(&self) -> impl Iterator<Item = (BlockPos, DeviceRole)> + '_ {
        self.orphans.iter().map(|(p, r)| (*p, *r))
    }

    pub fn orphan_count(&self) -> usize {
        self.orphans.len()
    }

    pub fn is_orphan(&self, pos: BlockPos) -> bool {
        self.orphans.contains_key(&pos)
    }

    /// The nearest network a device with `range` at `pos` could join.
    pub fn find_nearest(&self, pos: BlockPos, range: u32) -> Option<NetworkId> {
        self.state.spatial.find_nearest(pos, range).map(|n| n.id)
    }

    pub fn stats(&self) -> GridStats {
        let mut stats = GridStats {
            networks: 0,
            devices: self.state.devices.len(),
            orphans: self.orphans.len(),
            stored: 0,
            capacity: 0,
        };
        for (_, net) in self.state.snapshot() {
            let net = net.lock();
            stats.networks += 1;
            stats.stored = stats.stored.saturating_add(net.stored());
            stats.capacity = stats.capacity.saturating_add(net.capacity());
        }
        stats
    }

    /// Start a two-phase withdrawal from a network.
    pub fn begin_transaction(&self, id: NetworkId) -> Option<EnergyTransaction> {
        self.network(id).map(EnergyTransaction::new)
    }

    // -- Device lifecycle --

    /// React to a device being placed in the world.
    pub fn place_device(&mut self, role: DeviceRole, pos: BlockPos) -> Placement {
        if self.state.devices.contains(pos) || self.orphans.contains_key(&pos) {
            return Placement::AlreadyPlaced;
        }

        if role == DeviceRole::Hub {
            let id = self.create_network(pos);
            self.steal_devices(id, pos);
            self.reconcile_around(pos.region(self.config.cell_size));
            tracing::info!(network = %id, ?pos, "network created");
            return Placement::Created(id);
        }

        match self.attach(pos, role) {
            Some(id) => {
                if role.is_connector() {
                    self.reconcile_around(pos.region(self.config.cell_size));
                }
                Placement::Joined(id)
            }
            None => {
                tracing::debug!(?pos, ?role, "no network in range, device orphaned");
                self.orphans.insert(pos, role);
                Placement::Orphaned
            }
        }
    }

    /// React to a device being removed from the world. Unknown positions
    /// are a no-op.
    pub fn remove_device(&mut self, pos: BlockPos) -> Removal {
        if let Some(role) = self.orphans.remove(&pos) {
            return Removal {
                role: Some(role),
                ..Removal::default()
            };
        }

        let Some(id) = self.state.devices.get(pos) else {
            return Removal::default();
        };
        let Some(net) = self.state.network(id) else {
            // Index entry outlived its network.
            self.state.devices.remove(pos);
            return Removal::default();
        };

        let role = net.lock().role_of(pos);
        match role {
            None => {
                self.state.devices.remove_if_owned(pos, id);
                Removal::default()
            }
            Some(DeviceRole::Hub) => {
                let rehoming = self.destroy_network(id);
                Removal {
                    network: Some(id),
                    role,
                    destroyed: true,
                    rehomed: rehoming.rehomed,
                    orphaned: rehoming.orphaned,
                }
            }
            Some(member) => {
                net.lock().disconnect(member, pos);
                self.state.devices.remove_if_owned(pos, id);
                let rehoming = if member.is_connector() {
                    let pruned = ConnectivityValidator::new(&self.config).prune(&mut net.lock());
                    self.rehome(id, pruned)
                } else {
                    Rehoming::default()
                };
                Removal {
                    network: Some(id),
                    role,
                    destroyed: false,
                    rehomed: rehoming.rehomed,
                    orphaned: rehoming.orphaned,
                }
            }
        }
    }

    /// Re-run connectivity validation for a network and re-home whatever
    /// it prunes. Returns the pruned positions.
    pub fn revalidate(&mut self, id: NetworkId) -> Vec<BlockPos> {
        let Some(net) = self.state.network(id) else {
            return Vec::new();
        };
        let pruned = ConnectivityValidator::new(&self.config).prune(&mut net.lock());
        let positions = pruned.iter().map(|(p, _)| *p).collect();
        self.rehome(id, pruned);
        positions
    }

    /// A region became active: retry every orphan in it or its neighbours.
    /// Returns how many orphans were connected.
    pub fn on_region_activated(&mut self, region: RegionKey) -> usize {
        let connected = self.reconcile_around(region);
        if connected > 0 {
            tracing::info!(?region, connected, "reconnected orphans in activated region");
        }
        connected
    }

    /// Drop every network and orphan in `world` from memory, e.g. when the
    /// world is torn down. Dirty networks are flushed first; stored records
    /// are kept. Returns the number of networks unloaded.
    pub fn unload_world(&mut self, world: WorldId) -> usize {
        let doomed: Vec<(NetworkId, SharedNetwork)> = self
            .state
            .snapshot()
            .into_iter()
            .filter(|(_, net)| net.lock().hub().world == world)
            .collect();

        for (id, net) in &doomed {
            let (hub, positions) = {
                let mut net = net.lock();
                if net.is_dirty() {
                    net.force_persist();
                }
                net.detach_persist();
                (net.hub(), net.members().map(|(p, _)| p).collect::<Vec<_>>())
            };
            self.state.networks.write().remove(id);
            self.state.spatial.unregister(*id, hub);
            self.state.devices.remove(hub);
            self.state.devices.remove_all(positions);
        }
        self.orphans.retain(|pos, _| pos.world != world);

        if !doomed.is_empty() {
            tracing::info!(?world, networks = doomed.len(), "world unloaded");
        }
        doomed.len()
    }

    // -- Persistence --

    /// Load a batch of devices and restore network energy from `store`.
    ///
    /// Hubs are created first, then every other device is connected with
    /// multi-pass reconciliation, and only then is stored energy restored,
    /// so storage module capacity is in place before the clamp. Corrupt
    /// records are logged and discarded; the network keeps zero energy.
    pub fn load(
        &mut self,
        records: impl IntoIterator<Item = DeviceRecord>,
        store: &dyn MetadataStore,
    ) -> LoadReport {
        let mut report = LoadReport::default();
        let mut created = Vec::new();
        let mut members = Vec::new();

        for record in records {
            if self.state.devices.contains(record.pos) || self.orphans.contains_key(&record.pos) {
                continue;
            }
            if record.role == DeviceRole::Hub {
                created.push(self.create_network(record.pos));
            } else {
                members.push((record.pos, record.role));
            }
        }
        report.networks = created.len();

        let total = members.len();
        let (leftover, passes) = self.reconnect(members);
        report.passes = passes;
        report.connected = total - leftover.len();
        report.orphaned = leftover.len();
        for (pos, role) in leftover {
            self.orphans.insert(pos, role);
        }

        for id in created {
            match self.restore_energy(id, store) {
                Some(true) => report.restored += 1,
                Some(false) => report.discarded += 1,
                None => {}
            }
        }

        tracing::info!(
            networks = report.networks,
            connected = report.connected,
            orphaned = report.orphaned,
            restored = report.restored,
            discarded = report.discarded,
            passes = report.passes,
            "grid loaded"
        );
        report
    }

    /// Queue a save for every network with unforwarded changes, ignoring
    /// the compression threshold. Call on shutdown. Returns the number of
    /// requests queued.
    pub fn persist_all(&self) -> usize {
        self.state
            .snapshot()
            .into_iter()
            .filter(|(_, net)| {
                let mut net = net.lock();
                net.is_dirty() && net.force_persist()
            })
            .count()
    }

    /// Restore one network's energy. `None` when nothing is stored,
    /// `Some(true)` on success, `Some(false)` when the record was rejected.
    fn restore_energy(&self, id: NetworkId, store: &dyn MetadataStore) -> Option<bool> {
        let net = self.state.network(id)?;
        let hub = net.lock().hub();
        let json = store.load(hub)?;
        match NetworkMetadata::from_json(&json) {
            Ok(metadata) => {
                net.lock().restore_energy(&metadata);
                Some(true)
            }
            Err(err) => {
                tracing::warn!(network = %id, ?hub, error = %err, "discarding invalid network metadata");
                Some(false)
            }
        }
    }

    // -- Internals --

    fn create_network(&mut self, hub: BlockPos) -> NetworkId {
        let id = NetworkId(self.next_id);
        self.next_id += 1;
        let net = EnergyNetwork::new(id, hub, &self.config, self.persist.clone()).into_shared();
        self.state.networks.write().insert(id, net.clone());
        self.state.spatial.register(id, hub, net);
        self.state.devices.insert(hub, id);
        id
    }

    /// Destroy a network and offer its devices to whatever else is in range.
    fn destroy_network(&mut self, id: NetworkId) -> Rehoming {
        let Some(net) = self.state.networks.write().remove(&id) else {
            return Rehoming::default();
        };
        let (hub, members) = {
            let mut net = net.lock();
            net.detach_persist();
            (net.hub(), net.members().collect::<Vec<_>>())
        };
        self.state.spatial.unregister(id, hub);
        self.state.devices.remove(hub);
        if let Some(persist) = &self.persist {
            persist.send(PersistRequest::Forget { hub });
        }
        tracing::info!(network = %id, ?hub, released = members.len(), "network destroyed");
        self.rehome(id, members)
    }

    /// Reassign devices of other networks that are within range of a newly
    /// placed hub, then re-validate every network that lost a connector.
    fn steal_devices(&mut self, id: NetworkId, hub: BlockPos) {
        let Some(thief) = self.state.network(id) else {
            return;
        };
        let cells_out = self.config.max_range().div_ceil(self.config.cell_size);
        let radius = i32::try_from(cells_out).unwrap_or(i32::MAX).saturating_add(2);
        let nearby = self
            .state
            .spatial
            .networks_near(hub.region(self.config.cell_size), radius);

        for (victim_id, victim) in nearby {
            if victim_id == id {
                continue;
            }
            let stolen: Vec<(BlockPos, DeviceRole)> = {
                let mut victim = victim.lock();
                let stolen: Vec<_> = victim
                    .members()
                    .filter(|(pos, role)| hub.within_range(pos, role.range(&self.config)))
                    .collect();
                for (pos, role) in &stolen {
                    victim.disconnect(*role, *pos);
                }
                stolen
            };
            if stolen.is_empty() {
                continue;
            }

            {
                let mut thief = thief.lock();
                for (pos, role) in &stolen {
                    thief.connect(*role, *pos);
                }
            }
            self.state
                .devices
                .insert_all(stolen.iter().map(|(p, _)| *p), id);
            tracing::debug!(network = %id, victim = %victim_id, stolen = stolen.len(), "reassigned devices to new hub");

            if stolen.iter().any(|(_, role)| role.is_connector()) {
                let pruned = ConnectivityValidator::new(&self.config).prune(&mut victim.lock());
                self.rehome(victim_id, pruned);
            }
        }
    }

    /// Connect a device to the nearest network in its range and index it.
    fn attach(&self, pos: BlockPos, role: DeviceRole) -> Option<NetworkId> {
        let nearest = self.state.spatial.find_nearest(pos, role.range(&self.config))?;
        nearest.network.lock().connect(role, pos);
        self.state.devices.insert(pos, nearest.id);
        Some(nearest.id)
    }

    /// Multi-pass reconnection: retry the batch until a pass connects
    /// nothing or the pass cap is hit. Returns the unresolved devices and
    /// the number of passes used.
    fn reconnect(&self, mut pending: Vec<(BlockPos, DeviceRole)>) -> (Vec<(BlockPos, DeviceRole)>, u32) {
        let mut passes = 0;
        while !pending.is_empty() {
            if passes >= self.config.max_reconcile_passes {
                tracing::warn!(
                    unresolved = pending.len(),
                    passes,
                    "reconciliation pass cap reached"
                );
                break;
            }
            passes += 1;
            let before = pending.len();
            pending.retain(|(pos, role)| self.attach(*pos, *role).is_none());
            if pending.len() == before {
                break;
            }
        }
        (pending, passes)
    }

    /// Unindex devices released by `from` and offer them to other networks.
    fn rehome(&mut self, from: NetworkId, released: Vec<(BlockPos, DeviceRole)>) -> Rehoming {
        if released.is_empty() {
            return Rehoming::default();
        }
        for (pos, _) in &released {
            self.state.devices.remove_if_owned(*pos, from);
        }

        let positions: Vec<BlockPos> = released.iter().map(|(p, _)| *p).collect();
        let (leftover, _) = self.reconnect(released);
        let mut rehoming = Rehoming::default();
        for pos in positions {
            if self.state.devices.contains(pos) {
                rehoming.rehomed.push(pos);
            }
        }
        for (pos, role) in leftover {
            self.orphans.insert(pos, role);
            rehoming.orphaned.push(pos);
        }
        if !rehoming.orphaned.is_empty() {
            tracing::debug!(network = %from, orphaned = rehoming.orphaned.len(), "devices left without a network");
        }
        rehoming
    }

    /// Retry orphans in `region` and its eight neighbours.
    fn reconcile_around(&mut self, region: RegionKey) -> usize {
        let cell_size = self.config.cell_size;
        let candidates: Vec<(BlockPos, DeviceRole)> = self
            .orphans
            .iter()
            .filter(|(pos, _)| pos.region(cell_size).is_adjacent_or_same(&region))
            .map(|(p, r)| (*p, *r))
            .collect();
        if candidates.is_empty() {
            return 0;
        }
        for (pos, _) in &candidates {
            self.orphans.remove(pos);
        }

        let total = candidates.len();
        let (leftover, _) = self.reconnect(candidates);
        let connected = total - leftover.len();
        for (pos, role) in leftover {
            self.orphans.insert(pos, role);
        }
        connected
    }
}

// ===========================================================================
// Tests
// ===========================================================================
