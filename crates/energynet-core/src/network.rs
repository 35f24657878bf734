//! The per-network entity: energy counters and connected device sets.
//!
//! # Invariants
//!
//! - `0 <= stored <= capacity` after every public call.
//! - `capacity == base_capacity + storage_modules.len() * storage_bonus`.
//! - The hub position never appears in any member set.
//!
//! Energy changes that pass the persistence threshold are forwarded to the
//! [`PersistSender`] the network was built with. Networks built without one
//! (tests, read-only tools) simply never forward.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::config::GridConfig;
use crate::device::DeviceRole;
use crate::id::NetworkId;
use crate::metadata::NetworkMetadata;
use crate::persist::{PersistRequest, PersistSender, passes_threshold};
use crate::position::BlockPos;

/// A network behind its own lock. One mutator per network at a time;
/// different networks can be advanced in parallel.
pub type SharedNetwork = Arc<Mutex<EnergyNetwork>>;

/// How often the consumption rate estimate is recomputed.
const RATE_WINDOW: Duration = Duration::from_secs(1);
/// Idle time after which the consumption rate drops to zero.
const RATE_IDLE_RESET: Duration = Duration::from_secs(2);

// ---------------------------------------------------------------------------
// Consumption rate
// ---------------------------------------------------------------------------

/// Rolling estimate of energy drawn per second. Advisory only.
#[derive(Debug, Clone, Default)]
struct ConsumptionTracker {
    window_start: Option<Instant>,
    window_removed: u64,
    last_removal: Option<Instant>,
    rate: f64,
}

impl ConsumptionTracker {
    fn record(&mut self, amount: u64, now: Instant) {
        let idle = self
            .last_removal
            .is_none_or(|last| now.saturating_duration_since(last) >= RATE_IDLE_RESET);
        if idle {
            self.window_start = Some(now);
            self.window_removed = 0;
            self.rate = 0.0;
        }
        self.window_removed = self.window_removed.saturating_add(amount);
        self.last_removal = Some(now);

        let start = *self.window_start.get_or_insert(now);
        let elapsed = now.saturating_duration_since(start);
        if elapsed >= RATE_WINDOW {
            self.rate = self.window_removed as f64 / elapsed.as_secs_f64();
            self.window_start = Some(now);
            self.window_removed = 0;
        }
    }

    fn rate_at(&self, now: Instant) -> f64 {
        match self.last_removal {
            Some(last) if now.saturating_duration_since(last) < RATE_IDLE_RESET => self.rate,
            _ => 0.0,
        }
    }
}

// ---------------------------------------------------------------------------
// EnergyNetwork
// ---------------------------------------------------------------------------

/// One hub plus every device transitively connected to it.
#[derive(Debug)]
pub struct EnergyNetwork {
    id: NetworkId,
    hub: BlockPos,
    base_capacity: u64,
    storage_bonus: u64,
    persist_threshold: f64,
    stored: u64,
    capacity: u64,
    extenders: BTreeSet<BlockPos>,
    storage_modules: BTreeSet<BlockPos>,
    generators: BTreeSet<BlockPos>,
    consumers: BTreeSet<BlockPos>,
    consumption: ConsumptionTracker,
    last_persisted: u64,
    dirty: bool,
    wasted: u64,
    persist: Option<PersistSender>,
}

impl EnergyNetwork {
    /// Create an empty network anchored at `hub`.
    pub fn new(
        id: NetworkId,
        hub: BlockPos,
        config: &GridConfig,
        persist: Option<PersistSender>,
    ) -> Self {
        Self {
            id,
            hub,
            base_capacity: config.base_capacity,
            storage_bonus: config.storage_bonus,
            persist_threshold: config.persist_threshold,
            stored: 0,
            capacity: config.base_capacity,
            extenders: BTreeSet::new(),
            storage_modules: BTreeSet::new(),
            generators: BTreeSet::new(),
            consumers: BTreeSet::new(),
            consumption: ConsumptionTracker::default(),
            last_persisted: 0,
            dirty: false,
            wasted: 0,
            persist,
        }
    }

    /// Wrap in a [`SharedNetwork`].
    pub fn into_shared(self) -> SharedNetwork {
        Arc::new(Mutex::new(self))
    }

    // -- Identity --

    pub fn id(&self) -> NetworkId {
        self.id
    }

    pub fn hub(&self) -> BlockPos {
        self.hub
    }

    // -- Energy --

    pub fn stored(&self) -> u64 {
        self.stored
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    pub fn base_capacity(&self) -> u64 {
        self.base_capacity
    }

    pub fn free_capacity(&self) -> u64 {
        self.capacity - self.stored
    }

    /// Total energy offered to this network that did not fit.
    pub fn wasted(&self) -> u64 {
        self.wasted
    }

    /// Stored value at the last forwarded persistence request.
    pub fn last_persisted(&self) -> u64 {
        self.last_persisted
    }

    /// Whether energy changed since the last forwarded request.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Add up to `amount` Joules. Returns what was actually stored; the
    /// remainder is counted as wasted.
    pub fn add_energy(&mut self, amount: u64) -> u64 {
        let added = amount.min(self.free_capacity());
        self.wasted = self.wasted.saturating_add(amount - added);
        if added > 0 {
            self.stored += added;
            self.energy_changed();
        }
        added
    }

    /// Remove up to `amount` Joules. Returns what was actually removed.
    pub fn remove_energy(&mut self, amount: u64) -> u64 {
        self.remove_energy_at(amount, Instant::now())
    }

    /// [`remove_energy`](Self::remove_energy) with an explicit clock reading
    /// for the consumption-rate estimate.
    pub fn remove_energy_at(&mut self, amount: u64, now: Instant) -> u64 {
        let removed = amount.min(self.stored);
        if removed > 0 {
            self.stored -= removed;
            self.consumption.record(removed, now);
            self.energy_changed();
        }
        removed
    }

    /// Joules drawn per second, averaged over the last window.
    pub fn consumption_rate(&self) -> f64 {
        self.consumption_rate_at(Instant::now())
    }

    pub fn consumption_rate_at(&self, now: Instant) -> f64 {
        self.consumption.rate_at(now)
    }

    // -- Devices --

    /// Connect a non-hub device. Idempotent; returns `true` if newly added.
    ///
    /// A storage module raises capacity and marks the network dirty but is
    /// not forwarded on its own: a stored record's capacity may lag until
    /// the next forwarded energy change, and restore clamps against the
    /// live capacity anyway.
    pub fn connect(&mut self, role: DeviceRole, pos: BlockPos) -> bool {
        if pos == self.hub {
            return false;
        }
        let added = match self.set_mut(role) {
            Some(set) => set.insert(pos),
            None => return false,
        };
        if added && role == DeviceRole::StorageModule {
            self.capacity = self.capacity.saturating_add(self.storage_bonus);
            self.dirty = true;
        }
        added
    }

    /// Disconnect a non-hub device. Idempotent; returns `true` if it was
    /// connected. Losing a storage module clamps stored energy to the new
    /// capacity.
    pub fn disconnect(&mut self, role: DeviceRole, pos: BlockPos) -> bool {
        let removed = match self.set_mut(role) {
            Some(set) => set.remove(&pos),
            None => return false,
        };
        if removed && role == DeviceRole::StorageModule {
            self.capacity = self
                .capacity
                .saturating_sub(self.storage_bonus)
                .max(self.base_capacity);
            self.dirty = true;
            if self.stored > self.capacity {
                let lost = self.stored - self.capacity;
                self.stored = self.capacity;
                self.wasted = self.wasted.saturating_add(lost);
                tracing::debug!(network = %self.id, lost, "storage module removed, energy clamped");
                self.energy_changed();
            }
        }
        removed
    }

    /// Disconnect whatever device sits at `pos`, returning its role.
    pub fn remove_device(&mut self, pos: BlockPos) -> Option<DeviceRole> {
        let role = self.role_of(pos)?;
        if role == DeviceRole::Hub {
            return None;
        }
        self.disconnect(role, pos);
        Some(role)
    }

    /// Role of the device at `pos`, if it belongs to this network.
    pub fn role_of(&self, pos: BlockPos) -> Option<DeviceRole> {
        if pos == self.hub {
            return Some(DeviceRole::Hub);
        }
        DeviceRole::MEMBERS
            .into_iter()
            .find(|role| self.devices(*role).contains(&pos))
    }

    pub fn contains(&self, pos: BlockPos) -> bool {
        self.role_of(pos).is_some()
    }

    /// Connected positions for a role. Empty for [`DeviceRole::Hub`].
    pub fn devices(&self, role: DeviceRole) -> &BTreeSet<BlockPos> {
        static EMPTY: BTreeSet<BlockPos> = BTreeSet::new();
        match role {
            DeviceRole::Hub => &EMPTY,
            DeviceRole::Extender => &self.extenders,
            DeviceRole::StorageModule => &self.storage_modules,
            DeviceRole::Generator => &self.generators,
            DeviceRole::Consumer => &self.consumers,
        }
    }

    pub fn extenders(&self) -> &BTreeSet<BlockPos> {
        &self.extenders
    }

    pub fn storage_modules(&self) -> &BTreeSet<BlockPos> {
        &self.storage_modules
    }

    pub fn generators(&self) -> &BTreeSet<BlockPos> {
        &self.generators
    }

    pub fn consumers(&self) -> &BTreeSet<BlockPos> {
        &self.consumers
    }

    /// Connector-like members (extenders and storage modules) with their roles.
    pub fn connectors(&self) -> impl Iterator<Item = (BlockPos, DeviceRole)> + '_ {
        self.extenders
            .iter()
            .map(|p| (*p, DeviceRole::Extender))
            .chain(
                self.storage_modules
                    .iter()
                    .map(|p| (*p, DeviceRole::StorageModule)),
            )
    }

    /// Positions other devices can connect to: the hub and every connector.
    pub fn connection_points(&self) -> impl Iterator<Item = BlockPos> + '_ {
        std::iter::once(self.hub).chain(self.connectors().map(|(p, _)| p))
    }

    /// Every non-hub member with its role.
    pub fn members(&self) -> impl Iterator<Item = (BlockPos, DeviceRole)> + '_ {
        DeviceRole::MEMBERS
            .into_iter()
            .flat_map(move |role| self.devices(role).iter().map(move |p| (*p, role)))
    }

    /// Number of non-hub members.
    pub fn member_count(&self) -> usize {
        self.extenders.len() + self.storage_modules.len() + self.generators.len() + self.consumers.len()
    }

    // -- Persistence --

    /// The persisted projection of this network.
    pub fn metadata(&self) -> NetworkMetadata {
        NetworkMetadata::new(self.stored, self.capacity)
    }

    /// Load energy from a validated metadata record.
    ///
    /// This is the restore path: counters are written directly and nothing
    /// is forwarded for persistence, since the value just came from
    /// storage. Energy above the current capacity is clamped. Returns the
    /// restored amount.
    pub fn restore_energy(&mut self, metadata: &NetworkMetadata) -> u64 {
        debug_assert!(metadata.is_valid(), "restore from unvalidated metadata");
        let wanted = metadata.stored_joules();
        let restored = wanted.min(self.capacity);
        if restored < wanted {
            tracing::warn!(
                network = %self.id,
                wanted,
                capacity = self.capacity,
                "restored energy exceeds current capacity, clamping"
            );
        }
        self.stored = restored;
        self.last_persisted = restored;
        self.dirty = false;
        restored
    }

    /// Forward the current state regardless of the threshold. Returns
    /// whether a request was queued.
    pub fn force_persist(&mut self) -> bool {
        let Some(persist) = &self.persist else {
            return false;
        };
        let sent = persist.send(PersistRequest::Save {
            hub: self.hub,
            metadata: self.metadata(),
        });
        if sent {
            self.last_persisted = self.stored;
            self.dirty = false;
        }
        sent
    }

    /// Stop forwarding persistence requests. Called when the network is
    /// destroyed or unloaded, so late energy changes from transactions or
    /// an in-flight tick cannot resurrect its record.
    pub fn detach_persist(&mut self) {
        self.persist = None;
    }

    fn energy_changed(&mut self) {
        self.dirty = true;
        if self.persist.is_none() {
            return;
        }
        if passes_threshold(
            self.stored,
            self.last_persisted,
            self.capacity,
            self.persist_threshold,
        ) {
            self.force_persist();
        }
    }

    fn set_mut(&mut self, role: DeviceRole) -> Option<&mut BTreeSet<BlockPos>> {
        match role {
            DeviceRole::Hub => None,
            DeviceRole::Extender => Some(&mut self.extenders),
            DeviceRole::StorageModule => Some(&mut self.storage_modules),
            DeviceRole::Generator => Some(&mut self.generators),
            DeviceRole::Consumer => Some(&mut self.consumers),
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================
