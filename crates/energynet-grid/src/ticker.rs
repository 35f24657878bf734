//! Background energy advancement.
//!
//! A [`GridTicker`] is handed to the periodic worker. It can read the
//! network table and change stored energy, but has no way to add, remove
//! or move devices; membership changes stay with the [`NetworkManager`]
//! that created it.
//!
//! Each network is advanced under its own lock. With the `parallel` feature
//! enabled networks are advanced concurrently on the rayon pool.
//!
//! [`NetworkManager`]: crate::NetworkManager

use std::sync::Arc;

use energynet_core::{BlockPos, NetworkId, SharedNetwork};
#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::state::GridState;

/// Generation and demand rules supplied by the host.
pub trait EnergyPolicy: Sync {
    /// Joules a generator produces this tick.
    fn generation(&self, network: NetworkId, generator: BlockPos) -> u64;
    /// Joules a consumer wants this tick.
    fn demand(&self, network: NetworkId, consumer: BlockPos) -> u64;
}

/// Flat per-device rates. Handy for tests and simple hosts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlatPolicy {
    pub generation: u64,
    pub demand: u64,
}

impl EnergyPolicy for FlatPolicy {
    fn generation(&self, _network: NetworkId, _generator: BlockPos) -> u64 {
        self.generation
    }

    fn demand(&self, _network: NetworkId, _consumer: BlockPos) -> u64 {
        self.demand
    }
}

/// What one tick did to one network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickOutcome {
    pub network: NetworkId,
    /// Total offered by generators.
    pub generated: u64,
    /// Portion of `generated` that fit.
    pub added: u64,
    /// Total requested by consumers.
    pub demanded: u64,
    /// Portion of `demanded` that was supplied.
    pub removed: u64,
}

impl TickOutcome {
    pub fn wasted(&self) -> u64 {
        self.generated - self.added
    }

    pub fn shortfall(&self) -> u64 {
        self.demanded - self.removed
    }
}

/// Energy-only handle on the grid for the background worker.
#[derive(Debug, Clone)]
pub struct GridTicker {
    state: Arc<GridState>,
}

impl GridTicker {
    pub(crate) fn new(state: Arc<GridState>) -> Self {
        Self { state }
    }

    /// Advance every network by one tick: generation first, then demand.
    pub fn tick<P: EnergyPolicy>(&self, policy: &P) -> Vec<TickOutcome> {
        let networks = self.state.snapshot();

        #[cfg(feature = "parallel")]
        let outcomes: Vec<TickOutcome> = networks
            .par_iter()
            .map(|(id, net)| advance(*id, net, policy))
            .collect();

        #[cfg(not(feature = "parallel"))]
        let outcomes: Vec<TickOutcome> = networks
            .iter()
            .map(|(id, net)| advance(*id, net, policy))
            .collect();

        outcomes
    }

    /// Advance a single network. `None` if it no longer exists.
    pub fn tick_network<P: EnergyPolicy>(&self, id: NetworkId, policy: &P) -> Option<TickOutcome> {
        let net = self.state.network(id)?;
        Some(advance(id, &net, policy))
    }

    /// Number of live networks.
    pub fn network_count(&self) -> usize {
        self.state.networks.read().len()
    }
}

fn advance<P: EnergyPolicy>(id: NetworkId, network: &SharedNetwork, policy: &P) -> TickOutcome {
    let mut net = network.lock();
    let generated = net
        .generators()
        .iter()
        .map(|p| policy.generation(id, *p))
        .fold(0u64, u64::saturating_add);
    let demanded = net
        .consumers()
        .iter()
        .map(|p| policy.demand(id, *p))
        .fold(0u64, u64::saturating_add);

    let added = net.add_energy(generated);
    let removed = net.remove_energy(demanded);

    TickOutcome {
        network: id,
        generated,
        added,
        demanded,
        removed,
    }
}
