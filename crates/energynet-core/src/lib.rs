//! Energynet Core -- data model for voxel-world energy networks.
//!
//! This crate holds everything that belongs to a single network and is
//! shared by the index and orchestration crates:
//!
//! - [`position::BlockPos`] / [`position::RegionKey`] -- world coordinates
//!   and the region cells used for spatial bucketing.
//! - [`device::DeviceRole`] -- hub, extender, storage module, generator,
//!   consumer, and their connection ranges.
//! - [`network::EnergyNetwork`] -- stored energy, capacity, connected device
//!   sets and threshold-compressed change forwarding.
//! - [`transaction::EnergyTransaction`] -- reserve / commit / rollback.
//! - [`metadata::NetworkMetadata`] -- the versioned JSON record persisted
//!   per network.
//! - [`persist`] -- the queue between live networks and external storage.
//! - [`config::GridConfig`] -- tunables with documented defaults.
//!
//! # Energy units
//!
//! All energy is integer Joules (`u64`). Capacity is the hub's base
//! capacity plus a fixed bonus per connected storage module.

pub mod config;
pub mod device;
pub mod id;
pub mod metadata;
pub mod network;
pub mod persist;
pub mod position;
pub mod transaction;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use config::{ConfigError, GridConfig};
pub use device::DeviceRole;
pub use id::{NetworkId, WorldId};
pub use metadata::{METADATA_VERSION, MetadataError, NetworkMetadata};
pub use network::{EnergyNetwork, SharedNetwork};
pub use persist::{MemoryStore, MetadataStore, PersistQueue, PersistRequest, PersistSender, persist_channel};
pub use position::{BlockPos, RegionKey};
pub use transaction::{EnergyTransaction, TransactionError, TransactionState};
