//! Spatial indices for energy networks.
//!
//! - [`SpatialIndex`] buckets networks by the region cell their hub sits in
//!   and answers "which network can this position connect to?" by scanning
//!   only nearby cells.
//! - [`DeviceLocationIndex`] maps each connected device position back to
//!   its owning network.
//!
//! Both are explicit objects owned by the network manager (never globals).
//! Each wraps its map in a `parking_lot::RwLock`: lookups from any number
//! of threads run concurrently, inserts and removals are serialized.
//!
//! # Lock ordering
//!
//! [`SpatialIndex::find_nearest`] locks candidate networks while holding
//! its read lock. Callers must therefore never touch either index while
//! holding a network lock.

mod device_index;
mod spatial_index;

pub use device_index::DeviceLocationIndex;
pub use spatial_index::{Nearest, SpatialIndex};
