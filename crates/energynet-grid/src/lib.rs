//! Energynet Grid -- orchestration of energy networks in a voxel world.
//!
//! Ties the per-network model from `energynet-core` to the indices from
//! `energynet-spatial`:
//!
//! - [`NetworkManager`] -- creates and destroys networks, connects and
//!   disconnects devices, reassigns devices to newly placed hubs, restores
//!   networks from storage and reconciles orphaned devices.
//! - [`ConnectivityValidator`] -- breadth-first reachability from the hub
//!   over the implicit range graph.
//! - [`GridTicker`] -- energy-only handle for the background worker, driven
//!   by a host-supplied [`EnergyPolicy`].
//!
//! # Typical host loop
//!
//! ```rust,ignore
//! let (persist, queue) = energynet_core::persist_channel();
//! let mut grid = NetworkManager::new(config, Some(persist));
//! grid.load(device_records, &store);
//!
//! let ticker = grid.ticker();
//! std::thread::spawn(move || loop {
//!     ticker.tick(&policy);
//!     std::thread::sleep(TICK);
//! });
//!
//! // Main thread: world events.
//! grid.place_device(DeviceRole::Extender, pos);
//! grid.on_region_activated(region);
//!
//! // Flusher, on its own period.
//! queue.flush(&store);
//! ```

mod manager;
mod state;
mod ticker;
mod validator;

pub use manager::{DeviceRecord, GridStats, LoadReport, NetworkManager, Placement, Removal};
pub use ticker::{EnergyPolicy, FlatPolicy, GridTicker, TickOutcome};
pub use validator::ConnectivityValidator;
