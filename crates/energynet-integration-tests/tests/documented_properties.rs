//! Integration test: the documented behavioural guarantees, end to end.
//!
//! Each test drives the public API the way a host would (device events,
//! ticker, persistence queue) and checks one guarantee.

use energynet_core::test_utils::*;
use energynet_core::*;
use energynet_grid::{DeviceRecord, NetworkManager, Placement};

#[test]
fn add_energy_is_saturating() {
    let mut net = EnergyNetwork::new(NetworkId(0), ground(0, 0), &small_config(100), None);
    assert_eq!(net.add_energy(150), 100);
    assert_eq!(net.stored(), 100);
    assert_eq!(net.wasted(), 50);
}

#[test]
fn remove_energy_is_saturating() {
    let mut net = EnergyNetwork::new(NetworkId(0), ground(0, 0), &small_config(100), None);
    net.add_energy(70);
    assert_eq!(net.remove_energy(100), 70);
    assert_eq!(net.stored(), 0);
}

#[test]
fn transaction_rollback_round_trip() {
    let mut grid = NetworkManager::new(small_config(100), None);
    let id = grid.place_device(DeviceRole::Hub, ground(0, 0)).network().unwrap();
    let net = grid.network(id).unwrap();
    net.lock().add_energy(100);

    let mut tx = grid.begin_transaction(id).unwrap();
    assert_eq!(tx.try_reserve(40), Ok(true));
    assert_eq!(net.lock().stored(), 60);
    tx.rollback().unwrap();
    assert_eq!(net.lock().stored(), 100);
    assert_eq!(tx.commit(), Err(TransactionError::AlreadyRolledBack));
}

#[test]
fn storage_module_bonus_applies_and_reverts() {
    let mut grid = NetworkManager::new(example_config(), None);
    let id = grid.place_device(DeviceRole::Hub, ground(0, 0)).network().unwrap();
    assert_eq!(
        grid.place_device(DeviceRole::StorageModule, ground(0, 4)),
        Placement::Joined(id)
    );
    let net = grid.network(id).unwrap();
    assert_eq!(net.lock().capacity(), 228);

    net.lock().add_energy(228);
    grid.remove_device(ground(0, 4));
    assert_eq!(net.lock().capacity(), 100);
    assert_eq!(net.lock().stored(), 100);
}

#[test]
fn removing_bridge_orphans_untouched_device() {
    let mut grid = NetworkManager::new(GridConfig::default(), None);
    let hub = ground(0, 0);
    let a = ground(6, 0);
    let b = ground(12, 0);
    let id = grid.place_device(DeviceRole::Hub, hub).network().unwrap();
    grid.place_device(DeviceRole::Extender, a);
    grid.place_device(DeviceRole::Extender, b);
    assert!(!hub.within_range(&b, 6), "b only reaches the hub through a");
    assert_eq!(grid.network_at(b), Some(id));

    grid.remove_device(a);

    assert_eq!(grid.network_at(b), None);
    assert!(grid.is_orphan(b));
    assert!(!grid.network(id).unwrap().lock().contains(b));
}

#[test]
fn find_nearest_respects_range() {
    let mut grid = NetworkManager::new(GridConfig::default(), None);
    let id = grid.place_device(DeviceRole::Hub, ground(0, 0)).network().unwrap();

    assert_eq!(grid.find_nearest(ground(5, 0), 6), Some(id));
    assert_eq!(grid.find_nearest(ground(7, 0), 6), None);
}

#[test]
fn threshold_compression() {
    let (tx, queue) = persist_channel();
    let config = GridConfig {
        base_capacity: 1000,
        persist_threshold: 0.10,
        ..GridConfig::default()
    };
    let mut grid = NetworkManager::new(config, Some(tx));
    let store = MemoryStore::new();
    let hub = ground(0, 0);
    store.insert_raw(hub, NetworkMetadata::new(500, 1000).to_json());
    grid.load([DeviceRecord::new(hub, DeviceRole::Hub)], &store);
    let net = grid.network(grid.network_at(hub).unwrap()).unwrap();
    assert!(queue.is_empty());

    net.lock().add_energy(40);
    assert!(queue.is_empty(), "4% change must not be forwarded");

    net.lock().add_energy(110);
    assert_eq!(queue.drain().len(), 1, "15% change must be forwarded");

    net.lock().add_energy(350);
    assert_eq!(net.lock().stored(), 1000);
    assert_eq!(queue.drain().len(), 1, "full is always forwarded");

    net.lock().remove_energy(1000);
    assert_eq!(queue.drain().len(), 1, "empty is always forwarded");

    // Back up by a hair, then down to zero again: still forwarded.
    net.lock().add_energy(1);
    assert!(queue.is_empty());
    net.lock().remove_energy(1);
    assert_eq!(queue.drain().len(), 1);
}

#[test]
fn reverse_ordered_chain_fully_reconnects() {
    let mut grid = NetworkManager::new(GridConfig::default(), None);
    let hub = ground(0, 0);
    let chain = chain_along_x(hub, 6, 5);

    let mut records = vec![DeviceRecord::new(hub, DeviceRole::Hub)];
    records.extend(chain.iter().rev().map(|p| DeviceRecord::new(*p, DeviceRole::Extender)));

    let report = grid.load(records, &MemoryStore::new());

    assert_eq!(report.connected, 5);
    assert_eq!(report.orphaned, 0);
    assert_eq!(report.passes, 5);
    let id = grid.network_at(hub).unwrap();
    assert!(chain.iter().all(|p| grid.network_at(*p) == Some(id)));
}
