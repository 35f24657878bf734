//! Shared test helpers for unit tests, integration tests and benchmarks.
//!
//! Gated behind `#[cfg(any(test, feature = "test-utils"))]`.

use crate::config::GridConfig;
use crate::id::WorldId;
use crate::position::BlockPos;

// ===========================================================================
// Positions
// ===========================================================================

/// A position in the default world.
pub fn pos(x: i32, y: i32, z: i32) -> BlockPos {
    BlockPos::new(WorldId(0), x, y, z)
}

/// A position at ground level (`y = 64`) in the default world.
pub fn ground(x: i32, z: i32) -> BlockPos {
    pos(x, 64, z)
}

/// A position in another world.
pub fn pos_in(world: u32, x: i32, y: i32, z: i32) -> BlockPos {
    BlockPos::new(WorldId(world), x, y, z)
}

/// Positions along the x axis at ground level, `step` apart, starting at
/// `start` (exclusive).
pub fn chain_along_x(start: BlockPos, step: i32, count: usize) -> Vec<BlockPos> {
    (1..=count as i32)
        .map(|i| BlockPos::new(start.world, start.x + step * i, start.y, start.z))
        .collect()
}

// ===========================================================================
// Configs
// ===========================================================================

/// Default config with a custom base capacity and compression disabled, so
/// every energy change is forwarded.
pub fn small_config(base_capacity: u64) -> GridConfig {
    GridConfig {
        base_capacity,
        persist_threshold: 0.0,
        ..GridConfig::default()
    }
}

/// The numbers used throughout the documented examples: base 100, storage
/// bonus 128, 10% compression.
pub fn example_config() -> GridConfig {
    GridConfig {
        base_capacity: 100,
        storage_bonus: 128,
        persist_threshold: 0.10,
        ..GridConfig::default()
    }
}
