//! World coordinates and region (cell) keys.

use serde::{Deserialize, Serialize};

use crate::id::WorldId;

/// A block position in a specific world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockPos {
    pub world: WorldId,
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl BlockPos {
    pub fn new(world: WorldId, x: i32, y: i32, z: i32) -> Self {
        Self { world, x, y, z }
    }

    /// Squared Euclidean distance, or `None` when the positions are in
    /// different worlds.
    pub fn distance_sq(&self, other: &BlockPos) -> Option<u64> {
        if self.world != other.world {
            return None;
        }
        let dx = (i64::from(self.x) - i64::from(other.x)).unsigned_abs();
        let dy = (i64::from(self.y) - i64::from(other.y)).unsigned_abs();
        let dz = (i64::from(self.z) - i64::from(other.z)).unsigned_abs();
        Some(dx * dx + dy * dy + dz * dz)
    }

    /// Whether `other` lies within `range` units (inclusive) of this position.
    pub fn within_range(&self, other: &BlockPos, range: u32) -> bool {
        let range = u64::from(range);
        self.distance_sq(other).is_some_and(|d| d <= range * range)
    }

    /// The region cell containing this position for the given cell size.
    pub fn region(&self, cell_size: u32) -> RegionKey {
        let size = i32::try_from(cell_size.max(1)).unwrap_or(i32::MAX);
        RegionKey {
            world: self.world,
            cell_x: self.x.div_euclid(size),
            cell_z: self.z.div_euclid(size),
        }
    }
}

/// A column of the world at region granularity: `(world, cellX, cellZ)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RegionKey {
    pub world: WorldId,
    pub cell_x: i32,
    pub cell_z: i32,
}

impl RegionKey {
    pub fn new(world: WorldId, cell_x: i32, cell_z: i32) -> Self {
        Self {
            world,
            cell_x,
            cell_z,
        }
    }

    /// Offset this key by whole cells.
    pub fn offset(&self, dx: i32, dz: i32) -> Self {
        Self {
            world: self.world,
            cell_x: self.cell_x.saturating_add(dx),
            cell_z: self.cell_z.saturating_add(dz),
        }
    }

    /// All keys within a square of `radius` cells around this one, including itself.
    pub fn square(self, radius: i32) -> impl Iterator<Item = RegionKey> {
        (-radius..=radius).flat_map(move |dz| (-radius..=radius).map(move |dx| self.offset(dx, dz)))
    }

    /// Whether `other` is this cell or one of its 8 neighbours.
    pub fn is_adjacent_or_same(&self, other: &RegionKey) -> bool {
        self.world == other.world
            && (i64::from(self.cell_x) - i64::from(other.cell_x)).abs() <= 1
            && (i64::from(self.cell_z) - i64::from(other.cell_z)).abs() <= 1
    }
}
