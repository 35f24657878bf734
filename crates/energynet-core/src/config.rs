//! Tunable parameters for the network engine.
//!
//! The engine consumes a [`GridConfig`] but never parses one; callers
//! deserialize it from whatever format they use (TOML, RON, JSON) and hand
//! it over. Missing fields fall back to the documented defaults.

use serde::{Deserialize, Serialize};

/// Default base capacity of a hub in Joules.
pub const DEFAULT_BASE_CAPACITY: u64 = 100_000;
/// Default capacity bonus per connected storage module in Joules.
pub const DEFAULT_STORAGE_BONUS: u64 = 64_000;
/// Default connection range for extenders, generators and consumers.
pub const DEFAULT_CONNECTOR_RANGE: u32 = 6;
/// Default connection range for storage modules.
pub const DEFAULT_STORAGE_RANGE: u32 = 7;
/// Default region (chunk) edge length in blocks.
pub const DEFAULT_CELL_SIZE: u32 = 16;
/// Default persistence threshold as a fraction of capacity.
pub const DEFAULT_PERSIST_THRESHOLD: f64 = 0.05;
/// Default cap on multi-pass reconciliation.
pub const DEFAULT_MAX_RECONCILE_PASSES: u32 = 20;

/// Largest accepted region cell edge, in blocks.
pub const MAX_CELL_SIZE: u32 = 1 << 16;
/// Largest accepted connector or storage range, in blocks.
pub const MAX_DEVICE_RANGE: u32 = 1 << 10;

/// Errors from [`GridConfig::validate`].
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ConfigError {
    #[error("base capacity must be greater than zero")]
    ZeroBaseCapacity,
    #[error("cell size must be greater than zero")]
    ZeroCellSize,
    #[error("persist threshold must be within [0, 1], got {0}")]
    ThresholdOutOfRange(f64),
    #[error("max reconcile passes must be at least 1")]
    ZeroReconcilePasses,
    #[error("cell size {0} exceeds the maximum of {max}", max = MAX_CELL_SIZE)]
    CellSizeTooLarge(u32),
    #[error("device range {0} exceeds the maximum of {max}", max = MAX_DEVICE_RANGE)]
    RangeTooLarge(u32),
}

/// Engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    /// Capacity of a network with no storage modules.
    pub base_capacity: u64,
    /// Capacity added by each connected storage module.
    pub storage_bonus: u64,
    /// Range of extenders, generators and consumers.
    pub connector_range: u32,
    /// Range of storage modules.
    pub storage_range: u32,
    /// Edge length of a spatial index cell. Should match the world's
    /// native region size.
    pub cell_size: u32,
    /// Fraction of capacity an energy change must reach before it is
    /// forwarded for persistence. `0.0` forwards every change.
    pub persist_threshold: f64,
    /// Upper bound on reconciliation passes over a batch of devices.
    pub max_reconcile_passes: u32,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            base_capacity: DEFAULT_BASE_CAPACITY,
            storage_bonus: DEFAULT_STORAGE_BONUS,
            connector_range: DEFAULT_CONNECTOR_RANGE,
            storage_range: DEFAULT_STORAGE_RANGE,
            cell_size: DEFAULT_CELL_SIZE,
            persist_threshold: DEFAULT_PERSIST_THRESHOLD,
            max_reconcile_passes: DEFAULT_MAX_RECONCILE_PASSES,
        }
    }
}

impl GridConfig {
    /// Check that the configuration can drive the engine.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.base_capacity == 0 {
            return Err(ConfigError::ZeroBaseCapacity);
        }
        if self.cell_size == 0 {
            return Err(ConfigError::ZeroCellSize);
        }
        if self.cell_size > MAX_CELL_SIZE {
            return Err(ConfigError::CellSizeTooLarge(self.cell_size));
        }
        if self.max_range() > MAX_DEVICE_RANGE {
            return Err(ConfigError::RangeTooLarge(self.max_range()));
        }
        if !(0.0..=1.0).contains(&self.persist_threshold) {
            return Err(ConfigError::ThresholdOutOfRange(self.persist_threshold));
        }
        if self.max_reconcile_passes == 0 {
            return Err(ConfigError::ZeroReconcilePasses);
        }
        Ok(())
    }

    /// The largest range any device role can have.
    pub fn max_range(&self) -> u32 {
        self.connector_range.max(self.storage_range)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert_eq!(GridConfig::default().validate(), Ok(()));
    }

    #[test]
    fn rejects_zero_base_capacity() {
        let config = GridConfig {
            base_capacity: 0,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::ZeroBaseCapacity));
    }

    #[test]
    fn rejects_oversized_cells_and_ranges() {
        let config = GridConfig {
            cell_size: u32::MAX,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::CellSizeTooLarge(u32::MAX)));

        let config = GridConfig {
            storage_range: MAX_DEVICE_RANGE + 1,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::RangeTooLarge(MAX_DEVICE_RANGE + 1)));

        let config = GridConfig {
            cell_size: MAX_CELL_SIZE,
            connector_range: MAX_DEVICE_RANGE,
            ..Default::default()
        };
        assert_eq!(config.validate(), Ok(()));
    }

    #[test]
    fn rejects_threshold_out_of_range() {
        let config = GridConfig {
            persist_threshold: 1.5,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::ThresholdOutOfRange(1.5)));

        let config = GridConfig {
            persist_threshold: f64::NAN,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_zero_cell_size_and_passes() {
        let config = GridConfig {
            cell_size: 0,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::ZeroCellSize));

        let config = GridConfig {
            max_reconcile_passes: 0,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::ZeroReconcilePasses));
    }

    #[test]
    fn partial_toml_falls_back_to_defaults() {
        let config: GridConfig = toml::from_str(
            r#"
            base_capacity = 100
            storage_bonus = 128
            persist_threshold = 0.1
            "#,
        )
        .unwrap();

        assert_eq!(config.base_capacity, 100);
        assert_eq!(config.storage_bonus, 128);
        assert_eq!(config.persist_threshold, 0.1);
        assert_eq!(config.connector_range, DEFAULT_CONNECTOR_RANGE);
        assert_eq!(config.cell_size, DEFAULT_CELL_SIZE);
        assert_eq!(config.validate(), Ok(()));
    }

    #[test]
    fn max_range_picks_larger_role_range() {
        let config = GridConfig::default();
        assert_eq!(config.max_range(), 7);
    }
}
