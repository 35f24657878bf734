//! Versioned persistence record for a network's energy state.
//!
//! [`NetworkMetadata`] is the only thing the engine writes to storage for a
//! network. It is a snapshot (not a delta), so writing the same record twice
//! is harmless. Decoding validates the record and rejects anything that
//! could put a live network into an impossible state.

use serde::{Deserialize, Serialize};

/// Current metadata schema version. Increment when the record layout changes.
pub const METADATA_VERSION: u32 = 1;

/// Errors that can occur while decoding a stored metadata blob.
#[derive(Debug, thiserror::Error)]
pub enum MetadataError {
    #[error("metadata is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("metadata version {0} is not a valid schema version")]
    InvalidVersion(u32),
    #[error("metadata from future version {0} (this build supports up to {METADATA_VERSION})")]
    FutureVersion(u32),
    #[error("metadata capacity must be positive, got {0}")]
    NonPositiveCapacity(i64),
    #[error("metadata stored energy {stored} outside [0, {capacity}]")]
    StoredOutOfRange { stored: i64, capacity: i64 },
}

/// The persisted projection of a network's energy state.
///
/// Signed fields so that corrupted negative values survive decoding and can
/// be rejected by [`validate`](NetworkMetadata::validate) instead of
/// failing as an opaque parse error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkMetadata {
    pub version: u32,
    pub stored: i64,
    pub capacity: i64,
}

impl NetworkMetadata {
    /// Build a record for the current schema version.
    pub fn new(stored: u64, capacity: u64) -> Self {
        Self {
            version: METADATA_VERSION,
            stored: i64::try_from(stored).unwrap_or(i64::MAX),
            capacity: i64::try_from(capacity).unwrap_or(i64::MAX),
        }
    }

    /// `version > 0 && 0 <= stored <= capacity && capacity > 0`.
    pub fn validate(&self) -> Result<(), MetadataError> {
        if self.version == 0 {
            return Err(MetadataError::InvalidVersion(self.version));
        }
        if self.version > METADATA_VERSION {
            return Err(MetadataError::FutureVersion(self.version));
        }
        if self.capacity <= 0 {
            return Err(MetadataError::NonPositiveCapacity(self.capacity));
        }
        if self.stored < 0 || self.stored > self.capacity {
            return Err(MetadataError::StoredOutOfRange {
                stored: self.stored,
                capacity: self.capacity,
            });
        }
        Ok(())
    }

    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }

    /// Stored energy as an unsigned amount. Only meaningful on a valid record.
    pub fn stored_joules(&self) -> u64 {
        u64::try_from(self.stored).unwrap_or(0)
    }

    /// Capacity as an unsigned amount. Only meaningful on a valid record.
    pub fn capacity_joules(&self) -> u64 {
        u64::try_from(self.capacity).unwrap_or(0)
    }

    /// Encode as a JSON blob.
    pub fn to_json(&self) -> String {
        // A struct of plain integers always serializes.
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Decode and validate a JSON blob.
    pub fn from_json(json: &str) -> Result<Self, MetadataError> {
        let metadata: NetworkMetadata = serde_json::from_str(json)?;
        metadata.validate()?;
        Ok(metadata)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_uses_current_version() {
        let meta = NetworkMetadata::new(10, 100);
        assert_eq!(meta.version, METADATA_VERSION);
        assert!(meta.is_valid());
    }

    #[test]
    fn json_round_trip() {
        let meta = NetworkMetadata::new(512, 1000);
        let decoded = NetworkMetadata::from_json(&meta.to_json()).unwrap();
        assert_eq!(decoded, meta);
        assert_eq!(decoded.stored_joules(), 512);
        assert_eq!(decoded.capacity_joules(), 1000);
    }

    #[test]
    fn boundaries_are_valid() {
        assert!(NetworkMetadata::new(0, 1).is_valid());
        assert!(NetworkMetadata::new(1, 1).is_valid());
    }

    #[test]
    fn rejects_version_zero() {
        let err = NetworkMetadata::from_json(r#"{"version":0,"stored":1,"capacity":10}"#)
            .unwrap_err();
        assert!(matches!(err, MetadataError::InvalidVersion(0)));
    }

    #[test]
    fn rejects_future_version() {
        let err = NetworkMetadata::from_json(r#"{"version":99,"stored":1,"capacity":10}"#)
            .unwrap_err();
        assert!(matches!(err, MetadataError::FutureVersion(99)));
    }

    #[test]
    fn rejects_negative_stored() {
        let err = NetworkMetadata::from_json(r#"{"version":1,"stored":-5,"capacity":10}"#)
            .unwrap_err();
        assert!(matches!(
            err,
            MetadataError::StoredOutOfRange { stored: -5, capacity: 10 }
        ));
    }

    #[test]
    fn rejects_stored_above_capacity() {
        let err = NetworkMetadata::from_json(r#"{"version":1,"stored":11,"capacity":10}"#)
            .unwrap_err();
        assert!(matches!(err, MetadataError::StoredOutOfRange { .. }));
    }

    #[test]
    fn rejects_zero_capacity() {
        let err = NetworkMetadata::from_json(r#"{"version":1,"stored":0,"capacity":0}"#)
            .unwrap_err();
        assert!(matches!(err, MetadataError::NonPositiveCapacity(0)));
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(
            NetworkMetadata::from_json("not json at all"),
            Err(MetadataError::Parse(_))
        ));
        assert!(matches!(
            NetworkMetadata::from_json(r#"{"stored":1}"#),
            Err(MetadataError::Parse(_))
        ));
    }
}
