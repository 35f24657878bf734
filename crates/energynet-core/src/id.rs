use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies an energy network. Assigned monotonically by the manager, so
/// a lower id always belongs to an older network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NetworkId(pub u64);

impl fmt::Display for NetworkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "net#{}", self.0)
    }
}

/// Identifies a world (dimension). Positions in different worlds never
/// connect to each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct WorldId(pub u32);
