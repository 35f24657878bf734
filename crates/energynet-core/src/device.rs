use serde::{Deserialize, Serialize};

use crate::config::GridConfig;

/// The role a device plays in an energy network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceRole {
    /// The single anchor of a network. Defines identity and base capacity.
    Hub,
    /// Extends range, adds no capacity.
    Extender,
    /// Extends range and adds a fixed capacity bonus.
    StorageModule,
    Generator,
    Consumer,
}

impl DeviceRole {
    /// All non-hub roles, in the order networks store them.
    pub const MEMBERS: [DeviceRole; 4] = [
        DeviceRole::Extender,
        DeviceRole::StorageModule,
        DeviceRole::Generator,
        DeviceRole::Consumer,
    ];

    /// Connection range of this role in distance units.
    ///
    /// A hub does not connect to anything itself; other devices connect to
    /// it within their own range, so its range is zero.
    pub fn range(self, config: &GridConfig) -> u32 {
        match self {
            DeviceRole::Hub => 0,
            DeviceRole::StorageModule => config.storage_range,
            DeviceRole::Extender | DeviceRole::Generator | DeviceRole::Consumer => {
                config.connector_range
            }
        }
    }

    /// Connector-like devices act as connection points for other devices
    /// and can bridge parts of a network.
    pub fn is_connector(self) -> bool {
        matches!(self, DeviceRole::Extender | DeviceRole::StorageModule)
    }

    /// Leaves never bridge anything in the connectivity graph.
    pub fn is_leaf(self) -> bool {
        matches!(self, DeviceRole::Generator | DeviceRole::Consumer)
    }
}
