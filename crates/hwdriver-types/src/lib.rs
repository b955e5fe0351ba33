//! Record types exchanged between the controller core and the hardware
//! driver subsystem.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// L2 segmentation realizing a tenant network on the physical fabric.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SegmentationType {
    #[default]
    Vlan,
    /// Reserved. Drivers skip switch programming for tunnel networks.
    Tunnel,
}

impl SegmentationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SegmentationType::Vlan => "vlan",
            SegmentationType::Tunnel => "tunnel",
        }
    }
}

impl fmt::Display for SegmentationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SegmentationType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "vlan" => Ok(SegmentationType::Vlan),
            "tunnel" => Ok(SegmentationType::Tunnel),
            other => Err(format!("unknown segmentation type: {other}")),
        }
    }
}

/// Network record as delivered on network lifecycle callbacks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkRecord {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Port record as delivered on port lifecycle callbacks. The driver
/// subsystem consumes only the owning network and the binding host.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortRecord {
    pub network_id: String,
    /// Compute host the port is bound to; absent until the scheduler
    /// places the instance.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub binding_host_id: Option<String>,
}

impl PortRecord {
    /// Binding host, treating an empty string the same as absent.
    pub fn bound_host(&self) -> Option<&str> {
        self.binding_host_id.as_deref().filter(|host| !host.is_empty())
    }
}
