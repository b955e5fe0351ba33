use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use hwdriver_types::SegmentationType;

/// A required option is missing or unusable. Fatal at construction: the
/// subsystem refuses to start half-configured.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct DriverConfigError(pub String);

impl DriverConfigError {
    pub(crate) fn missing(option: &str) -> Self {
        Self(format!("required option {option} is not set"))
    }
}

/// Subsystem configuration, injected by the hosting plugin.
///
/// Mirrors the `HARDWARE_DRIVER` and `ARISTA_DRIVER` sections of the
/// plugin configuration file; loading and layering is the host's concern.
#[derive(Debug, Clone, Deserialize)]
pub struct HwConfig {
    pub hardware_driver: HardwareDriverConfig,
    #[serde(default)]
    pub arista_driver: Option<AristaConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HardwareDriverConfig {
    /// Driver backends lifecycle events fan out to, by registry name.
    pub hardware_drivers: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AristaConfig {
    pub eapi_user: String,
    pub eapi_pass: String,
    pub eapi_host: String,
    #[serde(default)]
    pub segmentation_type: SegmentationType,
    /// Send hostnames to the switch as FQDNs ("node1.domain.com") instead
    /// of short names ("node1").
    #[serde(default)]
    pub use_fqdn: bool,
    #[serde(default = "default_sync_interval")]
    pub sync_interval_secs: u64,
}

fn default_sync_interval() -> u64 {
    10
}

impl AristaConfig {
    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_secs)
    }

    pub(crate) fn validate(&self) -> Result<(), DriverConfigError> {
        for (value, option) in [
            (&self.eapi_user, "eapi_user"),
            (&self.eapi_pass, "eapi_pass"),
            (&self.eapi_host, "eapi_host"),
        ] {
            if value.is_empty() {
                return Err(DriverConfigError::missing(option));
            }
        }
        Ok(())
    }
}
