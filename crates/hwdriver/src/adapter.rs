use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use sqlx::SqlitePool;
use thiserror::Error;
use tracing::info;

use hwdriver_types::{NetworkRecord, PortRecord};

use crate::arista::AristaDriver;
use crate::config::{DriverConfigError, HwConfig};
use crate::driver::{DriverError, HardwareDriver};

/// Resolves a network to the segmentation id realizing it. Provided by
/// the hosting plugin, typically backed by its own database.
#[async_trait]
pub trait SegmentationLookup: Send + Sync {
    async fn segmentation_id(&self, network_id: &str) -> anyhow::Result<u16>;
}

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error(transparent)]
    Config(#[from] DriverConfigError),
    #[error(transparent)]
    Driver(#[from] DriverError),
    #[error("segmentation lookup failed for network {network_id}: {source}")]
    Lookup {
        network_id: String,
        #[source]
        source: anyhow::Error,
    },
}

/// Backends known to the adapter. Driver selection is by registry name;
/// there is no dynamic loading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum DriverKind {
    Dummy,
    Arista,
}

impl DriverKind {
    fn parse(name: &str) -> Result<Self, DriverConfigError> {
        match name {
            "dummy" => Ok(DriverKind::Dummy),
            "arista" => Ok(DriverKind::Arista),
            other => Err(DriverConfigError(format!(
                "unknown hardware driver {other:?}"
            ))),
        }
    }
}

/// Validates the configured driver list: every name must resolve, and
/// repeats collapse onto their first occurrence.
fn resolve_drivers(names: &[String]) -> Result<Vec<DriverKind>, DriverConfigError> {
    if names.is_empty() {
        return Err(DriverConfigError::missing("hardware_drivers"));
    }

    let mut seen = HashSet::new();
    let mut kinds = Vec::new();
    for name in names {
        let kind = DriverKind::parse(name.trim())?;
        if seen.insert(kind) {
            kinds.push(kind);
        }
    }
    Ok(kinds)
}

/// Fans controller lifecycle events out to the configured hardware
/// backends. With only the dummy backend configured every callback is a
/// no-op, so unconfigured deployments stay inert.
pub struct DriverAdapter {
    drivers: Vec<Arc<dyn HardwareDriver>>,
    lookup: Arc<dyn SegmentationLookup>,
}

impl std::fmt::Debug for DriverAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriverAdapter")
            .field("drivers", &self.drivers.len())
            .finish_non_exhaustive()
    }
}

impl DriverAdapter {
    pub async fn new(
        config: &HwConfig,
        pool: SqlitePool,
        lookup: Arc<dyn SegmentationLookup>,
    ) -> Result<Self, AdapterError> {
        let kinds = resolve_drivers(&config.hardware_driver.hardware_drivers)?;

        let mut drivers: Vec<Arc<dyn HardwareDriver>> = Vec::new();
        for kind in kinds {
            match kind {
                DriverKind::Dummy => {}
                DriverKind::Arista => {
                    let arista = config.arista_driver.clone().ok_or_else(|| {
                        DriverConfigError(
                            "arista driver selected but the arista_driver section is not set"
                                .into(),
                        )
                    })?;
                    drivers.push(AristaDriver::new(arista, pool.clone()).await?);
                }
            }
        }

        if drivers.is_empty() {
            info!("no hardware drivers active, lifecycle events will be ignored");
        }

        Ok(Self { drivers, lookup })
    }

    /// Adapter over pre-built drivers. Embedder and test seam.
    pub fn with_drivers(
        drivers: Vec<Arc<dyn HardwareDriver>>,
        lookup: Arc<dyn SegmentationLookup>,
    ) -> Self {
        Self { drivers, lookup }
    }

    pub fn driver_available(&self) -> bool {
        !self.drivers.is_empty()
    }

    pub async fn on_network_create(&self, network: &NetworkRecord) -> Result<(), AdapterError> {
        for driver in &self.drivers {
            driver.create_network(&network.id).await?;
        }
        Ok(())
    }

    /// Reserved: network updates carry nothing the backends act on yet.
    pub async fn on_network_update(&self, _network_id: &str, _network: &NetworkRecord) {}

    pub async fn on_network_delete(&self, network_id: &str) -> Result<(), AdapterError> {
        for driver in &self.drivers {
            driver.delete_network(network_id).await?;
        }
        Ok(())
    }

    pub async fn on_port_create(&self, port: &PortRecord) -> Result<(), AdapterError> {
        if self.drivers.is_empty() {
            return Ok(());
        }
        // Ports exist before the scheduler binds them to a compute host.
        let Some(host) = port.bound_host() else {
            return Ok(());
        };

        let network_id = &port.network_id;
        let segmentation_id = self
            .lookup
            .segmentation_id(network_id)
            .await
            .map_err(|source| AdapterError::Lookup {
                network_id: network_id.clone(),
                source,
            })?;

        for driver in &self.drivers {
            driver.plug_host(network_id, segmentation_id, host).await?;
        }
        Ok(())
    }

    pub async fn on_port_update(
        &self,
        port: &PortRecord,
        network_id: &str,
    ) -> Result<(), AdapterError> {
        let mut port = port.clone();
        port.network_id = network_id.to_string();
        self.on_port_create(&port).await
    }
}
