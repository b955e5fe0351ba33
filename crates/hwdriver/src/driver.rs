use async_trait::async_trait;
use thiserror::Error;

use crate::arista::eapi::RpcError;
use crate::config::DriverConfigError;

/// Failure of a driver lifecycle operation or of driver construction.
#[derive(Debug, Error)]
pub enum DriverError {
    #[error(transparent)]
    Rpc(#[from] RpcError),
    #[error("provisioned-net store failure: {0}")]
    Store(#[from] sqlx::Error),
    #[error(transparent)]
    Config(#[from] DriverConfigError),
}

/// Capability set a hardware backend provides for L2 connectivity.
///
/// Usable by any plugin that learns which compute host a port is bound
/// to. Backends are selected by configuration; see the adapter.
#[async_trait]
pub trait HardwareDriver: Send + Sync {
    /// Configures an isolated L2 segment for the given network.
    async fn create_network(&self, network_id: &str) -> Result<(), DriverError>;

    /// Attaches a compute host to the network on the given segment.
    async fn plug_host(
        &self,
        network_id: &str,
        segmentation_id: u16,
        host_id: &str,
    ) -> Result<(), DriverError>;

    /// Detaches a compute host from the network.
    async fn unplug_host(
        &self,
        network_id: &str,
        segmentation_id: u16,
        host_id: &str,
    ) -> Result<(), DriverError>;

    /// Removes the network's L2 configuration from the hardware.
    async fn delete_network(&self, network_id: &str) -> Result<(), DriverError>;
}
