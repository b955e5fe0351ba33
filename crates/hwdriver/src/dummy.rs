use async_trait::async_trait;

use crate::driver::{DriverError, HardwareDriver};

/// Empty implementation of [`HardwareDriver`]. Default backend, so
/// deployments without programmable hardware stay inert.
#[derive(Debug, Default)]
pub struct DummyDriver;

#[async_trait]
impl HardwareDriver for DummyDriver {
    async fn create_network(&self, _network_id: &str) -> Result<(), DriverError> {
        Ok(())
    }

    async fn plug_host(
        &self,
        _network_id: &str,
        _segmentation_id: u16,
        _host_id: &str,
    ) -> Result<(), DriverError> {
        Ok(())
    }

    async fn unplug_host(
        &self,
        _network_id: &str,
        _segmentation_id: u16,
        _host_id: &str,
    ) -> Result<(), DriverError> {
        Ok(())
    }

    async fn delete_network(&self, _network_id: &str) -> Result<(), DriverError> {
        Ok(())
    }
}
