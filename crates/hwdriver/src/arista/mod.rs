pub mod eapi;
pub mod repo;
pub mod sync;

#[cfg(test)]
pub(crate) mod fixtures;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::SqlitePool;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use hwdriver_types::SegmentationType;

use crate::config::AristaConfig;
use crate::driver::{DriverError, HardwareDriver};
use eapi::{EapiClient, SwitchApi};
use repo::ProvisionedNetRepository;
use sync::SyncService;

/// Driver for EOS-class top-of-rack switches. VLAN mode only for now.
///
/// Every binding pushed to the switch is recorded locally first, so a
/// repeat request for the same binding costs no RPC, and the reconciler
/// can replay anything the switch missed while unreachable.
pub struct AristaDriver {
    repo: ProvisionedNetRepository,
    switch: Arc<dyn SwitchApi>,
    sync: SyncService,
    /// Serializes lifecycle operations against reconciler ticks.
    sync_lock: Mutex<()>,
    sync_interval: Duration,
    segmentation_type: SegmentationType,
    use_fqdn: bool,
    shutdown: CancellationToken,
}

impl AristaDriver {
    /// Builds the driver against the real switch and arms the reconciler.
    pub async fn new(config: AristaConfig, pool: SqlitePool) -> Result<Arc<Self>, DriverError> {
        let switch = Arc::new(EapiClient::new(&config)?);
        let driver = Self::with_switch(config, pool, switch).await?;
        let _sync_handle = driver.spawn_sync();
        Ok(driver)
    }

    /// Builds the driver around an injected switch API without arming the
    /// reconciler. Callers arm it with [`Self::spawn_sync`] when ready.
    pub async fn with_switch(
        config: AristaConfig,
        pool: SqlitePool,
        switch: Arc<dyn SwitchApi>,
    ) -> Result<Arc<Self>, DriverError> {
        let repo = ProvisionedNetRepository::new(pool, config.segmentation_type);
        repo.initialize().await?;
        let sync = SyncService::new(repo.clone(), Arc::clone(&switch));

        Ok(Arc::new(Self {
            repo,
            switch,
            sync,
            sync_lock: Mutex::new(()),
            sync_interval: config.sync_interval(),
            segmentation_type: config.segmentation_type,
            use_fqdn: config.use_fqdn,
            shutdown: CancellationToken::new(),
        }))
    }

    /// Arms the periodic reconciler. The first tick runs immediately; a
    /// tick that overruns delays the next one instead of overlapping it.
    pub fn spawn_sync(self: &Arc<Self>) -> JoinHandle<()> {
        let driver = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = interval(driver.sync_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = driver.shutdown.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                let _guard = driver.sync_lock.lock().await;
                if let Err(err) = driver.sync.synchronize().await {
                    warn!(error = %err, "sync tick failed, retrying next interval");
                }
            }
        })
    }

    /// Stops the reconciler. A pending tick is cancelled; an in-flight
    /// tick finishes first.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    fn host_name<'a>(&self, host_id: &'a str) -> &'a str {
        if self.use_fqdn {
            host_id
        } else {
            host_id.split('.').next().unwrap_or(host_id)
        }
    }

    fn vlans_used(&self) -> bool {
        self.segmentation_type == SegmentationType::Vlan
    }
}

#[async_trait]
impl HardwareDriver for AristaDriver {
    async fn create_network(&self, network_id: &str) -> Result<(), DriverError> {
        let _guard = self.sync_lock.lock().await;
        self.repo.remember_network(network_id).await?;
        Ok(())
    }

    async fn delete_network(&self, network_id: &str) -> Result<(), DriverError> {
        let _guard = self.sync_lock.lock().await;
        if self
            .repo
            .is_network_provisioned(network_id, None, None)
            .await?
        {
            // Deletion succeeds even with the switch unreachable; the
            // reconciler removes the network once the switch is back.
            if let Err(err) = self.switch.delete_network(network_id).await {
                info!(network_id, error = %err, "switch unreachable, deferring delete to sync");
            }
            self.repo.forget_network(network_id).await?;
        }
        Ok(())
    }

    async fn plug_host(
        &self,
        network_id: &str,
        segmentation_id: u16,
        host_id: &str,
    ) -> Result<(), DriverError> {
        let _guard = self.sync_lock.lock().await;
        let hostname = self.host_name(host_id);
        let provisioned = self
            .repo
            .is_network_provisioned(network_id, Some(segmentation_id), Some(hostname))
            .await?;
        if !provisioned {
            if self.vlans_used() {
                self.switch
                    .plug_host(network_id, segmentation_id, hostname)
                    .await?;
            }
            self.repo
                .remember_host(network_id, segmentation_id, hostname)
                .await?;
        }
        Ok(())
    }

    async fn unplug_host(
        &self,
        network_id: &str,
        segmentation_id: u16,
        host_id: &str,
    ) -> Result<(), DriverError> {
        let _guard = self.sync_lock.lock().await;
        let hostname = self.host_name(host_id);
        let provisioned = self
            .repo
            .is_network_provisioned(network_id, Some(segmentation_id), Some(hostname))
            .await?;
        if provisioned {
            if self.vlans_used() {
                self.switch
                    .unplug_host(network_id, segmentation_id, hostname)
                    .await?;
            }
            self.repo.forget_host(network_id, hostname).await?;
        }
        Ok(())
    }
}
