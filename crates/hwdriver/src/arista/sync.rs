use std::sync::Arc;

use tracing::{info, warn};

use super::eapi::{RemoteNet, RpcError, SwitchApi};
use super::repo::ProvisionedNetRepository;
use crate::driver::DriverError;

/// Periodic reconciler converging switch state toward the local store.
pub struct SyncService {
    repo: ProvisionedNetRepository,
    switch: Arc<dyn SwitchApi>,
}

impl SyncService {
    pub fn new(repo: ProvisionedNetRepository, switch: Arc<dyn SwitchApi>) -> Self {
        Self { repo, switch }
    }

    /// One reconciliation tick.
    ///
    /// An unreachable switch is routine: the tick is skipped and retried
    /// on the next interval without touching the store. A mutation
    /// failure aborts the tick mid-way; the remaining difference is
    /// picked up next time.
    pub async fn synchronize(&self) -> Result<(), DriverError> {
        let remote = match self.switch.list_networks().await {
            Ok(remote) => remote,
            Err(err) => {
                warn!(error = %err, "switch unavailable, will try sync later");
                return Ok(());
            }
        };
        let desired = self.repo.get_network_list().await?;

        if remote == desired {
            return Ok(());
        }
        info!(
            remote = remote.len(),
            desired = desired.len(),
            "reconciling switch state"
        );

        // Stray networks are deleted before anything is plugged.
        for net_id in remote.keys() {
            if !desired.contains_key(net_id) {
                self.switch.delete_network(net_id).await?;
            }
        }

        for (net_id, net) in &desired {
            match remote.get(net_id) {
                None => self.plug_missing_hosts(net_id, net, &[]).await?,
                Some(remote_net) if remote_net.host_id != net.host_id => {
                    self.plug_missing_hosts(net_id, net, &remote_net.host_id)
                        .await?;
                }
                Some(_) => {}
            }
        }

        Ok(())
    }

    /// Plugs every desired host the switch does not already carry. Hosts
    /// present remotely but absent locally are left alone.
    async fn plug_missing_hosts(
        &self,
        net_id: &str,
        net: &RemoteNet,
        present: &[String],
    ) -> Result<(), RpcError> {
        for host in &net.host_id {
            if present.binary_search(host).is_err() {
                self.switch
                    .plug_host(net_id, net.segmentation_id, host)
                    .await?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::fixtures::{memory_pool, remote_net, FakeSwitch, SwitchCall};
    use super::*;
    use hwdriver_types::SegmentationType;
    use std::collections::BTreeMap;
    use std::sync::atomic::Ordering;

    async fn service_with(
        remote: BTreeMap<String, RemoteNet>,
    ) -> (SyncService, Arc<FakeSwitch>, ProvisionedNetRepository) {
        let repo = ProvisionedNetRepository::new(memory_pool().await, SegmentationType::Vlan);
        repo.initialize().await.unwrap();
        let switch = Arc::new(FakeSwitch::with_networks(remote));
        let service = SyncService::new(repo.clone(), Arc::clone(&switch) as Arc<dyn SwitchApi>);
        (service, switch, repo)
    }

    #[tokio::test]
    async fn plugs_every_host_of_a_missing_network() {
        let (service, switch, repo) = service_with(BTreeMap::new()).await;
        repo.remember_host("netA", 10, "h1").await.unwrap();
        repo.remember_host("netA", 10, "h2").await.unwrap();

        service.synchronize().await.unwrap();

        let plugs = switch.plug_calls();
        assert_eq!(
            plugs,
            vec![
                SwitchCall::Plug {
                    network_id: "netA".into(),
                    vlan_id: 10,
                    host_id: "h1".into(),
                },
                SwitchCall::Plug {
                    network_id: "netA".into(),
                    vlan_id: 10,
                    host_id: "h2".into(),
                },
            ]
        );
    }

    #[tokio::test]
    async fn deletes_networks_unknown_to_the_store() {
        let mut remote = BTreeMap::new();
        remote.insert("netB".to_string(), remote_net("netB", 20, &["h1"]));
        let (service, switch, _repo) = service_with(remote).await;

        service.synchronize().await.unwrap();

        let calls = switch.calls();
        assert!(calls.contains(&SwitchCall::Delete {
            network_id: "netB".into(),
        }));
        assert!(switch.plug_calls().is_empty());
    }

    #[tokio::test]
    async fn plugs_only_the_missing_hosts() {
        let mut remote = BTreeMap::new();
        remote.insert("netC".to_string(), remote_net("netC", 20, &["h1"]));
        let (service, switch, repo) = service_with(remote).await;
        for host in ["h1", "h2", "h3"] {
            repo.remember_host("netC", 20, host).await.unwrap();
        }

        service.synchronize().await.unwrap();

        let plugs = switch.plug_calls();
        assert_eq!(
            plugs,
            vec![
                SwitchCall::Plug {
                    network_id: "netC".into(),
                    vlan_id: 20,
                    host_id: "h2".into(),
                },
                SwitchCall::Plug {
                    network_id: "netC".into(),
                    vlan_id: 20,
                    host_id: "h3".into(),
                },
            ]
        );
    }

    #[tokio::test]
    async fn matching_state_issues_no_mutations() {
        let mut remote = BTreeMap::new();
        remote.insert("netD".to_string(), remote_net("netD", 30, &["h1"]));
        let (service, switch, repo) = service_with(remote).await;
        repo.remember_host("netD", 30, "h1").await.unwrap();

        service.synchronize().await.unwrap();

        assert_eq!(switch.calls(), vec![SwitchCall::List]);
    }

    #[tokio::test]
    async fn unreachable_switch_defers_the_tick() {
        let (service, switch, repo) = service_with(BTreeMap::new()).await;
        repo.remember_host("netE", 40, "h1").await.unwrap();
        switch.fail_list.store(true, Ordering::SeqCst);

        service.synchronize().await.unwrap();

        assert_eq!(switch.calls(), vec![SwitchCall::List]);
    }

    #[tokio::test]
    async fn mutation_failure_aborts_the_tick() {
        let mut remote = BTreeMap::new();
        remote.insert("stray".to_string(), remote_net("stray", 50, &["h1"]));
        let (service, switch, repo) = service_with(remote).await;
        repo.remember_host("netF", 50, "h1").await.unwrap();
        switch.fail_delete.store(true, Ordering::SeqCst);

        let err = service.synchronize().await.unwrap_err();

        assert!(matches!(err, DriverError::Rpc(_)));
        assert!(switch.plug_calls().is_empty());
    }

    #[tokio::test]
    async fn stray_remote_hosts_are_left_alone() {
        let mut remote = BTreeMap::new();
        remote.insert("netG".to_string(), remote_net("netG", 60, &["h1", "h9"]));
        let (service, switch, repo) = service_with(remote).await;
        repo.remember_host("netG", 60, "h1").await.unwrap();
        repo.remember_host("netG", 60, "h2").await.unwrap();

        service.synchronize().await.unwrap();

        let plugs = switch.plug_calls();
        assert_eq!(
            plugs,
            vec![SwitchCall::Plug {
                network_id: "netG".into(),
                vlan_id: 60,
                host_id: "h2".into(),
            }]
        );
        assert!(!switch
            .calls()
            .iter()
            .any(|call| matches!(call, SwitchCall::Unplug { .. })));
    }
}
