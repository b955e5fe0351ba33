//! Test doubles shared by the EOS driver test suites.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;

use hwdriver_types::SegmentationType;

use super::eapi::{RemoteNet, RpcError, SwitchApi};
use crate::config::AristaConfig;

/// Single-connection pool so the in-memory database survives the whole
/// test.
pub(crate) async fn memory_pool() -> SqlitePool {
    SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory sqlite pool")
}

pub(crate) fn arista_config() -> AristaConfig {
    AristaConfig {
        eapi_user: "admin".into(),
        eapi_pass: "secret".into(),
        eapi_host: "tor1.example.net".into(),
        segmentation_type: SegmentationType::Vlan,
        use_fqdn: false,
        sync_interval_secs: 10,
    }
}

pub(crate) fn remote_net(name: &str, vlan_id: u16, hosts: &[&str]) -> RemoteNet {
    let mut host_id: Vec<String> = hosts.iter().map(|host| host.to_string()).collect();
    host_id.sort();
    RemoteNet {
        name: name.to_string(),
        segmentation_id: vlan_id,
        segmentation_type: SegmentationType::Vlan,
        host_id,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum SwitchCall {
    List,
    Plug {
        network_id: String,
        vlan_id: u16,
        host_id: String,
    },
    Unplug {
        network_id: String,
        vlan_id: u16,
        host_id: String,
    },
    Delete {
        network_id: String,
    },
}

/// Records every switch call; failures are injected per operation.
#[derive(Default)]
pub(crate) struct FakeSwitch {
    pub(crate) networks: Mutex<BTreeMap<String, RemoteNet>>,
    calls: Mutex<Vec<SwitchCall>>,
    pub(crate) fail_list: AtomicBool,
    pub(crate) fail_plug: AtomicBool,
    pub(crate) fail_unplug: AtomicBool,
    pub(crate) fail_delete: AtomicBool,
}

impl FakeSwitch {
    pub(crate) fn with_networks(networks: BTreeMap<String, RemoteNet>) -> Self {
        Self {
            networks: Mutex::new(networks),
            ..Self::default()
        }
    }

    pub(crate) fn calls(&self) -> Vec<SwitchCall> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn plug_calls(&self) -> Vec<SwitchCall> {
        self.calls()
            .into_iter()
            .filter(|call| matches!(call, SwitchCall::Plug { .. }))
            .collect()
    }

    fn record(&self, call: SwitchCall) {
        self.calls.lock().unwrap().push(call);
    }

    fn failure(&self, cmd: &str) -> RpcError {
        RpcError::simulated("fake-switch", cmd)
    }
}

#[async_trait]
impl SwitchApi for FakeSwitch {
    async fn list_networks(&self) -> Result<BTreeMap<String, RemoteNet>, RpcError> {
        self.record(SwitchCall::List);
        if self.fail_list.load(Ordering::SeqCst) {
            return Err(self.failure("show openstack"));
        }
        Ok(self.networks.lock().unwrap().clone())
    }

    async fn plug_host(
        &self,
        network_id: &str,
        vlan_id: u16,
        host_id: &str,
    ) -> Result<(), RpcError> {
        self.record(SwitchCall::Plug {
            network_id: network_id.to_string(),
            vlan_id,
            host_id: host_id.to_string(),
        });
        if self.fail_plug.load(Ordering::SeqCst) {
            return Err(self.failure("type vlan id"));
        }
        Ok(())
    }

    async fn unplug_host(
        &self,
        network_id: &str,
        vlan_id: u16,
        host_id: &str,
    ) -> Result<(), RpcError> {
        self.record(SwitchCall::Unplug {
            network_id: network_id.to_string(),
            vlan_id,
            host_id: host_id.to_string(),
        });
        if self.fail_unplug.load(Ordering::SeqCst) {
            return Err(self.failure("no type vlan id"));
        }
        Ok(())
    }

    async fn delete_network(&self, network_id: &str) -> Result<(), RpcError> {
        self.record(SwitchCall::Delete {
            network_id: network_id.to_string(),
        });
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(self.failure("no tenant-network"));
        }
        Ok(())
    }
}
