use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tracing::debug;
use url::Url;

use hwdriver_types::SegmentationType;

use crate::config::{AristaConfig, DriverConfigError};

/// Commands wrapping every request: the switch only accepts tenant-network
/// statements inside its management context.
const COMMAND_PROLOGUE: [&str; 3] = ["enable", "configure", "management openstack"];
const COMMAND_EPILOGUE: [&str; 1] = ["exit"];

/// One network as the switch reports it from `show openstack`, and as the
/// provisioned-net store emits it for comparison.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteNet {
    pub name: String,
    pub segmentation_id: u16,
    pub segmentation_type: SegmentationType,
    /// Hosts attached to the network; kept sorted so two views of the
    /// same network compare equal.
    pub host_id: Vec<String>,
}

/// Any transport or protocol failure talking to the switch. Carries the
/// command sequence that failed so operators can replay it by hand.
#[derive(Debug, Error)]
#[error("eAPI call {cmds:?} on {host} failed: {source}")]
pub struct RpcError {
    pub host: String,
    pub cmds: Vec<String>,
    #[source]
    source: RpcFailure,
}

#[derive(Debug, Error)]
enum RpcFailure {
    #[error(transparent)]
    Transport(#[from] reqwest::Error),
    #[error("switch returned error {code}: {message}")]
    Eapi { code: i64, message: String },
    #[error("malformed eAPI response: {0}")]
    Protocol(String),
}

#[cfg(test)]
impl RpcError {
    pub(crate) fn simulated(host: &str, cmd: &str) -> Self {
        Self {
            host: host.into(),
            cmds: vec![cmd.into()],
            source: RpcFailure::Protocol("simulated failure".into()),
        }
    }
}

/// Switch-facing operations the EOS driver and its reconciler need.
/// [`EapiClient`] is the production implementation; tests substitute
/// recording fakes.
#[async_trait]
pub trait SwitchApi: Send + Sync {
    /// All networks known to the switch, keyed by network id, host lists
    /// sorted.
    async fn list_networks(&self) -> Result<BTreeMap<String, RemoteNet>, RpcError>;

    /// Creates the VLAN between the ToR switch and a compute host.
    async fn plug_host(
        &self,
        network_id: &str,
        vlan_id: u16,
        host_id: &str,
    ) -> Result<(), RpcError>;

    /// Removes a previously configured VLAN between the switch and a host.
    async fn unplug_host(
        &self,
        network_id: &str,
        vlan_id: u16,
        host_id: &str,
    ) -> Result<(), RpcError>;

    /// Drops the whole tenant network from the switch.
    async fn delete_network(&self, network_id: &str) -> Result<(), RpcError>;

    /// Remote view of a single network; `None` when the switch does not
    /// know it.
    async fn network_info(&self, network_id: &str) -> Result<Option<RemoteNet>, RpcError> {
        Ok(self.list_networks().await?.remove(network_id))
    }
}

/// JSON-RPC client for the switch command API.
#[derive(Debug)]
pub struct EapiClient {
    http: reqwest::Client,
    endpoint: Url,
    host: String,
    request_id: AtomicU64,
}

impl EapiClient {
    /// Builds the client from the driver configuration. User, password and
    /// host are all required.
    pub fn new(config: &AristaConfig) -> Result<Self, DriverConfigError> {
        config.validate()?;

        let mut endpoint = Url::parse(&format!("https://{}/command-api", config.eapi_host))
            .map_err(|err| {
                DriverConfigError(format!("invalid eapi_host {:?}: {err}", config.eapi_host))
            })?;
        endpoint
            .set_username(&config.eapi_user)
            .and_then(|_| endpoint.set_password(Some(&config.eapi_pass)))
            .map_err(|_| {
                DriverConfigError(format!(
                    "cannot embed eAPI credentials into URL for host {:?}",
                    config.eapi_host
                ))
            })?;

        // A hung switch must not stall a caller past the next sync tick.
        let http = reqwest::Client::builder()
            .timeout(config.sync_interval() / 2)
            .build()
            .map_err(|err| DriverConfigError(format!("cannot build eAPI client: {err}")))?;

        Ok(Self {
            http,
            endpoint,
            host: config.eapi_host.clone(),
            request_id: AtomicU64::new(1),
        })
    }

    #[cfg(test)]
    pub(crate) fn with_endpoint(endpoint: Url, host: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint,
            host: host.to_string(),
            request_id: AtomicU64::new(1),
        }
    }

    /// Runs `cmds` inside the management context and returns the result
    /// slots for `cmds` only, prologue and epilogue stripped.
    async fn run_openstack_cmds(
        &self,
        cmds: Vec<String>,
    ) -> Result<Vec<serde_json::Value>, RpcError> {
        let mut full: Vec<String> = COMMAND_PROLOGUE.iter().map(|c| c.to_string()).collect();
        full.extend(cmds.iter().cloned());
        full.extend(COMMAND_EPILOGUE.iter().map(|c| c.to_string()));

        debug!(host = %self.host, cmds = ?full, "executing commands on switch");

        let request = json!({
            "jsonrpc": "2.0",
            "method": "runCmds",
            "params": { "version": 1, "cmds": full },
            "id": self.request_id.fetch_add(1, Ordering::Relaxed),
        });

        let fail = |source: RpcFailure| RpcError {
            host: self.host.clone(),
            cmds: cmds.clone(),
            source,
        };

        let response = self
            .http
            .post(self.endpoint.clone())
            .json(&request)
            .send()
            .await
            .and_then(|resp| resp.error_for_status())
            .map_err(|err| fail(RpcFailure::Transport(err)))?;

        let body: EapiResponse = response
            .json()
            .await
            .map_err(|err| fail(RpcFailure::Transport(err)))?;

        if let Some(fault) = body.error {
            return Err(fail(RpcFailure::Eapi {
                code: fault.code,
                message: fault.message,
            }));
        }

        let mut slots = body.result.ok_or_else(|| {
            fail(RpcFailure::Protocol(
                "response carries neither result nor error".into(),
            ))
        })?;

        let expected = COMMAND_PROLOGUE.len() + cmds.len() + COMMAND_EPILOGUE.len();
        if slots.len() != expected {
            return Err(fail(RpcFailure::Protocol(format!(
                "expected {expected} result slots, got {}",
                slots.len()
            ))));
        }

        slots.truncate(expected - COMMAND_EPILOGUE.len());
        Ok(slots.split_off(COMMAND_PROLOGUE.len()))
    }
}

#[async_trait]
impl SwitchApi for EapiClient {
    async fn list_networks(&self) -> Result<BTreeMap<String, RemoteNet>, RpcError> {
        let cmds = vec!["show openstack".to_string()];
        let slots = self.run_openstack_cmds(cmds.clone()).await?;

        let protocol_err = |msg: String| RpcError {
            host: self.host.clone(),
            cmds: cmds.clone(),
            source: RpcFailure::Protocol(msg),
        };

        let networks = slots
            .first()
            .and_then(|slot| slot.get("networks"))
            .cloned()
            .ok_or_else(|| protocol_err("show openstack carries no networks map".into()))?;

        let mut networks: BTreeMap<String, RemoteNet> = serde_json::from_value(networks)
            .map_err(|err| protocol_err(err.to_string()))?;
        for net in networks.values_mut() {
            net.host_id.sort();
        }

        Ok(networks)
    }

    async fn plug_host(
        &self,
        network_id: &str,
        vlan_id: u16,
        host_id: &str,
    ) -> Result<(), RpcError> {
        let cmds = vec![
            format!("tenant-network {network_id}"),
            format!("type vlan id {vlan_id} host {host_id}"),
        ];
        self.run_openstack_cmds(cmds).await.map(|_| ())
    }

    async fn unplug_host(
        &self,
        network_id: &str,
        vlan_id: u16,
        host_id: &str,
    ) -> Result<(), RpcError> {
        let cmds = vec![
            format!("tenant-network {network_id}"),
            format!("no type vlan id {vlan_id} host id {host_id}"),
        ];
        self.run_openstack_cmds(cmds).await.map(|_| ())
    }

    async fn delete_network(&self, network_id: &str) -> Result<(), RpcError> {
        let cmds = vec![format!("no tenant-network {network_id}")];
        self.run_openstack_cmds(cmds).await.map(|_| ())
    }
}

#[derive(Debug, Deserialize)]
struct EapiResponse {
    result: Option<Vec<serde_json::Value>>,
    error: Option<EapiFault>,
}

#[derive(Debug, Deserialize)]
struct EapiFault {
    code: i64,
    message: String,
}
