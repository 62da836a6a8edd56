//! Typed access to a RouterOS device over a console session
//!
//! [`DeviceClient`] turns fixed CLI commands into typed records and builds
//! mutation commands from validated arguments. A mutation succeeds iff the
//! device wrote nothing to the error channel.

pub mod commands;
pub mod registry;
pub mod types;

use tracing::{instrument, warn};

use crate::parser::{Record, parse_records};
use crate::session::{CommandOutput, SessionError, SessionResult, SharedSession};

pub use commands::FirewallRuleSpec;
pub use registry::{DeviceRegistry, SshTransportFactory, TransportFactory};
pub use types::{
    DhcpLease, FirewallRule, InterfaceConfig, QueueItem, SystemInfo, WirelessClient,
    WirelessInterface,
};

#[derive(Clone)]
pub struct DeviceClient {
    device_id: String,
    session: SharedSession,
}

impl DeviceClient {
    pub fn new(device_id: impl Into<String>, session: SharedSession) -> Self {
        Self {
            device_id: device_id.into(),
            session,
        }
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// Run a raw command; output is returned as-is
    pub async fn execute(&self, command: &str) -> SessionResult<CommandOutput> {
        let mut session = self.session.lock().await;
        session.execute(command).await
    }

    async fn read_records(&self, command: &str) -> SessionResult<Vec<Record>> {
        let output = self.execute(command).await?;
        if !output.stderr.is_empty() {
            warn!(device_id = %self.device_id, "{command} failed: {}", output.stderr);
            return Err(SessionError::CommandRejected(output.stderr));
        }
        Ok(parse_records(&output.stdout))
    }

    async fn read_typed<T>(&self, command: &str, convert: fn(&Record) -> Option<T>) -> SessionResult<Vec<T>> {
        let records = self.read_records(command).await?;
        let total = records.len();
        let typed: Vec<T> = records.iter().filter_map(convert).collect();
        if typed.len() < total {
            warn!(
                device_id = %self.device_id,
                "{command}: skipped {} of {total} records without identity fields",
                total - typed.len()
            );
        }
        Ok(typed)
    }

    async fn mutate(&self, command: SessionResult<String>) -> SessionResult<bool> {
        let command = command?;
        let output = self.execute(&command).await?;
        if output.stderr.is_empty() {
            Ok(true)
        } else {
            warn!(device_id = %self.device_id, "device rejected `{command}`: {}", output.stderr);
            Ok(false)
        }
    }

    #[instrument(skip(self), fields(device_id = %self.device_id))]
    pub async fn system_info(&self) -> SessionResult<SystemInfo> {
        let record = self
            .read_records(commands::SYSTEM_RESOURCE)
            .await?
            .into_iter()
            .next()
            .unwrap_or_default();
        Ok(SystemInfo::from_record(record))
    }

    #[instrument(skip(self), fields(device_id = %self.device_id))]
    pub async fn dhcp_leases(&self) -> SessionResult<Vec<DhcpLease>> {
        self.read_typed(commands::DHCP_LEASES, DhcpLease::from_record).await
    }

    #[instrument(skip(self), fields(device_id = %self.device_id))]
    pub async fn add_dhcp_lease(&self, address: &str, mac_address: &str, comment: Option<&str>) -> SessionResult<bool> {
        self.mutate(commands::add_dhcp_lease(address, mac_address, comment))
            .await
    }

    #[instrument(skip(self), fields(device_id = %self.device_id))]
    pub async fn remove_dhcp_lease(&self, address: &str) -> SessionResult<bool> {
        self.mutate(commands::remove_dhcp_lease(address)).await
    }

    #[instrument(skip(self), fields(device_id = %self.device_id))]
    pub async fn queues(&self) -> SessionResult<Vec<QueueItem>> {
        self.read_typed(commands::SIMPLE_QUEUES, QueueItem::from_record).await
    }

    #[instrument(skip(self), fields(device_id = %self.device_id))]
    pub async fn add_queue(
        &self,
        name: &str,
        target: &str,
        max_limit: &str,
        comment: Option<&str>,
    ) -> SessionResult<bool> {
        self.mutate(commands::add_queue(name, target, max_limit, comment))
            .await
    }

    #[instrument(skip(self), fields(device_id = %self.device_id))]
    pub async fn remove_queue(&self, name: &str) -> SessionResult<bool> {
        self.mutate(commands::remove_queue(name)).await
    }

    #[instrument(skip(self), fields(device_id = %self.device_id))]
    pub async fn interfaces(&self) -> SessionResult<Vec<InterfaceConfig>> {
        self.read_typed(commands::INTERFACES, InterfaceConfig::from_record).await
    }

    #[instrument(skip(self), fields(device_id = %self.device_id))]
    pub async fn set_interface_mtu(&self, name: &str, mtu: u32) -> SessionResult<bool> {
        self.mutate(commands::set_interface_mtu(name, mtu)).await
    }

    #[instrument(skip(self), fields(device_id = %self.device_id))]
    pub async fn firewall_rules(&self) -> SessionResult<Vec<FirewallRule>> {
        self.read_typed(commands::FIREWALL_FILTER, FirewallRule::from_record).await
    }

    #[instrument(skip(self), fields(device_id = %self.device_id))]
    pub async fn add_firewall_rule(&self, rule: &FirewallRuleSpec) -> SessionResult<bool> {
        self.mutate(commands::add_firewall_rule(rule)).await
    }

    #[instrument(skip(self), fields(device_id = %self.device_id))]
    pub async fn wireless_interfaces(&self) -> SessionResult<Vec<WirelessInterface>> {
        self.read_typed(commands::WIRELESS_INTERFACES, WirelessInterface::from_record)
            .await
    }

    #[instrument(skip(self), fields(device_id = %self.device_id))]
    pub async fn wireless_clients(&self) -> SessionResult<Vec<WirelessClient>> {
        self.read_typed(commands::WIRELESS_REGISTRATIONS, WirelessClient::from_record)
            .await
    }
}
