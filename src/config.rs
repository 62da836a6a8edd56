//! JSON configuration for the hub
//!
//! Every section is optional; a missing file section takes its defaults.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;
use tracing::trace;

use crate::collection::{
    CollectionSettings, DiscoveredDevice, RestMetricsClient, SnmpCollector, snmp::DEFAULT_COMMUNITIES,
};
use crate::session::prompt::DEFAULT_PROMPT_PATTERN;
use crate::session::ssh::{SshAuth, SshTarget};
use crate::session::{PromptMatcher, SessionConfig};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub storage: StorageConfig,
    pub api: ApiSection,
    pub collection: CollectionConfig,
    pub session: SessionSection,
    /// Statically known devices, served as the discovery result
    pub devices: Vec<DeviceConfig>,
}

impl Config {
    /// `HUB_BIND_ADDR` and `HUB_DB_PATH` win over the file
    pub fn apply_env_overrides(&mut self) {
        if let Some(addr) = crate::util::get_bind_addr() {
            self.api.bind_addr = addr;
        }
        if let Some(path) = crate::util::get_db_path() {
            self.storage.path = path;
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Path to the SQLite database file
    pub path: PathBuf,

    /// Retention period in days (monitoring history older than this is deleted)
    pub retention_days: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: crate::util::get_default_db_path(),
            retention_days: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiSection {
    pub bind_addr: SocketAddr,
    pub auth_token: Option<String>,
    pub enable_cors: bool,
}

impl Default for ApiSection {
    fn default() -> Self {
        Self {
            bind_addr: crate::util::get_default_bind_addr(),
            auth_token: None,
            enable_cors: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CollectionConfig {
    pub interval_secs: u64,
    pub max_concurrency: usize,
    pub device_timeout_secs: u64,
    pub http_timeout_secs: u64,
    pub snmp_timeout_secs: u64,
    pub snmp_port: u16,
    pub snmp_communities: Vec<String>,
    pub metrics_scheme: String,
    pub metrics_username: Option<String>,
    pub metrics_password: Option<String>,
    pub max_backoff_cycles: u32,
    pub config_every_cycles: u64,
    pub network_ranges: Vec<String>,
}

impl Default for CollectionConfig {
    fn default() -> Self {
        Self {
            interval_secs: 60,
            max_concurrency: 10,
            device_timeout_secs: 30,
            http_timeout_secs: 10,
            snmp_timeout_secs: 5,
            snmp_port: 161,
            snmp_communities: DEFAULT_COMMUNITIES.iter().map(|c| c.to_string()).collect(),
            metrics_scheme: "http".to_string(),
            metrics_username: None,
            metrics_password: None,
            max_backoff_cycles: 8,
            config_every_cycles: 0,
            network_ranges: Vec::new(),
        }
    }
}

impl CollectionConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }

    pub fn settings(&self, retention_days: u32) -> CollectionSettings {
        CollectionSettings {
            max_concurrency: self.max_concurrency.max(1),
            device_timeout: Duration::from_secs(self.device_timeout_secs.max(1)),
            retention: chrono::Duration::days(i64::from(retention_days)),
            max_backoff_cycles: self.max_backoff_cycles,
            config_every_cycles: self.config_every_cycles,
            network_ranges: self.network_ranges.clone(),
        }
    }

    pub fn rest_client(&self) -> anyhow::Result<RestMetricsClient> {
        let mut client = RestMetricsClient::new(Duration::from_secs(self.http_timeout_secs.max(1)))
            .context("failed to build metrics HTTP client")?
            .with_scheme(&self.metrics_scheme);
        if let Some(username) = &self.metrics_username {
            client = client.with_credentials(username, self.metrics_password.clone());
        }
        Ok(client)
    }

    pub fn snmp_collector(&self) -> SnmpCollector {
        SnmpCollector::new(
            self.snmp_communities.clone(),
            self.snmp_port,
            Duration::from_secs(self.snmp_timeout_secs.max(1)),
        )
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionSection {
    pub connect_timeout_secs: u64,
    pub prompt_timeout_secs: u64,
    pub command_timeout_secs: u64,
    pub prompt_pattern: String,
    /// RouterOS console flags appended to every login name, e.g. `+cte`
    pub login_suffix: Option<String>,
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 30,
            prompt_timeout_secs: 10,
            command_timeout_secs: 10,
            prompt_pattern: DEFAULT_PROMPT_PATTERN.to_string(),
            login_suffix: None,
        }
    }
}

impl SessionSection {
    pub fn session_config(&self) -> anyhow::Result<SessionConfig> {
        let prompt = PromptMatcher::new(&self.prompt_pattern)
            .with_context(|| format!("invalid prompt pattern `{}`", self.prompt_pattern))?;

        Ok(SessionConfig {
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            prompt_timeout: Duration::from_secs(self.prompt_timeout_secs),
            command_timeout: Duration::from_secs(self.command_timeout_secs),
            prompt,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeviceConfig {
    pub ip: String,
    #[serde(default = "default_vendor")]
    pub vendor: String,
    pub hostname: Option<String>,
    pub model: Option<String>,
    pub firmware_version: Option<String>,
    pub ssh: Option<SshConfig>,
    #[serde(default)]
    pub neighbors: Vec<String>,
}

fn default_vendor() -> String {
    "MikroTik".to_string()
}

impl DeviceConfig {
    pub fn discovered(&self) -> DiscoveredDevice {
        DiscoveredDevice {
            hostname: self.hostname.clone(),
            model: self.model.clone(),
            firmware_version: self.firmware_version.clone(),
            neighbors: self.neighbors.clone(),
            ..DiscoveredDevice::new(&self.ip, &self.vendor)
        }
    }

    /// SSH parameters, when the device has credentials configured
    pub fn ssh_target(&self, login_suffix: Option<&str>) -> Option<SshTarget> {
        let ssh = self.ssh.as_ref()?;
        let auth = match (&ssh.private_key_path, &ssh.password) {
            (Some(path), _) => SshAuth::Key {
                private_key_path: path.clone(),
                passphrase: ssh.passphrase.clone(),
            },
            (None, Some(password)) => SshAuth::Password {
                password: password.clone(),
            },
            (None, None) => return None,
        };

        Some(SshTarget {
            host: self.ip.clone(),
            port: ssh.port,
            username: ssh.username.clone(),
            auth,
            login_suffix: login_suffix.map(str::to_string),
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SshConfig {
    #[serde(default = "default_username")]
    pub username: String,
    pub password: Option<String>,
    pub private_key_path: Option<PathBuf>,
    pub passphrase: Option<String>,
    #[serde(default = "default_ssh_port")]
    pub port: u16,
}

fn default_username() -> String {
    "admin".to_string()
}

fn default_ssh_port() -> u16 {
    22
}

pub fn read_config_file(path: &str) -> anyhow::Result<Config> {
    let file_content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read configuration file `{path}`"))?;
    serde_json::from_str(&file_content)
        .map_err(|e| anyhow::anyhow!("Invalid configuration file provided: {e}"))
        .inspect(|config| trace!("loaded config: {config:?}"))
}
