//! Discovery collaborator
//!
//! Discovery itself (MNDP, ARP sweeps, ...) lives outside this crate; it only
//! has to hand back [`DiscoveredDevice`]s for an address range. The built-in
//! [`StaticDiscovery`] serves the devices listed in the configuration file.

use std::collections::HashMap;
use std::net::Ipv4Addr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::storage::{ConnectionUpsert, DeviceUpsert, StorageBackend, StorageResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveredDevice {
    pub ip_address: String,
    pub vendor: String,
    #[serde(default)]
    pub hostname: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub firmware_version: Option<String>,
    #[serde(default)]
    pub mac_address: Option<String>,
    /// IP addresses of directly connected devices
    #[serde(default)]
    pub neighbors: Vec<String>,
}

impl DiscoveredDevice {
    pub fn new(ip_address: impl Into<String>, vendor: impl Into<String>) -> Self {
        Self {
            ip_address: ip_address.into(),
            vendor: vendor.into(),
            hostname: None,
            model: None,
            firmware_version: None,
            mac_address: None,
            neighbors: Vec::new(),
        }
    }

    /// Stable identity, e.g. `mikrotik_192.168.88.1`
    pub fn device_id(&self) -> String {
        device_id_for(&self.vendor, &self.ip_address)
    }

    pub fn is_routeros(&self) -> bool {
        self.vendor.eq_ignore_ascii_case("mikrotik")
    }

    pub fn to_upsert(&self, method: &str) -> DeviceUpsert {
        DeviceUpsert {
            mac_address: self.mac_address.clone(),
            hostname: self.hostname.clone(),
            device_type: if self.is_routeros() { "router" } else { "unknown" }.to_string(),
            vendor: Some(self.vendor.clone()),
            model: self.model.clone(),
            firmware_version: self.firmware_version.clone(),
            discovery_method: Some(method.to_string()),
            ..DeviceUpsert::new(self.device_id(), &self.ip_address)
        }
    }
}

pub fn device_id_for(vendor: &str, ip_address: &str) -> String {
    format!("{}_{}", vendor.to_lowercase(), ip_address)
}

#[async_trait]
pub trait Discovery: Send + Sync {
    async fn discover(&self, network_range: &str) -> anyhow::Result<Vec<DiscoveredDevice>>;
}

/// Serves a fixed device list, filtered by the requested range
#[derive(Debug, Clone, Default)]
pub struct StaticDiscovery {
    devices: Vec<DiscoveredDevice>,
}

impl StaticDiscovery {
    pub fn new(devices: Vec<DiscoveredDevice>) -> Self {
        Self { devices }
    }
}

#[async_trait]
impl Discovery for StaticDiscovery {
    async fn discover(&self, network_range: &str) -> anyhow::Result<Vec<DiscoveredDevice>> {
        Ok(self
            .devices
            .iter()
            .filter(|d| in_range(&d.ip_address, network_range))
            .cloned()
            .collect())
    }
}

/// `""`/`all` match everything; otherwise an IPv4 CIDR or a single address
pub fn in_range(ip: &str, range: &str) -> bool {
    let range = range.trim();
    if range.is_empty() || range.eq_ignore_ascii_case("all") {
        return true;
    }
    let Ok(ip) = ip.parse::<Ipv4Addr>() else {
        return false;
    };

    let (network, prefix) = match range.split_once('/') {
        Some((network, prefix)) => (network, prefix.parse::<u32>().ok()),
        None => (range, Some(32)),
    };
    let (Ok(network), Some(prefix)) = (network.parse::<Ipv4Addr>(), prefix) else {
        return false;
    };
    if prefix > 32 {
        return false;
    }

    let mask = u32::MAX.checked_shl(32 - prefix).unwrap_or(0);
    u32::from(ip) & mask == u32::from(network) & mask
}

/// Counts written by [`record_discovery`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoverySummary {
    pub devices: usize,
    pub connections: usize,
}

/// Upsert discovered devices, then turn reported neighbors into connections
#[instrument(skip_all, fields(found = found.len()))]
pub async fn record_discovery(
    storage: &dyn StorageBackend,
    found: &[DiscoveredDevice],
    method: &str,
) -> StorageResult<DiscoverySummary> {
    let mut by_ip: HashMap<&str, i64> = HashMap::new();
    for device in found {
        let record = storage.upsert_device(&device.to_upsert(method)).await?;
        by_ip.insert(device.ip_address.as_str(), record.id);
    }

    let mut connections = 0;
    for device in found {
        let Some(&source) = by_ip.get(device.ip_address.as_str()) else {
            continue;
        };
        for neighbor in &device.neighbors {
            match by_ip.get(neighbor.as_str()) {
                Some(&target) if target != source => {
                    let edge = ConnectionUpsert {
                        discovery_method: Some(method.to_string()),
                        ..ConnectionUpsert::between(source, target)
                    };
                    storage.upsert_connection(&edge).await?;
                    connections += 1;
                }
                Some(_) => {}
                None => warn!(
                    device_id = %device.device_id(),
                    "neighbor {neighbor} was not discovered in this pass"
                ),
            }
        }
    }

    debug!("recorded {} devices and {connections} connections", by_ip.len());
    Ok(DiscoverySummary {
        devices: by_ip.len(),
        connections,
    })
}
