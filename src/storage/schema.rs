//! Row and input types for the network inventory database
//!
//! ## Layout
//!
//! Inventory tables (`devices`, `interfaces`, `connections`) are mutable and
//! written through upserts keyed on natural identities, so repeated discovery
//! never duplicates rows. History tables (`device_monitoring`,
//! `routeros_graphing_data`, `routeros_config_data`) are append-only and
//! trimmed by the retention sweep.
//!
//! Devices carry two identities: the integer row id used by foreign keys and
//! the REST paths, and the stable `device_id` string (`mikrotik_10.0.0.1`)
//! used by the collection pipeline.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceStatus {
    Online,
    Offline,
    Unknown,
}

impl fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceStatus::Online => write!(f, "online"),
            DeviceStatus::Offline => write!(f, "offline"),
            DeviceStatus::Unknown => write!(f, "unknown"),
        }
    }
}

impl FromStr for DeviceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "online" => Ok(DeviceStatus::Online),
            "offline" => Ok(DeviceStatus::Offline),
            "unknown" => Ok(DeviceStatus::Unknown),
            other => Err(format!("unknown device status `{other}`")),
        }
    }
}

/// A stored device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceRecord {
    pub id: i64,
    pub device_id: String,
    pub ip_address: String,
    pub mac_address: Option<String>,
    pub hostname: Option<String>,
    pub device_type: String,
    pub vendor: Option<String>,
    pub model: Option<String>,
    pub firmware_version: Option<String>,
    pub status: DeviceStatus,
    pub location: Option<String>,
    pub description: Option<String>,
    pub snmp_community: Option<String>,
    pub snmp_version: Option<String>,
    pub discovery_method: Option<String>,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DeviceRecord {
    pub fn is_routeros(&self) -> bool {
        self.vendor
            .as_deref()
            .is_some_and(|v| v.eq_ignore_ascii_case("mikrotik"))
    }
}

/// Device fields written by discovery; absent options keep the stored value
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceUpsert {
    pub device_id: String,
    pub ip_address: String,
    pub mac_address: Option<String>,
    pub hostname: Option<String>,
    pub device_type: String,
    pub vendor: Option<String>,
    pub model: Option<String>,
    pub firmware_version: Option<String>,
    pub status: DeviceStatus,
    pub location: Option<String>,
    pub description: Option<String>,
    pub snmp_community: Option<String>,
    pub snmp_version: Option<String>,
    pub discovery_method: Option<String>,
    pub seen_at: DateTime<Utc>,
}

impl DeviceUpsert {
    pub fn new(device_id: impl Into<String>, ip_address: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            ip_address: ip_address.into(),
            mac_address: None,
            hostname: None,
            device_type: "unknown".to_string(),
            vendor: None,
            model: None,
            firmware_version: None,
            status: DeviceStatus::Unknown,
            location: None,
            description: None,
            snmp_community: None,
            snmp_version: None,
            discovery_method: None,
            seen_at: Utc::now(),
        }
    }
}

/// Listing filter for devices
#[derive(Debug, Clone, Default)]
pub struct DeviceFilter {
    pub device_type: Option<String>,
    pub vendor: Option<String>,
    pub status: Option<DeviceStatus>,
    pub limit: u32,
    pub offset: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterfaceRecord {
    pub id: i64,
    pub device_id: i64,
    pub interface_name: String,
    pub interface_index: Option<i64>,
    pub description: Option<String>,
    pub mac_address: Option<String>,
    pub ip_address: Option<String>,
    pub subnet_mask: Option<String>,
    pub speed: Option<i64>,
    pub status: String,
    pub admin_status: Option<String>,
    pub interface_type: Option<String>,
    pub mtu: Option<i64>,
    pub bandwidth: Option<i64>,
    pub duplex: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Owning device, filled by joined listings
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_ip: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InterfaceUpsert {
    pub interface_name: String,
    pub interface_index: Option<i64>,
    pub description: Option<String>,
    pub mac_address: Option<String>,
    pub ip_address: Option<String>,
    pub subnet_mask: Option<String>,
    pub speed: Option<i64>,
    /// `up`, `down` or `unknown`
    pub status: String,
    pub admin_status: Option<String>,
    pub interface_type: Option<String>,
    pub mtu: Option<i64>,
    pub bandwidth: Option<i64>,
    pub duplex: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionRecord {
    pub id: i64,
    pub source_device_id: i64,
    pub source_interface_id: Option<i64>,
    pub target_device_id: i64,
    pub target_interface_id: Option<i64>,
    pub connection_type: String,
    pub bandwidth: Option<i64>,
    pub status: String,
    pub discovery_method: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub source_hostname: Option<String>,
    pub source_ip: Option<String>,
    pub target_hostname: Option<String>,
    pub target_ip: Option<String>,
    pub source_interface_name: Option<String>,
    pub target_interface_name: Option<String>,
}

/// Edge identity is the four-tuple of device and interface ids
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionUpsert {
    pub source_device_id: i64,
    pub source_interface_id: Option<i64>,
    pub target_device_id: i64,
    pub target_interface_id: Option<i64>,
    pub connection_type: String,
    pub bandwidth: Option<i64>,
    pub status: String,
    pub discovery_method: Option<String>,
}

impl ConnectionUpsert {
    pub fn between(source_device_id: i64, target_device_id: i64) -> Self {
        Self {
            source_device_id,
            source_interface_id: None,
            target_device_id,
            target_interface_id: None,
            connection_type: "ethernet".to_string(),
            bandwidth: None,
            status: "active".to_string(),
            discovery_method: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanStatus {
    Running,
    Completed,
    Failed,
}

impl fmt::Display for ScanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanStatus::Running => write!(f, "running"),
            ScanStatus::Completed => write!(f, "completed"),
            ScanStatus::Failed => write!(f, "failed"),
        }
    }
}

impl FromStr for ScanStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(ScanStatus::Running),
            "completed" => Ok(ScanStatus::Completed),
            "failed" => Ok(ScanStatus::Failed),
            other => Err(format!("unknown scan status `{other}`")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanSession {
    pub id: i64,
    pub session_name: Option<String>,
    pub scan_type: String,
    pub network_range: String,
    pub status: ScanStatus,
    pub devices_discovered: i64,
    pub connections_discovered: i64,
    pub error_message: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Terminal state of a scan session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ScanOutcome {
    Completed {
        devices_discovered: i64,
        connections_discovered: i64,
    },
    Failed {
        error: String,
    },
}

/// Summary row written once per device per collection cycle
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MonitoringSample {
    pub cpu_usage: Option<f64>,
    pub memory_usage: Option<f64>,
    pub temperature: Option<f64>,
    pub uptime: Option<i64>,
    pub interface_count: Option<i64>,
    pub active_connections: Option<i64>,
    pub packet_loss: Option<f64>,
    pub latency: Option<f64>,
    pub bandwidth_in: Option<i64>,
    pub bandwidth_out: Option<i64>,
    /// Which path produced the data (`rest`, `snmp`)
    pub source: Option<String>,
    pub monitored_at: DateTime<Utc>,
}

impl MonitoringSample {
    /// Fold a device's data points into one summary row
    pub fn summarize(points: &[GraphDataPoint], source: &str, at: DateTime<Utc>) -> Self {
        let find = |name: &str| {
            points
                .iter()
                .find(|p| p.metric_name == name && p.interface_name.is_none())
                .map(|p| p.value)
        };
        let interfaces: BTreeSet<&str> = points
            .iter()
            .filter(|p| p.metric_type == "interface")
            .filter_map(|p| p.interface_name.as_deref())
            .collect();

        Self {
            cpu_usage: find("cpu_load"),
            memory_usage: find("memory_usage"),
            uptime: find("uptime").map(|v| v as i64),
            interface_count: (!interfaces.is_empty()).then_some(interfaces.len() as i64),
            source: Some(source.to_string()),
            monitored_at: at,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitoringRecord {
    pub id: i64,
    pub device_id: i64,
    #[serde(flatten)]
    pub sample: MonitoringSample,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_type: Option<String>,
}

/// One timestamped measurement from the metrics API or SNMP
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphDataPoint {
    pub device_id: String,
    pub timestamp: DateTime<Utc>,
    /// `interface`, `system`, `wireless` or `queue`
    pub metric_type: String,
    pub metric_name: String,
    pub value: f64,
    pub unit: String,
    pub interface_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigSnapshot {
    pub id: i64,
    pub device_id: String,
    pub data_type: String,
    pub data: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

/// Devices, interfaces and connections read in one transaction
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TopologySnapshot {
    pub devices: Vec<DeviceRecord>,
    pub interfaces: Vec<InterfaceRecord>,
    pub connections: Vec<ConnectionRecord>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceCounts {
    pub total_devices: i64,
    pub online_devices: i64,
    pub offline_devices: i64,
    pub routers: i64,
    pub switches: i64,
    pub servers: i64,
    pub mikrotik_devices: i64,
    pub cisco_devices: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InterfaceCounts {
    pub total_interfaces: i64,
    pub active_interfaces: i64,
    pub inactive_interfaces: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConnectionCounts {
    pub total_connections: i64,
    pub active_connections: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecentActivity {
    pub devices_last_24h: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkStatistics {
    pub devices: DeviceCounts,
    pub interfaces: InterfaceCounts,
    pub connections: ConnectionCounts,
    pub recent_activity: RecentActivity,
    pub last_updated: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(name: &str, value: f64, interface: Option<&str>) -> GraphDataPoint {
        GraphDataPoint {
            device_id: "mikrotik_10.0.0.1".to_string(),
            timestamp: Utc::now(),
            metric_type: if interface.is_some() { "interface" } else { "system" }.to_string(),
            metric_name: name.to_string(),
            value,
            unit: "percent".to_string(),
            interface_name: interface.map(str::to_string),
        }
    }

    #[test]
    fn test_summarize_picks_system_metrics() {
        let points = vec![
            point("cpu_load", 12.0, None),
            point("memory_usage", 40.5, None),
            point("uptime", 3600.0, None),
            point("tx_bytes", 100.0, Some("ether1")),
            point("rx_bytes", 100.0, Some("ether1")),
            point("tx_bytes", 5.0, Some("ether2")),
        ];
        let at = Utc::now();

        let sample = MonitoringSample::summarize(&points, "rest", at);

        assert_eq!(sample.cpu_usage, Some(12.0));
        assert_eq!(sample.memory_usage, Some(40.5));
        assert_eq!(sample.uptime, Some(3600));
        assert_eq!(sample.interface_count, Some(2));
        assert_eq!(sample.source.as_deref(), Some("rest"));
        assert_eq!(sample.monitored_at, at);
    }

    #[test]
    fn test_status_round_trip_through_text() {
        for status in [DeviceStatus::Online, DeviceStatus::Offline, DeviceStatus::Unknown] {
            assert_eq!(status.to_string().parse::<DeviceStatus>(), Ok(status));
        }
        assert!("broken".parse::<ScanStatus>().is_err());
    }
}
