//! Typed views of RouterOS configuration records

use serde::{Deserialize, Serialize};

use crate::parser::Record;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DhcpLease {
    pub address: String,
    pub mac_address: String,
    pub client_id: String,
    pub address_lists: String,
    pub server: String,
    pub rate_limit: String,
    pub last_seen: String,
    pub active_address: String,
    pub active_mac_address: String,
    pub host_name: String,
    pub comment: String,
    pub radius: bool,
    pub dynamic: bool,
    pub blocked: bool,
    pub disabled: bool,
}

impl DhcpLease {
    pub fn from_record(record: &Record) -> Option<Self> {
        let address = record.text("address").filter(|a| !a.is_empty())?;
        Some(Self {
            address,
            mac_address: record.text_or_default("mac_address"),
            client_id: record.text_or_default("client_id"),
            address_lists: record.text_or_default("address_lists"),
            server: record.text_or_default("server"),
            rate_limit: record.text_or_default("rate_limit"),
            last_seen: record.text_or_default("last_seen"),
            active_address: record.text_or_default("active_address"),
            active_mac_address: record.text_or_default("active_mac_address"),
            host_name: record.text_or_default("host_name"),
            comment: record.text_or_default("comment"),
            radius: record.flag("radius"),
            dynamic: record.flag("dynamic"),
            blocked: record.flag("blocked"),
            disabled: record.flag("disabled"),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueueItem {
    pub name: String,
    pub target: String,
    pub parent: String,
    pub packet_mark: String,
    pub priority: i64,
    pub max_limit: String,
    pub limit_at: String,
    pub burst_limit: String,
    pub burst_threshold: String,
    pub burst_time: String,
    pub comment: String,
    pub disabled: bool,
}

impl QueueItem {
    pub fn from_record(record: &Record) -> Option<Self> {
        let name = record.text("name").filter(|n| !n.is_empty())?;
        Some(Self {
            name,
            target: record.text_or_default("target"),
            parent: record.text_or_default("parent"),
            packet_mark: record.text_or_default("packet_mark"),
            priority: record.int("priority").unwrap_or(0),
            max_limit: record.text_or_default("max_limit"),
            limit_at: record.text_or_default("limit_at"),
            burst_limit: record.text_or_default("burst_limit"),
            burst_threshold: record.text_or_default("burst_threshold"),
            burst_time: record.text_or_default("burst_time"),
            comment: record.text_or_default("comment"),
            disabled: record.flag("disabled"),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InterfaceConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub mtu: i64,
    pub mac_address: String,
    pub speed: String,
    pub disabled: bool,
    pub running: bool,
    pub comment: String,
}

impl InterfaceConfig {
    pub fn from_record(record: &Record) -> Option<Self> {
        let name = record.text("name").filter(|n| !n.is_empty())?;
        Some(Self {
            name,
            kind: record.text_or_default("type"),
            mtu: record.int("mtu").unwrap_or(1500),
            mac_address: record.text_or_default("mac_address"),
            speed: record.text_or_default("speed"),
            disabled: record.flag("disabled"),
            running: record.flag("running"),
            comment: record.text_or_default("comment"),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FirewallRule {
    pub chain: String,
    pub action: String,
    pub protocol: String,
    pub src_address: String,
    pub dst_address: String,
    pub src_port: String,
    pub dst_port: String,
    pub comment: String,
    pub disabled: bool,
}

impl FirewallRule {
    pub fn from_record(record: &Record) -> Option<Self> {
        let chain = record.text("chain").filter(|c| !c.is_empty())?;
        Some(Self {
            chain,
            action: record.text_or_default("action"),
            protocol: record.text_or_default("protocol"),
            src_address: record.text_or_default("src_address"),
            dst_address: record.text_or_default("dst_address"),
            src_port: record.text_or_default("src_port"),
            dst_port: record.text_or_default("dst_port"),
            comment: record.text_or_default("comment"),
            disabled: record.flag("disabled"),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WirelessInterface {
    pub name: String,
    pub mode: String,
    pub ssid: String,
    pub band: String,
    pub frequency: i64,
    pub channel_width: String,
    pub mac_address: String,
    pub disabled: bool,
    pub running: bool,
}

impl WirelessInterface {
    pub fn from_record(record: &Record) -> Option<Self> {
        let name = record.text("name").filter(|n| !n.is_empty())?;
        Some(Self {
            name,
            mode: record.text_or_default("mode"),
            ssid: record.text_or_default("ssid"),
            band: record.text_or_default("band"),
            frequency: record.int("frequency").unwrap_or(0),
            channel_width: record.text_or_default("channel_width"),
            mac_address: record.text_or_default("mac_address"),
            disabled: record.flag("disabled"),
            running: record.flag("running"),
        })
    }
}

/// One row of the wireless registration table
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WirelessClient {
    pub interface: String,
    pub mac_address: String,
    pub signal_strength: String,
    pub signal_to_noise: String,
    pub tx_rate: String,
    pub rx_rate: String,
    pub uptime: String,
    pub tx_ccq: f64,
    pub rx_ccq: f64,
}

impl WirelessClient {
    pub fn from_record(record: &Record) -> Option<Self> {
        let mac_address = record.text("mac_address").filter(|m| !m.is_empty())?;
        Some(Self {
            interface: record.text_or_default("interface"),
            mac_address,
            signal_strength: record.text_or_default("signal_strength"),
            signal_to_noise: record.text_or_default("signal_to_noise"),
            tx_rate: record.text_or_default("tx_rate"),
            rx_rate: record.text_or_default("rx_rate"),
            uptime: record.text_or_default("uptime"),
            tx_ccq: record.float("tx_ccq").unwrap_or(0.0),
            rx_ccq: record.float("rx_ccq").unwrap_or(0.0),
        })
    }
}

/// Output of `/system resource print`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SystemInfo {
    pub uptime: Option<String>,
    pub version: Option<String>,
    pub board_name: Option<String>,
    pub architecture_name: Option<String>,
    pub cpu: Option<String>,
    pub cpu_count: Option<i64>,
    pub cpu_load: Option<String>,
    pub free_memory: Option<String>,
    pub total_memory: Option<String>,
    /// Every field as reported
    pub raw: Record,
}

impl SystemInfo {
    pub fn from_record(record: Record) -> Self {
        Self {
            uptime: record.text("uptime"),
            version: record.text("version"),
            board_name: record.text("board_name"),
            architecture_name: record.text("architecture_name"),
            cpu: record.text("cpu"),
            cpu_count: record.int("cpu_count"),
            cpu_load: record.text("cpu_load"),
            free_memory: record.text("free_memory"),
            total_memory: record.text("total_memory"),
            raw: record,
        }
    }
}
