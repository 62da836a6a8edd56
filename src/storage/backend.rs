//! Storage backend trait definition
//!
//! The backend is the only state shared between the collection pipeline,
//! the scan coordinator and the API. Every write is either an upsert keyed on
//! a natural identity or an append, so concurrent writers never need
//! coordination beyond the database's own transactions.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::error::StorageResult;
use super::schema::{
    ConfigSnapshot, ConnectionRecord, ConnectionUpsert, DeviceFilter, DeviceRecord, DeviceStatus,
    DeviceUpsert, GraphDataPoint, InterfaceRecord, InterfaceUpsert, MonitoringRecord,
    MonitoringSample, NetworkStatistics, ScanOutcome, ScanSession, TopologySnapshot,
};

/// Health status of the storage backend
#[derive(Debug, Clone)]
pub struct HealthStatus {
    /// Is the backend operational?
    pub healthy: bool,

    /// Human-readable status message
    pub message: String,

    /// Additional backend-specific metadata
    pub metadata: HashMap<String, String>,
}

/// Rows removed by one retention sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetentionReport {
    pub monitoring_rows: u64,
    pub graphing_rows: u64,
}

impl RetentionReport {
    pub fn total(&self) -> u64 {
        self.monitoring_rows + self.graphing_rows
    }
}

/// Everything one device produced in a configuration pass
#[derive(Debug, Clone, Default)]
pub struct ConfigCollection {
    /// `(data_type, payload)` pairs, e.g. `("dhcp_leases", [...])`
    pub snapshots: Vec<(String, serde_json::Value)>,
    pub interfaces: Vec<InterfaceUpsert>,
}

#[async_trait]
pub trait StorageBackend: Send + Sync {
    // === Devices ===

    /// Insert or update by `device_id`; `first_seen` survives updates
    async fn upsert_device(&self, device: &DeviceUpsert) -> StorageResult<DeviceRecord>;

    async fn get_device(&self, id: i64) -> StorageResult<Option<DeviceRecord>>;

    async fn get_device_by_device_id(&self, device_id: &str) -> StorageResult<Option<DeviceRecord>>;

    async fn list_devices(&self, filter: &DeviceFilter) -> StorageResult<Vec<DeviceRecord>>;

    /// Devices seen at or after `since`, most recent first
    async fn recent_devices(&self, since: DateTime<Utc>) -> StorageResult<Vec<DeviceRecord>>;

    async fn set_device_status(
        &self,
        device_id: &str,
        status: DeviceStatus,
        at: DateTime<Utc>,
    ) -> StorageResult<()>;

    // === Interfaces ===

    /// Insert or update by `(device, interface_name)`
    async fn upsert_interface(&self, device_pk: i64, interface: &InterfaceUpsert) -> StorageResult<i64>;

    async fn device_interfaces(&self, device_pk: i64) -> StorageResult<Vec<InterfaceRecord>>;

    async fn list_interfaces(&self, limit: u32) -> StorageResult<Vec<InterfaceRecord>>;

    // === Connections ===

    /// Insert or update by the four-key tuple; `updated_at` always advances
    async fn upsert_connection(&self, connection: &ConnectionUpsert) -> StorageResult<ConnectionRecord>;

    /// Connections where the device is source or target
    async fn device_connections(&self, device_pk: i64) -> StorageResult<Vec<ConnectionRecord>>;

    async fn list_connections(&self, limit: u32) -> StorageResult<Vec<ConnectionRecord>>;

    // === Topology & statistics ===

    /// Devices, interfaces and connections from one consistent read
    async fn topology_snapshot(&self) -> StorageResult<TopologySnapshot>;

    async fn statistics(&self) -> StorageResult<NetworkStatistics>;

    // === Scan sessions ===

    async fn create_scan_session(
        &self,
        scan_type: &str,
        network_range: &str,
        session_name: Option<&str>,
    ) -> StorageResult<ScanSession>;

    /// Move a running session to its terminal state, exactly once
    async fn complete_scan_session(&self, id: i64, outcome: &ScanOutcome) -> StorageResult<ScanSession>;

    async fn get_scan_session(&self, id: i64) -> StorageResult<Option<ScanSession>>;

    async fn list_scan_sessions(&self, limit: u32) -> StorageResult<Vec<ScanSession>>;

    // === Monitoring history ===

    async fn record_monitoring_sample(&self, device_pk: i64, sample: &MonitoringSample) -> StorageResult<i64>;

    /// Persist one device's collection result atomically: graph points,
    /// summary row, and `online`/`last_seen` on the device
    async fn record_collection(
        &self,
        device_id: &str,
        points: &[GraphDataPoint],
        summary: &MonitoringSample,
    ) -> StorageResult<()>;

    async fn device_monitoring(&self, device_pk: i64, since: DateTime<Utc>) -> StorageResult<Vec<MonitoringRecord>>;

    /// Newest sample per device, joined with device identity
    async fn latest_monitoring(&self, limit: u32) -> StorageResult<Vec<MonitoringRecord>>;

    async fn graphing_data(
        &self,
        device_id: &str,
        metric_type: Option<&str>,
        since: DateTime<Utc>,
    ) -> StorageResult<Vec<GraphDataPoint>>;

    /// Latest value per metric (and interface) for the device
    async fn latest_graphing_data(&self, device_id: &str) -> StorageResult<Vec<GraphDataPoint>>;

    // === Configuration snapshots ===

    async fn save_config_snapshot(
        &self,
        device_id: &str,
        data_type: &str,
        data: &serde_json::Value,
    ) -> StorageResult<i64>;

    /// Snapshots plus interface upserts for one device in one transaction
    async fn record_config_collection(&self, device_id: &str, collection: &ConfigCollection) -> StorageResult<()>;

    async fn config_snapshots(
        &self,
        device_id: &str,
        data_type: &str,
        since: DateTime<Utc>,
    ) -> StorageResult<Vec<ConfigSnapshot>>;

    /// The live view of one configuration category
    async fn latest_config_snapshot(
        &self,
        device_id: &str,
        data_type: &str,
    ) -> StorageResult<Option<ConfigSnapshot>>;

    // === Maintenance ===

    /// Delete monitoring and graphing rows older than `before`
    async fn cleanup_old_monitoring(&self, before: DateTime<Utc>) -> StorageResult<RetentionReport>;

    async fn health_check(&self) -> StorageResult<HealthStatus>;

    async fn close(&self) -> StorageResult<()>;
}
