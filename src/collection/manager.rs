//! Bounded fan-out of collection cycles
//!
//! One cycle: optional discovery, poll every RouterOS device under a
//! semaphore, persist each device in its own transaction, sweep expired
//! history, and (every `config_every_cycles`) snapshot device configuration
//! over SSH. A device that fails is logged, marked offline and backed off;
//! it never fails the cycle.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, Semaphore};
use tokio::time::timeout;
use tracing::{debug, info, instrument, warn};

use super::discovery::{Discovery, DiscoverySummary, record_discovery};
use super::{CollectError, CollectResult, DeviceTarget, MetricsSource};
use crate::device::DeviceRegistry;
use crate::device::types::InterfaceConfig;
use crate::storage::{
    ConfigCollection, DeviceFilter, DeviceRecord, DeviceStatus, GraphDataPoint, InterfaceUpsert,
    MonitoringSample, RetentionReport, StorageBackend, StorageResult,
};
use crate::topology::{TopologyEvent, TopologyHub};

/// `data_type` values written by the configuration pass
pub const CONFIG_KINDS: [&str; 6] = [
    "dhcp_leases",
    "queues",
    "interfaces",
    "firewall_rules",
    "wireless_interfaces",
    "wireless_clients",
];

/// Source of "now"; replaced in tests to pin the retention cutoff
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

#[derive(Debug, Clone)]
pub struct CollectionSettings {
    pub max_concurrency: usize,
    pub device_timeout: Duration,
    pub retention: chrono::Duration,
    /// Upper bound on skipped cycles; `0` disables backoff
    pub max_backoff_cycles: u32,
    /// Run the SSH configuration pass every n cycles; `0` disables it
    pub config_every_cycles: u64,
    pub network_ranges: Vec<String>,
}

impl Default for CollectionSettings {
    fn default() -> Self {
        Self {
            max_concurrency: 10,
            device_timeout: Duration::from_secs(30),
            retention: chrono::Duration::days(30),
            max_backoff_cycles: 8,
            config_every_cycles: 0,
            network_ranges: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceFailure {
    pub device_id: String,
    pub message: String,
}

/// Outcome of one collection cycle
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CycleReport {
    pub cycle: u64,
    pub attempted: usize,
    /// Devices that yielded at least one data point
    pub succeeded: usize,
    pub failures: Vec<DeviceFailure>,
    /// Devices sitting out this cycle because of backoff
    pub skipped: usize,
    pub data_points: usize,
    pub retention_rows: u64,
    pub config_snapshots: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default)]
struct Backoff {
    failures: u32,
    skip_remaining: u32,
}

impl Backoff {
    fn record_failure(&mut self, max_cycles: u32) {
        self.failures = self.failures.saturating_add(1);
        if max_cycles > 0 {
            let exp = 1u32.checked_shl(self.failures - 1).unwrap_or(u32::MAX);
            self.skip_remaining = exp.min(max_cycles);
        }
    }
}

enum DeviceOutcome {
    Collected { points: usize },
    Failed(String),
}

pub struct CollectionManager {
    storage: Arc<dyn StorageBackend>,
    primary: Arc<dyn MetricsSource>,
    fallback: Option<Arc<dyn MetricsSource>>,
    registry: Option<DeviceRegistry>,
    discovery: Option<Arc<dyn Discovery>>,
    hub: Option<TopologyHub>,
    settings: CollectionSettings,
    semaphore: Arc<Semaphore>,
    availability: Mutex<HashMap<String, bool>>,
    backoff: Mutex<HashMap<String, Backoff>>,
    cycle: AtomicU64,
    clock: Clock,
}

impl CollectionManager {
    pub fn new(
        storage: Arc<dyn StorageBackend>,
        primary: Arc<dyn MetricsSource>,
        settings: CollectionSettings,
    ) -> Self {
        let permits = settings.max_concurrency.max(1);
        Self {
            storage,
            primary,
            fallback: None,
            registry: None,
            discovery: None,
            hub: None,
            settings,
            semaphore: Arc::new(Semaphore::new(permits)),
            availability: Mutex::new(HashMap::new()),
            backoff: Mutex::new(HashMap::new()),
            cycle: AtomicU64::new(0),
            clock: Arc::new(Utc::now),
        }
    }

    pub fn with_fallback(mut self, fallback: Arc<dyn MetricsSource>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    /// Sessions used by the configuration pass
    pub fn with_registry(mut self, registry: DeviceRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn with_discovery(mut self, discovery: Arc<dyn Discovery>) -> Self {
        self.discovery = Some(discovery);
        self
    }

    pub fn with_hub(mut self, hub: TopologyHub) -> Self {
        self.hub = Some(hub);
        self
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn settings(&self) -> &CollectionSettings {
        &self.settings
    }

    fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    #[instrument(skip(self))]
    pub async fn run_cycle(&self) -> anyhow::Result<CycleReport> {
        let cycle = self.cycle.fetch_add(1, Ordering::SeqCst) + 1;
        let started_at = self.now();
        info!("starting collection cycle {cycle}");

        self.discover().await;

        let devices: Vec<DeviceRecord> = self
            .storage
            .list_devices(&DeviceFilter {
                vendor: Some("MikroTik".to_string()),
                limit: u32::MAX,
                ..Default::default()
            })
            .await?
            .into_iter()
            .filter(DeviceRecord::is_routeros)
            .collect();

        let mut due = Vec::with_capacity(devices.len());
        let mut skipped = 0;
        {
            let mut backoff = self.backoff.lock().await;
            for device in &devices {
                match backoff.get_mut(&device.device_id) {
                    Some(state) if state.skip_remaining > 0 => {
                        state.skip_remaining -= 1;
                        skipped += 1;
                        debug!(device_id = %device.device_id, "backing off, {} cycles left", state.skip_remaining);
                    }
                    _ => due.push(DeviceTarget::from(device)),
                }
            }
        }

        let outcomes = join_all(due.iter().map(|target| self.poll_device(target))).await;

        let mut report = CycleReport {
            cycle,
            attempted: due.len(),
            skipped,
            started_at,
            ..Default::default()
        };
        for (target, outcome) in due.iter().zip(outcomes) {
            match outcome {
                DeviceOutcome::Collected { points } => {
                    report.succeeded += 1;
                    report.data_points += points;
                }
                DeviceOutcome::Failed(message) => report.failures.push(DeviceFailure {
                    device_id: target.device_id.clone(),
                    message,
                }),
            }
        }

        match self.sweep_retention().await {
            Ok(removed) => report.retention_rows = removed.total(),
            Err(e) => warn!("retention sweep failed: {e}"),
        }

        let every = self.settings.config_every_cycles;
        if every > 0 && cycle % every == 0 {
            report.config_snapshots = self.run_config_pass(&devices).await;
        }

        report.finished_at = self.now();
        info!(
            "cycle {cycle}: {}/{} devices collected, {} failed, {} backed off, {} points",
            report.succeeded,
            report.attempted,
            report.failures.len(),
            report.skipped,
            report.data_points
        );

        if let Some(hub) = &self.hub {
            hub.broadcast(&TopologyEvent::CollectionCompleted(report.clone()))
                .await;
        }

        Ok(report)
    }

    async fn discover(&self) {
        let Some(discovery) = &self.discovery else {
            return;
        };

        let mut changed = DiscoverySummary::default();
        for range in &self.settings.network_ranges {
            let found = match discovery.discover(range).await {
                Ok(found) => found,
                Err(e) => {
                    warn!("discovery of {range} failed: {e:#}");
                    continue;
                }
            };
            match record_discovery(self.storage.as_ref(), &found, "discovery").await {
                Ok(summary) => {
                    changed.devices += summary.devices;
                    changed.connections += summary.connections;
                }
                Err(e) => warn!("failed to record discovery of {range}: {e}"),
            }
        }

        if changed.devices > 0
            && let Some(hub) = &self.hub
        {
            hub.broadcast(&TopologyEvent::DevicesUpdated(changed)).await;
        }
    }

    /// Collect and persist one device under the concurrency cap
    async fn poll_device(&self, target: &DeviceTarget) -> DeviceOutcome {
        let Ok(_permit) = self.semaphore.acquire().await else {
            return DeviceOutcome::Failed("collection manager shut down".to_string());
        };

        let limit = self.settings.device_timeout;
        let result = match timeout(limit, self.collect_device(target)).await {
            Ok(result) => result,
            Err(_) => Err(CollectError::Timeout(limit)),
        };

        let outcome = match result {
            Ok((points, source)) => self.persist(target, &points, source).await,
            Err(e) => Err(e),
        };

        match outcome {
            Ok(count) => {
                self.backoff.lock().await.remove(&target.device_id);
                DeviceOutcome::Collected { points: count }
            }
            Err(e) => {
                warn!(device_id = %target.device_id, ip = %target.ip_address, "collection failed: {e}");
                self.backoff
                    .lock()
                    .await
                    .entry(target.device_id.clone())
                    .or_default()
                    .record_failure(self.settings.max_backoff_cycles);
                if let Err(e) = self
                    .storage
                    .set_device_status(&target.device_id, DeviceStatus::Offline, self.now())
                    .await
                {
                    warn!(device_id = %target.device_id, "failed to mark device offline: {e}");
                }
                DeviceOutcome::Failed(e.to_string())
            }
        }
    }

    /// Primary source when it is known to work, otherwise the fallback
    async fn collect_device(&self, target: &DeviceTarget) -> CollectResult<(Vec<GraphDataPoint>, &'static str)> {
        let cached = self.availability.lock().await.get(&target.device_id).copied();
        let available = match cached {
            Some(available) => available,
            None => {
                let available = self.primary.probe(target).await;
                debug!(device_id = %target.device_id, "{} available: {available}", self.primary.name());
                self.availability
                    .lock()
                    .await
                    .insert(target.device_id.clone(), available);
                available
            }
        };

        if available {
            match self.primary.collect(target).await {
                Ok(points) if !points.is_empty() => return Ok((points, self.primary.name())),
                Ok(_) => debug!(device_id = %target.device_id, "{} returned no data", self.primary.name()),
                Err(e) => debug!(device_id = %target.device_id, "{} failed: {e}", self.primary.name()),
            }
            // re-probe next cycle
            self.availability.lock().await.remove(&target.device_id);
        }

        if let Some(fallback) = &self.fallback {
            match fallback.collect(target).await {
                Ok(points) if !points.is_empty() => return Ok((points, fallback.name())),
                Ok(_) => debug!(device_id = %target.device_id, "{} returned no data", fallback.name()),
                Err(e) => debug!(device_id = %target.device_id, "{} failed: {e}", fallback.name()),
            }
        }

        Err(CollectError::UpstreamUnavailable)
    }

    async fn persist(&self, target: &DeviceTarget, points: &[GraphDataPoint], source: &str) -> CollectResult<usize> {
        let summary = MonitoringSample::summarize(points, source, self.now());
        self.storage
            .record_collection(&target.device_id, points, &summary)
            .await?;
        debug!(device_id = %target.device_id, "stored {} points from {source}", points.len());
        Ok(points.len())
    }

    /// Delete history older than the retention window, measured from the clock
    pub async fn sweep_retention(&self) -> StorageResult<RetentionReport> {
        let cutoff = self.now() - self.settings.retention;
        self.storage.cleanup_old_monitoring(cutoff).await
    }

    /// Snapshot leases, queues, interfaces, firewall and wireless state over
    /// SSH for every registered device; returns the number of snapshots written
    #[instrument(skip_all, fields(devices = devices.len()))]
    pub async fn run_config_pass(&self, devices: &[DeviceRecord]) -> usize {
        let Some(registry) = &self.registry else {
            return 0;
        };

        let passes = devices.iter().map(|device| async move {
            if !registry.contains(&device.device_id).await {
                return 0;
            }
            let Ok(_permit) = self.semaphore.acquire().await else {
                return 0;
            };

            let limit = self.settings.device_timeout;
            match timeout(limit, self.snapshot_device(registry, &device.device_id)).await {
                Ok(Ok(count)) => count,
                Ok(Err(e)) => {
                    warn!(device_id = %device.device_id, ip = %device.ip_address, "config pass failed: {e:#}");
                    0
                }
                Err(_) => {
                    warn!(device_id = %device.device_id, ip = %device.ip_address, "config pass timed out after {limit:?}");
                    registry.disconnect_device(&device.device_id).await;
                    0
                }
            }
        });

        join_all(passes).await.into_iter().sum()
    }

    async fn snapshot_device(&self, registry: &DeviceRegistry, device_id: &str) -> anyhow::Result<usize> {
        let client = registry.client(device_id).await?;
        let mut collection = ConfigCollection::default();

        macro_rules! snapshot {
            ($kind:literal, $call:expr) => {
                match $call.await {
                    Ok(items) => collection
                        .snapshots
                        .push(($kind.to_string(), serde_json::to_value(&items)?)),
                    Err(e) => warn!(device_id, "skipping {}: {e}", $kind),
                }
            };
        }

        snapshot!("dhcp_leases", client.dhcp_leases());
        snapshot!("queues", client.queues());
        snapshot!("firewall_rules", client.firewall_rules());
        snapshot!("wireless_interfaces", client.wireless_interfaces());
        snapshot!("wireless_clients", client.wireless_clients());

        match client.interfaces().await {
            Ok(interfaces) => {
                collection
                    .snapshots
                    .push(("interfaces".to_string(), serde_json::to_value(&interfaces)?));
                collection.interfaces = interfaces.iter().map(interface_upsert).collect();
            }
            Err(e) => warn!(device_id, "skipping interfaces: {e}"),
        }

        let written = collection.snapshots.len();
        self.storage
            .record_config_collection(device_id, &collection)
            .await?;
        debug!(device_id, "stored {written} config snapshots");
        Ok(written)
    }
}

fn interface_upsert(interface: &InterfaceConfig) -> InterfaceUpsert {
    let status = if interface.disabled {
        "down"
    } else if interface.running {
        "up"
    } else {
        "down"
    };
    let non_empty = |s: &str| (!s.is_empty()).then(|| s.to_string());

    InterfaceUpsert {
        interface_name: interface.name.clone(),
        description: non_empty(&interface.comment),
        mac_address: non_empty(&interface.mac_address),
        status: status.to_string(),
        admin_status: Some(if interface.disabled { "disabled" } else { "enabled" }.to_string()),
        interface_type: non_empty(&interface.kind),
        mtu: Some(interface.mtu),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::discovery::{DiscoveredDevice, StaticDiscovery};
    use crate::device::registry::TransportFactory;
    use crate::session::SessionConfig;
    use crate::session::mock::{ScriptedFactory, ScriptedTransport};
    use crate::session::ssh::SshTarget;
    use crate::storage::sqlite::SqliteBackend;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;

    /// Answers with one cpu point; fails for listed device ids
    struct FakeSource {
        name: &'static str,
        available: bool,
        failing: Vec<String>,
        probes: AtomicUsize,
        collects: AtomicUsize,
    }

    impl FakeSource {
        fn new(name: &'static str, available: bool) -> Self {
            Self {
                name,
                available,
                failing: Vec::new(),
                probes: AtomicUsize::new(0),
                collects: AtomicUsize::new(0),
            }
        }

        fn failing(mut self, device_id: &str) -> Self {
            self.failing.push(device_id.to_string());
            self
        }
    }

    #[async_trait]
    impl MetricsSource for FakeSource {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn probe(&self, _target: &DeviceTarget) -> bool {
            self.probes.fetch_add(1, Ordering::SeqCst);
            self.available
        }

        async fn collect(&self, target: &DeviceTarget) -> CollectResult<Vec<GraphDataPoint>> {
            self.collects.fetch_add(1, Ordering::SeqCst);
            if self.failing.contains(&target.device_id) {
                return Err(CollectError::Http("connection refused".to_string()));
            }
            Ok(vec![GraphDataPoint {
                device_id: target.device_id.clone(),
                timestamp: Utc::now(),
                metric_type: "system".to_string(),
                metric_name: "cpu_load".to_string(),
                value: 5.0,
                unit: "percent".to_string(),
                interface_name: None,
            }])
        }
    }

    async fn storage_with(devices: &[&str]) -> (tempfile::TempDir, Arc<SqliteBackend>) {
        let temp_dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(SqliteBackend::new(temp_dir.path().join("test.db")).await.unwrap());
        let found: Vec<DiscoveredDevice> = devices
            .iter()
            .map(|ip| DiscoveredDevice::new(*ip, "MikroTik"))
            .collect();
        record_discovery(storage.as_ref(), &found, "test").await.unwrap();
        (temp_dir, storage)
    }

    #[test]
    fn test_backoff_grows_and_caps() {
        let mut backoff = Backoff::default();
        let mut skips = Vec::new();
        for _ in 0..6 {
            backoff.record_failure(8);
            skips.push(backoff.skip_remaining);
        }
        assert_eq!(skips, vec![1, 2, 4, 8, 8, 8]);

        let mut disabled = Backoff::default();
        disabled.record_failure(0);
        assert_eq!(disabled.skip_remaining, 0);
    }

    #[tokio::test]
    async fn test_primary_availability_is_cached() {
        let (_dir, storage) = storage_with(&["10.0.0.1"]).await;
        let primary = Arc::new(FakeSource::new("rest", true));
        let manager = CollectionManager::new(storage.clone(), primary.clone(), CollectionSettings::default());

        manager.run_cycle().await.unwrap();
        let report = manager.run_cycle().await.unwrap();

        assert_eq!(report.succeeded, 1);
        assert_eq!(primary.probes.load(Ordering::SeqCst), 1);
        assert_eq!(primary.collects.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_fallback_used_when_primary_unavailable() {
        let (_dir, storage) = storage_with(&["10.0.0.1"]).await;
        let primary = Arc::new(FakeSource::new("rest", false));
        let fallback = Arc::new(FakeSource::new("snmp", true));
        let manager = CollectionManager::new(storage.clone(), primary.clone(), CollectionSettings::default())
            .with_fallback(fallback.clone());

        let report = manager.run_cycle().await.unwrap();

        assert_eq!(report.succeeded, 1);
        assert_eq!(primary.collects.load(Ordering::SeqCst), 0);
        let latest = storage.latest_monitoring(10).await.unwrap();
        assert_eq!(latest[0].sample.source.as_deref(), Some("snmp"));
    }

    #[tokio::test]
    async fn test_failed_device_is_marked_offline_and_backed_off() {
        let (_dir, storage) = storage_with(&["10.0.0.1", "10.0.0.2"]).await;
        let primary = Arc::new(FakeSource::new("rest", true).failing("mikrotik_10.0.0.2"));
        let manager = CollectionManager::new(storage.clone(), primary, CollectionSettings::default());

        let first = manager.run_cycle().await.unwrap();
        let second = manager.run_cycle().await.unwrap();
        let third = manager.run_cycle().await.unwrap();

        assert_eq!(first.succeeded, 1);
        assert_eq!(first.failures.len(), 1);
        assert_eq!(first.failures[0].device_id, "mikrotik_10.0.0.2");
        assert_eq!(second.skipped, 1);
        assert_eq!(second.attempted, 1);
        assert_eq!(third.attempted, 2);
        let device = storage
            .get_device_by_device_id("mikrotik_10.0.0.2")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(device.status, DeviceStatus::Offline);
    }

    #[tokio::test]
    async fn test_non_routeros_devices_are_not_polled() {
        let (_dir, storage) = storage_with(&["10.0.0.1"]).await;
        record_discovery(storage.as_ref(), &[DiscoveredDevice::new("10.0.0.9", "Cisco")], "test")
            .await
            .unwrap();
        let manager = CollectionManager::new(
            storage,
            Arc::new(FakeSource::new("rest", true)),
            CollectionSettings::default(),
        );

        let report = manager.run_cycle().await.unwrap();

        assert_eq!(report.attempted, 1);
    }

    #[tokio::test]
    async fn test_discovery_runs_before_polling() {
        let temp_dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(SqliteBackend::new(temp_dir.path().join("test.db")).await.unwrap());
        let discovery = StaticDiscovery::new(vec![DiscoveredDevice::new("192.168.88.1", "MikroTik")]);
        let settings = CollectionSettings {
            network_ranges: vec!["192.168.88.0/24".to_string()],
            ..Default::default()
        };
        let manager = CollectionManager::new(storage, Arc::new(FakeSource::new("rest", true)), settings)
            .with_discovery(Arc::new(discovery));

        let report = manager.run_cycle().await.unwrap();

        assert_eq!(report.succeeded, 1);
    }

    #[tokio::test]
    async fn test_config_pass_writes_snapshots() {
        let (_dir, storage) = storage_with(&["10.0.0.1"]).await;
        let transport = ScriptedTransport::new("admin", "gw")
            .respond(
                "/interface print detail",
                "Flags: D - dynamic, R - running\nname: ether1\ntype: ether\nmtu: 1500\nrunning: true",
            )
            .respond("/ip dhcp-server lease print detail", "address: 192.168.88.10\nmac-address: AA:BB:CC:DD:EE:FF");
        let factory: Arc<dyn TransportFactory> = Arc::new(ScriptedFactory::new(transport));
        let registry = DeviceRegistry::new(factory, SessionConfig::default());
        registry
            .add_device("mikrotik_10.0.0.1", SshTarget::password("10.0.0.1", "admin", "secret"))
            .await;
        let settings = CollectionSettings {
            config_every_cycles: 1,
            ..Default::default()
        };
        let manager = CollectionManager::new(storage.clone(), Arc::new(FakeSource::new("rest", true)), settings)
            .with_registry(registry);

        let report = manager.run_cycle().await.unwrap();

        // leases and interfaces succeed; the rest answer with a syntax error
        assert_eq!(report.config_snapshots, 2);
        let device = storage
            .get_device_by_device_id("mikrotik_10.0.0.1")
            .await
            .unwrap()
            .unwrap();
        let interfaces = storage.device_interfaces(device.id).await.unwrap();
        assert_eq!(interfaces.len(), 1);
        assert_eq!(interfaces[0].status, "up");
        assert_eq!(interfaces[0].mtu, Some(1500));
    }
}
