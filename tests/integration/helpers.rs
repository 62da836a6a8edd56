//! Helper functions for integration tests

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use routeros_monitoring::{
    collection::{
        CollectResult, DeviceTarget, DiscoveredDevice, MetricsSource,
        discovery::record_discovery,
    },
    storage::{DeviceRecord, GraphDataPoint, StorageBackend, sqlite::SqliteBackend},
};
use tempfile::TempDir;

pub async fn temp_storage() -> (TempDir, Arc<SqliteBackend>) {
    let temp_dir = tempfile::tempdir().unwrap();
    let storage = SqliteBackend::new(temp_dir.path().join("hub.db")).await.unwrap();
    (temp_dir, Arc::new(storage))
}

/// Insert `count` MikroTik routers at 10.0.<n/250>.<n%250 + 1>
pub async fn seed_routers(storage: &SqliteBackend, count: usize) -> Vec<DeviceRecord> {
    let found: Vec<DiscoveredDevice> = (0..count)
        .map(|n| DiscoveredDevice::new(router_ip(n), "MikroTik"))
        .collect();
    record_discovery(storage, &found, "test").await.unwrap();

    let mut devices = Vec::with_capacity(count);
    for device in &found {
        devices.push(
            storage
                .get_device_by_device_id(&device.device_id())
                .await
                .unwrap()
                .unwrap(),
        );
    }
    devices
}

pub fn router_ip(n: usize) -> String {
    format!("10.0.{}.{}", n / 250, n % 250 + 1)
}

pub fn point(device_id: &str, name: &str, value: f64, at: DateTime<Utc>) -> GraphDataPoint {
    GraphDataPoint {
        device_id: device_id.to_string(),
        timestamp: at,
        metric_type: "system".to_string(),
        metric_name: name.to_string(),
        value,
        unit: "percent".to_string(),
        interface_name: None,
    }
}

/// Metrics source that tracks how many calls run at once
///
/// Each collect sleeps for `delay`; devices listed in `stalled` sleep far
/// past any test timeout.
#[derive(Default)]
pub struct InstrumentedSource {
    delay: Duration,
    stalled: HashSet<String>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    calls: AtomicUsize,
}

impl InstrumentedSource {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            ..Default::default()
        }
    }

    pub fn stall(mut self, device_id: &str) -> Self {
        self.stalled.insert(device_id.to_string());
        self
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MetricsSource for InstrumentedSource {
    fn name(&self) -> &'static str {
        "rest"
    }

    async fn probe(&self, _target: &DeviceTarget) -> bool {
        true
    }

    async fn collect(&self, target: &DeviceTarget) -> CollectResult<Vec<GraphDataPoint>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        let delay = if self.stalled.contains(&target.device_id) {
            Duration::from_secs(60)
        } else {
            self.delay
        };
        tokio::time::sleep(delay).await;

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(vec![point(&target.device_id, "cpu_load", 10.0, Utc::now())])
    }
}
