//! Discovery runs with scan-session bookkeeping
//!
//! A scan creates a `running` session, discovers in the background, and
//! finishes the session exactly once: `completed` with counts, or `failed`
//! with the error (timeouts included).

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::Local;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{error, info, instrument};

use crate::collection::discovery::{Discovery, DiscoverySummary, record_discovery};
use crate::storage::{ScanOutcome, ScanSession, StorageBackend, StorageResult};
use crate::topology::{TopologyEvent, TopologyHub};

fn default_scan_type() -> String {
    "full".to_string()
}

fn default_timeout() -> u64 {
    300
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanRequest {
    /// `mndp`, `snmp`, `cdp`, `lldp` or `full`
    #[serde(default = "default_scan_type")]
    pub scan_type: String,
    /// Empty means the configured default ranges
    #[serde(default)]
    pub network_ranges: Vec<String>,
    /// Seconds before the scan is failed
    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

impl Default for ScanRequest {
    fn default() -> Self {
        Self {
            scan_type: default_scan_type(),
            network_ranges: Vec::new(),
            timeout: default_timeout(),
        }
    }
}

#[derive(Clone)]
pub struct ScanCoordinator {
    storage: Arc<dyn StorageBackend>,
    discovery: Arc<dyn Discovery>,
    hub: TopologyHub,
    default_ranges: Vec<String>,
}

impl ScanCoordinator {
    pub fn new(
        storage: Arc<dyn StorageBackend>,
        discovery: Arc<dyn Discovery>,
        hub: TopologyHub,
        default_ranges: Vec<String>,
    ) -> Self {
        Self {
            storage,
            discovery,
            hub,
            default_ranges,
        }
    }

    /// Create the session and run discovery on a background task
    #[instrument(skip(self))]
    pub async fn start_scan(&self, request: &ScanRequest) -> anyhow::Result<(ScanSession, JoinHandle<()>)> {
        let ranges = if request.network_ranges.is_empty() {
            self.default_ranges.clone()
        } else {
            request.network_ranges.clone()
        };
        let range_text = if ranges.is_empty() {
            "default".to_string()
        } else {
            ranges.join(",")
        };
        let name = format!("API Scan - {}", Local::now().format("%Y-%m-%d %H:%M:%S"));

        let session = self
            .storage
            .create_scan_session(&request.scan_type, &range_text, Some(name.as_str()))
            .await
            .context("failed to create scan session")?;
        info!("scan session {} started for {range_text}", session.id);
        self.hub
            .broadcast(&TopologyEvent::ScanStarted(session.clone()))
            .await;

        let this = self.clone();
        let id = session.id;
        let limit = Duration::from_secs(request.timeout.max(1));
        let task = tokio::spawn(async move {
            if let Err(e) = this.run_scan(id, &ranges, limit).await {
                error!("failed to finish scan session {id}: {e}");
            }
        });

        Ok((session, task))
    }

    /// Discover, persist and close the session
    pub async fn run_scan(&self, id: i64, ranges: &[String], limit: Duration) -> StorageResult<ScanSession> {
        let outcome = match tokio::time::timeout(limit, self.discover(ranges)).await {
            Ok(Ok(summary)) => ScanOutcome::Completed {
                devices_discovered: summary.devices as i64,
                connections_discovered: summary.connections as i64,
            },
            Ok(Err(e)) => ScanOutcome::Failed {
                error: format!("{e:#}"),
            },
            Err(_) => ScanOutcome::Failed {
                error: format!("scan timed out after {}s", limit.as_secs()),
            },
        };

        let session = self.storage.complete_scan_session(id, &outcome).await?;
        info!("scan session {id} finished: {}", session.status);

        if session.devices_discovered > 0 {
            let summary = DiscoverySummary {
                devices: session.devices_discovered as usize,
                connections: session.connections_discovered as usize,
            };
            self.hub.broadcast(&TopologyEvent::DevicesUpdated(summary)).await;
        }
        self.hub
            .broadcast(&TopologyEvent::ScanCompleted(session.clone()))
            .await;

        Ok(session)
    }

    async fn discover(&self, ranges: &[String]) -> anyhow::Result<DiscoverySummary> {
        let mut total = DiscoverySummary::default();
        let ranges: Vec<&str> = if ranges.is_empty() {
            vec![""]
        } else {
            ranges.iter().map(String::as_str).collect()
        };

        for range in ranges {
            let found = self
                .discovery
                .discover(range)
                .await
                .with_context(|| format!("discovery of `{range}` failed"))?;
            let summary = record_discovery(self.storage.as_ref(), &found, "scan").await?;
            total.devices += summary.devices;
            total.connections += summary.connections;
        }

        Ok(total)
    }
}
