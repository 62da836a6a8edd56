//! Periodic metrics collection from RouterOS devices
//!
//! ## Paths
//!
//! ```text
//! CollectionManager ──► RestMetricsClient (/rest/...)   primary, probed once and cached
//!        │          └─► SnmpCollector (two OIDs)         fallback, per community string
//!        ▼
//!   StorageBackend::record_collection (one transaction per device)
//! ```
//!
//! Every source sits behind [`MetricsSource`], so tests swap in fakes that
//! count in-flight calls or stall on purpose.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::storage::{DeviceRecord, GraphDataPoint, StorageError};

pub mod discovery;
pub mod manager;
pub mod metrics_api;
pub mod snmp;

pub use discovery::{DiscoveredDevice, Discovery, DiscoverySummary, StaticDiscovery};
pub use manager::{CONFIG_KINDS, CollectionManager, CollectionSettings, CycleReport, DeviceFailure};
pub use metrics_api::RestMetricsClient;
pub use snmp::SnmpCollector;

/// What a metrics source needs to reach one device
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceTarget {
    pub device_id: String,
    pub ip_address: String,
    pub hostname: Option<String>,
}

impl DeviceTarget {
    pub fn new(device_id: impl Into<String>, ip_address: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            ip_address: ip_address.into(),
            hostname: None,
        }
    }

    /// Name for log lines
    pub fn label(&self) -> &str {
        self.hostname.as_deref().unwrap_or(&self.ip_address)
    }
}

impl From<&DeviceRecord> for DeviceTarget {
    fn from(device: &DeviceRecord) -> Self {
        Self {
            device_id: device.device_id.clone(),
            ip_address: device.ip_address.clone(),
            hostname: device.hostname.clone(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CollectError {
    #[error("http request failed: {0}")]
    Http(String),

    #[error("unexpected response from {endpoint}: {message}")]
    InvalidResponse { endpoint: String, message: String },

    #[error("snmp query failed: {0}")]
    Snmp(String),

    #[error("no metrics source produced data")]
    UpstreamUnavailable,

    #[error("collection timed out after {0:?}")]
    Timeout(Duration),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl From<reqwest::Error> for CollectError {
    fn from(err: reqwest::Error) -> Self {
        CollectError::Http(err.to_string())
    }
}

pub type CollectResult<T> = Result<T, CollectError>;

/// A way of pulling graph points from a device
#[async_trait]
pub trait MetricsSource: Send + Sync {
    /// Short tag stored with each monitoring row (`rest`, `snmp`)
    fn name(&self) -> &'static str;

    /// Cheap reachability check; `false` means "do not try `collect`"
    async fn probe(&self, target: &DeviceTarget) -> bool;

    async fn collect(&self, target: &DeviceTarget) -> CollectResult<Vec<GraphDataPoint>>;
}
