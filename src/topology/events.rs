//! Events pushed to real-time subscribers
//!
//! Serialized in the same `{type, data}` shape as WebSocket replies, so
//! clients handle pushes and answers with one decoder.

use serde::{Deserialize, Serialize};

use crate::collection::{CycleReport, DiscoverySummary};
use crate::storage::ScanSession;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum TopologyEvent {
    /// Discovery changed the device set; clients should refetch
    DevicesUpdated(DiscoverySummary),
    CollectionCompleted(CycleReport),
    ScanStarted(ScanSession),
    ScanCompleted(ScanSession),
}

impl TopologyEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            TopologyEvent::DevicesUpdated(_) => "devices_updated",
            TopologyEvent::CollectionCompleted(_) => "collection_completed",
            TopologyEvent::ScanStarted(_) => "scan_started",
            TopologyEvent::ScanCompleted(_) => "scan_completed",
        }
    }
}
