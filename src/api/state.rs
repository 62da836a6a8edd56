//! API shared state

use crate::actors::CollectorHandle;
use crate::scan::ScanCoordinator;
use crate::topology::TopologyService;

/// Shared state passed to all API handlers
#[derive(Clone)]
pub struct ApiState {
    /// Reads over devices, interfaces and connections plus the event hub
    pub topology: TopologyService,

    /// Starts background discovery scans
    pub scans: ScanCoordinator,

    /// Collection actor, when the binary runs one
    pub collector: Option<CollectorHandle>,
}

impl ApiState {
    pub fn new(topology: TopologyService, scans: ScanCoordinator) -> Self {
        Self {
            topology,
            scans,
            collector: None,
        }
    }

    pub fn with_collector(mut self, collector: CollectorHandle) -> Self {
        self.collector = Some(collector);
        self
    }
}
