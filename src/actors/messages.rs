//! Message types for actor communication
//!
//! Commands are request/response messages sent to a specific actor over
//! mpsc; replies travel back on a oneshot channel carried in the command.

use tokio::sync::oneshot;

use crate::collection::CycleReport;

/// Commands accepted by the [`CollectionActor`](super::collector::CollectionActor)
#[derive(Debug)]
pub enum CollectorCommand {
    /// Run a cycle immediately, outside the interval timer
    RunNow {
        respond_to: oneshot::Sender<anyhow::Result<CycleReport>>,
    },

    /// Report of the most recent finished cycle
    LastReport {
        respond_to: oneshot::Sender<Option<CycleReport>>,
    },

    /// Change the cycle interval; the timer restarts from now
    UpdateInterval { interval_secs: u64 },

    /// Stop after the in-flight cycle, if any
    Shutdown,
}
