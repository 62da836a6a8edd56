//! CollectionActor - runs collection cycles on a timer
//!
//! ## Message Flow
//!
//! ```text
//! Timer tick ──► CollectionManager::run_cycle ──► CycleReport (kept as last report)
//!     ↑
//!     └─── Commands (RunNow, LastReport, UpdateInterval, Shutdown)
//! ```
//!
//! Cycles never overlap: the actor awaits each cycle before looking at the
//! next tick or command, and late ticks are delayed rather than bunched.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Interval, MissedTickBehavior, interval};
use tracing::{debug, error, info, instrument, warn};

use crate::collection::{CollectionManager, CycleReport};

use super::messages::CollectorCommand;

pub struct CollectionActor {
    manager: Arc<CollectionManager>,
    command_rx: mpsc::Receiver<CollectorCommand>,
    interval_duration: Duration,
    last_report: Option<CycleReport>,
}

fn ticker(period: Duration) -> Interval {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

impl CollectionActor {
    pub fn new(
        manager: Arc<CollectionManager>,
        command_rx: mpsc::Receiver<CollectorCommand>,
        interval_duration: Duration,
    ) -> Self {
        Self {
            manager,
            command_rx,
            interval_duration,
            last_report: None,
        }
    }

    /// Runs until a Shutdown command arrives or every handle is dropped
    #[instrument(skip(self), fields(interval = ?self.interval_duration))]
    pub async fn run(mut self) {
        debug!("starting collection actor");

        let mut ticker = ticker(self.interval_duration);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.run_cycle().await {
                        error!("collection cycle failed: {:#}", e);
                    }
                }

                Some(cmd) = self.command_rx.recv() => {
                    match cmd {
                        CollectorCommand::RunNow { respond_to } => {
                            debug!("received RunNow command");
                            let result = self.run_cycle().await;
                            let _ = respond_to.send(result);
                        }

                        CollectorCommand::LastReport { respond_to } => {
                            let _ = respond_to.send(self.last_report.clone());
                        }

                        CollectorCommand::UpdateInterval { interval_secs } => {
                            debug!("updating interval to {interval_secs}s");
                            self.interval_duration = Duration::from_secs(interval_secs.max(1));
                            ticker = self::ticker(self.interval_duration);
                            // the fresh interval fires immediately; skip that tick
                            ticker.reset();
                        }

                        CollectorCommand::Shutdown => {
                            debug!("received shutdown command");
                            break;
                        }
                    }
                }

                else => {
                    warn!("command channel closed, shutting down");
                    break;
                }
            }
        }

        info!("collection actor stopped");
    }

    async fn run_cycle(&mut self) -> Result<CycleReport> {
        let report = self.manager.run_cycle().await?;
        self.last_report = Some(report.clone());
        Ok(report)
    }
}

/// Handle for controlling a CollectionActor; cheap to clone
#[derive(Clone)]
pub struct CollectorHandle {
    sender: mpsc::Sender<CollectorCommand>,
}

impl CollectorHandle {
    pub fn spawn(manager: Arc<CollectionManager>, interval_duration: Duration) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(32);

        let actor = CollectionActor::new(manager, cmd_rx, interval_duration);
        tokio::spawn(actor.run());

        Self { sender: cmd_tx }
    }

    /// Run a cycle now and wait for its report
    pub async fn run_now(&self) -> Result<CycleReport> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(CollectorCommand::RunNow { respond_to: tx })
            .await
            .context("failed to send RunNow command")?;

        rx.await.context("failed to receive response")?
    }

    pub async fn last_report(&self) -> Result<Option<CycleReport>> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(CollectorCommand::LastReport { respond_to: tx })
            .await
            .context("failed to send LastReport command")?;

        rx.await.context("failed to receive response")
    }

    pub async fn update_interval(&self, interval_secs: u64) -> Result<()> {
        self.sender
            .send(CollectorCommand::UpdateInterval { interval_secs })
            .await
            .context("failed to send UpdateInterval command")?;
        Ok(())
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(CollectorCommand::Shutdown)
            .await
            .context("failed to send Shutdown command")?;
        Ok(())
    }
}
