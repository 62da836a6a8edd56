//! Interactive RouterOS console sessions
//!
//! RouterOS exposes its CLI as an interactive shell, so commands are written
//! into a PTY and the output is collected until the prompt reappears. The
//! session owns one [`Transport`] and walks a small state machine:
//!
//! ```text
//! Disconnected ──connect──► Connecting ──prompt──► Ready ◄──┐
//!       ▲                        │                   │      │ prompt
//!       └──── failure ───────────┘                execute   │
//!       ▲                                            ▼      │
//!       └──────── timeout / transport failure ── Executing ─┘
//! ```
//!
//! Commands on one session never interleave: `execute` takes `&mut self`,
//! and shared sessions sit behind a FIFO `tokio::sync::Mutex`.

pub mod client;
pub mod error;
pub mod mock;
pub mod prompt;
pub mod ssh;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use client::{SessionClient, SessionConfig, SharedSession};
pub use error::{SessionError, SessionResult};
pub use prompt::{CommandOutput, PromptMatcher};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Disconnected,
    Connecting,
    Ready,
    Executing,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Disconnected => "disconnected",
            SessionState::Connecting => "connecting",
            SessionState::Ready => "ready",
            SessionState::Executing => "executing",
        };
        f.write_str(name)
    }
}

/// Byte stream to an interactive shell on the device
///
/// `open` establishes the connection, authenticates and starts the shell.
/// `read` waits for the next chunk of shell output; `Ok(None)` means the
/// remote side closed the channel.
#[async_trait]
pub trait Transport: Send {
    async fn open(&mut self) -> SessionResult<()>;

    async fn write(&mut self, data: &[u8]) -> SessionResult<()>;

    async fn read(&mut self) -> SessionResult<Option<Vec<u8>>>;

    /// Best effort, never fails
    async fn close(&mut self);

    /// Human-readable peer for logging
    fn peer(&self) -> String;
}

#[async_trait]
impl Transport for Box<dyn Transport> {
    async fn open(&mut self) -> SessionResult<()> {
        (**self).open().await
    }

    async fn write(&mut self, data: &[u8]) -> SessionResult<()> {
        (**self).write(data).await
    }

    async fn read(&mut self) -> SessionResult<Option<Vec<u8>>> {
        (**self).read().await
    }

    async fn close(&mut self) {
        (**self).close().await
    }

    fn peer(&self) -> String {
        (**self).peer()
    }
}
