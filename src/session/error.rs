use thiserror::Error;

use super::SessionState;

/// Result type alias for session operations
pub type SessionResult<T> = Result<T, SessionError>;

#[derive(Debug, Error)]
pub enum SessionError {
    /// Connection, channel or I/O failure
    #[error("transport error: {0}")]
    Transport(String),

    #[error("authentication failed: {0}")]
    Authentication(String),

    /// The shell never showed a prompt after connecting
    #[error("no prompt within {0:?} after connecting")]
    PromptTimeout(std::time::Duration),

    /// The prompt did not reappear after a command
    #[error("command `{command}` did not complete within {timeout:?}")]
    CommandTimeout {
        command: String,
        timeout: std::time::Duration,
    },

    #[error("session is {actual}, expected {expected}")]
    InvalidState {
        expected: SessionState,
        actual: SessionState,
    },

    /// Argument rejected before reaching the device
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The device reported an error for the command
    #[error("device rejected command: {0}")]
    CommandRejected(String),
}

impl From<russh::Error> for SessionError {
    fn from(err: russh::Error) -> Self {
        SessionError::Transport(err.to_string())
    }
}

impl From<std::io::Error> for SessionError {
    fn from(err: std::io::Error) -> Self {
        SessionError::Transport(err.to_string())
    }
}
