//! Prompt-driven command execution over a [`Transport`]

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::{Instant, timeout, timeout_at};
use tracing::{debug, info, instrument, trace, warn};

use super::prompt::{CommandOutput, PromptMatcher, split_output, strip_terminal_noise};
use super::{SessionError, SessionResult, SessionState, Transport};

/// Session handle shared between tasks; callers queue in FIFO order
pub type SharedSession = Arc<Mutex<SessionClient>>;

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Bound for establishing the transport (TCP, handshake, auth, shell)
    pub connect_timeout: Duration,

    /// Bound for the first prompt after the shell starts
    pub prompt_timeout: Duration,

    /// Default bound for a command's prompt to reappear
    pub command_timeout: Duration,

    pub prompt: PromptMatcher,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            prompt_timeout: Duration::from_secs(10),
            command_timeout: Duration::from_secs(10),
            prompt: PromptMatcher::default(),
        }
    }
}

enum ReadFailure {
    Timeout,
    Session(SessionError),
}

pub struct SessionClient {
    transport: Box<dyn Transport>,
    state: SessionState,
    config: SessionConfig,
    peer: String,
}

impl SessionClient {
    pub fn new(transport: Box<dyn Transport>, config: SessionConfig) -> Self {
        let peer = transport.peer();
        Self {
            transport,
            state: SessionState::Disconnected,
            config,
            peer,
        }
    }

    pub fn into_shared(self) -> SharedSession {
        Arc::new(Mutex::new(self))
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == SessionState::Ready
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Open the transport and wait for the first prompt
    ///
    /// Connecting an already ready session is a no-op. A session left in
    /// `Connecting` or `Executing` by a cancelled call is torn down first.
    #[instrument(skip(self), fields(peer = %self.peer))]
    pub async fn connect(&mut self) -> SessionResult<()> {
        match self.state {
            SessionState::Ready => return Ok(()),
            SessionState::Connecting | SessionState::Executing => {
                debug!("discarding half-open session before reconnecting");
                self.transport.close().await;
            }
            SessionState::Disconnected => {}
        }

        self.state = SessionState::Connecting;

        match timeout(self.config.connect_timeout, self.transport.open()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!("failed to open transport: {e}");
                self.teardown().await;
                return Err(e);
            }
            Err(_) => {
                warn!("transport open timed out");
                self.teardown().await;
                return Err(SessionError::Transport(format!(
                    "connection timed out after {:?}",
                    self.config.connect_timeout
                )));
            }
        }

        match self.read_until_prompt(self.config.prompt_timeout, None).await {
            Ok(banner) => {
                trace!("discarding {} bytes of login banner", banner.len());
                self.state = SessionState::Ready;
                info!("session ready");
                Ok(())
            }
            Err(ReadFailure::Timeout) => {
                warn!("no prompt after connecting");
                self.teardown().await;
                Err(SessionError::PromptTimeout(self.config.prompt_timeout))
            }
            Err(ReadFailure::Session(e)) => {
                self.teardown().await;
                Err(e)
            }
        }
    }

    /// Run one command with the configured command timeout
    pub async fn execute(&mut self, command: &str) -> SessionResult<CommandOutput> {
        let limit = self.config.command_timeout;
        self.execute_with_timeout(command, limit).await
    }

    /// Run one command and collect its output up to the next prompt
    ///
    /// Only valid from `Ready`. The command must be a single line; control
    /// characters are rejected before anything is sent. Output is taken from
    /// the echoed command line to the prompt that follows it, so prompts
    /// redrawn before the echo never end the read. On timeout or transport
    /// failure the session is closed and must be reconnected.
    #[instrument(skip(self), fields(peer = %self.peer))]
    pub async fn execute_with_timeout(
        &mut self,
        command: &str,
        limit: Duration,
    ) -> SessionResult<CommandOutput> {
        if self.state != SessionState::Ready {
            return Err(SessionError::InvalidState {
                expected: SessionState::Ready,
                actual: self.state,
            });
        }

        let command = command.trim();
        if command.chars().any(char::is_control) {
            return Err(SessionError::InvalidArgument(
                "command must be a single line without control characters".to_string(),
            ));
        }

        self.state = SessionState::Executing;
        trace!("sending command");

        let line = format!("{command}\r\n");
        if let Err(e) = self.transport.write(line.as_bytes()).await {
            warn!("failed to send command: {e}");
            self.teardown().await;
            return Err(e);
        }

        let echo = (!command.is_empty()).then_some(command);
        match self.read_until_prompt(limit, echo).await {
            Ok(raw) => {
                self.state = SessionState::Ready;
                let output = split_output(&self.config.prompt, &raw, command);
                debug!(
                    stdout_lines = output.stdout.lines().count(),
                    stderr_lines = output.stderr.lines().count(),
                    "command complete"
                );
                Ok(output)
            }
            Err(ReadFailure::Timeout) => {
                warn!("prompt did not reappear within {limit:?}");
                self.teardown().await;
                Err(SessionError::CommandTimeout {
                    command: command.to_string(),
                    timeout: limit,
                })
            }
            Err(ReadFailure::Session(e)) => {
                warn!("transport failed during command: {e}");
                self.teardown().await;
                Err(e)
            }
        }
    }

    /// Close the transport; never fails
    #[instrument(skip(self), fields(peer = %self.peer))]
    pub async fn disconnect(&mut self) {
        if self.state != SessionState::Disconnected {
            debug!("closing session");
            self.transport.close().await;
        }
        self.state = SessionState::Disconnected;
    }

    async fn teardown(&mut self) {
        self.transport.close().await;
        self.state = SessionState::Disconnected;
    }

    /// Read until the buffer ends in a prompt
    ///
    /// With `echo`, only a prompt after the echoed command line counts and
    /// the result starts at that line.
    async fn read_until_prompt(&mut self, limit: Duration, echo: Option<&str>) -> Result<String, ReadFailure> {
        let deadline = Instant::now() + limit;
        let mut raw: Vec<u8> = Vec::new();

        loop {
            let chunk = match timeout_at(deadline, self.transport.read()).await {
                Err(_) => return Err(ReadFailure::Timeout),
                Ok(Err(e)) => return Err(ReadFailure::Session(e)),
                Ok(Ok(None)) => {
                    return Err(ReadFailure::Session(SessionError::Transport(
                        "channel closed by peer".to_string(),
                    )));
                }
                Ok(Ok(Some(chunk))) => chunk,
            };

            trace!("received {} bytes", chunk.len());
            raw.extend_from_slice(&chunk);

            let text = strip_terminal_noise(&String::from_utf8_lossy(&raw));
            let reply = match echo {
                Some(command) => from_echo(&text, command),
                None => Some(text.as_str()),
            };
            if let Some(reply) = reply
                && self.config.prompt.ends_with_prompt(reply)
            {
                return Ok(reply.to_string());
            }
        }
    }
}

/// Slice of `text` starting at the first line that echoes `command`
fn from_echo<'a>(text: &'a str, command: &str) -> Option<&'a str> {
    let mut start = 0;
    for line in text.split_inclusive('\n') {
        if line.trim().ends_with(command) {
            return Some(&text[start..]);
        }
        start += line.len();
    }
    None
}
