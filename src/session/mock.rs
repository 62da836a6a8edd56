//! Scripted RouterOS console for tests
//!
//! Emulates the parts of the RouterOS shell the session relies on: a login
//! banner, a `[user@identity] > ` prompt, command echo, and canned output per
//! command. Unknown commands answer with a syntax error like the real CLI.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use super::ssh::SshTarget;
use super::{SessionError, SessionResult, Transport};
use crate::device::registry::TransportFactory;

const BANNER: &str = "\r\n\r\n  MMM      MMM       KKK                          TTTTTTTTTTT      KKK\r\n  MikroTik RouterOS (c) 1999-2024       https://www.mikrotik.com/\r\n\r\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OpenBehavior {
    Accept,
    RejectCredentials,
    Unreachable,
    Silent,
}

#[derive(Debug, Default)]
struct LogInner {
    commands: Vec<String>,
    opens: usize,
    closes: usize,
}

/// Shared record of what a scripted transport saw
#[derive(Debug, Clone, Default)]
pub struct ScriptLog {
    inner: Arc<Mutex<LogInner>>,
}

impl ScriptLog {
    fn with<R>(&self, f: impl FnOnce(&mut LogInner) -> R) -> R {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut inner)
    }

    pub fn commands(&self) -> Vec<String> {
        self.with(|log| log.commands.clone())
    }

    pub fn opens(&self) -> usize {
        self.with(|log| log.opens)
    }

    pub fn closes(&self) -> usize {
        self.with(|log| log.closes)
    }
}

#[derive(Debug, Clone)]
pub struct ScriptedTransport {
    identity: String,
    responses: HashMap<String, String>,
    hang_on: HashSet<String>,
    open_behavior: OpenBehavior,
    open_delay: Option<Duration>,
    chunk_size: Option<usize>,
    redraw_prompt: bool,
    pending: VecDeque<Vec<u8>>,
    open: bool,
    log: ScriptLog,
}

impl ScriptedTransport {
    pub fn new(user: &str, identity: &str) -> Self {
        Self {
            identity: format!("{user}@{identity}"),
            responses: HashMap::new(),
            hang_on: HashSet::new(),
            open_behavior: OpenBehavior::Accept,
            open_delay: None,
            chunk_size: None,
            redraw_prompt: false,
            pending: VecDeque::new(),
            open: false,
            log: ScriptLog::default(),
        }
    }

    /// Canned output for `command`, lines separated by `\n`
    pub fn respond(mut self, command: &str, output: &str) -> Self {
        self.responses
            .insert(command.trim().to_string(), output.to_string());
        self
    }

    /// Echo `command` but never return to the prompt
    pub fn hang_on(mut self, command: &str) -> Self {
        self.hang_on.insert(command.trim().to_string());
        self
    }

    pub fn reject_credentials(mut self) -> Self {
        self.open_behavior = OpenBehavior::RejectCredentials;
        self
    }

    pub fn unreachable(mut self) -> Self {
        self.open_behavior = OpenBehavior::Unreachable;
        self
    }

    /// Open succeeds but the shell never prints a prompt
    pub fn silent(mut self) -> Self {
        self.open_behavior = OpenBehavior::Silent;
        self
    }

    pub fn open_delay(mut self, delay: Duration) -> Self {
        self.open_delay = Some(delay);
        self
    }

    /// Deliver output in pieces of at most `size` bytes
    pub fn chunked(mut self, size: usize) -> Self {
        self.chunk_size = Some(size.max(1));
        self
    }

    /// Print the prompt a second time after login, as a RouterOS PTY does
    /// once the terminal size is negotiated
    pub fn redraw_prompt(mut self) -> Self {
        self.redraw_prompt = true;
        self
    }

    pub fn log(&self) -> ScriptLog {
        self.log.clone()
    }

    fn prompt(&self) -> String {
        format!("[{}] > ", self.identity)
    }

    fn enqueue(&mut self, text: &str) {
        let bytes = text.as_bytes();
        match self.chunk_size {
            Some(size) => {
                for piece in bytes.chunks(size) {
                    self.pending.push_back(piece.to_vec());
                }
            }
            None => self.pending.push_back(bytes.to_vec()),
        }
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn open(&mut self) -> SessionResult<()> {
        if let Some(delay) = self.open_delay {
            tokio::time::sleep(delay).await;
        }
        self.log.with(|log| log.opens += 1);

        match self.open_behavior {
            OpenBehavior::RejectCredentials => {
                Err(SessionError::Authentication("rejected by server".to_string()))
            }
            OpenBehavior::Unreachable => {
                Err(SessionError::Transport("connection refused".to_string()))
            }
            OpenBehavior::Silent => {
                self.open = true;
                self.enqueue(BANNER);
                Ok(())
            }
            OpenBehavior::Accept => {
                self.open = true;
                self.pending.clear();
                let greeting = format!("{BANNER}\x1b[m{}", self.prompt());
                self.enqueue(&greeting);
                if self.redraw_prompt {
                    let redraw = format!("\r{}", self.prompt());
                    self.enqueue(&redraw);
                }
                Ok(())
            }
        }
    }

    async fn write(&mut self, data: &[u8]) -> SessionResult<()> {
        if !self.open {
            return Err(SessionError::Transport("channel not open".to_string()));
        }

        let command = String::from_utf8_lossy(data).trim().to_string();
        self.log.with(|log| log.commands.push(command.clone()));

        if self.hang_on.contains(&command) {
            self.enqueue(&format!("{command}\r\n"));
            return Ok(());
        }

        let body = self
            .responses
            .get(&command)
            .cloned()
            .unwrap_or_else(|| "syntax error (line 1 column 1)".to_string());
        let body = body.replace('\n', "\r\n");
        let reply = format!("{command}\r\n{body}\r\n\r\n{}", self.prompt());
        self.enqueue(&reply);
        Ok(())
    }

    async fn read(&mut self) -> SessionResult<Option<Vec<u8>>> {
        if let Some(chunk) = self.pending.pop_front() {
            return Ok(Some(chunk));
        }
        if !self.open {
            return Ok(None);
        }
        std::future::pending::<SessionResult<Option<Vec<u8>>>>().await
    }

    async fn close(&mut self) {
        self.open = false;
        self.pending.clear();
        self.log.with(|log| log.closes += 1);
    }

    fn peer(&self) -> String {
        format!("scripted:{}", self.identity)
    }
}

/// Hands out scripted transports per host, falling back to a template
#[derive(Debug, Clone)]
pub struct ScriptedFactory {
    template: ScriptedTransport,
    per_host: HashMap<String, ScriptedTransport>,
}

impl ScriptedFactory {
    pub fn new(template: ScriptedTransport) -> Self {
        Self {
            template,
            per_host: HashMap::new(),
        }
    }

    pub fn with_host(mut self, host: &str, transport: ScriptedTransport) -> Self {
        self.per_host.insert(host.to_string(), transport);
        self
    }
}

impl TransportFactory for ScriptedFactory {
    fn create(&self, target: &SshTarget) -> Box<dyn Transport> {
        let transport = self
            .per_host
            .get(&target.host)
            .unwrap_or(&self.template)
            .clone();
        Box::new(transport)
    }
}
