//! SSH transport to the RouterOS console using russh

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use russh::keys::PublicKey;
use russh::keys::key::PrivateKeyWithHashAlg;
use russh::{ChannelMsg, Disconnect, client};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace, warn};

use super::{SessionError, SessionResult, Transport};

const PTY_COLUMNS: u32 = 200;
const PTY_ROWS: u32 = 50;

/// How to authenticate against the device
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum SshAuth {
    Password {
        password: String,
    },
    Key {
        private_key_path: PathBuf,
        passphrase: Option<String>,
    },
}

/// Connection parameters for one device
#[derive(Debug, Clone)]
pub struct SshTarget {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub auth: SshAuth,
    /// RouterOS console flags appended to the login name, e.g. `+cte`
    pub login_suffix: Option<String>,
}

impl SshTarget {
    pub fn password(host: impl Into<String>, username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: 22,
            username: username.into(),
            auth: SshAuth::Password {
                password: password.into(),
            },
            login_suffix: None,
        }
    }

    fn login_name(&self) -> String {
        match &self.login_suffix {
            Some(suffix) => format!("{}{}", self.username, suffix),
            None => self.username.clone(),
        }
    }
}

/// russh callbacks; RouterOS devices are addressed by IP and accepted as-is
struct ClientHandler {
    host: String,
}

impl client::Handler for ClientHandler {
    type Error = russh::Error;

    async fn check_server_key(&mut self, server_public_key: &PublicKey) -> Result<bool, Self::Error> {
        debug!(
            "accepting {} host key for {}",
            server_public_key.algorithm(),
            self.host
        );
        Ok(true)
    }
}

pub struct SshTransport {
    target: SshTarget,
    handle: Option<client::Handle<ClientHandler>>,
    channel: Option<russh::Channel<client::Msg>>,
}

impl SshTransport {
    pub fn new(target: SshTarget) -> Self {
        Self {
            target,
            handle: None,
            channel: None,
        }
    }

    async fn authenticate(&self, handle: &mut client::Handle<ClientHandler>) -> SessionResult<()> {
        let login = self.target.login_name();

        let result = match &self.target.auth {
            SshAuth::Password { password } => handle
                .authenticate_password(&login, password)
                .await
                .map_err(|e| SessionError::Authentication(e.to_string()))?,
            SshAuth::Key {
                private_key_path,
                passphrase,
            } => {
                let key = russh::keys::load_secret_key(private_key_path, passphrase.as_deref())
                    .map_err(|e| SessionError::Authentication(format!("failed to load key: {e}")))?;
                let key_with_hash = PrivateKeyWithHashAlg::new(Arc::new(key), None);

                handle
                    .authenticate_publickey(&login, key_with_hash)
                    .await
                    .map_err(|e| SessionError::Authentication(e.to_string()))?
            }
        };

        if !result.success() {
            return Err(SessionError::Authentication(format!(
                "server rejected credentials for {}",
                self.target.username
            )));
        }

        Ok(())
    }
}

#[async_trait]
impl Transport for SshTransport {
    async fn open(&mut self) -> SessionResult<()> {
        let addr = (self.target.host.as_str(), self.target.port);
        info!("connecting to {}:{}", self.target.host, self.target.port);

        let config = client::Config {
            inactivity_timeout: None,
            keepalive_interval: Some(Duration::from_secs(30)),
            keepalive_max: 3,
            ..Default::default()
        };
        let handler = ClientHandler {
            host: self.target.host.clone(),
        };

        let mut handle = client::connect(Arc::new(config), addr, handler)
            .await
            .map_err(|e| SessionError::Transport(format!("ssh connect failed: {e}")))?;

        debug!("ssh handshake complete");
        self.authenticate(&mut handle).await?;

        let channel = handle.channel_open_session().await?;
        channel
            .request_pty(false, "dumb", PTY_COLUMNS, PTY_ROWS, 0, 0, &[])
            .await?;
        channel.request_shell(false).await?;

        debug!("interactive shell started");
        self.handle = Some(handle);
        self.channel = Some(channel);
        Ok(())
    }

    async fn write(&mut self, data: &[u8]) -> SessionResult<()> {
        let channel = self
            .channel
            .as_ref()
            .ok_or_else(|| SessionError::Transport("channel not open".to_string()))?;
        channel.data(data).await?;
        Ok(())
    }

    async fn read(&mut self) -> SessionResult<Option<Vec<u8>>> {
        let Some(channel) = self.channel.as_mut() else {
            return Ok(None);
        };

        loop {
            match channel.wait().await {
                Some(ChannelMsg::Data { data }) => return Ok(Some(data.to_vec())),
                Some(ChannelMsg::ExtendedData { data, .. }) => return Ok(Some(data.to_vec())),
                Some(ChannelMsg::Eof) | Some(ChannelMsg::Close) | None => {
                    debug!("shell channel closed by device");
                    return Ok(None);
                }
                Some(other) => trace!("ignoring channel message: {other:?}"),
            }
        }
    }

    async fn close(&mut self) {
        if let Some(channel) = self.channel.take() {
            let _ = channel.eof().await;
        }
        if let Some(handle) = self.handle.take()
            && let Err(e) = handle
                .disconnect(Disconnect::ByApplication, "session closed", "en")
                .await
        {
            warn!("ssh disconnect failed: {e}");
        }
    }

    fn peer(&self) -> String {
        format!("{}@{}:{}", self.target.username, self.target.host, self.target.port)
    }
}
