//! Per-device session bookkeeping
//!
//! The registry maps device ids to connection parameters and lazily opened
//! sessions. A cached session that is no longer `Ready` (timed out, dropped
//! mid-command, closed by the device) is reconnected on next use.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

use super::DeviceClient;
use crate::session::ssh::{SshTarget, SshTransport};
use crate::session::{
    CommandOutput, SessionClient, SessionConfig, SessionError, SessionResult, SharedSession,
    Transport,
};

/// Builds a fresh transport for a device
pub trait TransportFactory: Send + Sync {
    fn create(&self, target: &SshTarget) -> Box<dyn Transport>;
}

#[derive(Debug, Clone, Default)]
pub struct SshTransportFactory;

impl TransportFactory for SshTransportFactory {
    fn create(&self, target: &SshTarget) -> Box<dyn Transport> {
        Box::new(SshTransport::new(target.clone()))
    }
}

struct DeviceEntry {
    target: SshTarget,
    session: Option<SharedSession>,
}

#[derive(Clone)]
pub struct DeviceRegistry {
    devices: Arc<RwLock<HashMap<String, DeviceEntry>>>,
    factory: Arc<dyn TransportFactory>,
    config: SessionConfig,
}

impl DeviceRegistry {
    pub fn new(factory: Arc<dyn TransportFactory>, config: SessionConfig) -> Self {
        Self {
            devices: Arc::new(RwLock::new(HashMap::new())),
            factory,
            config,
        }
    }

    /// Register or replace connection parameters; an existing session is dropped
    pub async fn add_device(&self, device_id: &str, target: SshTarget) {
        let previous = self.devices.write().await.insert(
            device_id.to_string(),
            DeviceEntry {
                target,
                session: None,
            },
        );
        if let Some(DeviceEntry {
            session: Some(session),
            ..
        }) = previous
        {
            session.lock().await.disconnect().await;
        }
        debug!(device_id, "device registered");
    }

    pub async fn remove_device(&self, device_id: &str) -> bool {
        let removed = self.devices.write().await.remove(device_id);
        match removed {
            Some(entry) => {
                if let Some(session) = entry.session {
                    session.lock().await.disconnect().await;
                }
                true
            }
            None => false,
        }
    }

    pub async fn contains(&self, device_id: &str) -> bool {
        self.devices.read().await.contains_key(device_id)
    }

    pub async fn device_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.devices.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Session for the device, connecting if needed
    #[instrument(skip(self))]
    pub async fn session(&self, device_id: &str) -> SessionResult<SharedSession> {
        let (target, cached) = {
            let devices = self.devices.read().await;
            let entry = devices.get(device_id).ok_or_else(|| {
                SessionError::InvalidArgument(format!("unknown device `{device_id}`"))
            })?;
            (entry.target.clone(), entry.session.clone())
        };

        let session = match cached {
            Some(session) => session,
            None => {
                let client = SessionClient::new(self.factory.create(&target), self.config.clone());
                let session = client.into_shared();
                let mut devices = self.devices.write().await;
                match devices.get_mut(device_id) {
                    // another caller may have raced us to create it
                    Some(DeviceEntry {
                        session: Some(existing),
                        ..
                    }) => Arc::clone(existing),
                    Some(entry) => {
                        entry.session = Some(Arc::clone(&session));
                        session
                    }
                    None => {
                        return Err(SessionError::InvalidArgument(format!(
                            "device `{device_id}` was removed"
                        )));
                    }
                }
            }
        };

        {
            let mut guard = session.lock().await;
            if !guard.is_ready() {
                info!(device_id, "connecting to {}", target.host);
                guard.connect().await?;
            }
        }

        Ok(session)
    }

    /// Explicitly connect; returns once the prompt has been seen
    pub async fn connect_device(&self, device_id: &str) -> SessionResult<()> {
        self.session(device_id).await.map(|_| ())
    }

    pub async fn disconnect_device(&self, device_id: &str) {
        let session = self
            .devices
            .read()
            .await
            .get(device_id)
            .and_then(|entry| entry.session.clone());
        if let Some(session) = session {
            session.lock().await.disconnect().await;
        }
    }

    pub async fn disconnect_all(&self) {
        let sessions: Vec<(String, SharedSession)> = self
            .devices
            .read()
            .await
            .iter()
            .filter_map(|(id, entry)| entry.session.clone().map(|s| (id.clone(), s)))
            .collect();

        for (device_id, session) in sessions {
            debug!(device_id, "disconnecting");
            session.lock().await.disconnect().await;
        }
    }

    pub async fn client(&self, device_id: &str) -> SessionResult<DeviceClient> {
        let session = self.session(device_id).await?;
        Ok(DeviceClient::new(device_id, session))
    }

    /// Run a raw command, connecting first when necessary
    pub async fn execute_on_device(&self, device_id: &str, command: &str) -> SessionResult<CommandOutput> {
        let session = self.session(device_id).await?;
        let mut guard = session.lock().await;
        let result = guard.execute(command).await;
        if let Err(e) = &result {
            warn!(device_id, "command failed: {e}");
        }
        result
    }
}
