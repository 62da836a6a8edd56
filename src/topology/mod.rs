//! Topology read model and real-time fan-out

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::storage::{
    ConnectionRecord, DeviceRecord, InterfaceRecord, NetworkStatistics, StorageBackend,
    StorageResult, TopologySnapshot,
};

pub mod events;
pub mod hub;

pub use events::TopologyEvent;
pub use hub::{SubscriberId, TopologyHub};

/// One device with everything attached to it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceDetails {
    pub device: DeviceRecord,
    pub interfaces: Vec<InterfaceRecord>,
    pub connections: Vec<ConnectionRecord>,
}

/// Reads shared by the REST routes and the WebSocket commands
#[derive(Clone)]
pub struct TopologyService {
    storage: Arc<dyn StorageBackend>,
    hub: TopologyHub,
}

impl TopologyService {
    pub fn new(storage: Arc<dyn StorageBackend>, hub: TopologyHub) -> Self {
        Self { storage, hub }
    }

    pub fn storage(&self) -> &Arc<dyn StorageBackend> {
        &self.storage
    }

    pub fn hub(&self) -> &TopologyHub {
        &self.hub
    }

    pub async fn snapshot(&self) -> StorageResult<TopologySnapshot> {
        self.storage.topology_snapshot().await
    }

    pub async fn statistics(&self) -> StorageResult<NetworkStatistics> {
        self.storage.statistics().await
    }

    pub async fn device_details(&self, id: i64) -> StorageResult<Option<DeviceDetails>> {
        let Some(device) = self.storage.get_device(id).await? else {
            return Ok(None);
        };
        let interfaces = self.storage.device_interfaces(id).await?;
        let connections = self.storage.device_connections(id).await?;

        Ok(Some(DeviceDetails {
            device,
            interfaces,
            connections,
        }))
    }
}
