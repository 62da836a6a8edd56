//! WebSocket endpoint for real-time topology updates
//!
//! Clients send `{"command": ...}` requests and get `{type, data}` replies.
//! Hub events share the socket and the reply shape.

use axum::{
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::Response,
};
use futures::{SinkExt, stream::StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::{
    api::state::ApiState,
    scan::ScanRequest,
    storage::{DeviceFilter, StorageError},
};

/// One reply frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WsReply {
    #[serde(rename = "type")]
    pub kind: String,
    pub data: Value,
}

impl WsReply {
    fn new(kind: &str, data: impl Serialize) -> Self {
        Self {
            kind: kind.to_string(),
            data: serde_json::to_value(data).unwrap_or(Value::Null),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            kind: "error".to_string(),
            data: json!({ "message": message.into() }),
        }
    }
}

impl From<StorageError> for WsReply {
    fn from(err: StorageError) -> Self {
        WsReply::error(err.to_string())
    }
}

/// WebSocket upgrade handler
///
/// GET /ws
pub async fn websocket_handler(ws: WebSocketUpgrade, State(state): State<ApiState>) -> Response {
    ws.on_upgrade(|socket| handle_websocket(socket, state))
}

async fn handle_websocket(socket: WebSocket, state: ApiState) {
    let hub = state.topology.hub().clone();
    let (subscriber_id, mut events) = hub.register().await;
    info!("WebSocket client {subscriber_id} connected");

    let (mut sender, mut receiver) = socket.split();
    let (reply_tx, mut reply_rx) = mpsc::channel::<WsReply>(32);

    // Single writer: replies and hub events are interleaved here
    let mut send_task = tokio::spawn(async move {
        loop {
            let text = tokio::select! {
                Some(reply) = reply_rx.recv() => serde_json::to_string(&reply),
                Some(event) = events.recv() => serde_json::to_string(&event),
                else => break,
            };

            if let Ok(text) = text
                && sender.send(Message::Text(text)).await.is_err()
            {
                debug!("WebSocket send failed, client disconnected");
                break;
            }
        }
    });

    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => {
                    let reply = handle_command(&state, &text).await;
                    if reply_tx.send(reply).await.is_err() {
                        break;
                    }
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = (&mut send_task) => {
            recv_task.abort();
        }
        _ = (&mut recv_task) => {
            send_task.abort();
        }
    }

    hub.unregister(subscriber_id).await;
    info!("WebSocket client {subscriber_id} disconnected");
}

/// Answer one text frame
pub async fn handle_command(state: &ApiState, text: &str) -> WsReply {
    let Ok(request) = serde_json::from_str::<Value>(text) else {
        return WsReply::error("Invalid JSON format");
    };
    let command = request.get("command").and_then(Value::as_str).unwrap_or_default();
    debug!("WebSocket command `{command}`");

    let result = match command {
        "get_devices" => {
            let filter = DeviceFilter {
                limit: 100,
                ..Default::default()
            };
            state
                .topology
                .storage()
                .list_devices(&filter)
                .await
                .map(|devices| WsReply::new("devices", devices))
        }
        "get_topology" => state
            .topology
            .snapshot()
            .await
            .map(|topology| WsReply::new("topology", topology)),
        "get_statistics" => state
            .topology
            .statistics()
            .await
            .map(|stats| WsReply::new("statistics", stats)),
        "get_device_info" => {
            let Some(id) = request.get("device_id").and_then(Value::as_i64) else {
                return WsReply::error("device_id is required");
            };
            match state.topology.device_details(id).await {
                Ok(Some(details)) => Ok(WsReply::new("device_info", details)),
                Ok(None) => Ok(WsReply::error("Device not found")),
                Err(e) => Err(e),
            }
        }
        "start_scan" => return start_scan(state, request).await,
        other => return WsReply::error(format!("Unknown command: {other}")),
    };

    result.unwrap_or_else(|e| {
        warn!("WebSocket command `{command}` failed: {e}");
        e.into()
    })
}

async fn start_scan(state: &ApiState, request: Value) -> WsReply {
    let request: ScanRequest = match serde_json::from_value(request) {
        Ok(request) => request,
        Err(e) => return WsReply::error(format!("invalid scan request: {e}")),
    };

    match state.scans.start_scan(&request).await {
        Ok((session, _task)) => WsReply::new(
            "scan_status",
            json!({
                "session_id": session.id,
                "status": "scanning",
                "message": "Scan started",
            }),
        ),
        Err(e) => WsReply::error(format!("{e:#}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::{DiscoveredDevice, StaticDiscovery};
    use crate::scan::ScanCoordinator;
    use crate::storage::StorageBackend;
    use crate::storage::sqlite::SqliteBackend;
    use crate::topology::{TopologyHub, TopologyService};
    use std::sync::Arc;

    async fn state() -> (tempfile::TempDir, ApiState) {
        let temp_dir = tempfile::tempdir().unwrap();
        let storage: Arc<dyn StorageBackend> =
            Arc::new(SqliteBackend::new(temp_dir.path().join("test.db")).await.unwrap());
        let hub = TopologyHub::default();
        let discovery = StaticDiscovery::new(vec![DiscoveredDevice::new("10.0.0.1", "MikroTik")]);
        let scans = ScanCoordinator::new(storage.clone(), Arc::new(discovery), hub.clone(), vec![]);

        (temp_dir, ApiState::new(TopologyService::new(storage, hub), scans))
    }

    #[tokio::test]
    async fn test_invalid_json() {
        let (_dir, state) = state().await;

        let reply = handle_command(&state, "{not json").await;

        assert_eq!(reply, WsReply::error("Invalid JSON format"));
    }

    #[tokio::test]
    async fn test_unknown_command() {
        let (_dir, state) = state().await;

        let reply = handle_command(&state, r#"{"command":"reboot"}"#).await;

        assert_eq!(reply.kind, "error");
        assert_eq!(reply.data["message"], "Unknown command: reboot");
    }

    #[tokio::test]
    async fn test_get_device_info_for_missing_device() {
        let (_dir, state) = state().await;

        let reply = handle_command(&state, r#"{"command":"get_device_info","device_id":42}"#).await;

        assert_eq!(reply, WsReply::error("Device not found"));
    }

    #[tokio::test]
    async fn test_start_scan_then_get_devices() {
        let (_dir, state) = state().await;

        let reply = handle_command(&state, r#"{"command":"start_scan","timeout":5}"#).await;
        assert_eq!(reply.kind, "scan_status");
        let session_id = reply.data["session_id"].as_i64().unwrap();

        // wait for the background scan to close the session
        for _ in 0..50 {
            let session = state.topology.storage().get_scan_session(session_id).await.unwrap().unwrap();
            if session.completed_at.is_some() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }

        let reply = handle_command(&state, r#"{"command":"get_devices"}"#).await;
        assert_eq!(reply.kind, "devices");
        assert_eq!(reply.data[0]["device_id"], "mikrotik_10.0.0.1");
    }
}
