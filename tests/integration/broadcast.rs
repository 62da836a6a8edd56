//! Real-time fan-out tests
//!
//! These tests verify that:
//! - A closed subscriber never blocks delivery to the others
//! - Concurrent connects and disconnects during broadcast are tolerated
//! - WebSocket clients get command replies and pushed scan events

use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use pretty_assertions::assert_eq;
use routeros_monitoring::{
    api::{ApiConfig, ApiState, spawn_api_server},
    collection::{DiscoveredDevice, DiscoverySummary, StaticDiscovery},
    scan::ScanCoordinator,
    topology::{TopologyEvent, TopologyHub, TopologyService},
};
use serde_json::{Value, json};
use tokio_tungstenite::{connect_async, tungstenite::Message};

use crate::helpers::temp_storage;

fn devices_updated() -> TopologyEvent {
    TopologyEvent::DevicesUpdated(DiscoverySummary {
        devices: 1,
        connections: 0,
    })
}

#[tokio::test]
async fn test_closed_subscriber_does_not_block_others() {
    let hub = TopologyHub::default();
    let mut receivers = Vec::new();
    for _ in 0..5 {
        receivers.push(hub.register().await.1);
    }
    drop(receivers.remove(2));

    let delivered = hub.broadcast(&devices_updated()).await;

    assert_eq!(delivered, 4);
    assert_eq!(hub.subscriber_count().await, 4);
    for rx in &mut receivers {
        assert_eq!(rx.recv().await, Some(devices_updated()));
    }
}

#[tokio::test]
async fn test_broadcast_during_churn() {
    let hub = TopologyHub::new(256);

    let churn = {
        let hub = hub.clone();
        tokio::spawn(async move {
            for _ in 0..200 {
                let (id, rx) = hub.register().await;
                if id % 2 == 0 {
                    drop(rx);
                } else {
                    hub.unregister(id).await;
                }
            }
        })
    };
    let (_id, mut steady) = hub.register().await;
    for _ in 0..200 {
        hub.broadcast(&devices_updated()).await;
        tokio::task::yield_now().await;
    }
    churn.await.unwrap();
    hub.broadcast(&devices_updated()).await;

    let mut received = 0;
    while steady.try_recv().is_ok() {
        received += 1;
    }
    assert_eq!(received, 201);
    assert_eq!(hub.subscriber_count().await, 1);
}

async fn spawn_hub() -> (tempfile::TempDir, SocketAddr, TopologyHub) {
    let (dir, storage) = temp_storage().await;
    let hub = TopologyHub::default();
    let discovery = StaticDiscovery::new(vec![
        DiscoveredDevice::new("192.168.88.1", "MikroTik"),
        DiscoveredDevice::new("192.168.88.2", "MikroTik"),
    ]);
    let scans = ScanCoordinator::new(storage.clone(), Arc::new(discovery), hub.clone(), vec![]);
    let state = ApiState::new(TopologyService::new(storage, hub.clone()), scans);
    let config = ApiConfig {
        bind_addr: "127.0.0.1:0".parse().unwrap(),
        ..Default::default()
    };

    let addr = spawn_api_server(config, state).await.unwrap();
    (dir, addr, hub)
}

async fn next_json<S>(ws: &mut S) -> Value
where
    S: StreamExt<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("socket closed")
            .unwrap();
        if let Message::Text(text) = msg {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

#[tokio::test]
async fn test_websocket_commands_and_pushed_events() {
    let (_dir, addr, hub) = spawn_hub().await;
    let (mut ws, _) = connect_async(format!("ws://{addr}/ws")).await.unwrap();

    ws.send(Message::Text("not json".to_string())).await.unwrap();
    let reply = next_json(&mut ws).await;
    assert_eq!(reply, json!({ "type": "error", "data": { "message": "Invalid JSON format" } }));

    ws.send(Message::Text(json!({ "command": "get_statistics" }).to_string()))
        .await
        .unwrap();
    let reply = next_json(&mut ws).await;
    assert_eq!(reply["type"], "statistics");
    assert_eq!(hub.subscriber_count().await, 1);

    ws.send(Message::Text(json!({ "command": "start_scan" }).to_string()))
        .await
        .unwrap();

    let mut seen = HashSet::new();
    while !["scan_status", "scan_started", "devices_updated", "scan_completed"]
        .iter()
        .all(|kind| seen.contains(*kind))
    {
        let frame = next_json(&mut ws).await;
        let kind = frame["type"].as_str().unwrap().to_string();
        if kind == "devices_updated" {
            assert_eq!(frame["data"]["devices"], 2);
        }
        if kind == "scan_completed" {
            assert_eq!(frame["data"]["status"], "completed");
            assert_eq!(frame["data"]["devices_discovered"], 2);
        }
        seen.insert(kind);
    }

    ws.send(Message::Text(json!({ "command": "get_devices" }).to_string()))
        .await
        .unwrap();
    let reply = next_json(&mut ws).await;
    assert_eq!(reply["type"], "devices");
    assert_eq!(reply["data"].as_array().unwrap().len(), 2);

    ws.close(None).await.unwrap();
    for _ in 0..50 {
        if hub.subscriber_count().await == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(hub.subscriber_count().await, 0);
}
