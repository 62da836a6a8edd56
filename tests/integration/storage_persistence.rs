//! SQLite persistence integration tests
//!
//! These tests verify that:
//! - Connections are deduplicated on their four-key identity
//! - The retention sweep honours the window against a fixed clock
//! - Data survives closing and reopening the database
//! - The topology snapshot reflects every written table

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use pretty_assertions::assert_eq;
use routeros_monitoring::{
    collection::{CollectionManager, CollectionSettings, DiscoveredDevice, discovery::record_discovery},
    storage::{
        ConfigCollection, ConnectionUpsert, InterfaceUpsert, MonitoringSample, StorageBackend,
        sqlite::SqliteBackend,
    },
};

use crate::helpers::*;

#[tokio::test]
async fn test_connection_dedupe_advances_updated_at() {
    let (_dir, storage) = temp_storage().await;
    let devices = seed_routers(&storage, 2).await;
    let edge = ConnectionUpsert::between(devices[0].id, devices[1].id);

    let first = storage.upsert_connection(&edge).await.unwrap();
    let second = storage.upsert_connection(&edge).await.unwrap();

    assert_eq!(first.id, second.id);
    assert!(second.updated_at > first.updated_at);
    assert_eq!(storage.list_connections(100).await.unwrap().len(), 1);

    // a different interface pair is a different edge
    let ether1 = storage
        .upsert_interface(
            devices[0].id,
            &InterfaceUpsert {
                interface_name: "ether1".to_string(),
                status: "up".to_string(),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    storage
        .upsert_connection(&ConnectionUpsert {
            source_interface_id: Some(ether1),
            ..edge.clone()
        })
        .await
        .unwrap();

    let connections = storage.list_connections(100).await.unwrap();
    assert_eq!(connections.len(), 2);
    assert!(
        connections
            .iter()
            .any(|c| c.source_interface_name.as_deref() == Some("ether1"))
    );
}

#[tokio::test]
async fn test_retention_sweep_with_fixed_clock() {
    let (_dir, storage) = temp_storage().await;
    let device = seed_routers(&storage, 1).await.remove(0);
    let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
    let expired = now - chrono::Duration::days(31);
    let kept = now - chrono::Duration::days(29);

    for at in [expired, kept] {
        let points = vec![point(&device.device_id, "cpu_load", 5.0, at)];
        let summary = MonitoringSample::summarize(&points, "rest", at);
        storage
            .record_collection(&device.device_id, &points, &summary)
            .await
            .unwrap();
    }

    let manager = CollectionManager::new(
        storage.clone(),
        Arc::new(InstrumentedSource::new(Duration::ZERO)),
        CollectionSettings {
            retention: chrono::Duration::days(30),
            ..Default::default()
        },
    )
    .with_clock(Arc::new(move || now));

    let removed = manager.sweep_retention().await.unwrap();

    assert_eq!(removed.monitoring_rows, 1);
    assert_eq!(removed.graphing_rows, 1);

    let epoch = Utc.timestamp_millis_opt(0).unwrap();
    let samples = storage.device_monitoring(device.id, epoch).await.unwrap();
    assert_eq!(samples.len(), 1);
    assert_eq!(samples[0].sample.monitored_at, kept);
    let points = storage
        .graphing_data(&device.device_id, None, epoch)
        .await
        .unwrap();
    assert_eq!(points.len(), 1);
    assert_eq!(points[0].timestamp, kept);
}

#[tokio::test]
async fn test_data_survives_reopen() {
    let temp_dir = tempfile::tempdir().unwrap();
    let db_path = temp_dir.path().join("hub.db");

    {
        let storage = SqliteBackend::new(&db_path).await.unwrap();
        record_discovery(&storage, &[DiscoveredDevice::new("192.168.88.1", "MikroTik")], "test")
            .await
            .unwrap();
        storage.close().await.unwrap();
    }

    let storage = SqliteBackend::new(&db_path).await.unwrap();
    let device = storage
        .get_device_by_device_id("mikrotik_192.168.88.1")
        .await
        .unwrap();

    assert!(device.is_some());
    assert_eq!(device.unwrap().device_type, "router");
}

#[tokio::test]
async fn test_topology_snapshot_includes_everything() {
    let (_dir, storage) = temp_storage().await;
    let mut gw = DiscoveredDevice::new("10.1.0.1", "MikroTik");
    gw.neighbors = vec!["10.1.0.2".to_string(), "10.1.0.3".to_string()];
    record_discovery(
        storage.as_ref(),
        &[
            gw,
            DiscoveredDevice::new("10.1.0.2", "MikroTik"),
            DiscoveredDevice::new("10.1.0.3", "Cisco"),
        ],
        "test",
    )
    .await
    .unwrap();
    storage
        .record_config_collection(
            "mikrotik_10.1.0.1",
            &ConfigCollection {
                snapshots: vec![("interfaces".to_string(), serde_json::json!([{ "name": "ether1" }]))],
                interfaces: vec![InterfaceUpsert {
                    interface_name: "ether1".to_string(),
                    status: "up".to_string(),
                    ..Default::default()
                }],
            },
        )
        .await
        .unwrap();

    let snapshot = storage.topology_snapshot().await.unwrap();
    let stats = storage.statistics().await.unwrap();

    assert_eq!(snapshot.devices.len(), 3);
    assert_eq!(snapshot.interfaces.len(), 1);
    assert_eq!(snapshot.connections.len(), 2);
    assert_eq!(stats.devices.total_devices, 3);
    assert_eq!(stats.devices.mikrotik_devices, 2);
    assert_eq!(stats.interfaces.active_interfaces, 1);
    assert_eq!(stats.connections.total_connections, 2);
}
