//! Collection cycle behaviour against instrumented sources
//!
//! These tests verify that:
//! - The concurrency cap bounds in-flight collections
//! - A device that times out does not cost the others their data
//! - The REST pipeline persists graph points and a monitoring summary

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use pretty_assertions::assert_eq;
use routeros_monitoring::{
    actors::CollectorHandle,
    collection::{
        CollectionManager, CollectionSettings, DiscoveredDevice, RestMetricsClient,
        discovery::record_discovery,
    },
    storage::{DeviceStatus, StorageBackend},
};
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::helpers::*;

#[tokio::test]
async fn test_concurrency_cap_is_respected() {
    let (_dir, storage) = temp_storage().await;
    seed_routers(&storage, 25).await;
    let source = Arc::new(InstrumentedSource::new(Duration::from_millis(20)));
    let settings = CollectionSettings {
        max_concurrency: 3,
        ..Default::default()
    };
    let manager = CollectionManager::new(storage.clone(), source.clone(), settings);

    let report = manager.run_cycle().await.unwrap();

    assert_eq!(report.attempted, 25);
    assert_eq!(report.succeeded, 25);
    assert_eq!(source.calls(), 25);
    assert!(source.peak() <= 3, "peak in-flight was {}", source.peak());
    assert!(source.peak() >= 2, "collections never overlapped");
}

#[tokio::test]
async fn test_timed_out_device_is_isolated() {
    let (_dir, storage) = temp_storage().await;
    let devices = seed_routers(&storage, 10).await;
    let slow = devices[4].device_id.clone();
    let source = Arc::new(InstrumentedSource::new(Duration::from_millis(5)).stall(&slow));
    let settings = CollectionSettings {
        device_timeout: Duration::from_millis(300),
        ..Default::default()
    };
    let manager = CollectionManager::new(storage.clone(), source, settings);

    let report = manager.run_cycle().await.unwrap();

    assert_eq!(report.attempted, 10);
    assert_eq!(report.succeeded, 9);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].device_id, slow);

    for device in &devices {
        let stored = storage.get_device(device.id).await.unwrap().unwrap();
        let samples = storage
            .device_monitoring(device.id, Utc::now() - chrono::Duration::hours(1))
            .await
            .unwrap();
        if device.device_id == slow {
            assert_eq!(stored.status, DeviceStatus::Offline);
            assert!(samples.is_empty());
        } else {
            assert_eq!(stored.status, DeviceStatus::Online);
            assert_eq!(samples.len(), 1);
        }
    }
}

#[tokio::test]
async fn test_rest_pipeline_persists_points_and_summary() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/tool/graphing"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/interface"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "name": "ether1", "tx-byte": "1000", "rx-byte": "2000", "tx-packet": "10", "rx-packet": "20" },
            { "name": "ether2", "tx-byte": 5, "rx-byte": 6 }
        ])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/system/resource"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "cpu-load": "12",
            "free-memory": "768",
            "total-memory": "1024",
            "uptime": "1d2h3m4s"
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/queue/simple"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "name": "guest", "queue": "3/4", "dropped": "1/0" }
        ])))
        .mount(&server)
        .await;

    let (_dir, storage) = temp_storage().await;
    record_discovery(storage.as_ref(), &[DiscoveredDevice::new("127.0.0.1", "MikroTik")], "test")
        .await
        .unwrap();
    let client = RestMetricsClient::new(Duration::from_secs(2))
        .unwrap()
        .with_port(server.address().port());
    let manager = CollectionManager::new(storage.clone(), Arc::new(client), CollectionSettings::default());
    let collector = CollectorHandle::spawn(Arc::new(manager), Duration::from_secs(3600));

    let report = collector.run_now().await.unwrap();
    collector.shutdown().await.unwrap();

    assert_eq!(report.succeeded, 1);
    assert!(report.failures.is_empty());

    let latest = storage.latest_graphing_data("mikrotik_127.0.0.1").await.unwrap();
    let value = |name: &str, interface: Option<&str>| {
        latest
            .iter()
            .find(|p| p.metric_name == name && p.interface_name.as_deref() == interface)
            .map(|p| p.value)
    };
    assert_eq!(value("tx_bytes", Some("ether1")), Some(1000.0));
    assert_eq!(value("rx_bytes", Some("ether2")), Some(6.0));
    assert_eq!(value("cpu_load", None), Some(12.0));
    assert_eq!(value("memory_usage", None), Some(25.0));
    assert_eq!(value("uptime", None), Some(93_784.0));
    assert_eq!(value("queue_length", Some("guest")), Some(7.0));

    let monitoring = storage.latest_monitoring(10).await.unwrap();
    assert_eq!(monitoring.len(), 1);
    assert_eq!(monitoring[0].sample.cpu_usage, Some(12.0));
    assert_eq!(monitoring[0].sample.interface_count, Some(2));
    assert_eq!(monitoring[0].sample.source.as_deref(), Some("rest"));
}
