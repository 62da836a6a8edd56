//! Integration tests for API endpoints
//!
//! These tests verify that:
//! - Every response uses the `{success, data, message, timestamp}` envelope
//! - Filters, bounds and 404s behave as documented
//! - Scans started over REST complete in the background
//! - Authentication middleware functions properly

use std::sync::Arc;

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
};
use pretty_assertions::assert_eq;
use routeros_monitoring::{
    api::{ApiConfig, ApiState, build_router},
    collection::{DiscoveredDevice, StaticDiscovery, discovery::record_discovery},
    scan::ScanCoordinator,
    storage::{MonitoringSample, StorageBackend, sqlite::SqliteBackend},
    topology::{TopologyHub, TopologyService},
};
use serde_json::{Value, json};
use tempfile::TempDir;
use tower::ServiceExt;

struct TestApi {
    _dir: TempDir,
    storage: Arc<SqliteBackend>,
    router: Router,
}

async fn spawn_test_api(auth_token: Option<&str>) -> TestApi {
    let temp_dir = tempfile::tempdir().unwrap();
    let storage = Arc::new(SqliteBackend::new(temp_dir.path().join("api.db")).await.unwrap());

    let mut gw = DiscoveredDevice::new("192.168.88.1", "MikroTik");
    gw.hostname = Some("gw".to_string());
    gw.neighbors = vec!["192.168.88.2".to_string()];
    let ap = DiscoveredDevice::new("192.168.88.2", "MikroTik");
    let switch = DiscoveredDevice::new("192.168.88.3", "Cisco");
    record_discovery(storage.as_ref(), &[gw.clone(), ap.clone(), switch], "test")
        .await
        .unwrap();

    let hub = TopologyHub::default();
    let discovery = StaticDiscovery::new(vec![gw, ap, DiscoveredDevice::new("10.9.9.9", "MikroTik")]);
    let scans = ScanCoordinator::new(storage.clone(), Arc::new(discovery), hub.clone(), vec![]);
    let state = ApiState::new(TopologyService::new(storage.clone(), hub), scans);
    let config = ApiConfig {
        auth_token: auth_token.map(str::to_string),
        ..Default::default()
    };

    TestApi {
        _dir: temp_dir,
        storage,
        router: build_router(state, &config),
    }
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&body).unwrap_or(Value::Null))
}

async fn get(router: &Router, uri: &str) -> (StatusCode, Value) {
    send(router, Request::get(uri).body(Body::empty()).unwrap()).await
}

#[tokio::test]
async fn test_root_describes_service() {
    let api = spawn_test_api(None).await;

    let (status, body) = get(&api.router, "/").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["endpoints"]["websocket"], "/ws");
    assert!(body["timestamp"].is_string());
}

#[tokio::test]
async fn test_health_reports_storage() {
    let api = spawn_test_api(None).await;

    let (status, body) = get(&api.router, "/api/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "ok");
    assert_eq!(body["data"]["subscribers"], 0);
}

#[tokio::test]
async fn test_list_devices_with_filters() {
    let api = spawn_test_api(None).await;

    let (status, all) = get(&api.router, "/api/devices").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(all["data"].as_array().unwrap().len(), 3);
    assert_eq!(all["message"], "Retrieved 3 devices");

    let (_, mikrotik) = get(&api.router, "/api/devices?vendor=MikroTik").await;
    assert_eq!(mikrotik["data"].as_array().unwrap().len(), 2);

    let (_, page) = get(&api.router, "/api/devices?limit=1&offset=1").await;
    assert_eq!(page["data"].as_array().unwrap().len(), 1);

    let (status, body) = get(&api.router, "/api/devices?limit=5000").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert!(body["data"].is_null());

    let (status, _) = get(&api.router, "/api/devices?status=sleeping").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_device_details_and_missing_device() {
    let api = spawn_test_api(None).await;
    let gw = api
        .storage
        .get_device_by_device_id("mikrotik_192.168.88.1")
        .await
        .unwrap()
        .unwrap();

    let (status, body) = get(&api.router, &format!("/api/devices/{}", gw.id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["device"]["hostname"], "gw");
    assert_eq!(body["data"]["connections"].as_array().unwrap().len(), 1);

    let (status, body) = get(&api.router, "/api/devices/9999").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
    assert_eq!(body["message"], "Device not found");

    let (status, _) = get(&api.router, "/api/devices/9999/monitoring").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_recent_devices_bounds() {
    let api = spawn_test_api(None).await;

    let (status, body) = get(&api.router, "/api/devices/recent?hours=1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 3);

    let (status, _) = get(&api.router, "/api/devices/recent?hours=169").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_monitoring_endpoints() {
    let api = spawn_test_api(None).await;
    let gw = api
        .storage
        .get_device_by_device_id("mikrotik_192.168.88.1")
        .await
        .unwrap()
        .unwrap();
    let sample = MonitoringSample {
        cpu_usage: Some(42.0),
        source: Some("rest".to_string()),
        monitored_at: chrono::Utc::now(),
        ..Default::default()
    };
    api.storage.record_monitoring_sample(gw.id, &sample).await.unwrap();

    let (status, latest) = get(&api.router, "/api/monitoring/latest").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(latest["data"].as_array().unwrap().len(), 1);

    let (_, history) = get(&api.router, &format!("/api/devices/{}/monitoring?hours=2", gw.id)).await;
    assert_eq!(history["data"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_config_kind_is_validated() {
    let api = spawn_test_api(None).await;
    let gw = api
        .storage
        .get_device_by_device_id("mikrotik_192.168.88.1")
        .await
        .unwrap()
        .unwrap();
    api.storage
        .save_config_snapshot(&gw.device_id, "queues", &json!([{ "name": "guest" }]))
        .await
        .unwrap();

    let (status, body) = get(&api.router, &format!("/api/devices/{}/config/queues", gw.id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"][0]["data"][0]["name"], "guest");

    let (status, _) = get(&api.router, &format!("/api/devices/{}/config/passwords", gw.id)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_topology_and_statistics() {
    let api = spawn_test_api(None).await;

    let (_, topology) = get(&api.router, "/api/topology").await;
    assert_eq!(topology["data"]["devices"].as_array().unwrap().len(), 3);
    assert_eq!(topology["data"]["connections"].as_array().unwrap().len(), 1);

    let (_, stats) = get(&api.router, "/api/statistics").await;
    assert_eq!(stats["data"]["devices"]["total_devices"], 3);

    let (status, _) = get(&api.router, "/api/interfaces?limit=10001").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = get(&api.router, "/api/connections?limit=10000").await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_start_scan_creates_session() {
    let api = spawn_test_api(None).await;
    let request = Request::post("/api/scan/start")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            json!({ "scan_type": "mndp", "network_ranges": ["10.9.9.0/24"] }).to_string(),
        ))
        .unwrap();

    let (status, body) = send(&api.router, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "started");
    let session_id = body["data"]["session_id"].as_i64().unwrap();

    let mut completed = None;
    for _ in 0..50 {
        let session = api.storage.get_scan_session(session_id).await.unwrap().unwrap();
        if session.completed_at.is_some() {
            completed = Some(session);
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
    let session = completed.expect("scan did not finish");
    assert_eq!(session.devices_discovered, 1);
    assert_eq!(session.scan_type, "mndp");

    let (_, sessions) = get(&api.router, "/api/scan/sessions").await;
    assert_eq!(sessions["data"][0]["status"], "completed");
}

#[tokio::test]
async fn test_auth_required() {
    let api = spawn_test_api(Some("test-token")).await;

    let (status, _) = get(&api.router, "/api/devices").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let wrong = Request::get("/api/devices")
        .header(header::AUTHORIZATION, "Bearer wrong")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&api.router, wrong).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["success"], false);

    let right = Request::get("/api/devices")
        .header(header::AUTHORIZATION, "Bearer test-token")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&api.router, right).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
}
