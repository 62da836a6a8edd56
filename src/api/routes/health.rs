//! Service description and health check

use axum::{Json, extract::State};
use serde_json::{Value, json};

use crate::api::{
    error::ApiResult,
    state::ApiState,
    types::{ApiResponse, HealthResponse},
};

/// GET /
pub async fn root() -> Json<ApiResponse<Value>> {
    Json(ApiResponse::ok(
        json!({
            "name": "RouterOS Monitoring Hub",
            "version": env!("CARGO_PKG_VERSION"),
            "endpoints": {
                "devices": "/api/devices",
                "interfaces": "/api/interfaces",
                "connections": "/api/connections",
                "topology": "/api/topology",
                "statistics": "/api/statistics",
                "scan": "/api/scan",
                "monitoring": "/api/monitoring/latest",
                "websocket": "/ws"
            }
        }),
        "RouterOS monitoring hub is running",
    ))
}

/// GET /api/health
///
/// Storage reachability, connected real-time clients and the last cycle
pub async fn health_check(State(state): State<ApiState>) -> ApiResult<Json<ApiResponse<HealthResponse>>> {
    let storage = state.topology.storage().health_check().await?;

    let last_cycle = match &state.collector {
        Some(collector) => collector.last_report().await.unwrap_or_default(),
        None => None,
    };

    let status = if storage.healthy { "ok" } else { "degraded" };
    Ok(Json(ApiResponse::ok(
        HealthResponse {
            status: status.to_string(),
            storage: storage.message,
            subscribers: state.topology.hub().subscriber_count().await,
            last_cycle,
        },
        "Health check completed",
    )))
}
