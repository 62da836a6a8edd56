//! Interfaces, connections, topology and statistics

use axum::{
    Json,
    extract::{Query, State},
};

use crate::{
    api::{
        error::ApiResult,
        state::ApiState,
        types::{ApiResponse, LimitQuery, bounded},
    },
    storage::{ConnectionRecord, InterfaceRecord, NetworkStatistics, TopologySnapshot},
};

/// GET /api/interfaces?limit=
pub async fn list_interfaces(
    State(state): State<ApiState>,
    Query(query): Query<LimitQuery>,
) -> ApiResult<Json<ApiResponse<Vec<InterfaceRecord>>>> {
    let limit = bounded("limit", query.limit, 1000, 1, 10_000)?;
    let interfaces = state.topology.storage().list_interfaces(limit).await?;

    let message = format!("Retrieved {} interfaces", interfaces.len());
    Ok(Json(ApiResponse::ok(interfaces, message)))
}

/// GET /api/connections?limit=
pub async fn list_connections(
    State(state): State<ApiState>,
    Query(query): Query<LimitQuery>,
) -> ApiResult<Json<ApiResponse<Vec<ConnectionRecord>>>> {
    let limit = bounded("limit", query.limit, 1000, 1, 10_000)?;
    let connections = state.topology.storage().list_connections(limit).await?;

    let message = format!("Retrieved {} connections", connections.len());
    Ok(Json(ApiResponse::ok(connections, message)))
}

/// GET /api/topology
pub async fn topology(State(state): State<ApiState>) -> ApiResult<Json<ApiResponse<TopologySnapshot>>> {
    let snapshot = state.topology.snapshot().await?;
    Ok(Json(ApiResponse::ok(snapshot, "Network topology retrieved successfully")))
}

/// GET /api/statistics
pub async fn statistics(State(state): State<ApiState>) -> ApiResult<Json<ApiResponse<NetworkStatistics>>> {
    let stats = state.topology.statistics().await?;
    Ok(Json(ApiResponse::ok(stats, "Statistics retrieved successfully")))
}
