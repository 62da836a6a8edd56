//! Device endpoints

use axum::{
    Json,
    extract::{Path, Query, State},
};
use chrono::{Duration, Utc};

use crate::{
    api::{
        error::{ApiError, ApiResult},
        state::ApiState,
        types::{ApiResponse, DeviceListQuery, GraphingQuery, HoursQuery, bounded},
    },
    collection::CONFIG_KINDS,
    storage::{
        ConfigSnapshot, ConnectionRecord, DeviceFilter, DeviceRecord, DeviceStatus,
        GraphDataPoint, InterfaceRecord, MonitoringRecord,
    },
    topology::DeviceDetails,
};

type Reply<T> = ApiResult<Json<ApiResponse<T>>>;

async fn require_device(state: &ApiState, id: i64) -> ApiResult<DeviceRecord> {
    state
        .topology
        .storage()
        .get_device(id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Device not found".to_string()))
}

/// GET /api/devices?device_type=&vendor=&status=&limit=&offset=
pub async fn list_devices(State(state): State<ApiState>, Query(query): Query<DeviceListQuery>) -> Reply<Vec<DeviceRecord>> {
    let status = query
        .status
        .as_deref()
        .map(str::parse::<DeviceStatus>)
        .transpose()
        .map_err(ApiError::InvalidRequest)?;

    let filter = DeviceFilter {
        device_type: query.device_type,
        vendor: query.vendor,
        status,
        limit: bounded("limit", query.limit, 100, 1, 1000)?,
        offset: query.offset.unwrap_or(0),
    };
    let devices = state.topology.storage().list_devices(&filter).await?;

    let message = format!("Retrieved {} devices", devices.len());
    Ok(Json(ApiResponse::ok(devices, message)))
}

/// GET /api/devices/:id
pub async fn get_device(State(state): State<ApiState>, Path(id): Path<i64>) -> Reply<DeviceDetails> {
    let details = state
        .topology
        .device_details(id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Device not found".to_string()))?;

    Ok(Json(ApiResponse::ok(details, "Device retrieved successfully")))
}

/// GET /api/devices/recent?hours=
pub async fn recent_devices(State(state): State<ApiState>, Query(query): Query<HoursQuery>) -> Reply<Vec<DeviceRecord>> {
    let since = Utc::now() - Duration::hours(i64::from(query.hours()?));
    let devices = state.topology.storage().recent_devices(since).await?;

    let message = format!("Retrieved {} recently discovered devices", devices.len());
    Ok(Json(ApiResponse::ok(devices, message)))
}

/// GET /api/devices/:id/interfaces
pub async fn device_interfaces(State(state): State<ApiState>, Path(id): Path<i64>) -> Reply<Vec<InterfaceRecord>> {
    require_device(&state, id).await?;
    let interfaces = state.topology.storage().device_interfaces(id).await?;

    let message = format!("Retrieved {} interfaces for device {id}", interfaces.len());
    Ok(Json(ApiResponse::ok(interfaces, message)))
}

/// GET /api/devices/:id/connections
pub async fn device_connections(State(state): State<ApiState>, Path(id): Path<i64>) -> Reply<Vec<ConnectionRecord>> {
    require_device(&state, id).await?;
    let connections = state.topology.storage().device_connections(id).await?;

    let message = format!("Retrieved {} connections for device {id}", connections.len());
    Ok(Json(ApiResponse::ok(connections, message)))
}

/// GET /api/devices/:id/monitoring?hours=
pub async fn device_monitoring(
    State(state): State<ApiState>,
    Path(id): Path<i64>,
    Query(query): Query<HoursQuery>,
) -> Reply<Vec<MonitoringRecord>> {
    let hours = query.hours()?;
    require_device(&state, id).await?;

    let since = Utc::now() - Duration::hours(i64::from(hours));
    let samples = state.topology.storage().device_monitoring(id, since).await?;

    Ok(Json(ApiResponse::ok(samples, format!("Retrieved monitoring data for device {id}"))))
}

/// GET /api/devices/:id/graphing?hours=&metric_type=
pub async fn device_graphing(
    State(state): State<ApiState>,
    Path(id): Path<i64>,
    Query(query): Query<GraphingQuery>,
) -> Reply<Vec<GraphDataPoint>> {
    let hours = bounded("hours", query.hours, 24, 1, 168)?;
    let device = require_device(&state, id).await?;

    let since = Utc::now() - Duration::hours(i64::from(hours));
    let points = state
        .topology
        .storage()
        .graphing_data(&device.device_id, query.metric_type.as_deref(), since)
        .await?;

    let message = format!("Retrieved {} data points for device {id}", points.len());
    Ok(Json(ApiResponse::ok(points, message)))
}

/// GET /api/devices/:id/config/:kind?hours=
pub async fn device_config(
    State(state): State<ApiState>,
    Path((id, kind)): Path<(i64, String)>,
    Query(query): Query<HoursQuery>,
) -> Reply<Vec<ConfigSnapshot>> {
    if !CONFIG_KINDS.contains(&kind.as_str()) {
        return Err(ApiError::InvalidRequest(format!(
            "unknown configuration kind `{kind}`, expected one of {}",
            CONFIG_KINDS.join(", ")
        )));
    }
    let hours = query.hours()?;
    let device = require_device(&state, id).await?;

    let since = Utc::now() - Duration::hours(i64::from(hours));
    let snapshots = state
        .topology
        .storage()
        .config_snapshots(&device.device_id, &kind, since)
        .await?;

    let message = format!("Retrieved {} {kind} snapshots for device {id}", snapshots.len());
    Ok(Json(ApiResponse::ok(snapshots, message)))
}
