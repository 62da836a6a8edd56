//! Monitoring summaries

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
    storage::MonitoringRecord,
};

/// GET /api/monitoring/latest?limit=
///
/// Newest sample for each device
pub async fn latest_monitoring(
    State(state): State<ApiState>,
    Query(query): Query<LimitQuery>,
) -> ApiResult<Json<ApiResponse<Vec<MonitoringRecord>>>> {
    let limit = bounded("limit", query.limit, 100, 1, 1000)?;
    let samples = state.topology.storage().latest_monitoring(limit).await?;

    let message = format!("Retrieved monitoring data for {} devices", samples.len());
    Ok(Json(ApiResponse::ok(samples, message)))
}
