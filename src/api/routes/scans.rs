//! Scan sessions

use axum::{
    Json,
    extract::{Query, State},
};

use crate::{
    api::{
        error::ApiResult,
        state::ApiState,
        types::{ApiResponse, LimitQuery, ScanStarted, bounded},
    },
    scan::ScanRequest,
    storage::ScanSession,
};

/// GET /api/scan/sessions?limit=
pub async fn list_sessions(
    State(state): State<ApiState>,
    Query(query): Query<LimitQuery>,
) -> ApiResult<Json<ApiResponse<Vec<ScanSession>>>> {
    let limit = bounded("limit", query.limit, 50, 1, 1000)?;
    let sessions = state.topology.storage().list_scan_sessions(limit).await?;

    let message = format!("Retrieved {} scan sessions", sessions.len());
    Ok(Json(ApiResponse::ok(sessions, message)))
}

/// POST /api/scan/start
///
/// Returns as soon as the session exists; discovery continues in the
/// background and completion is pushed to real-time clients.
pub async fn start_scan(
    State(state): State<ApiState>,
    Json(request): Json<ScanRequest>,
) -> ApiResult<Json<ApiResponse<ScanStarted>>> {
    let (session, _task) = state.scans.start_scan(&request).await?;

    Ok(Json(ApiResponse::ok(
        ScanStarted {
            session_id: session.id,
            status: "started".to_string(),
        },
        "Scan started successfully",
    )))
}
