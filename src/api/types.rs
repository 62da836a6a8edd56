//! Request and response types shared by REST handlers and the WebSocket

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::{ApiError, ApiResult};
use crate::collection::CycleReport;

/// Envelope around every REST response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T, message: impl Into<String>) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: Some(message.into()),
            timestamp: Utc::now(),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            message: Some(message.into()),
            timestamp: Utc::now(),
        }
    }
}

/// Reject values outside `min..=max`; absent values take the default
pub fn bounded(name: &str, value: Option<u32>, default: u32, min: u32, max: u32) -> ApiResult<u32> {
    let value = value.unwrap_or(default);
    if (min..=max).contains(&value) {
        Ok(value)
    } else {
        Err(ApiError::InvalidRequest(format!(
            "`{name}` must be between {min} and {max}, got {value}"
        )))
    }
}

/// `?limit=` for listings capped at 1000 rows
#[derive(Debug, Default, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<u32>,
}

/// `?hours=` window, 1 to 168
#[derive(Debug, Default, Deserialize)]
pub struct HoursQuery {
    pub hours: Option<u32>,
}

impl HoursQuery {
    pub fn hours(&self) -> ApiResult<u32> {
        bounded("hours", self.hours, 24, 1, 168)
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct DeviceListQuery {
    pub limit: Option<u32>,
    pub offset: Option<u32>,
    pub device_type: Option<String>,
    pub vendor: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct GraphingQuery {
    pub hours: Option<u32>,
    pub metric_type: Option<String>,
}

/// `GET /api/health` payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub storage: String,
    pub subscribers: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_cycle: Option<CycleReport>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanStarted {
    pub session_id: i64,
    pub status: String,
}
