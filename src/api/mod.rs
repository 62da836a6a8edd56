//! REST API and WebSocket server for the monitoring hub
//!
//! ## Endpoints
//!
//! - `GET /` - Service description
//! - `GET /api/health` - Storage and collector health
//! - `GET /api/devices` - Devices (filters: `device_type`, `vendor`, `status`, `limit`, `offset`)
//! - `GET /api/devices/recent?hours=` - Devices seen recently
//! - `GET /api/devices/{id}` - Device with interfaces and connections
//! - `GET /api/devices/{id}/interfaces|connections|monitoring|graphing`
//! - `GET /api/devices/{id}/config/{kind}` - Configuration snapshots
//! - `GET /api/interfaces`, `GET /api/connections`, `GET /api/topology`, `GET /api/statistics`
//! - `GET /api/scan/sessions`, `POST /api/scan/start`
//! - `GET /api/monitoring/latest` - Newest sample per device
//! - `WS /ws` - Commands and pushed topology events
//!
//! Every REST response is wrapped as `{success, data, message, timestamp}`.

pub mod error;
pub mod middleware;
pub mod routes;
pub mod state;
pub mod types;
pub mod websocket;

pub use error::{ApiError, ApiResult};
pub use state::ApiState;
pub use types::{ApiResponse, HealthResponse};

use std::net::{Ipv4Addr, SocketAddr};

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

/// API server configuration
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Bind address (e.g., "0.0.0.0:8000")
    pub bind_addr: SocketAddr,

    /// Optional authentication token
    pub auth_token: Option<String>,

    /// Enable CORS for browser dashboards
    pub enable_cors: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, 8000)),
            auth_token: None,
            enable_cors: true,
        }
    }
}

/// Assemble every route and layer; used directly by in-process tests
pub fn build_router(state: ApiState, config: &ApiConfig) -> Router {
    let mut app = Router::new()
        .route("/", get(routes::health::root))
        .route("/api/health", get(routes::health::health_check))
        .route("/api/devices", get(routes::devices::list_devices))
        .route("/api/devices/recent", get(routes::devices::recent_devices))
        .route("/api/devices/:id", get(routes::devices::get_device))
        .route(
            "/api/devices/:id/interfaces",
            get(routes::devices::device_interfaces),
        )
        .route(
            "/api/devices/:id/connections",
            get(routes::devices::device_connections),
        )
        .route(
            "/api/devices/:id/monitoring",
            get(routes::devices::device_monitoring),
        )
        .route(
            "/api/devices/:id/graphing",
            get(routes::devices::device_graphing),
        )
        .route(
            "/api/devices/:id/config/:kind",
            get(routes::devices::device_config),
        )
        .route("/api/interfaces", get(routes::network::list_interfaces))
        .route("/api/connections", get(routes::network::list_connections))
        .route("/api/topology", get(routes::network::topology))
        .route("/api/statistics", get(routes::network::statistics))
        .route("/api/scan/sessions", get(routes::scans::list_sessions))
        .route("/api/scan/start", post(routes::scans::start_scan))
        .route(
            "/api/monitoring/latest",
            get(routes::monitoring::latest_monitoring),
        )
        .route("/ws", get(websocket::websocket_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    if config.enable_cors {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
        app = app.layer(cors);
    }

    if let Some(token) = config.auth_token.clone() {
        app = app.layer(axum::middleware::from_fn_with_state(
            token,
            middleware::auth::auth_middleware,
        ));
    }

    app
}

/// Spawn the API server
///
/// Binds, then serves on a background task. Returns the bound address,
/// which differs from the configured one when port 0 was requested.
pub async fn spawn_api_server(config: ApiConfig, state: ApiState) -> anyhow::Result<SocketAddr> {
    info!("starting API server on {}", config.bind_addr);

    let app = build_router(state, &config);

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    let addr = listener.local_addr()?;

    info!("API server listening on {}", addr);

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!("API server error: {}", e);
        }
    });

    Ok(addr)
}
