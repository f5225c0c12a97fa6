use axum::{routing::get, Router};
use chrono::{DateTime, Utc};
use nanorelay_core::config::RelayConfig;
use nanorelay_hub::RelayHub;
use nanorelay_upstream::UpstreamHandle;
use std::sync::Arc;

/// Central shared state: passed as Arc<AppState> to all Axum handlers.
pub struct AppState {
    pub config: RelayConfig,
    pub hub: Arc<RelayHub>,
    /// Account-filtered node connection.
    pub filtered_upstream: UpstreamHandle,
    /// Unfiltered node connection; only present when listen-all is enabled.
    pub listen_all_upstream: Option<UpstreamHandle>,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(
        config: RelayConfig,
        hub: Arc<RelayHub>,
        filtered_upstream: UpstreamHandle,
        listen_all_upstream: Option<UpstreamHandle>,
    ) -> Self {
        Self {
            config,
            hub,
            filtered_upstream,
            listen_all_upstream,
            started_at: Utc::now(),
        }
    }
}

/// Assemble the full Axum router.
///
/// Existing clients connect at `/`, so the socket is served
/// there as well as at `/ws`.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(crate::ws::connection::ws_handler))
        .route("/ws", get(crate::ws::connection::ws_handler))
        .route("/health", get(crate::http::health::health_handler))
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}
