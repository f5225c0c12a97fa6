use axum::{extract::State, Json};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::app::AppState;

/// GET /health: liveness probe, returns relay counters and upstream status.
pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(health_body(&state))
}

fn health_body(state: &AppState) -> Value {
    let stats = state.hub.stats();
    json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "started_at": state.started_at.to_rfc3339(),
        "topic": state.hub.topic(),
        "clients": stats.clients,
        "tracked_accounts": stats.tracked_accounts,
        "registered_clients": stats.registered_clients,
        "listen_all_clients": stats.listen_all_clients,
        "listen_all_enabled": stats.listen_all_enabled,
        "upstream": {
            "filtered": state.filtered_upstream.is_connected(),
            "listen_all": state.listen_all_upstream.as_ref().map(|h| h.is_connected()),
        },
    })
}
