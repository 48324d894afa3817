use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::{json, Value};

use crate::state::AppState;

/// `GET /health` — liveness check.
///
/// `200 OK` when DuckDB answers `SELECT 1`, `503 Service Unavailable` with
/// `"reason": "storage_unreachable"` otherwise. Also reports how many
/// dashboard sockets are connected.
///
/// Response shape:
/// ```json
/// { "status": "ok", "version": "0.1.0", "storage": "ok", "realtimeClients": 0 }
/// ```
#[tracing::instrument(skip(state))]
pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let storage = state.db.ping().await;
    if let Err(e) = &storage {
        tracing::error!(error = %e, "Health check: DuckDB unreachable");
    }
    let (status, body) = health_report(storage.is_ok(), state.realtime.connected_clients());
    (status, Json(body))
}

fn health_report(storage_ok: bool, realtime_clients: usize) -> (StatusCode, Value) {
    if storage_ok {
        (
            StatusCode::OK,
            json!({
                "status": "ok",
                "version": env!("CARGO_PKG_VERSION"),
                "storage": "ok",
                "realtimeClients": realtime_clients
            }),
        )
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            json!({
                "status": "degraded",
                "version": env!("CARGO_PKG_VERSION"),
                "storage": "unreachable",
                "reason": "storage_unreachable",
                "realtimeClients": realtime_clients
            }),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unreachable_storage_is_degraded_with_reason() {
        let (status, body) = health_report(false, 3);
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["status"], "degraded");
        assert_eq!(body["reason"], "storage_unreachable");
        assert_eq!(body["realtimeClients"], 3);
    }

    #[test]
    fn healthy_storage_has_no_reason() {
        let (status, body) = health_report(true, 0);
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["storage"], "ok");
        assert!(body.get("reason").is_none());
    }
}
