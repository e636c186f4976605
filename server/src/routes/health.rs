use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use crate::state::AppState;

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let root = state.core.assets.root();
    Json(json!({
        "status": "ok",
        "storage": if root.is_fallback() { "fallback" } else { "primary" },
        "inFlight": state.core.dedup.in_flight_count(),
    }))
}
