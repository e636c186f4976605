use axum::routing::{get, post};
use axum::Router;

use crate::state::AppState;

pub mod generate;
pub mod health;
pub mod images;
pub mod proxy;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/generate", post(generate::generate))
        .route("/proxy", get(proxy::proxy))
        .route("/images/:name", get(images::serve_image))
        .route("/health", get(health::health))
        .with_state(state)
}
