use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use citybingo::sanitize;
use tracing::{debug, warn};

use crate::state::AppState;

/// `GET /images/:name`: serves a stored artifact from the active root.
pub async fn serve_image(State(state): State<AppState>, Path(name): Path<String>) -> Response {
    let reference = format!("/images/{}", name);
    let path = match state.core.assets.resolve_public_ref(&reference) {
        Ok(path) => path,
        Err(_) => return (StatusCode::BAD_REQUEST, "Invalid image name").into_response(),
    };

    match tokio::fs::read(&path).await {
        Ok(bytes) if !bytes.is_empty() => (
            [
                (header::CONTENT_TYPE, content_type_for(&name)),
                (header::CACHE_CONTROL, "public, max-age=31536000, immutable"),
            ],
            Body::from(bytes),
        )
            .into_response(),
        Ok(_) => {
            warn!(file = %sanitize::redact_path(&path), "Stored artifact is empty");
            StatusCode::NOT_FOUND.into_response()
        }
        Err(e) => {
            debug!(file = %sanitize::redact_path(&path), error = %e, "Artifact not readable");
            StatusCode::NOT_FOUND.into_response()
        }
    }
}

fn content_type_for(name: &str) -> &'static str {
    match name.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase()) {
        Some(ext) if ext == "jpg" || ext == "jpeg" => "image/jpeg",
        Some(ext) if ext == "webp" => "image/webp",
        Some(ext) if ext == "gif" => "image/gif",
        _ => "image/png",
    }
}
