use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use citybingo::sanitize;
use citybingo::storage::is_expiring_url;
use serde::Deserialize;
use tracing::{info_span, warn, Instrument};

use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ProxyQuery {
    src: Option<String>,
}

/// `GET /proxy?src=<url>`: streams an image from a short-lived upstream URL.
///
/// Only hosts known to expire their links are proxied.
pub async fn proxy(State(state): State<AppState>, Query(query): Query<ProxyQuery>) -> Response {
    let Some(src) = query.src.filter(|s| !s.is_empty()) else {
        return (StatusCode::BAD_REQUEST, "Missing src parameter").into_response();
    };
    if !is_expiring_url(&src) {
        return (StatusCode::FORBIDDEN, "Source host is not proxied").into_response();
    }

    let span = info_span!("api.proxy", src = %sanitize::redact_url(&src));
    async {
        let upstream = match state.http.get(&src).send().await {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "Proxy fetch failed");
                return StatusCode::BAD_GATEWAY.into_response();
            }
        };

        let status = upstream.status();
        if !status.is_success() {
            warn!(status = status.as_u16(), "Upstream refused proxied image");
            let code = if status == reqwest::StatusCode::NOT_FOUND
                || status == reqwest::StatusCode::FORBIDDEN
            {
                StatusCode::NOT_FOUND
            } else {
                StatusCode::BAD_GATEWAY
            };
            return code.into_response();
        }

        let content_type = upstream
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("image/png")
            .to_string();

        (
            [
                (header::CONTENT_TYPE, content_type),
                (header::CACHE_CONTROL, "public, max-age=3600".to_string()),
            ],
            Body::from_stream(upstream.bytes_stream()),
        )
            .into_response()
    }
    .instrument(span)
    .await
}
