use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use citybingo::{GenerateRequest, GenerationError, ServiceOutcome};
use tracing::{info_span, Instrument};

use crate::state::AppState;

/// `POST /api/generate`: generate (or reuse) the image for one item.
pub async fn generate(
    State(state): State<AppState>,
    Json(request): Json<GenerateRequest>,
) -> impl IntoResponse {
    let span = info_span!(
        "api.generate",
        city_id = %request.city_id,
        item_id = request.item_id.as_deref().unwrap_or("-"),
        force_new = request.force_new,
    );

    let outcome = state.core.service.handle(request).instrument(span).await;
    let status = status_for(&outcome);
    (status, Json(outcome.into_response()))
}

fn status_for(outcome: &ServiceOutcome) -> StatusCode {
    match outcome {
        ServiceOutcome::Generated { .. } => StatusCode::OK,
        ServiceOutcome::Duplicate(_) => StatusCode::CONFLICT,
        ServiceOutcome::Failed(GenerationError::InvalidRequest(_)) => StatusCode::BAD_REQUEST,
        ServiceOutcome::Failed(GenerationError::Upstream(_) | GenerationError::EmptyResult) => {
            StatusCode::BAD_GATEWAY
        }
        ServiceOutcome::Failed(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use citybingo::storage::RawSource;
    use citybingo::{GenerateResponse, GenerationError, ImageGenerator, ImagePrompt};
    use serde_json::json;

    use crate::routes::test_support::{spawn_app, InlineGenerator};

    struct SlowGenerator;

    #[async_trait]
    impl ImageGenerator for SlowGenerator {
        async fn generate_image(
            &self,
            _prompt: &ImagePrompt,
        ) -> Result<Option<String>, GenerationError> {
            tokio::time::sleep(Duration::from_millis(300)).await;
            Ok(Some(RawSource::inline_png(b"slow-image")))
        }
    }

    async fn post(base: &str, body: serde_json::Value) -> (u16, GenerateResponse) {
        let response = reqwest::Client::new()
            .post(format!("{}/api/generate", base))
            .json(&body)
            .send()
            .await
            .unwrap();
        let status = response.status().as_u16();
        (status, response.json().await.unwrap())
    }

    #[tokio::test]
    async fn test_generate_returns_public_ref() {
        let (_dir, state, base) = spawn_app(Arc::new(InlineGenerator)).await;

        let (status, body) = post(
            &base,
            json!({"cityId": "paris", "itemId": "louvre", "itemText": "Visit the Louvre"}),
        )
        .await;

        assert_eq!(status, 200);
        assert!(body.success);
        let public_ref = body.public_ref.unwrap();
        assert!(public_ref.starts_with("/images/"));
        assert!(state.core.assets.is_valid_reference(&public_ref).await);
    }

    #[tokio::test]
    async fn test_missing_item_fields_is_bad_request() {
        let (_dir, _state, base) = spawn_app(Arc::new(InlineGenerator)).await;

        let (status, body) = post(&base, json!({"cityId": "paris"})).await;

        assert_eq!(status, 400);
        assert!(!body.success);
        assert_eq!(body.message.as_deref(), Some("invalid_request"));
    }

    #[tokio::test]
    async fn test_concurrent_duplicate_is_conflict() {
        let (_dir, _state, base) = spawn_app(Arc::new(SlowGenerator)).await;
        let body = json!({"cityId": "paris", "itemText": "Eat a croissant"});

        let (first, second) = tokio::join!(post(&base, body.clone()), async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            post(&base, body.clone()).await
        });

        assert_eq!(first.0, 200);
        assert_eq!(second.0, 409);
        assert_eq!(second.1.duplicate, Some(true));
        assert!(second.1.elapsed_ms.is_some());
    }
}
