//! Request handling for generation jobs.
//!
//! Resolves the [`GenerationKey`], claims it in the deduplicator, runs the
//! orchestrator and shapes the response. The in-flight guard is held for
//! the whole job and released on every exit path when it is dropped.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::db::{artifact_repo, Database};
use crate::dedup::{Acquisition, Rejection, RequestDeduplicator};
use crate::error::GenerationError;
use crate::storage::rewrite_for_display;

use super::item::{GenerationKey, WorkItem};
use super::orchestrator::{GeneratedArtifact, GenerationOrchestrator};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    pub city_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub force_new: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style_hints: Option<serde_json::Value>,
}

impl GenerateRequest {
    pub fn for_item(item: &WorkItem, force_new: bool) -> Self {
        Self {
            city_id: item.city_id.clone(),
            item_id: Some(item.item_id.clone()),
            item_text: Some(item.item_text.clone()),
            description: item.description.clone(),
            force_new,
            style_hints: item.style_hints.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duplicate: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elapsed_ms: Option<u64>,
}

impl GenerateResponse {
    pub fn is_duplicate(&self) -> bool {
        self.duplicate.unwrap_or(false)
    }
}

/// How a generation request ended.
#[derive(Debug)]
pub enum ServiceOutcome {
    Generated {
        artifact: GeneratedArtifact,
        elapsed_ms: u64,
    },
    Duplicate(Rejection),
    Failed(GenerationError),
}

impl ServiceOutcome {
    pub fn into_response(self) -> GenerateResponse {
        match self {
            ServiceOutcome::Generated {
                artifact,
                elapsed_ms,
            } => GenerateResponse {
                success: true,
                public_ref: Some(rewrite_for_display(&artifact.public_ref)),
                elapsed_ms: Some(elapsed_ms),
                ..GenerateResponse::default()
            },
            ServiceOutcome::Duplicate(rejection) => GenerateResponse {
                success: false,
                duplicate: Some(true),
                message: Some(rejection.reason),
                elapsed_ms: Some(rejection.elapsed_ms),
                ..GenerateResponse::default()
            },
            ServiceOutcome::Failed(error) => GenerateResponse {
                success: false,
                error: Some(error.to_string()),
                message: Some(error.kind().to_string()),
                ..GenerateResponse::default()
            },
        }
    }
}

pub struct GenerationService {
    orchestrator: Arc<GenerationOrchestrator>,
    dedup: Arc<RequestDeduplicator>,
    catalog: Option<Database>,
}

impl GenerationService {
    pub fn new(orchestrator: Arc<GenerationOrchestrator>, dedup: Arc<RequestDeduplicator>) -> Self {
        Self {
            orchestrator,
            dedup,
            catalog: None,
        }
    }

    /// Uses `db` to look up item text for requests that only carry an item
    /// id, and to remember the text of every item generated.
    pub fn with_catalog(mut self, db: Database) -> Self {
        self.catalog = Some(db);
        self
    }

    pub fn dedup(&self) -> &Arc<RequestDeduplicator> {
        &self.dedup
    }

    pub fn orchestrator(&self) -> &Arc<GenerationOrchestrator> {
        &self.orchestrator
    }

    pub async fn handle(&self, request: GenerateRequest) -> ServiceOutcome {
        let started = Instant::now();

        let item = match self.resolve(&request).await {
            Ok(item) => item,
            Err(e) => return ServiceOutcome::Failed(e),
        };
        let key = item.key();

        let _guard = match self.dedup.try_acquire(&key) {
            Acquisition::Accepted(guard) => guard,
            Acquisition::Rejected(rejection) => return ServiceOutcome::Duplicate(rejection),
        };

        match self.orchestrator.generate(&item, request.force_new).await {
            Ok(artifact) => {
                self.remember_item(&item).await;
                ServiceOutcome::Generated {
                    artifact,
                    elapsed_ms: started.elapsed().as_millis() as u64,
                }
            }
            Err(e) => {
                warn!(key = %key, kind = e.kind(), error = %e, "Generation failed");
                ServiceOutcome::Failed(e)
            }
        }
    }

    async fn resolve(&self, request: &GenerateRequest) -> Result<WorkItem, GenerationError> {
        let city_id = request.city_id.trim();
        if city_id.is_empty() {
            return Err(GenerationError::InvalidRequest("cityId is required".to_string()));
        }

        let item_id = non_blank(request.item_id.as_deref());
        let item_text = non_blank(request.item_text.as_deref());

        let item = match (item_id, item_text) {
            (Some(id), Some(text)) => WorkItem::new(city_id, id, text),
            (None, Some(text)) => WorkItem::from_text(city_id, text),
            (Some(id), None) => {
                let text = self.lookup_item_text(&GenerationKey::new(city_id, id)).await?;
                WorkItem::new(city_id, id, &text)
            }
            (None, None) => {
                return Err(GenerationError::InvalidRequest(
                    "itemId or itemText is required".to_string(),
                ))
            }
        };

        Ok(item
            .with_description(request.description.clone())
            .with_style_hints(request.style_hints.clone()))
    }

    async fn lookup_item_text(&self, key: &GenerationKey) -> Result<String, GenerationError> {
        let unknown = || GenerationError::InvalidRequest(format!("No item text known for {}", key));

        let Some(db) = self.catalog.clone() else {
            return Err(unknown());
        };
        let lookup_key = key.clone();
        let row = tokio::task::spawn_blocking(move || {
            artifact_repo::find(&db, lookup_key.city_id(), lookup_key.item_id())
        })
        .await
        .map_err(|e| GenerationError::Upstream(e.to_string()))?
        .map_err(|e| GenerationError::Upstream(format!("Item lookup failed: {}", e)))?;

        row.and_then(|r| r.item_text)
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(unknown)
    }

    async fn remember_item(&self, item: &WorkItem) {
        let Some(db) = self.catalog.clone() else {
            return;
        };
        let (city_id, item_id, text) = (
            item.city_id.clone(),
            item.item_id.clone(),
            item.item_text.clone(),
        );
        let result = tokio::task::spawn_blocking(move || {
            artifact_repo::upsert_item_text(&db, &city_id, &item_id, &text)
        })
        .await;

        match result {
            Ok(Ok(())) => debug!(key = %item.key(), "Recorded item text"),
            Ok(Err(e)) => warn!(key = %item.key(), error = %e, "Failed to record item text"),
            Err(e) => warn!(key = %item.key(), error = %e, "Failed to record item text"),
        }
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
