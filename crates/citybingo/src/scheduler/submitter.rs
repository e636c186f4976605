//! Where a batch sends its jobs, and how it learns what to send.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, info};

use crate::db::{artifact_repo, Database};
use crate::error::SchedulerError;
use crate::generation::{
    GenerateRequest, GenerateResponse, GenerationService, ServiceOutcome, WorkItem,
};

use super::outcome::{BatchProgress, JobOutcome};

#[async_trait]
pub trait JobSubmitter: Send + Sync {
    async fn submit(&self, item: &WorkItem) -> JobOutcome;
}

/// Called periodically while a batch runs so the caller can reload state.
#[async_trait]
pub trait StateRefresher: Send + Sync {
    async fn refresh(&self, progress: BatchProgress);
}

#[async_trait]
pub trait ItemSource: Send + Sync {
    async fn items_for_city(&self, city_id: &str) -> Result<Vec<WorkItem>, SchedulerError>;
}

/// Submits jobs to an in-process [`GenerationService`].
pub struct ServiceSubmitter {
    service: Arc<GenerationService>,
    force_new: bool,
}

impl ServiceSubmitter {
    pub fn new(service: Arc<GenerationService>, force_new: bool) -> Self {
        Self { service, force_new }
    }
}

#[async_trait]
impl JobSubmitter for ServiceSubmitter {
    async fn submit(&self, item: &WorkItem) -> JobOutcome {
        let outcome = self
            .service
            .handle(GenerateRequest::for_item(item, self.force_new))
            .await;
        match outcome {
            ServiceOutcome::Generated { artifact, .. } => JobOutcome::Succeeded {
                public_ref: artifact.public_ref,
            },
            ServiceOutcome::Duplicate(rejection) => JobOutcome::Duplicate {
                elapsed_ms: rejection.elapsed_ms,
            },
            ServiceOutcome::Failed(e) => JobOutcome::Failed {
                error: e.to_string(),
            },
        }
    }
}

/// Submits jobs to a running server's `POST /api/generate`.
pub struct HttpSubmitter {
    client: Client,
    endpoint: String,
    force_new: bool,
}

impl HttpSubmitter {
    pub fn new(base_url: &str, force_new: bool) -> Result<Self, SchedulerError> {
        let client = Client::builder()
            .user_agent(format!("citybingo-regenerate/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SchedulerError::AggregateFailure {
                reason: format!("Failed to create HTTP client: {}", e),
            })?;
        Ok(Self {
            client,
            endpoint: format!("{}/api/generate", base_url.trim_end_matches('/')),
            force_new,
        })
    }
}

#[async_trait]
impl JobSubmitter for HttpSubmitter {
    async fn submit(&self, item: &WorkItem) -> JobOutcome {
        let request = GenerateRequest::for_item(item, self.force_new);
        let response = match self.client.post(&self.endpoint).json(&request).send().await {
            Ok(response) => response,
            Err(e) => {
                return JobOutcome::Failed {
                    error: format!("Request failed: {}", e),
                }
            }
        };

        // Error statuses still carry a response body.
        let status = response.status();
        match response.json::<GenerateResponse>().await {
            Ok(body) => response_outcome(body),
            Err(e) => JobOutcome::Failed {
                error: format!("HTTP {}: unreadable response ({})", status, e),
            },
        }
    }
}

fn response_outcome(body: GenerateResponse) -> JobOutcome {
    if body.is_duplicate() {
        return JobOutcome::Duplicate {
            elapsed_ms: body.elapsed_ms.unwrap_or(0),
        };
    }
    match (body.success, body.public_ref) {
        (true, Some(public_ref)) => JobOutcome::Succeeded { public_ref },
        _ => JobOutcome::Failed {
            error: body
                .error
                .or(body.message)
                .unwrap_or_else(|| "generation failed".to_string()),
        },
    }
}

/// Refresher for runs nobody is watching.
pub struct NoopRefresher;

#[async_trait]
impl StateRefresher for NoopRefresher {
    async fn refresh(&self, progress: BatchProgress) {
        debug!(completed = progress.completed, total = progress.total, "Refresh skipped");
    }
}

/// Reports progress through the log.
pub struct LogRefresher;

#[async_trait]
impl StateRefresher for LogRefresher {
    async fn refresh(&self, progress: BatchProgress) {
        info!(
            completed = progress.completed,
            total = progress.total,
            succeeded = progress.success_count,
            failed = progress.failure_count,
            duplicates = progress.duplicate_count,
            "Batch progress"
        );
    }
}

/// Items recorded in the `item_artifacts` table.
pub struct CatalogItemSource {
    db: Database,
}

impl CatalogItemSource {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ItemSource for CatalogItemSource {
    async fn items_for_city(&self, city_id: &str) -> Result<Vec<WorkItem>, SchedulerError> {
        let db = self.db.clone();
        let city = city_id.to_string();
        let rows = tokio::task::spawn_blocking(move || artifact_repo::list_by_city(&db, &city))
            .await
            .map_err(|e| SchedulerError::AggregateFailure {
                reason: e.to_string(),
            })?
            .map_err(|e| SchedulerError::AggregateFailure {
                reason: format!("Failed to list items for {}: {}", city_id, e),
            })?;

        Ok(rows
            .into_iter()
            .filter_map(|row| {
                let text = row.item_text.filter(|t| !t.trim().is_empty())?;
                Some(WorkItem::new(&row.city_id, &row.item_id, &text))
            })
            .collect())
    }
}
