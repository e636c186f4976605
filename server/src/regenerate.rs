//! Batch regeneration of a city's images through a running server.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use citybingo::config::Config;
use citybingo::db::Database;
use citybingo::scheduler::{CatalogItemSource, HttpSubmitter, LogRefresher};
use citybingo::{load_config_or_default, BatchPolicy, ClientBatchScheduler, ConfigError};
use tracing::{info, warn};

use crate::error::ServerError;

pub struct RegenerateArgs {
    pub config_path: PathBuf,
    pub city: String,
    pub server: String,
    pub force_new: bool,
    pub spacing_ms: Option<u64>,
}

pub async fn run(args: RegenerateArgs) -> Result<(), ServerError> {
    let config = load_config_or_default(&args.config_path)?;
    let db_path = config
        .persistence
        .database_path()
        .ok_or_else(|| ConfigError::Validation {
            message: "No database path configured".to_string(),
        })?;
    let db = Database::open(&db_path)?;

    let submitter = Arc::new(HttpSubmitter::new(&args.server, args.force_new)?);
    let scheduler = ClientBatchScheduler::new(submitter, Arc::new(LogRefresher))
        .with_refresh_every(config.batch.refresh_every);
    let policy = policy_for(&config, args.spacing_ms);

    info!(city = %args.city, server = %args.server, ?policy, "Regenerating city");
    let outcome = scheduler
        .run_for_city(&CatalogItemSource::new(db), &args.city, policy)
        .await?;

    for (key, error) in &outcome.failures {
        warn!(key = %key, error = %error, "Item failed");
    }
    info!(
        total = outcome.total,
        succeeded = outcome.success_count,
        failed = outcome.failure_count,
        duplicates = outcome.duplicate_count,
        "Regeneration finished"
    );
    Ok(())
}

fn policy_for(config: &Config, spacing_ms: Option<u64>) -> BatchPolicy {
    match spacing_ms {
        Some(ms) => BatchPolicy::FixedSpacing {
            spacing: Duration::from_millis(ms),
        },
        None => config.batch.policy.into(),
    }
}
