//! Wiring of the core components from a [`Config`].

use std::sync::Arc;

use tracing::info;

use crate::config::Config;
use crate::db::Database;
use crate::dedup::RequestDeduplicator;
use crate::error::{ConfigError, Result};
use crate::generation::{
    GenerationOrchestrator, GenerationService, ImageGenerator, OpenAiImageGenerator,
};
use crate::persistence::{
    CachedReferenceStore, DurableWriter, ReferenceStore, SqliteReferenceStore,
};
use crate::storage::{AssetCache, StorageRoot};

/// Shared handles to every core component of a running process.
#[derive(Clone)]
pub struct CoreServices {
    pub config: Arc<Config>,
    pub db: Database,
    pub assets: Arc<AssetCache>,
    pub dedup: Arc<RequestDeduplicator>,
    pub writer: Arc<DurableWriter>,
    pub service: Arc<GenerationService>,
}

impl CoreServices {
    /// Opens the configured database and uses the configured HTTP generator.
    pub fn from_config(config: Config) -> Result<Self> {
        let db_path = config
            .persistence
            .database_path()
            .ok_or_else(|| ConfigError::Validation {
                message: "No database path configured and no platform data directory".to_string(),
            })?;
        let db = Database::open(&db_path)?;
        let generator = Arc::new(OpenAiImageGenerator::new(config.generator.settings())?);
        Self::assemble(config, db, generator)
    }

    /// Builds the components around an existing database and generator.
    pub fn assemble(
        config: Config,
        db: Database,
        generator: Arc<dyn ImageGenerator>,
    ) -> Result<Self> {
        let backing = Arc::new(SqliteReferenceStore::new(db.clone()));
        Self::assemble_with_backing_store(config, db, generator, backing)
    }

    /// Like [`assemble`](Self::assemble), but persists references through
    /// `backing`. The read cache is still layered on top.
    pub fn assemble_with_backing_store(
        config: Config,
        db: Database,
        generator: Arc<dyn ImageGenerator>,
        backing: Arc<dyn ReferenceStore>,
    ) -> Result<Self> {
        let root = StorageRoot::initialize(
            config.storage.primary_path(),
            config.storage.fallback_path(),
        )?;
        if root.is_fallback() {
            info!("Artifacts are stored in the fallback directory");
        }
        let assets = Arc::new(AssetCache::new(root, config.storage.asset_cache_options())?);

        let store = CachedReferenceStore::new(backing, config.persistence.cache_capacity);
        let writer = Arc::new(DurableWriter::new(
            Arc::new(store),
            config.persistence.retry_policy(),
        ));

        let dedup = Arc::new(RequestDeduplicator::new(config.dedup.stale_after()));
        let orchestrator = Arc::new(GenerationOrchestrator::new(
            generator,
            assets.clone(),
            writer.clone(),
        ));
        let service = Arc::new(
            GenerationService::new(orchestrator, dedup.clone()).with_catalog(db.clone()),
        );

        Ok(Self {
            config: Arc::new(config),
            db,
            assets,
            dedup,
            writer,
            service,
        })
    }
}
