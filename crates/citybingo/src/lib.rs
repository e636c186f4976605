pub mod app;
pub mod config;
pub mod db;
pub mod dedup;
pub mod error;
pub mod generation;
pub mod persistence;
pub mod retry;
pub mod sanitize;
pub mod scheduler;
pub mod storage;

pub use app::CoreServices;
pub use config::{load_config, load_config_or_default, Config};
pub use dedup::{Acquisition, InFlightGuard, Rejection, RequestDeduplicator};
pub use error::{
    AssetError, CityBingoError, ConfigError, GenerationError, PersistError, Result,
    SchedulerError, StoreError,
};
pub use generation::{
    GenerateRequest, GenerateResponse, GenerationKey, GenerationOrchestrator, GenerationService,
    ImageGenerator, ImagePrompt, ServiceOutcome, WorkItem,
};
pub use persistence::{DurableWriter, PersistOutcome, PersistTicket, ReferenceStore};
pub use scheduler::{BatchOutcome, BatchPolicy, ClientBatchScheduler, JobOutcome};
pub use storage::{Artifact, AssetCache, StorageRoot};
