pub mod batch;
pub mod outcome;
pub mod policy;
pub mod submitter;

pub use batch::{ClientBatchScheduler, DEFAULT_REFRESH_EVERY};
pub use outcome::{BatchOutcome, BatchProgress, JobOutcome};
pub use policy::BatchPolicy;
pub use submitter::{
    CatalogItemSource, HttpSubmitter, ItemSource, JobSubmitter, LogRefresher, NoopRefresher,
    ServiceSubmitter, StateRefresher,
};
