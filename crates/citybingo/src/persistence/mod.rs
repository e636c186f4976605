pub mod store;
pub mod writer;

pub use store::{
    CachedReferenceStore, ReferenceStore, SqliteReferenceStore, DEFAULT_CACHE_CAPACITY,
};
pub use writer::{DurableWriter, PersistOutcome, PersistTicket};
