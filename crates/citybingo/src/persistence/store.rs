//! Durable store collaborators for artifact references.

use std::sync::Arc;

use async_trait::async_trait;
use moka::sync::Cache;

use crate::db::{artifact_repo, Database};
use crate::error::StoreError;
use crate::generation::GenerationKey;

/// Default number of references kept by [`CachedReferenceStore`].
pub const DEFAULT_CACHE_CAPACITY: u64 = 10_000;

/// Where the persisted reference of an item lives.
#[async_trait]
pub trait ReferenceStore: Send + Sync {
    async fn read(&self, key: &GenerationKey) -> Result<Option<String>, StoreError>;

    async fn write(&self, key: &GenerationKey, reference: &str) -> Result<(), StoreError>;

    /// Reads from the backing store, bypassing any cache layer.
    /// Write verification must use this.
    async fn read_authoritative(&self, key: &GenerationKey) -> Result<Option<String>, StoreError> {
        self.read(key).await
    }
}

#[async_trait]
impl<T: ReferenceStore + ?Sized> ReferenceStore for Arc<T> {
    async fn read(&self, key: &GenerationKey) -> Result<Option<String>, StoreError> {
        (**self).read(key).await
    }

    async fn write(&self, key: &GenerationKey, reference: &str) -> Result<(), StoreError> {
        (**self).write(key, reference).await
    }

    async fn read_authoritative(&self, key: &GenerationKey) -> Result<Option<String>, StoreError> {
        (**self).read_authoritative(key).await
    }
}

/// `item_artifacts.image` in SQLite.
#[derive(Clone)]
pub struct SqliteReferenceStore {
    db: Database,
}

impl SqliteReferenceStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }
}

#[async_trait]
impl ReferenceStore for SqliteReferenceStore {
    async fn read(&self, key: &GenerationKey) -> Result<Option<String>, StoreError> {
        let db = self.db.clone();
        let key = key.clone();
        tokio::task::spawn_blocking(move || {
            artifact_repo::read_image(&db, key.city_id(), key.item_id())
        })
        .await
        .map_err(|e| StoreError::Unavailable(e.to_string()))?
        .map_err(StoreError::from)
    }

    async fn write(&self, key: &GenerationKey, reference: &str) -> Result<(), StoreError> {
        let db = self.db.clone();
        let key = key.clone();
        let reference = reference.to_string();
        tokio::task::spawn_blocking(move || {
            artifact_repo::upsert_image(&db, key.city_id(), key.item_id(), &reference)
        })
        .await
        .map_err(|e| StoreError::Unavailable(e.to_string()))??;
        Ok(())
    }
}

/// Read-through cache in front of another store.
///
/// Writes never populate the cache. Only values read back from the inner
/// store are cached, so the cache cannot hold a reference the store lacks.
pub struct CachedReferenceStore<S> {
    inner: S,
    cache: Cache<GenerationKey, String>,
}

impl<S: ReferenceStore> CachedReferenceStore<S> {
    pub fn new(inner: S, capacity: u64) -> Self {
        Self {
            inner,
            cache: Cache::new(capacity),
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Forgets the cached value for `key`; the next read hits the store.
    pub fn invalidate(&self, key: &GenerationKey) {
        self.cache.invalidate(key);
    }
}

#[async_trait]
impl<S: ReferenceStore> ReferenceStore for CachedReferenceStore<S> {
    async fn read(&self, key: &GenerationKey) -> Result<Option<String>, StoreError> {
        if let Some(hit) = self.cache.get(key) {
            return Ok(Some(hit));
        }
        let value = self.inner.read(key).await?;
        if let Some(reference) = &value {
            self.cache.insert(key.clone(), reference.clone());
        }
        Ok(value)
    }

    async fn write(&self, key: &GenerationKey, reference: &str) -> Result<(), StoreError> {
        self.cache.invalidate(key);
        let result = self.inner.write(key, reference).await;
        // A read racing the write may have cached the old value.
        self.cache.invalidate(key);
        result
    }

    async fn read_authoritative(&self, key: &GenerationKey) -> Result<Option<String>, StoreError> {
        let value = self.inner.read_authoritative(key).await?;
        match &value {
            Some(reference) => self.cache.insert(key.clone(), reference.clone()),
            None => self.cache.invalidate(key),
        }
        Ok(value)
    }
}
