//! In-flight table that keeps one generation job per key.
//!
//! A record older than the staleness threshold is treated as abandoned: a new
//! job for the same key is accepted and takes the record over. The abandoned
//! job is not cancelled; its guard simply no longer owns the record.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};

use crate::generation::GenerationKey;

/// How long an in-flight record is trusted to represent active work.
pub const DEFAULT_STALE_AFTER: Duration = Duration::from_secs(120);

#[derive(Debug, Clone, Copy)]
struct InFlightRecord {
    started_at: Instant,
    owner: u64,
}

/// Why a job was not accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub key: GenerationKey,
    pub reason: String,
    /// Time since the active job for this key started.
    pub elapsed_ms: u64,
}

/// Result of [`RequestDeduplicator::try_acquire`].
#[derive(Debug)]
pub enum Acquisition {
    Accepted(InFlightGuard),
    Rejected(Rejection),
}

impl Acquisition {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Acquisition::Accepted(_))
    }
}

/// Process-wide table of in-flight generation jobs.
#[derive(Debug)]
pub struct RequestDeduplicator {
    table: Mutex<HashMap<GenerationKey, InFlightRecord>>,
    stale_after: Duration,
    next_owner: AtomicU64,
}

impl RequestDeduplicator {
    pub fn new(stale_after: Duration) -> Self {
        Self {
            table: Mutex::new(HashMap::new()),
            stale_after,
            next_owner: AtomicU64::new(1),
        }
    }

    pub fn stale_after(&self) -> Duration {
        self.stale_after
    }

    /// Registers a job for `key` unless a fresh one is already running.
    ///
    /// The returned guard releases the key when dropped, so every exit path
    /// of the caller (including early returns and panics) cleans up.
    pub fn try_acquire(self: &Arc<Self>, key: &GenerationKey) -> Acquisition {
        let now = Instant::now();
        let mut table = self.lock();

        if let Some(record) = table.get(key) {
            let elapsed = now.saturating_duration_since(record.started_at);
            if elapsed < self.stale_after {
                let elapsed_ms = elapsed.as_millis() as u64;
                debug!(key = %key, elapsed_ms, "Rejecting duplicate generation request");
                return Acquisition::Rejected(Rejection {
                    key: key.clone(),
                    reason: format!(
                        "{} is already being generated (started {}s ago)",
                        key,
                        elapsed.as_secs()
                    ),
                    elapsed_ms,
                });
            }
            warn!(
                key = %key,
                elapsed_secs = elapsed.as_secs(),
                "Replacing stale in-flight record"
            );
        }

        let owner = self.next_owner.fetch_add(1, Ordering::Relaxed);
        table.insert(
            key.clone(),
            InFlightRecord {
                started_at: now,
                owner,
            },
        );

        Acquisition::Accepted(InFlightGuard {
            dedup: Arc::clone(self),
            key: key.clone(),
            owner,
        })
    }

    /// Unconditionally removes the record for `key`.
    pub fn release(&self, key: &GenerationKey) {
        if self.lock().remove(key).is_some() {
            debug!(key = %key, "Released in-flight record");
        }
    }

    /// Removes the record only if `owner` still holds it. A job that was
    /// declared stale must not evict the job that replaced it.
    fn release_owned(&self, key: &GenerationKey, owner: u64) {
        let mut table = self.lock();
        match table.get(key) {
            Some(record) if record.owner == owner => {
                table.remove(key);
                debug!(key = %key, "Released in-flight record");
            }
            Some(_) => {
                debug!(key = %key, "Stale job finished after being replaced; keeping newer record");
            }
            None => {}
        }
    }

    /// Whether a record exists for `key`, stale or not.
    pub fn is_in_flight(&self, key: &GenerationKey) -> bool {
        self.lock().contains_key(key)
    }

    pub fn in_flight_count(&self) -> usize {
        self.lock().len()
    }

    /// Drops every record. Intended for tests and administrative resets.
    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<GenerationKey, InFlightRecord>> {
        // The table holds plain data; a panic elsewhere cannot leave it half-updated.
        self.table.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for RequestDeduplicator {
    fn default() -> Self {
        Self::new(DEFAULT_STALE_AFTER)
    }
}

/// Ownership of an in-flight record. Dropping it releases the key.
#[derive(Debug)]
pub struct InFlightGuard {
    dedup: Arc<RequestDeduplicator>,
    key: GenerationKey,
    owner: u64,
}

impl InFlightGuard {
    pub fn key(&self) -> &GenerationKey {
        &self.key
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.dedup.release_owned(&self.key, self.owner);
    }
}
