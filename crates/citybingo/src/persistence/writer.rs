//! Verified, retried writes of artifact references.
//!
//! Every generation job takes a [`PersistTicket`] when it starts. Only the
//! holder of the newest ticket for a key may write: a job that was declared
//! stale and finishes late sees that it has been superseded and leaves the
//! row to the newer job.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::time::Instant;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::error::{PersistError, StoreError};
use crate::generation::GenerationKey;
use crate::retry::{retry_with_backoff, RetryPolicy};

use super::store::ReferenceStore;

type LatestTickets = Arc<Mutex<HashMap<GenerationKey, u64>>>;

/// Right to write the reference for one key, issued at job start.
///
/// Dropping the newest ticket for a key forgets the key, so the table only
/// holds keys with a job in progress.
#[derive(Debug)]
pub struct PersistTicket {
    key: GenerationKey,
    issued_at: Instant,
    sequence: u64,
    latest: LatestTickets,
}

impl PersistTicket {
    pub fn key(&self) -> &GenerationKey {
        &self.key
    }

    pub fn issued_at(&self) -> Instant {
        self.issued_at
    }
}

impl Drop for PersistTicket {
    fn drop(&mut self) {
        let mut latest = lock(&self.latest);
        if latest.get(&self.key) == Some(&self.sequence) {
            latest.remove(&self.key);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistOutcome {
    /// The store holds the reference and a read-back confirmed it.
    Verified,
    /// A newer job owns the key; nothing was written (or the newer value won).
    Superseded,
}

pub struct DurableWriter {
    store: Arc<dyn ReferenceStore>,
    policy: RetryPolicy,
    /// Newest ticket sequence per key with a job in progress.
    latest: LatestTickets,
    next_sequence: AtomicU64,
}

impl DurableWriter {
    pub fn new(store: Arc<dyn ReferenceStore>, policy: RetryPolicy) -> Self {
        Self {
            store,
            policy,
            latest: Arc::new(Mutex::new(HashMap::new())),
            next_sequence: AtomicU64::new(1),
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn store(&self) -> &Arc<dyn ReferenceStore> {
        &self.store
    }

    /// Issues a ticket for `key`. Any earlier ticket for the key is superseded.
    pub fn begin(&self, key: &GenerationKey) -> PersistTicket {
        let sequence = self.next_sequence.fetch_add(1, Ordering::Relaxed);
        lock(&self.latest).insert(key.clone(), sequence);

        PersistTicket {
            key: key.clone(),
            issued_at: Instant::now(),
            sequence,
            latest: Arc::clone(&self.latest),
        }
    }

    /// Whether the ticket is still the newest one issued for its key.
    ///
    /// A ticket whose key was forgotten (the newer job already finished) is
    /// not current either.
    pub fn is_current(&self, ticket: &PersistTicket) -> bool {
        lock(&self.latest)
            .get(&ticket.key)
            .is_some_and(|latest| *latest == ticket.sequence)
    }

    /// Number of keys with an outstanding ticket.
    pub fn tracked_keys(&self) -> usize {
        lock(&self.latest).len()
    }

    /// Writes `reference` for the ticket's key and reads it back.
    ///
    /// Store errors and read-back mismatches count as failed attempts. After
    /// the last backoff sleep the store is read one final time before the
    /// write is declared failed.
    pub async fn persist(
        &self,
        ticket: &PersistTicket,
        reference: &str,
    ) -> Result<PersistOutcome, PersistError> {
        let span = info_span!("durable_writer.persist", key = %ticket.key);

        async {
            let label = ticket.key.to_string();
            let result = retry_with_backoff(&self.policy, &label, |_| {
                self.attempt(ticket, reference)
            })
            .await;

            let exhausted = match result {
                Ok(outcome) => {
                    log_outcome(ticket, outcome);
                    return Ok(outcome);
                }
                Err(exhausted) => exhausted,
            };

            match self.store.read_authoritative(&ticket.key).await {
                Ok(Some(value)) if value == reference => {
                    info!("Reference verified on final read");
                    return Ok(PersistOutcome::Verified);
                }
                _ if !self.is_current(ticket) => {
                    log_outcome(ticket, PersistOutcome::Superseded);
                    return Ok(PersistOutcome::Superseded);
                }
                _ => {}
            }

            warn!(attempts = exhausted.attempts, "Reference could not be verified");
            Err(PersistError::VerificationFailed {
                key: ticket.key.to_string(),
                attempts: exhausted.attempts,
                last_error: exhausted.last_error.map(|e| e.to_string()),
            })
        }
        .instrument(span)
        .await
    }

    async fn attempt(
        &self,
        ticket: &PersistTicket,
        reference: &str,
    ) -> Result<Option<PersistOutcome>, StoreError> {
        if !self.is_current(ticket) {
            return Ok(Some(PersistOutcome::Superseded));
        }

        self.store.write(&ticket.key, reference).await?;

        match self.store.read_authoritative(&ticket.key).await? {
            Some(value) if value == reference => Ok(Some(PersistOutcome::Verified)),
            _ if !self.is_current(ticket) => Ok(Some(PersistOutcome::Superseded)),
            other => {
                debug!(found = ?other, "Read-back does not match written reference");
                Ok(None)
            }
        }
    }
}

fn lock(latest: &LatestTickets) -> MutexGuard<'_, HashMap<GenerationKey, u64>> {
    latest.lock().unwrap_or_else(|e| e.into_inner())
}

fn log_outcome(ticket: &PersistTicket, outcome: PersistOutcome) {
    match outcome {
        PersistOutcome::Verified => debug!("Reference verified"),
        PersistOutcome::Superseded => info!(
            held_for_ms = ticket.issued_at.elapsed().as_millis() as u64,
            "Newer job owns this key; leaving its reference in place"
        ),
    }
}
