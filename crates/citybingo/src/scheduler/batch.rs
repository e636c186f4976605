use std::collections::HashSet;
use std::sync::Arc;

use futures_util::stream::{FuturesUnordered, StreamExt};
use tokio::time::{sleep, sleep_until, Instant};
use tracing::{debug, info, info_span, warn, Instrument};

use crate::error::SchedulerError;
use crate::generation::{GenerationKey, WorkItem};

use super::outcome::{BatchOutcome, JobOutcome};
use super::policy::BatchPolicy;
use super::submitter::{ItemSource, JobSubmitter, StateRefresher};

/// Default number of completions between refreshes.
pub const DEFAULT_REFRESH_EVERY: usize = 5;

/// Paces a bulk set of generation jobs from the client side.
///
/// Individual failures never abort a run; they are counted and the run
/// continues with the next item.
pub struct ClientBatchScheduler {
    submitter: Arc<dyn JobSubmitter>,
    refresher: Arc<dyn StateRefresher>,
    refresh_every: usize,
}

impl ClientBatchScheduler {
    pub fn new(submitter: Arc<dyn JobSubmitter>, refresher: Arc<dyn StateRefresher>) -> Self {
        Self {
            submitter,
            refresher,
            refresh_every: DEFAULT_REFRESH_EVERY,
        }
    }

    pub fn with_refresh_every(mut self, refresh_every: usize) -> Self {
        self.refresh_every = refresh_every.max(1);
        self
    }

    /// Fetches the items of a city from `source` and runs them as one batch.
    pub async fn run_for_city(
        &self,
        source: &dyn ItemSource,
        city_id: &str,
        policy: BatchPolicy,
    ) -> Result<BatchOutcome, SchedulerError> {
        let items = source.items_for_city(city_id).await?;
        info!(city_id, items = items.len(), "Starting batch for city");
        Ok(self.run_batch(items, policy).await)
    }

    pub async fn run_batch(&self, items: Vec<WorkItem>, policy: BatchPolicy) -> BatchOutcome {
        let span = info_span!("batch", total = items.len());

        async {
            let mut run = Run::new(self, items.len());

            let mut seen: HashSet<GenerationKey> = HashSet::new();
            let mut unique = Vec::with_capacity(items.len());
            for item in items {
                if seen.insert(item.key()) {
                    unique.push(item);
                } else {
                    debug!(key = %item.key(), "Item already submitted in this run");
                    run.complete(item.key(), JobOutcome::Duplicate { elapsed_ms: 0 })
                        .await;
                }
            }

            match policy {
                BatchPolicy::FixedConcurrency {
                    group_size,
                    inter_batch_delay,
                } => {
                    let groups: Vec<&[WorkItem]> = unique.chunks(group_size.max(1)).collect();
                    for (index, group) in groups.iter().enumerate() {
                        if index > 0 && !inter_batch_delay.is_zero() {
                            sleep(inter_batch_delay).await;
                        }
                        let mut pending: FuturesUnordered<_> =
                            group.iter().map(|item| self.submit(item)).collect();
                        while let Some((key, outcome)) = pending.next().await {
                            run.complete(key, outcome).await;
                        }
                    }
                }
                BatchPolicy::FixedSpacing { .. } => {
                    // One task per job: start times stay on the grid while
                    // `run.complete` awaits a refresh.
                    let start = Instant::now();
                    let mut pending: FuturesUnordered<_> = unique
                        .iter()
                        .enumerate()
                        .map(|(index, item)| {
                            let at = start + policy.start_offset(index).unwrap_or_default();
                            let submitter = self.submitter.clone();
                            let item = item.clone();
                            let key = item.key();
                            let job = tokio::spawn(
                                async move {
                                    sleep_until(at).await;
                                    submit_job(submitter.as_ref(), &item).await
                                }
                                .in_current_span(),
                            );
                            async move { (key, job.await) }
                        })
                        .collect();
                    while let Some((key, joined)) = pending.next().await {
                        let outcome = joined.unwrap_or_else(|e| {
                            warn!(key = %key, error = %e, "Job task failed");
                            JobOutcome::Failed {
                                error: format!("Job task failed: {}", e),
                            }
                        });
                        run.complete(key, outcome).await;
                    }
                }
            }

            run.finish().await
        }
        .instrument(span)
        .await
    }

    async fn submit(&self, item: &WorkItem) -> (GenerationKey, JobOutcome) {
        (item.key(), submit_job(self.submitter.as_ref(), item).await)
    }
}

async fn submit_job(submitter: &dyn JobSubmitter, item: &WorkItem) -> JobOutcome {
    debug!(key = %item.key(), "Submitting job");
    let outcome = submitter.submit(item).await;
    if let JobOutcome::Failed { error } = &outcome {
        warn!(key = %item.key(), error = %error, "Job failed");
    }
    outcome
}

/// Counters and refresh bookkeeping for one run.
struct Run<'a> {
    scheduler: &'a ClientBatchScheduler,
    outcome: BatchOutcome,
}

impl<'a> Run<'a> {
    fn new(scheduler: &'a ClientBatchScheduler, total: usize) -> Self {
        Self {
            scheduler,
            outcome: BatchOutcome::new(total),
        }
    }

    async fn complete(&mut self, key: GenerationKey, outcome: JobOutcome) {
        self.outcome.record(key, &outcome);
        if self.outcome.completed() % self.scheduler.refresh_every == 0 {
            self.refresh().await;
        }
    }

    async fn refresh(&mut self) {
        self.outcome.refreshes += 1;
        self.scheduler.refresher.refresh(self.outcome.progress()).await;
    }

    async fn finish(mut self) -> BatchOutcome {
        self.refresh().await;
        info!(
            succeeded = self.outcome.success_count,
            failed = self.outcome.failure_count,
            duplicates = self.outcome.duplicate_count,
            "Batch finished"
        );
        self.outcome
    }
}
