use serde::Serialize;

use crate::generation::GenerationKey;

/// How one submitted job ended, as seen by the scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Succeeded { public_ref: String },
    Failed { error: String },
    /// Another job for the same key was already running.
    Duplicate { elapsed_ms: u64 },
}

/// Counters of a batch in progress, handed to the refresher.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchProgress {
    pub total: usize,
    pub completed: usize,
    pub success_count: usize,
    pub failure_count: usize,
    pub duplicate_count: usize,
}

/// Final tally of a batch run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchOutcome {
    pub total: usize,
    pub success_count: usize,
    pub failure_count: usize,
    pub duplicate_count: usize,
    /// Number of refreshes triggered, including the final one.
    pub refreshes: usize,
    #[serde(skip)]
    pub failures: Vec<(GenerationKey, String)>,
}

impl BatchOutcome {
    pub(crate) fn new(total: usize) -> Self {
        Self {
            total,
            ..Self::default()
        }
    }

    pub(crate) fn record(&mut self, key: GenerationKey, outcome: &JobOutcome) {
        match outcome {
            JobOutcome::Succeeded { .. } => self.success_count += 1,
            JobOutcome::Failed { error } => {
                self.failure_count += 1;
                self.failures.push((key, error.clone()));
            }
            JobOutcome::Duplicate { .. } => self.duplicate_count += 1,
        }
    }

    pub fn completed(&self) -> usize {
        self.success_count + self.failure_count + self.duplicate_count
    }

    pub fn progress(&self) -> BatchProgress {
        BatchProgress {
            total: self.total,
            completed: self.completed(),
            success_count: self.success_count,
            failure_count: self.failure_count,
            duplicate_count: self.duplicate_count,
        }
    }
}
