use std::time::Duration;

/// How a batch paces its submissions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchPolicy {
    /// Run `group_size` jobs at once, wait for the whole group, pause, repeat.
    FixedConcurrency {
        group_size: usize,
        inter_batch_delay: Duration,
    },
    /// Start job `i` exactly `i * spacing` after the run started, whether or
    /// not earlier jobs have finished.
    FixedSpacing { spacing: Duration },
}

impl Default for BatchPolicy {
    fn default() -> Self {
        BatchPolicy::FixedConcurrency {
            group_size: 3,
            inter_batch_delay: Duration::from_secs(5),
        }
    }
}

impl BatchPolicy {
    /// Offset from the run start at which job `index` may start, for
    /// policies that fix start times up front.
    pub fn start_offset(&self, index: usize) -> Option<Duration> {
        match self {
            BatchPolicy::FixedSpacing { spacing } => {
                Some(spacing.saturating_mul(u32::try_from(index).unwrap_or(u32::MAX)))
            }
            BatchPolicy::FixedConcurrency { .. } => None,
        }
    }
}
