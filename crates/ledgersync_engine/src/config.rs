//! Configuration for the sync engine.

use ledgersync_protocol::{Budget, DEFAULT_PAGE_SIZE};
use std::time::Duration;

/// Default upper bound on pages fetched by one full-collection read.
pub const DEFAULT_MAX_PAGES: usize = 10_000;

/// Configuration for sync operations.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Per-call size and count budget.
    pub budget: Budget,
    /// Page size for full-collection reads.
    pub page_size: usize,
    /// Maximum pages per full-collection read before giving up.
    pub max_pages: usize,
    /// What to do when a broadcast chunk fails.
    pub failure_policy: FailurePolicy,
}

impl SyncConfig {
    /// Creates a configuration with the default budgets.
    pub fn new() -> Self {
        Self {
            budget: Budget::default(),
            page_size: DEFAULT_PAGE_SIZE,
            max_pages: DEFAULT_MAX_PAGES,
            failure_policy: FailurePolicy::Halt,
        }
    }

    /// Sets the per-call budget.
    pub fn with_budget(mut self, budget: Budget) -> Self {
        self.budget = budget;
        self
    }

    /// Sets the size budget, in kilobytes.
    pub fn with_size_budget_kb(mut self, kilobytes: usize) -> Self {
        self.budget = Budget::from_kilobytes(kilobytes, self.budget.max_items);
        self
    }

    /// Sets the count budget (minimum 1).
    pub fn with_count_budget(mut self, items: usize) -> Self {
        self.budget.max_items = items.max(1);
        self
    }

    /// Sets the page size for full-collection reads.
    pub fn with_page_size(mut self, size: usize) -> Self {
        self.page_size = size.max(1);
        self
    }

    /// Sets the page limit for full-collection reads.
    pub fn with_max_pages(mut self, pages: usize) -> Self {
        self.max_pages = pages;
        self
    }

    /// Sets the broadcast failure policy.
    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// What the broadcaster does when a chunk fails.
#[derive(Debug, Clone, Default)]
pub enum FailurePolicy {
    /// Stop at the first failing chunk. Later chunks are never submitted.
    #[default]
    Halt,
    /// Re-submit a failing chunk on retryable errors, then halt.
    Retry(RetryConfig),
}

impl FailurePolicy {
    /// Returns the number of submission attempts per chunk.
    pub fn max_attempts(&self) -> u32 {
        match self {
            FailurePolicy::Halt => 1,
            FailurePolicy::Retry(retry) => retry.max_attempts.max(1),
        }
    }

    /// Returns the delay before attempt `attempt` (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        match self {
            FailurePolicy::Halt => Duration::ZERO,
            FailurePolicy::Retry(retry) => retry.delay_for_attempt(attempt),
        }
    }
}

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, the first one included.
    pub max_attempts: u32,
    /// Initial delay between retries.
    pub initial_delay: Duration,
    /// Maximum delay between retries.
    pub max_delay: Duration,
    /// Multiplier for exponential backoff.
    pub backoff_multiplier: f64,
    /// Whether to add jitter to delays.
    pub add_jitter: bool,
}

impl RetryConfig {
    /// Creates a new retry configuration.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            add_jitter: true,
        }
    }

    /// Sets the initial delay.
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Sets the maximum delay.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the backoff multiplier.
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Disables jitter.
    pub fn without_jitter(mut self) -> Self {
        self.add_jitter = false;
        self
    }

    /// Calculates the delay for a given attempt (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let base_delay = self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        let delay_secs = base_delay.min(self.max_delay.as_secs_f64());

        if self.add_jitter {
            // Up to 25% on top.
            let jitter = delay_secs * 0.25 * jitter_fraction();
            Duration::from_secs_f64(delay_secs + jitter)
        } else {
            Duration::from_secs_f64(delay_secs)
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new(3)
    }
}

/// Returns a value in `[0, 1)` derived from the wall clock.
fn jitter_fraction() -> f64 {
    let nanos = chrono::Utc::now().timestamp_subsec_nanos();
    f64::from(nanos % 1000) / 1000.0
}
