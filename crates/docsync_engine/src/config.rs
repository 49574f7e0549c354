//! Configuration for the buffered document.

use crate::error::CommitError;
use std::time::Duration;

/// Delay before a failed commit is attempted again.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(1000);

/// Configuration for a buffered document.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Label attached to log events.
    pub label: String,
    /// Retry configuration.
    pub retry: RetryConfig,
}

impl EngineConfig {
    /// Creates a configuration with the given log label.
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            retry: RetryConfig::default(),
        }
    }

    /// Sets the log label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Sets the retry configuration.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new("document")
    }
}

/// Configuration for retrying failed commits.
///
/// The default retries every failure forever after a fixed delay. Failures
/// are not classified as permanent unless `honor_retryable` is set.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Fixed delay between a failure and the next attempt.
    pub delay: Duration,
    /// Maximum number of attempts per commit, if limited.
    pub max_attempts: Option<u32>,
    /// Whether a non-retryable failure drops the commit.
    pub honor_retryable: bool,
}

impl RetryConfig {
    /// Creates an unconditional retry configuration with the given delay.
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            max_attempts: None,
            honor_retryable: false,
        }
    }

    /// Retries every failure forever after the default delay.
    pub fn unconditional() -> Self {
        Self::new(DEFAULT_RETRY_DELAY)
    }

    /// Sets the delay.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Limits the number of attempts per commit.
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts);
        self
    }

    /// Drops commits whose failure is reported as non-retryable.
    pub fn honoring_retryable(mut self) -> Self {
        self.honor_retryable = true;
        self
    }

    /// Decides whether a commit that has failed `tries` times is attempted
    /// again after `error`.
    pub fn should_retry(&self, error: &CommitError, tries: u32) -> bool {
        if self.honor_retryable && !error.is_retryable() {
            return false;
        }
        match self.max_attempts {
            Some(max) => tries < max,
            None => true,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::unconditional()
    }
}
