use std::time::Duration;

/// Decides how long the delivery worker waits after a failed connect or
/// delivery attempt, and whether it tries again at all.
pub trait RetryPolicy: Send + Sync {
    /// Delay before the next attempt after `failures` consecutive failures
    /// (always at least 1). `None` stops the worker.
    fn next_delay(&self, failures: u32) -> Option<Duration>;
}

/// Retry forever with the same pause between attempts.
#[derive(Debug, Clone, Copy)]
pub struct FixedDelay {
    delay: Duration,
}

impl FixedDelay {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

impl RetryPolicy for FixedDelay {
    fn next_delay(&self, _failures: u32) -> Option<Duration> {
        Some(self.delay)
    }
}

/// Fixed delay, giving up after `max_failures` consecutive failures.
#[derive(Debug, Clone, Copy)]
pub struct LimitedAttempts {
    delay: Duration,
    max_failures: u32,
}

impl LimitedAttempts {
    pub fn new(delay: Duration, max_failures: u32) -> Self {
        Self {
            delay,
            max_failures,
        }
    }
}

impl RetryPolicy for LimitedAttempts {
    fn next_delay(&self, failures: u32) -> Option<Duration> {
        (failures < self.max_failures).then_some(self.delay)
    }
}
