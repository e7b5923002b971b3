use std::time::Duration;

/// Exponential backoff with a ceiling and a bounded number of attempts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffPolicy {
    /// First delay, and the delay after a reset
    pub base: Duration,
    /// Growth applied after each handed-out delay
    pub factor: f64,
    /// Ceiling for any single delay
    pub max: Duration,
    /// Number of delays handed out before giving up
    pub max_attempts: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(2_000),
            factor: 1.5,
            max: Duration::from_millis(30_000),
            max_attempts: 5,
        }
    }
}

/// Running state of a [`BackoffPolicy`].
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: BackoffPolicy,
    current: Duration,
    attempts: u32,
}

impl Backoff {
    pub fn new(policy: BackoffPolicy) -> Self {
        Self {
            current: policy.base.min(policy.max),
            policy,
            attempts: 0,
        }
    }

    /// Delay to wait before the next attempt, or `None` once the attempt
    /// budget is spent. The stored delay grows after every call.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.exhausted() {
            return None;
        }
        self.attempts += 1;
        let delay = self.current;
        let grown = self.current.as_secs_f64() * self.policy.factor.max(1.0);
        self.current = Duration::from_secs_f64(grown.min(self.policy.max.as_secs_f64()));
        Some(delay)
    }

    pub fn reset(&mut self) {
        self.attempts = 0;
        self.current = self.policy.base.min(self.policy.max);
    }

    pub fn exhausted(&self) -> bool {
        self.attempts >= self.policy.max_attempts
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Delay the next call to `next_delay` will return
    pub fn current(&self) -> Duration {
        self.current
    }

    pub fn policy(&self) -> &BackoffPolicy {
        &self.policy
    }
}
