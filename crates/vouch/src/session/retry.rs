//! Bounded retry with fixed backoff for landmark source readiness.

use std::time::Duration;

use crate::config::SessionConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
    /// Bound on a single attempt
    pub attempt_timeout: Duration,
}

impl From<&SessionConfig> for RetryPolicy {
    fn from(config: &SessionConfig) -> Self {
        Self {
            max_attempts: config.init_max_attempts,
            backoff: config.init_backoff(),
            attempt_timeout: config.init_attempt_timeout(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Wait this long, then try again
    Backoff(Duration),
    GiveUp,
}

/// Counts attempts and backoff waits against a [`RetryPolicy`]
#[derive(Debug)]
pub struct RetryTracker {
    policy: RetryPolicy,
    attempts: u32,
    backoff_waits: u32,
}

impl RetryTracker {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            attempts: 0,
            backoff_waits: 0,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Record the start of an attempt; returns its 1-based number
    pub fn begin_attempt(&mut self) -> u32 {
        self.attempts += 1;
        self.attempts
    }

    /// Decide what follows a failed attempt
    pub fn on_failure(&mut self) -> RetryDecision {
        if self.attempts >= self.policy.max_attempts {
            RetryDecision::GiveUp
        } else {
            self.backoff_waits += 1;
            RetryDecision::Backoff(self.policy.backoff)
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn backoff_waits(&self) -> u32 {
        self.backoff_waits
    }
}
