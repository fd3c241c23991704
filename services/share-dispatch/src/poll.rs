//! Timing knobs for the request pipeline: how copy jobs are polled and where
//! timestamps come from.

use std::time::Duration;

use chrono::{Local, NaiveDateTime};
use shared::config::Settings;

/// Fixed-interval polling of an asynchronous job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    /// `None` polls until the job reaches a terminal state.
    pub max_attempts: Option<u32>,
}

impl PollPolicy {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            interval: settings.copy_poll_interval(),
            max_attempts: settings.copy_poll_max_attempts,
        }
    }

    /// No delay between polls; for tests.
    pub fn immediate() -> Self {
        Self {
            interval: Duration::ZERO,
            max_attempts: None,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    pub fn allows(&self, attempt: u32) -> bool {
        self.max_attempts.map_or(true, |max| attempt < max)
    }
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            max_attempts: None,
        }
    }
}

pub trait Clock: Send + Sync {
    /// Local wall-clock time.
    fn now(&self) -> NaiveDateTime;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// A clock frozen at one instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub NaiveDateTime);

impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unbounded_policy_always_allows() {
        let policy = PollPolicy::default();
        assert!(policy.allows(0));
        assert!(policy.allows(u32::MAX - 1));
    }

    #[test]
    fn bounded_policy_stops_at_ceiling() {
        let policy = PollPolicy::immediate().with_max_attempts(3);
        assert!(policy.allows(2));
        assert!(!policy.allows(3));
    }
}
