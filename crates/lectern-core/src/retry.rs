//! Retry policy for transient provider failures.

use std::time::Duration;

use backon::ExponentialBuilder;
use serde::{Deserialize, Serialize};

use crate::error::LecternError;

/// Exponential backoff applied per provider before failing over.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Retries after the first attempt on the same provider.
    pub max_retries: u32,
    /// Delay before the first retry (milliseconds).
    pub base_delay_ms: u64,
    /// Maximum delay between retries (milliseconds).
    pub max_delay_ms: u64,
    /// Multiplier for exponential backoff.
    pub multiplier: f32,
    /// Randomize each delay.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay_ms: 500,
            max_delay_ms: 10_000,
            multiplier: 2.0_f32,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Builder: set the retry count.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Builder: set base and cap delays.
    pub fn with_delays(mut self, base: Duration, max: Duration) -> Self {
        self.base_delay_ms = base.as_millis() as u64;
        self.max_delay_ms = max.as_millis() as u64;
        self
    }

    /// Builder: toggle jitter.
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Total attempts per provider.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Longest wait between two attempts on one provider.
    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms.max(self.base_delay_ms))
    }

    /// Whether `err` may be retried on the same provider.
    ///
    /// A transient error asking for a `Retry-After` longer than
    /// [`max_delay`](Self::max_delay) is not retried; the chain fails over.
    pub fn should_retry(&self, err: &LecternError) -> bool {
        match err {
            LecternError::ProviderTransient {
                retry_after: Some(after),
                ..
            } => *after <= self.max_delay(),
            other => other.is_transient(),
        }
    }

    /// Extra wait on top of the backoff delay `backoff` so that the next
    /// attempt honors `retry_after`, never beyond the delay cap.
    pub fn hint_delay(&self, retry_after: Duration, backoff: Duration) -> Duration {
        retry_after.min(self.max_delay()).saturating_sub(backoff)
    }

    /// Backoff builder for `backon`.
    pub fn backoff(&self) -> ExponentialBuilder {
        let builder = ExponentialBuilder::default()
            .with_max_times(self.max_retries as usize)
            .with_min_delay(Duration::from_millis(self.base_delay_ms))
            .with_max_delay(self.max_delay())
            .with_factor(self.multiplier.max(1.0));
        if self.jitter {
            builder.with_jitter()
        } else {
            builder
        }
    }
}
