//! Token-bucket rate limiting shared by concurrent provider calls.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::error::{ErrorCode, LecternError, LecternResult};
use crate::traits::RateLimitPolicy;

/// Classic token bucket refilled continuously.
#[derive(Debug, Clone)]
pub struct TokenBucket {
    capacity: f64,
    available: f64,
    refill_per_sec: f64,
    last_refill: Instant,
}

impl TokenBucket {
    /// Bucket holding `per_minute` units, refilled evenly over a minute.
    pub fn per_minute(per_minute: u32) -> Self {
        let capacity = f64::from(per_minute.max(1));
        Self {
            capacity,
            available: capacity,
            refill_per_sec: capacity / 60.0,
            last_refill: Instant::now(),
        }
    }

    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.available = (self.available + elapsed * self.refill_per_sec).min(self.capacity);
        self.last_refill = now;
    }

    /// Time until `cost` units are available. Costs above capacity are capped.
    fn wait_for(&mut self, cost: f64, now: Instant) -> Duration {
        self.refill(now);
        let cost = cost.min(self.capacity);
        if self.available >= cost {
            Duration::ZERO
        } else {
            Duration::from_secs_f64((cost - self.available) / self.refill_per_sec)
        }
    }

    fn take(&mut self, cost: f64) {
        self.available = (self.available - cost.min(self.capacity)).max(0.0);
    }

    /// Units currently available.
    pub fn available(&self) -> f64 {
        self.available
    }
}

#[derive(Debug)]
struct Buckets {
    requests: Option<TokenBucket>,
    tokens: Option<TokenBucket>,
}

/// Requests-per-minute and tokens-per-minute limiter for one provider.
#[derive(Debug)]
pub struct RateLimiter {
    provider: String,
    policy: RateLimitPolicy,
    buckets: Mutex<Buckets>,
}

impl RateLimiter {
    pub fn new(provider: impl Into<String>, policy: RateLimitPolicy) -> Self {
        let buckets = Buckets {
            requests: policy.requests_per_minute.map(TokenBucket::per_minute),
            tokens: policy.tokens_per_minute.map(TokenBucket::per_minute),
        };
        Self {
            provider: provider.into(),
            policy,
            buckets: Mutex::new(buckets),
        }
    }

    /// A limiter that never waits.
    pub fn unlimited(provider: impl Into<String>) -> Self {
        Self::new(provider, RateLimitPolicy::unlimited())
    }

    pub fn policy(&self) -> &RateLimitPolicy {
        &self.policy
    }

    /// Wait for one request slot plus `estimated_tokens`.
    ///
    /// Fails with a transient `PRV_002` error when capacity does not free up
    /// within the policy's wait timeout. The error's `retry_after` is the
    /// remaining refill wait, so a chain whose retry cap is shorter fails over.
    pub async fn acquire(&self, estimated_tokens: u32) -> LecternResult<()> {
        let deadline = Instant::now() + self.policy.max_wait();
        let token_cost = f64::from(estimated_tokens);
        loop {
            let wait = {
                let mut buckets = self.buckets.lock().await;
                let now = Instant::now();
                let request_wait = buckets
                    .requests
                    .as_mut()
                    .map(|b| b.wait_for(1.0, now))
                    .unwrap_or(Duration::ZERO);
                let token_wait = buckets
                    .tokens
                    .as_mut()
                    .map(|b| b.wait_for(token_cost, now))
                    .unwrap_or(Duration::ZERO);
                let wait = request_wait.max(token_wait);
                if wait.is_zero() {
                    if let Some(bucket) = buckets.requests.as_mut() {
                        bucket.take(1.0);
                    }
                    if let Some(bucket) = buckets.tokens.as_mut() {
                        bucket.take(token_cost);
                    }
                    return Ok(());
                }
                wait
            };

            if Instant::now() + wait > deadline {
                tracing::warn!(
                    provider = %self.provider,
                    wait_ms = wait.as_millis() as u64,
                    "Rate limit wait exceeds timeout"
                );
                return Err(LecternError::transient(
                    &self.provider,
                    ErrorCode::PrvRateLimited,
                    format!(
                        "local rate limit: capacity not available within {}ms",
                        self.policy.max_wait_ms
                    ),
                )
                .with_retry_after(Some(wait)));
            }
            tracing::debug!(provider = %self.provider, wait_ms = wait.as_millis() as u64, "Waiting for rate limit");
            tokio::time::sleep(wait).await;
        }
    }
}

/// Process-wide limiter registry keyed by provider id.
///
/// Adapters for the same provider id share one limiter, so concurrent
/// requests draw from the same buckets.
#[derive(Debug, Default)]
pub struct RateLimitRegistry {
    limiters: RwLock<HashMap<String, Arc<RateLimiter>>>,
}

impl RateLimitRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Limiter for `provider`, created with `policy` on first use.
    pub fn limiter(&self, provider: &str, policy: &RateLimitPolicy) -> Arc<RateLimiter> {
        if let Some(existing) = self
            .limiters
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(provider)
        {
            return Arc::clone(existing);
        }
        let mut limiters = self.limiters.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(
            limiters
                .entry(provider.to_string())
                .or_insert_with(|| Arc::new(RateLimiter::new(provider, policy.clone()))),
        )
    }

    /// Provider ids with a registered limiter.
    pub fn providers(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .limiters
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        ids.sort();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unlimited_never_waits() {
        let limiter = RateLimiter::unlimited("groq");
        for _ in 0..100 {
            limiter.acquire(10_000).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_exhausted_bucket_times_out_as_transient() {
        let policy = RateLimitPolicy {
            requests_per_minute: Some(1),
            tokens_per_minute: None,
            max_wait_ms: 10,
        };
        let limiter = RateLimiter::new("groq", policy);
        limiter.acquire(1).await.unwrap();

        let err = limiter.acquire(1).await.unwrap_err();
        assert!(err.is_transient());
        assert_eq!(err.code(), ErrorCode::PrvRateLimited);
    }

    #[tokio::test]
    async fn test_token_cost_above_capacity_is_capped() {
        let policy = RateLimitPolicy {
            requests_per_minute: None,
            tokens_per_minute: Some(100),
            max_wait_ms: 10,
        };
        let limiter = RateLimiter::new("gemini", policy);
        limiter.acquire(1_000_000).await.unwrap();
    }

    #[test]
    fn test_registry_shares_limiters() {
        let registry = RateLimitRegistry::new();
        let a = registry.limiter("openai", &RateLimitPolicy::per_minute(60, 10_000));
        let b = registry.limiter("openai", &RateLimitPolicy::unlimited());
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(b.policy().requests_per_minute, Some(60));
        assert_eq!(registry.providers(), vec!["openai"]);
    }
}
