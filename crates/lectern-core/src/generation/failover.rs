//! Ordered provider failover with per-provider retry.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use backon::Retryable;
use tokio_util::sync::CancellationToken;

use crate::error::{ErrorCode, FailureKind, LecternError, LecternResult, ProviderFailure};
use crate::registry::ProviderRegistry;
use crate::retry::RetryPolicy;
use crate::traits::{GenerationOptions, ProviderResponse};
use crate::types::Prompt;

/// One entry in a failover chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainStep {
    pub provider: String,
    /// Model override; `None` uses the provider's default model.
    pub model: Option<String>,
}

impl ChainStep {
    pub fn new(provider: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            model: None,
        }
    }

    pub fn with_model(mut self, model: Option<String>) -> Self {
        self.model = model;
        self
    }
}

/// Successful chain result plus the failures seen before it.
#[derive(Debug, Clone)]
pub struct ChainOutcome {
    pub response: ProviderResponse,
    pub failures: Vec<ProviderFailure>,
}

/// Tries providers in order until one succeeds.
///
/// Transient failures are retried on the same provider according to the
/// [`RetryPolicy`]; permanent failures advance to the next provider at once.
#[derive(Debug, Clone)]
pub struct FailoverChain {
    registry: Arc<ProviderRegistry>,
    policy: RetryPolicy,
    call_timeout: Duration,
}

impl FailoverChain {
    pub fn new(registry: Arc<ProviderRegistry>, policy: RetryPolicy) -> Self {
        Self {
            registry,
            policy,
            call_timeout: Duration::from_secs(120),
        }
    }

    /// Builder: per-attempt timeout.
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `prompt` through `steps` in order.
    pub async fn generate(
        &self,
        steps: &[ChainStep],
        prompt: &Prompt,
        options: &GenerationOptions,
        cancel: &CancellationToken,
    ) -> LecternResult<ChainOutcome> {
        if steps.is_empty() {
            return Err(LecternError::validation("provider chain is empty"));
        }

        let mut failures = Vec::new();
        for step in steps {
            if cancel.is_cancelled() {
                return Err(LecternError::Cancelled);
            }

            let Some(provider) = self.registry.get(&step.provider) else {
                tracing::warn!(provider = %step.provider, "Provider not configured, skipping");
                failures.push(ProviderFailure {
                    provider: step.provider.clone(),
                    kind: FailureKind::Permanent,
                    message: LecternError::UnsupportedProvider {
                        provider: step.provider.clone(),
                    }
                    .to_string(),
                    attempts: 0,
                });
                continue;
            };

            let model = step
                .model
                .clone()
                .unwrap_or_else(|| provider.default_model().to_string());
            let attempts = AtomicU32::new(0);
            let retry_hint: Mutex<Option<Duration>> = Mutex::new(None);
            let call_timeout = self.call_timeout;

            let provider_ref = &provider;
            let model_ref = model.as_str();
            let attempts_ref = &attempts;
            let hint_ref = &retry_hint;
            let call = move || async move {
                let pending = hint_ref
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .take();
                if let Some(extra) = pending {
                    tokio::time::sleep(extra).await;
                }
                attempts_ref.fetch_add(1, Ordering::SeqCst);
                let started = Instant::now();
                match tokio::time::timeout(call_timeout, provider_ref.generate(prompt, model_ref, options)).await {
                    Ok(Ok(mut response)) => {
                        response.latency = started.elapsed();
                        Ok(response)
                    }
                    Ok(Err(err)) => Err(err),
                    Err(_) => Err(LecternError::transient(
                        provider_ref.id(),
                        ErrorCode::PrvTimeout,
                        format!("no response within {}s", call_timeout.as_secs()),
                    )),
                }
            };

            let provider_id = step.provider.as_str();
            let policy = &self.policy;
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(LecternError::Cancelled),
                result = call
                    .retry(policy.backoff())
                    .when(|e: &LecternError| policy.should_retry(e))
                    .notify(|err: &LecternError, dur: Duration| {
                        if let LecternError::ProviderTransient { retry_after: Some(after), .. } = err {
                            *hint_ref.lock().unwrap_or_else(PoisonError::into_inner) =
                                Some(policy.hint_delay(*after, dur));
                        }
                        tracing::warn!(
                            provider = %provider_id,
                            retry_in_ms = dur.as_millis() as u64,
                            error = %err,
                            "Provider call failed, retrying"
                        );
                    }) => result,
            };

            let attempts = attempts.load(Ordering::SeqCst);
            match result {
                Ok(mut response) => {
                    response.attempts = attempts;
                    response.provider = step.provider.clone();
                    tracing::debug!(
                        provider = %step.provider,
                        model = %response.model,
                        attempts,
                        latency_ms = response.latency.as_millis() as u64,
                        "Provider call succeeded"
                    );
                    return Ok(ChainOutcome { response, failures });
                }
                Err(LecternError::Cancelled) => return Err(LecternError::Cancelled),
                Err(err) => {
                    tracing::warn!(
                        provider = %step.provider,
                        attempts,
                        kind = ?err.failure_kind(),
                        error = %err,
                        "Provider failed, advancing to next"
                    );
                    failures.push(ProviderFailure {
                        provider: step.provider.clone(),
                        kind: err.failure_kind(),
                        message: err.to_string(),
                        attempts,
                    });
                }
            }
        }

        Err(LecternError::AllProvidersExhausted { failures })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::{Provider, ProviderCapabilities};
    use async_trait::async_trait;

    struct Flaky {
        id: String,
        fail_times: u32,
        calls: AtomicU32,
        permanent: bool,
        retry_after: Option<Duration>,
    }

    #[async_trait]
    impl Provider for Flaky {
        fn id(&self) -> &str {
            &self.id
        }

        fn default_model(&self) -> &str {
            "m"
        }

        fn capabilities(&self) -> ProviderCapabilities {
            ProviderCapabilities::default()
        }

        async fn generate(
            &self,
            _prompt: &Prompt,
            model: &str,
            _options: &GenerationOptions,
        ) -> LecternResult<ProviderResponse> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_times {
                if self.permanent {
                    Err(LecternError::permanent(&self.id, ErrorCode::PrvAuthFailed, "bad key"))
                } else {
                    Err(LecternError::transient(&self.id, ErrorCode::PrvServerError, "HTTP 503")
                        .with_retry_after(self.retry_after))
                }
            } else {
                Ok(ProviderResponse::new(&self.id, model, "ok"))
            }
        }
    }

    fn flaky(id: &str, fail_times: u32, permanent: bool) -> Arc<Flaky> {
        Arc::new(Flaky {
            id: id.to_string(),
            fail_times,
            calls: AtomicU32::new(0),
            permanent,
            retry_after: None,
        })
    }

    fn rate_limited(id: &str, fail_times: u32, retry_after: Duration) -> Arc<Flaky> {
        Arc::new(Flaky {
            id: id.to_string(),
            fail_times,
            calls: AtomicU32::new(0),
            permanent: false,
            retry_after: Some(retry_after),
        })
    }

    fn fast_policy(retries: u32) -> RetryPolicy {
        RetryPolicy::default()
            .with_max_retries(retries)
            .with_delays(Duration::from_millis(1), Duration::from_millis(2))
            .with_jitter(false)
    }

    #[tokio::test]
    async fn test_transient_failures_retry_same_provider() {
        let primary = flaky("groq", 2, false);
        let registry = ProviderRegistry::new().with(primary.clone());
        let chain = FailoverChain::new(Arc::new(registry), fast_policy(2));

        let outcome = chain
            .generate(
                &[ChainStep::new("groq")],
                &Prompt::new("hi"),
                &GenerationOptions::default(),
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(outcome.response.attempts, 3);
        assert!(outcome.failures.is_empty());
    }

    #[tokio::test]
    async fn test_long_retry_after_fails_over_without_waiting() {
        let primary = rate_limited("groq", u32::MAX, Duration::from_secs(3600));
        let backup = flaky("openai", 0, false);
        let registry = ProviderRegistry::new().with(primary.clone()).with(backup);
        let chain = FailoverChain::new(Arc::new(registry), fast_policy(1));

        let outcome = tokio::time::timeout(
            Duration::from_secs(2),
            chain.generate(
                &[ChainStep::new("groq"), ChainStep::new("openai")],
                &Prompt::new("hi"),
                &GenerationOptions::default(),
                &CancellationToken::new(),
            ),
        )
        .await
        .expect("chain waited on Retry-After")
        .unwrap();
        assert_eq!(outcome.response.provider, "openai");
        assert_eq!(primary.calls.load(Ordering::SeqCst), 1);
        assert_eq!(outcome.failures[0].provider, "groq");
        assert_eq!(outcome.failures[0].kind, FailureKind::Transient);
        assert_eq!(outcome.failures[0].attempts, 1);

        let registry = ProviderRegistry::new().with(rate_limited("groq", u32::MAX, Duration::from_secs(3600)));
        let chain = FailoverChain::new(Arc::new(registry), fast_policy(1));
        let err = tokio::time::timeout(
            Duration::from_secs(2),
            chain.generate(
                &[ChainStep::new("groq")],
                &Prompt::new("hi"),
                &GenerationOptions::default(),
                &CancellationToken::new(),
            ),
        )
        .await
        .expect("chain waited on Retry-After")
        .unwrap_err();
        assert!(matches!(err, LecternError::AllProvidersExhausted { .. }));
    }

    #[tokio::test]
    async fn test_short_retry_after_is_honored_within_cap() {
        let primary = rate_limited("groq", 1, Duration::from_millis(30));
        let registry = ProviderRegistry::new().with(primary.clone());
        let policy = RetryPolicy::default()
            .with_max_retries(1)
            .with_delays(Duration::from_millis(1), Duration::from_millis(50))
            .with_jitter(false);
        let chain = FailoverChain::new(Arc::new(registry), policy);

        let started = Instant::now();
        let outcome = chain
            .generate(
                &[ChainStep::new("groq")],
                &Prompt::new("hi"),
                &GenerationOptions::default(),
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(outcome.response.attempts, 2);
        assert!(started.elapsed() >= Duration::from_millis(30));
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_unknown_provider_recorded_and_skipped() {
        let backup = flaky("openai", 0, false);
        let registry = ProviderRegistry::new().with(backup);
        let chain = FailoverChain::new(Arc::new(registry), fast_policy(1));

        let outcome = chain
            .generate(
                &[ChainStep::new("missing"), ChainStep::new("openai")],
                &Prompt::new("hi"),
                &GenerationOptions::default(),
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(outcome.response.provider, "openai");
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].attempts, 0);
        assert_eq!(outcome.failures[0].kind, FailureKind::Permanent);
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let registry = ProviderRegistry::new().with(flaky("groq", 0, false));
        let chain = FailoverChain::new(Arc::new(registry), fast_policy(0));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = chain
            .generate(&[ChainStep::new("groq")], &Prompt::new("hi"), &GenerationOptions::default(), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, LecternError::Cancelled));
    }
}
