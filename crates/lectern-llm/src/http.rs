//! Shared HTTP plumbing for provider adapters.

use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client, RequestBuilder};
use secrecy::{ExposeSecret, Secret};

use lectern_core::error::{ErrorCode, LecternError, LecternResult};
use lectern_core::ProviderConfig;

/// API key held in memory without leaking through `Debug`.
pub type ApiKey = Secret<String>;

/// Build a client with the per-call timeout.
pub(crate) fn build_client(timeout: Duration) -> LecternResult<Client> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| LecternError::Configuration(format!("Failed to create HTTP client: {}", e)))
}

/// API key from configuration or, failing that, the kind's environment variable.
pub(crate) fn resolve_api_key(config: &ProviderConfig) -> Option<ApiKey> {
    config
        .api_key
        .clone()
        .or_else(|| config.kind.api_key_env().and_then(|var| std::env::var(var).ok()))
        .filter(|key| !key.trim().is_empty())
        .map(Secret::new)
}

/// The key, or a permanent auth failure naming the variable to set.
pub(crate) fn require_key<'a>(provider: &str, key: &'a Option<ApiKey>, env: Option<&str>) -> LecternResult<&'a str> {
    key.as_ref().map(|k| k.expose_secret().as_str()).ok_or_else(|| {
        let hint = env
            .map(|var| format!("; set {} or provide api_key in config", var))
            .unwrap_or_default();
        LecternError::permanent(provider, ErrorCode::PrvAuthFailed, format!("API key not configured{}", hint))
    })
}

/// Parse a `Retry-After` header given in seconds or as an HTTP date.
pub(crate) fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    let value = headers.get(RETRY_AFTER)?.to_str().ok()?.trim();
    if let Ok(secs) = value.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    let at = DateTime::parse_from_rfc2822(value).ok()?.with_timezone(&Utc);
    (at - Utc::now()).to_std().ok()
}

/// Send a request and return the body of a successful response.
///
/// Transport failures and statuses are classified into transient and
/// permanent provider errors; `Retry-After` is kept on transient ones.
pub(crate) async fn send(provider: &str, request: RequestBuilder) -> LecternResult<String> {
    let response = request.send().await.map_err(|e| classify_transport(provider, e))?;
    let status = response.status();
    let hint = retry_after(response.headers());
    let body = response
        .text()
        .await
        .map_err(|e| LecternError::transient(provider, ErrorCode::PrvInvalidResponse, format!("Failed to read response body: {}", e)))?;

    if status.is_success() {
        return Ok(body);
    }

    tracing::debug!(provider, status = status.as_u16(), "Provider returned error status");
    let message = error_message(&body);
    Err(LecternError::from_http_status(provider, status.as_u16(), &message).with_retry_after(hint))
}

fn classify_transport(provider: &str, err: reqwest::Error) -> LecternError {
    let code = if err.is_timeout() {
        ErrorCode::PrvTimeout
    } else {
        ErrorCode::PrvConnectionFailed
    };
    LecternError::transient(provider, code, format!("request failed: {}", err))
}

/// Best-effort extraction of a human-readable message from a JSON error body.
pub(crate) fn error_message(body: &str) -> String {
    let Ok(value) = serde_json::from_str::<serde_json::Value>(body) else {
        return body.trim().to_string();
    };
    let message = value["error"]["message"]
        .as_str()
        .or_else(|| value["error"].as_str())
        .or_else(|| value["message"].as_str());
    let kind = value["error"]["type"]
        .as_str()
        .or_else(|| value["error"]["code"].as_str())
        .or_else(|| value["error"]["status"].as_str());
    match (kind, message) {
        (Some(kind), Some(message)) => format!("{}: {}", kind, message),
        (None, Some(message)) => message.to_string(),
        _ => body.trim().to_string(),
    }
}

/// Parse a response body, mapping schema mismatches to a transient invalid-response error.
pub(crate) fn parse_body<T: serde::de::DeserializeOwned>(provider: &str, body: &str) -> LecternResult<T> {
    serde_json::from_str(body).map_err(|e| {
        LecternError::transient(provider, ErrorCode::PrvInvalidResponse, format!("Failed to parse response: {}", e))
    })
}

/// Listed models plus configured extras, sorted without duplicates.
pub(crate) fn merge_models(mut listed: Vec<String>, extra: &[String]) -> Vec<String> {
    listed.extend(extra.iter().cloned());
    listed.sort();
    listed.dedup();
    listed
}
