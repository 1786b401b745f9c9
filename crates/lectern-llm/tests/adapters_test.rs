//! Adapter behavior against a local HTTP responder.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use lectern_core::generation::{ChainStep, FailoverChain};
use lectern_core::{
    ErrorCode, FailureKind, LecternError, ProviderRegistry, RateLimitRegistry, RetryPolicy,
};
use lectern_llm::{GenerationOptions, ProviderConfig, ProviderFactory, ProviderKind};
use lectern_core::types::Prompt;

struct Canned {
    status: u16,
    headers: Vec<(&'static str, &'static str)>,
    body: &'static str,
}

impl Canned {
    fn ok(body: &'static str) -> Self {
        Self {
            status: 200,
            headers: Vec::new(),
            body,
        }
    }

    fn status(status: u16, body: &'static str) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body,
        }
    }

    fn header(mut self, name: &'static str, value: &'static str) -> Self {
        self.headers.push((name, value));
        self
    }
}

#[derive(Debug)]
struct Captured {
    request_line: String,
    headers: Vec<(String, String)>,
    body: serde_json::Value,
}

impl Captured {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Serve `responses` to successive connections, one each, and report what was received.
async fn serve(responses: Vec<Canned>) -> (String, mpsc::UnboundedReceiver<Captured>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        for canned in responses {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            let mut chunk = [0u8; 4096];
            let header_end = loop {
                let n = socket.read(&mut chunk).await.unwrap();
                buf.extend_from_slice(&chunk[..n]);
                if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                    break pos + 4;
                }
                if n == 0 {
                    break buf.len();
                }
            };

            let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
            let mut lines = head.lines();
            let request_line = lines.next().unwrap_or_default().to_string();
            let headers: Vec<(String, String)> = lines
                .filter_map(|l| l.split_once(':'))
                .map(|(n, v)| (n.trim().to_ascii_lowercase(), v.trim().to_string()))
                .collect();
            let length = headers
                .iter()
                .find(|(n, _)| n == "content-length")
                .and_then(|(_, v)| v.parse::<usize>().ok())
                .unwrap_or(0);
            while buf.len() < header_end + length {
                let n = socket.read(&mut chunk).await.unwrap();
                if n == 0 {
                    break;
                }
                buf.extend_from_slice(&chunk[..n]);
            }
            let body = serde_json::from_slice(&buf[header_end..]).unwrap_or(serde_json::Value::Null);

            let mut response = format!(
                "HTTP/1.1 {} Canned\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n",
                canned.status,
                canned.body.len()
            );
            for (name, value) in &canned.headers {
                response.push_str(&format!("{}: {}\r\n", name, value));
            }
            response.push_str("\r\n");
            response.push_str(canned.body);
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();

            let _ = tx.send(Captured {
                request_line,
                headers,
                body,
            });
        }
    });

    (format!("http://{}", addr), rx)
}

fn prompt() -> Prompt {
    Prompt::new("Outline week 1").with_system("You write lesson plans in Markdown.")
}

fn options() -> GenerationOptions {
    GenerationOptions::default().with_max_tokens(400).with_temperature(0.7)
}

fn provider(kind: ProviderKind, id: &str, base_url: &str) -> Arc<dyn lectern_core::Provider> {
    let config = ProviderConfig::for_kind(kind)
        .with_api_key("test-key")
        .with_base_url(base_url);
    ProviderFactory::create(id, &config, &RateLimitRegistry::new(), Duration::from_secs(5)).unwrap()
}

const CHAT_OK: &str = r##"{"model":"llama-3.3-70b-versatile","choices":[{"message":{"role":"assistant","content":"# Week 1\n\nIntro"},"finish_reason":"stop"}],"usage":{"prompt_tokens":20,"completion_tokens":6,"total_tokens":26}}"##;

#[tokio::test]
async fn test_chat_completions_request_shape() {
    let (base, mut rx) = serve(vec![Canned::ok(CHAT_OK)]).await;
    let groq = provider(ProviderKind::Groq, "groq", &base);

    let response = groq
        .generate(&prompt(), "llama-3.3-70b-versatile", &options())
        .await
        .unwrap();
    assert_eq!(response.provider, "groq");
    assert_eq!(response.content, "# Week 1\n\nIntro");
    assert_eq!(response.usage.unwrap().total_tokens, 26);

    let captured = rx.recv().await.unwrap();
    assert_eq!(captured.request_line, "POST /chat/completions HTTP/1.1");
    assert_eq!(captured.header("authorization"), Some("Bearer test-key"));
    assert_eq!(captured.body["model"], "llama-3.3-70b-versatile");
    assert_eq!(captured.body["max_tokens"], 400);
    assert_eq!(captured.body["messages"][0]["role"], "system");
    assert_eq!(captured.body["messages"][1]["content"], "Outline week 1");
}

#[tokio::test]
async fn test_rate_limited_is_transient_with_retry_after() {
    let (base, _rx) = serve(vec![Canned::status(
        429,
        r#"{"error":{"type":"rate_limit_exceeded","message":"slow down"}}"#,
    )
    .header("Retry-After", "3")])
    .await;
    let openai = provider(ProviderKind::OpenAI, "openai", &base);

    let err = openai.generate(&prompt(), "gpt-4o-mini", &options()).await.unwrap_err();
    match err {
        LecternError::ProviderTransient {
            code, retry_after, message, ..
        } => {
            assert_eq!(code, ErrorCode::PrvRateLimited);
            assert_eq!(retry_after, Some(Duration::from_secs(3)));
            assert!(message.contains("slow down"));
        }
        other => panic!("expected transient error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_unauthorized_is_permanent() {
    let (base, _rx) = serve(vec![Canned::status(401, r#"{"error":{"message":"invalid x-api-key"}}"#)]).await;
    let anthropic = provider(ProviderKind::Anthropic, "anthropic", &base);

    let err = anthropic
        .generate(&prompt(), "claude-3-5-sonnet-20241022", &options())
        .await
        .unwrap_err();
    assert_eq!(err.failure_kind(), FailureKind::Permanent);
    assert_eq!(err.code(), ErrorCode::PrvAuthFailed);
}

#[tokio::test]
async fn test_anthropic_headers_and_system_field() {
    let (base, mut rx) = serve(vec![Canned::ok(
        r#"{"content":[{"type":"text","text":"Plan"}],"usage":{"input_tokens":5,"output_tokens":1}}"#,
    )])
    .await;
    let anthropic = provider(ProviderKind::Anthropic, "anthropic", &base);
    anthropic
        .generate(&prompt(), "claude-3-5-sonnet-20241022", &options())
        .await
        .unwrap();

    let captured = rx.recv().await.unwrap();
    assert_eq!(captured.request_line, "POST /messages HTTP/1.1");
    assert_eq!(captured.header("x-api-key"), Some("test-key"));
    assert_eq!(captured.header("anthropic-version"), Some("2023-06-01"));
    assert_eq!(captured.body["system"], "You write lesson plans in Markdown.");
    assert_eq!(captured.body["messages"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_gemini_url_and_body() {
    let (base, mut rx) = serve(vec![Canned::ok(
        r#"{"candidates":[{"content":{"parts":[{"text":"Guide"}]},"finishReason":"STOP"}]}"#,
    )])
    .await;
    let gemini = provider(ProviderKind::Gemini, "gemini", &base);
    let response = gemini
        .generate(&prompt(), "gemini-1.5-flash", &options())
        .await
        .unwrap();
    assert_eq!(response.content, "Guide");

    let captured = rx.recv().await.unwrap();
    assert_eq!(
        captured.request_line,
        "POST /models/gemini-1.5-flash:generateContent?key=test-key HTTP/1.1"
    );
    assert_eq!(captured.body["generationConfig"]["maxOutputTokens"], 400);
    assert_eq!(captured.body["contents"][0]["parts"][0]["text"], "Outline week 1");
}

#[tokio::test]
async fn test_connection_refused_is_transient() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);

    let xai = provider(ProviderKind::Xai, "xai", &base);
    let err = xai.generate(&prompt(), "grok-2-latest", &options()).await.unwrap_err();
    assert!(err.is_transient());
    assert_eq!(err.code(), ErrorCode::PrvConnectionFailed);
}

#[tokio::test]
async fn test_missing_key_never_reaches_network() {
    let (base, mut rx) = serve(vec![Canned::ok(CHAT_OK)]).await;
    let config = ProviderConfig {
        api_key: None,
        ..ProviderConfig::for_kind(ProviderKind::Anthropic).with_base_url(&base)
    };
    std::env::remove_var("ANTHROPIC_API_KEY");
    let anthropic =
        ProviderFactory::create("anthropic", &config, &RateLimitRegistry::new(), Duration::from_secs(5)).unwrap();

    let err = anthropic.generate(&prompt(), "m", &options()).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::PrvAuthFailed);
    assert!(tokio::time::timeout(Duration::from_millis(100), rx.recv()).await.is_err());
}

#[tokio::test]
async fn test_server_errors_fail_over_to_next_adapter() {
    let (primary, _rx1) = serve(vec![
        Canned::status(503, r#"{"error":{"message":"overloaded"}}"#),
        Canned::status(503, r#"{"error":{"message":"overloaded"}}"#),
    ])
    .await;
    let (fallback, _rx2) = serve(vec![Canned::ok(
        r#"{"content":[{"type":"text","text":"From fallback"}]}"#,
    )])
    .await;

    let registry = ProviderRegistry::new()
        .with(provider(ProviderKind::Groq, "groq", &primary))
        .with(provider(ProviderKind::Anthropic, "anthropic", &fallback));
    let policy = RetryPolicy::default()
        .with_max_retries(1)
        .with_delays(Duration::from_millis(1), Duration::from_millis(5))
        .with_jitter(false);
    let chain = FailoverChain::new(Arc::new(registry), policy);

    let steps = [ChainStep::new("groq"), ChainStep::new("anthropic")];
    let outcome = chain
        .generate(&steps, &prompt(), &options(), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(outcome.response.provider, "anthropic");
    assert_eq!(outcome.response.content, "From fallback");
    assert_eq!(outcome.failures.len(), 1);
    assert_eq!(outcome.failures[0].provider, "groq");
    assert_eq!(outcome.failures[0].attempts, 2);
    assert_eq!(outcome.failures[0].kind, FailureKind::Transient);
}
