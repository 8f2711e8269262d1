//! Protocol behaviour against a mock upstream.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chat_core::Message;
use chat_metrics::MetricsBus;
use duck_llm::{
    AuxHeaders, ChallengeKind, HeaderError, HeaderProvider, ProtocolConfig, ProtocolError,
    ProtocolState, SessionProtocolManager,
};
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

const STATUS_PATH: &str = "/duckchat/v1/status";
const CHAT_PATH: &str = "/duckchat/v1/chat";

fn network_tests_disabled() -> bool {
    std::env::var_os("CODEX_SANDBOX_NETWORK_DISABLED").is_some()
}

fn test_config(server: &MockServer) -> ProtocolConfig {
    ProtocolConfig::default()
        .with_base_url(server.uri())
        .with_backoff(Duration::from_millis(5))
}

fn sse_body(chunks: &[&str]) -> String {
    let mut body = String::new();
    for chunk in chunks {
        body.push_str(&format!(
            "data: {{\"role\":\"assistant\",\"message\":{},\"created\":1,\"id\":\"x\",\"action\":\"success\",\"model\":\"gpt-4o-mini\"}}\n\n",
            serde_json::to_string(chunk).unwrap()
        ));
    }
    body.push_str("data: [DONE]\n\n");
    body
}

fn sse_reply(chunks: &[&str], next_token: &str) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .insert_header("content-type", "text/event-stream")
        .insert_header("x-vqd-4", next_token)
        .set_body_string(sse_body(chunks))
}

/// Status endpoint handing out `boot-0`, `boot-1`, ...
async fn mount_bootstrap(server: &MockServer) -> Arc<AtomicUsize> {
    let count = Arc::new(AtomicUsize::new(0));
    let counter = count.clone();
    Mock::given(method("GET"))
        .and(path(STATUS_PATH))
        .and(header("x-vqd-accept", "1"))
        .respond_with(move |_req: &Request| {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            let token = format!("boot-{n}");
            ResponseTemplate::new(200).insert_header("x-vqd-hash-1", token.as_str())
        })
        .mount(server)
        .await;
    count
}

struct CountingProvider {
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl HeaderProvider for CountingProvider {
    async fn fetch(&self) -> Result<AuxHeaders, HeaderError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(AuxHeaders {
            fe_signals: format!("signals-{n}"),
            fe_version: format!("version-{n}"),
            vqd_hash_1: None,
        })
    }

    fn name(&self) -> &'static str {
        "counting"
    }
}

async fn open_counting(server: &MockServer) -> (SessionProtocolManager, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let provider = CountingProvider {
        calls: calls.clone(),
    };
    let manager = SessionProtocolManager::open_with_provider(
        test_config(server),
        "gpt-4o-mini",
        MetricsBus::disconnected(),
        Box::new(provider),
    )
    .await
    .expect("open");
    (manager, calls)
}

fn turn(text: &str) -> Vec<Message> {
    vec![Message::user(text)]
}

#[tokio::test]
async fn open_falls_back_to_last_known_headers() {
    if network_tests_disabled() {
        return;
    }
    let server = MockServer::start().await;
    mount_bootstrap(&server).await;

    // no landing page mounted: the page provider sees a 404
    let config = test_config(&server);
    let fallback = config.last_known_headers.clone();
    let manager = SessionProtocolManager::open(config, "gpt-4o-mini", MetricsBus::disconnected())
        .await
        .expect("open should degrade, not fail");

    assert!(manager.is_degraded());
    assert_eq!(manager.state(), ProtocolState::Ready);
    assert_eq!(manager.tokens().current(), Some("boot-0"));
    assert_eq!(manager.tokens().aux(), &fallback);
}

#[tokio::test]
async fn open_mines_headers_from_landing_page() {
    if network_tests_disabled() {
        return;
    }
    let server = MockServer::start().await;
    mount_bootstrap(&server).await;
    let signals = "s".repeat(64);
    let html = format!(
        r#"<html><script>__DDG_BE_VERSION__="serp_20250901_120000_ET-abc";var c={{"fe_signals":"{signals}"}};</script></html>"#
    );
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(html))
        .mount(&server)
        .await;

    let manager = SessionProtocolManager::open(
        test_config(&server),
        "gpt-4o-mini",
        MetricsBus::disconnected(),
    )
    .await
    .expect("open");

    assert!(!manager.is_degraded());
    assert_eq!(manager.tokens().aux().fe_version, "serp_20250901_120000_ET-abc");
    assert_eq!(manager.tokens().aux().fe_signals, signals);
}

#[tokio::test]
async fn open_fails_when_bootstrap_yields_no_token() {
    if network_tests_disabled() {
        return;
    }
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(STATUS_PATH))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let result = SessionProtocolManager::open_with_provider(
        test_config(&server),
        "gpt-4o-mini",
        MetricsBus::disconnected(),
        Box::new(CountingProvider {
            calls: Arc::new(AtomicUsize::new(0)),
        }),
    )
    .await;

    assert!(matches!(result, Err(ProtocolError::TokenAcquisition(_))));
}

#[tokio::test]
async fn tokens_rotate_and_are_never_reused() {
    if network_tests_disabled() {
        return;
    }
    let server = MockServer::start().await;
    let bootstraps = mount_bootstrap(&server).await;

    // each token is accepted exactly once and answered with its successor
    for (sent, next) in [("boot-0", "tok-1"), ("tok-1", "tok-2"), ("tok-2", "tok-3")] {
        Mock::given(method("POST"))
            .and(path(CHAT_PATH))
            .and(header("x-vqd-4", sent))
            .respond_with(sse_reply(&["ok"], next))
            .expect(1)
            .mount(&server)
            .await;
    }

    let (mut manager, _) = open_counting(&server).await;
    for _ in 0..3 {
        let text = manager.send(&turn("hi")).await.expect("send").collect_text().await;
        assert_eq!(text, "ok");
    }

    assert_eq!(manager.tokens().current(), Some("tok-3"));
    assert_eq!(manager.tokens().previous(), Some("tok-2"));
    assert_eq!(bootstraps.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn reply_without_fresh_token_forces_bootstrap() {
    if network_tests_disabled() {
        return;
    }
    let server = MockServer::start().await;
    let bootstraps = mount_bootstrap(&server).await;
    Mock::given(method("POST"))
        .and(path(CHAT_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/event-stream")
                .set_body_string(sse_body(&["ok"])),
        )
        .mount(&server)
        .await;

    let (mut manager, _) = open_counting(&server).await;
    manager.send(&turn("one")).await.expect("first send");
    manager.send(&turn("two")).await.expect("second send");

    assert_eq!(bootstraps.load(Ordering::SeqCst), 2);
    assert_eq!(manager.tokens().current(), Some("boot-1"));
}

#[tokio::test]
async fn bot_challenge_then_success_regenerates_headers_once() {
    if network_tests_disabled() {
        return;
    }
    let server = MockServer::start().await;
    mount_bootstrap(&server).await;
    let attempts = Arc::new(AtomicUsize::new(0));
    let counter = attempts.clone();
    Mock::given(method("POST"))
        .and(path(CHAT_PATH))
        .respond_with(move |_req: &Request| {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                ResponseTemplate::new(418).set_body_string("teapot")
            } else {
                sse_reply(&["Hello", " from attempt 2"], "tok-next")
            }
        })
        .mount(&server)
        .await;

    let (mut manager, header_calls) = open_counting(&server).await;
    assert_eq!(header_calls.load(Ordering::SeqCst), 1);

    let text = manager.send(&turn("hi")).await.expect("send").collect_text().await;

    assert_eq!(text, "Hello from attempt 2");
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
    assert_eq!(header_calls.load(Ordering::SeqCst), 2);
    assert_eq!(manager.tokens().aux().fe_version, "version-1");
    assert_eq!(manager.retry_count(), 0);
    assert_eq!(manager.state(), ProtocolState::Ready);
}

#[tokio::test]
async fn persistent_challenge_exhausts_retries_and_session_survives() {
    if network_tests_disabled() {
        return;
    }
    let server = MockServer::start().await;
    let bootstraps = mount_bootstrap(&server).await;
    let attempts = Arc::new(AtomicUsize::new(0));
    let counter = attempts.clone();
    Mock::given(method("POST"))
        .and(path(CHAT_PATH))
        .respond_with(move |_req: &Request| {
            if counter.fetch_add(1, Ordering::SeqCst) < 4 {
                ResponseTemplate::new(418)
            } else {
                sse_reply(&["back"], "tok-after")
            }
        })
        .mount(&server)
        .await;

    let (mut manager, header_calls) = open_counting(&server).await;
    let err = match manager.send(&turn("hi")).await {
        Ok(_) => panic!("expected ExhaustedRetries"),
        Err(e) => e,
    };

    match err {
        ProtocolError::ExhaustedRetries { retries, last } => {
            assert_eq!(retries, 3);
            assert_eq!(last, ChallengeKind::BotChallenge);
        }
        other => panic!("expected ExhaustedRetries, got {other:?}"),
    }
    // one initial dispatch plus three retries
    assert_eq!(attempts.load(Ordering::SeqCst), 4);
    assert_eq!(header_calls.load(Ordering::SeqCst), 2);
    assert_eq!(manager.state(), ProtocolState::Failed);
    assert_eq!(manager.retry_count(), 3);

    let text = manager.send(&turn("again")).await.expect("next turn").collect_text().await;
    assert_eq!(text, "back");
    assert_eq!(manager.retry_count(), 0);
    assert_eq!(manager.state(), ProtocolState::Ready);
    // open, three retries, and the stale token after exhaustion
    assert_eq!(bootstraps.load(Ordering::SeqCst), 5);
}

#[tokio::test]
async fn rate_limit_retries_without_header_regeneration() {
    if network_tests_disabled() {
        return;
    }
    let server = MockServer::start().await;
    mount_bootstrap(&server).await;
    let attempts = Arc::new(AtomicUsize::new(0));
    let counter = attempts.clone();
    Mock::given(method("POST"))
        .and(path(CHAT_PATH))
        .respond_with(move |_req: &Request| match counter.fetch_add(1, Ordering::SeqCst) {
            0 => ResponseTemplate::new(429),
            1 => ResponseTemplate::new(400)
                .set_body_string(r#"{"action":"error","type":"ERR_INVALID_VQD"}"#),
            _ => sse_reply(&["done"], "tok-next"),
        })
        .mount(&server)
        .await;

    let (mut manager, header_calls) = open_counting(&server).await;
    let text = manager.send(&turn("hi")).await.expect("send").collect_text().await;

    assert_eq!(text, "done");
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
    assert_eq!(header_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn hard_failure_is_not_retried() {
    if network_tests_disabled() {
        return;
    }
    let server = MockServer::start().await;
    let bootstraps = mount_bootstrap(&server).await;
    Mock::given(method("POST"))
        .and(path(CHAT_PATH))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream down"))
        .expect(1)
        .mount(&server)
        .await;

    let (mut manager, _) = open_counting(&server).await;
    let result = manager.send(&turn("hi")).await;

    match result {
        Err(ProtocolError::Upstream { status, body }) => {
            assert_eq!(status.as_u16(), 500);
            assert_eq!(body, "upstream down");
        }
        Err(other) => panic!("expected Upstream, got {other:?}"),
        Ok(_) => panic!("expected failure"),
    }
    assert_eq!(bootstraps.load(Ordering::SeqCst), 1);
    assert_eq!(manager.retry_count(), 0);
}

#[tokio::test]
async fn unreadable_error_body_falls_back_to_status() {
    if network_tests_disabled() {
        return;
    }
    let server = MockServer::start().await;
    mount_bootstrap(&server).await;
    // claims gzip but is plain text, so reading the body fails
    Mock::given(method("POST"))
        .and(path(CHAT_PATH))
        .respond_with(
            ResponseTemplate::new(400)
                .insert_header("content-encoding", "gzip")
                .set_body_string("ERR_INVALID_VQD"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let (mut manager, _) = open_counting(&server).await;
    match manager.send(&turn("hi")).await {
        Err(ProtocolError::Upstream { status, body }) => {
            assert_eq!(status.as_u16(), 400);
            assert!(body.is_empty());
        }
        Err(other) => panic!("expected Upstream, got {other:?}"),
        Ok(_) => panic!("expected failure"),
    }
    assert_eq!(manager.state(), ProtocolState::Failed);
}

#[tokio::test]
async fn malformed_lines_are_skipped_and_done_ends_stream() {
    if network_tests_disabled() {
        return;
    }
    let server = MockServer::start().await;
    mount_bootstrap(&server).await;
    let body = concat!(
        "data: {\"role\":\"assistant\",\"message\":\"one \"}\n",
        "data: {broken json\n",
        "data: {\"role\":\"assistant\",\"message\":\"two\"}\n",
        "\n",
        "data: {\"role\":\"assistant\"}\n\n",
        "data: [DONE]\n\n",
        "data: {\"role\":\"assistant\",\"message\":\"after done\"}\n\n",
    );
    Mock::given(method("POST"))
        .and(path(CHAT_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("x-vqd-4", "tok-next")
                .set_body_string(body),
        )
        .mount(&server)
        .await;

    let (mut manager, _) = open_counting(&server).await;
    let text = manager.send(&turn("hi")).await.expect("send").collect_text().await;

    assert_eq!(text, "one two");
}

#[tokio::test]
async fn payload_carries_model_and_transcript() {
    if network_tests_disabled() {
        return;
    }
    let server = MockServer::start().await;
    mount_bootstrap(&server).await;
    Mock::given(method("POST"))
        .and(path(CHAT_PATH))
        .and(header("x-fe-version", "version-0"))
        .and(body_partial_json(serde_json::json!({
            "model": "o3-mini",
            "messages": [
                {"role": "user", "content": "first"},
                {"role": "assistant", "content": "reply"},
                {"role": "user", "content": "second"}
            ],
            "canUseTools": true,
            "canUseApproxLocation": true
        })))
        .respond_with(sse_reply(&["ok"], "tok-next"))
        .expect(1)
        .mount(&server)
        .await;

    let (mut manager, _) = open_counting(&server).await;
    manager.change_model("o3-mini");
    let transcript = vec![
        Message::user("first"),
        Message::assistant("reply"),
        Message::user("second"),
    ];
    let text = manager.send(&transcript).await.expect("send").collect_text().await;
    assert_eq!(text, "ok");
}
