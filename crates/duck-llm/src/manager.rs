//! Session protocol: token lifecycle, challenge retry and dispatch.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chat_core::Message;
use chat_metrics::{ChallengeClass, EventMeta, MetricsBus, MetricsEvent, ProtocolEvent};
use reqwest::cookie::Jar;
use reqwest::{Client, Proxy, Response, StatusCode, Url};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};

use crate::challenge::{ChallengeDetector, ChallengeKind, ResponseClass};
use crate::config::ProtocolConfig;
use crate::error::{ProtocolError, Result};
use crate::headers::{
    chat_headers, status_headers, FallbackHeaderProvider, HeaderProvider, PageHeaderProvider,
    HASH_HEADER, TOKEN_HEADER,
};
use crate::payload::ChatPayload;
use crate::sse::ChatStream;
use crate::token::TokenStore;

/// Cookies the upstream expects from a browser that has visited before.
const INITIAL_COOKIES: &[&str] = &["5=1", "dcm=3", "dcs=1"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolState {
    Uninitialized,
    Ready,
    Sending,
    Challenged,
    Refreshing,
    /// The last call failed; the next call is still allowed
    Failed,
}

/// Owns the token store and the cookie-carrying transport for one session.
///
/// One call at a time: every operation takes `&mut self`, so callers sharing
/// a session put it behind a mutex.
pub struct SessionProtocolManager {
    config: ProtocolConfig,
    client: Client,
    bootstrap_client: ClientWithMiddleware,
    headers: FallbackHeaderProvider,
    detector: ChallengeDetector,
    tokens: TokenStore,
    model: String,
    state: ProtocolState,
    degraded: bool,
    metrics: MetricsBus,
}

impl SessionProtocolManager {
    /// Bootstrap a session, mining fresh header values from the landing page.
    pub async fn open(config: ProtocolConfig, model: &str, metrics: MetricsBus) -> Result<Self> {
        let (client, bootstrap_client) = build_clients(&config)?;
        let page = PageHeaderProvider::new(
            bootstrap_client.clone(),
            config.page_url(),
            config.last_known_headers.clone(),
        );
        Self::assemble(config, model, metrics, client, bootstrap_client, Box::new(page))
            .start()
            .await
    }

    /// Bootstrap a session with a caller-supplied header source.
    pub async fn open_with_provider(
        config: ProtocolConfig,
        model: &str,
        metrics: MetricsBus,
        provider: Box<dyn HeaderProvider>,
    ) -> Result<Self> {
        let (client, bootstrap_client) = build_clients(&config)?;
        Self::assemble(config, model, metrics, client, bootstrap_client, provider)
            .start()
            .await
    }

    fn assemble(
        config: ProtocolConfig,
        model: &str,
        metrics: MetricsBus,
        client: Client,
        bootstrap_client: ClientWithMiddleware,
        provider: Box<dyn HeaderProvider>,
    ) -> Self {
        let fallback = config.last_known_headers.clone();
        Self {
            tokens: TokenStore::new(fallback.clone()),
            headers: FallbackHeaderProvider::new(provider, fallback),
            detector: ChallengeDetector::new(),
            model: model.to_string(),
            state: ProtocolState::Uninitialized,
            degraded: false,
            config,
            client,
            bootstrap_client,
            metrics,
        }
    }

    async fn start(mut self) -> Result<Self> {
        self.refresh_headers().await;
        self.refresh_token().await?;
        self.state = ProtocolState::Ready;
        log::info!("Session ready (model: {})", self.model);
        Ok(self)
    }

    pub fn state(&self) -> ProtocolState {
        self.state
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn change_model(&mut self, model: &str) {
        log::info!("Switching model {} -> {}", self.model, model);
        self.model = model.to_string();
    }

    pub fn retry_count(&self) -> u32 {
        self.tokens.retry_count()
    }

    pub fn tokens(&self) -> &TokenStore {
        &self.tokens
    }

    /// True while running on last-known-good headers.
    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    /// Drop the token pair and fetch a fresh one for a new conversation.
    pub async fn reset(&mut self) -> Result<()> {
        self.tokens.reset();
        self.refresh_token().await?;
        self.state = ProtocolState::Ready;
        Ok(())
    }

    /// Send the whole transcript and stream the reply text.
    ///
    /// Challenges are retried with a fresh token until the retry window is
    /// used up; anything else fails the call immediately.
    pub async fn send(&mut self, transcript: &[Message]) -> Result<ChatStream> {
        let body = serde_json::to_vec(&ChatPayload::from_transcript(&self.model, transcript))?;

        self.state = ProtocolState::Sending;
        let started = Instant::now();
        let outcome = self.send_with_retries(body).await;
        let latency_ms = started.elapsed().as_millis() as u64;

        let failure = match &outcome {
            Ok(_) => {
                self.state = ProtocolState::Ready;
                None
            }
            Err(e) => {
                self.state = ProtocolState::Failed;
                log::error!("Send failed: {}", e);
                Some(match e {
                    ProtocolError::ExhaustedRetries { last, .. } => ChallengeClass::from(*last),
                    ProtocolError::TransientChallenge(kind) => ChallengeClass::from(*kind),
                    ProtocolError::InvalidToken => ChallengeClass::InvalidToken,
                    _ => ChallengeClass::Other,
                })
            }
        };
        self.emit(ProtocolEvent::RequestCompleted {
            meta: EventMeta::new(),
            model: self.model.clone(),
            latency_ms,
            success: failure.is_none(),
            failure,
        });

        outcome
    }

    async fn send_with_retries(&mut self, body: Vec<u8>) -> Result<ChatStream> {
        loop {
            if self.tokens.needs_bootstrap() {
                self.refresh_token().await?;
            }

            match self.dispatch(&body).await {
                Ok(response) => {
                    let fresh = response
                        .headers()
                        .get(TOKEN_HEADER)
                        .and_then(|v| v.to_str().ok())
                        .map(str::to_string);
                    if self.tokens.record_success(fresh.as_deref()) {
                        log::debug!("Rotated session token");
                    } else {
                        log::debug!("Reply carried no fresh token, next send bootstraps");
                    }
                    return Ok(ChatStream::from_response(response));
                }
                Err(ProtocolError::TransientChallenge(kind)) => self.handle_challenge(kind).await?,
                Err(ProtocolError::InvalidToken) => {
                    self.handle_challenge(ChallengeKind::InvalidToken).await?
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn dispatch(&mut self, body: &[u8]) -> Result<Response> {
        let token = self
            .tokens
            .take_for_request()
            .ok_or_else(|| ProtocolError::TokenAcquisition("no usable session token".to_string()))?;
        let headers = chat_headers(&token, self.tokens.aux()).map_err(|e| {
            ProtocolError::TokenAcquisition(format!("token is not a valid header value: {}", e))
        })?;

        log::debug!("POST {} ({} bytes)", self.config.chat_url(), body.len());
        let response = self
            .client
            .post(self.config.chat_url())
            .headers(headers)
            .body(body.to_vec())
            .timeout(self.config.chat_timeout)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::OK {
            return Ok(response);
        }

        let text = match response.text().await {
            Ok(text) => text,
            Err(e) => {
                log::warn!("Failed to read HTTP {} body, classifying on status only: {}", status, e);
                String::new()
            }
        };
        match self.detector.classify(status, &text) {
            ResponseClass::Challenge(kind) => Err(kind.into()),
            ResponseClass::Success | ResponseClass::HardFailure => {
                log::error!("Upstream error: HTTP {} - {}", status, text);
                Err(ProtocolError::Upstream { status, body: text })
            }
        }
    }

    async fn handle_challenge(&mut self, kind: ChallengeKind) -> Result<()> {
        let attempt = self.tokens.retry_count() + 1;
        log::warn!("Upstream challenge: {} (attempt {})", kind, attempt);
        self.emit(ProtocolEvent::ChallengeDetected {
            meta: EventMeta::new(),
            class: kind.into(),
            attempt,
        });

        self.tokens.invalidate();
        if !self.tokens.can_retry(self.config.max_retries) {
            return Err(ProtocolError::ExhaustedRetries {
                retries: self.tokens.retry_count(),
                last: kind,
            });
        }

        self.state = ProtocolState::Challenged;
        tokio::time::sleep(self.config.challenge_backoff).await;

        self.state = ProtocolState::Refreshing;
        self.refresh_token().await?;
        if kind == ChallengeKind::BotChallenge && self.tokens.retry_count() == 0 {
            log::warn!("Bot challenge on a fresh window, regenerating headers");
            self.refresh_headers().await;
        }

        let retry = self.tokens.begin_retry();
        log::warn!("Retrying request (attempt {}/{})", retry, self.config.max_retries);
        self.state = ProtocolState::Sending;
        Ok(())
    }

    async fn refresh_token(&mut self) -> Result<()> {
        let response = self
            .bootstrap_client
            .get(self.config.status_url())
            .headers(status_headers())
            .timeout(self.config.bootstrap_timeout)
            .send()
            .await
            .map_err(|e| ProtocolError::TokenAcquisition(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ProtocolError::TokenAcquisition(format!(
                "status endpoint returned HTTP {}",
                response.status()
            )));
        }

        let token = response
            .headers()
            .get(HASH_HEADER)
            .and_then(|v| v.to_str().ok())
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .ok_or_else(|| {
                ProtocolError::TokenAcquisition("status endpoint returned no token".to_string())
            })?;

        if !self.tokens.adopt_bootstrap(token) {
            return Err(ProtocolError::TokenAcquisition(
                "status endpoint returned an already used token".to_string(),
            ));
        }
        log::debug!("Acquired session token");
        self.emit(ProtocolEvent::TokenRefreshed {
            meta: EventMeta::new(),
        });
        Ok(())
    }

    async fn refresh_headers(&mut self) {
        let (aux, degraded) = self.headers.fetch_or_fallback().await;
        if degraded {
            log::warn!("Running in degraded mode on last-known-good headers");
        }
        self.tokens.set_aux(aux);
        self.degraded = degraded;
        self.emit(ProtocolEvent::HeadersRefreshed {
            meta: EventMeta::new(),
            degraded,
        });
    }

    fn emit(&self, event: ProtocolEvent) {
        self.metrics.emit(MetricsEvent::Protocol(event));
    }
}

fn build_clients(config: &ProtocolConfig) -> Result<(Client, ClientWithMiddleware)> {
    let base: Url = config.base_url.parse().map_err(|e| {
        ProtocolError::TokenAcquisition(format!("invalid base url {}: {}", config.base_url, e))
    })?;
    let jar = Arc::new(Jar::default());
    for cookie in INITIAL_COOKIES {
        jar.add_cookie_str(cookie, &base);
    }

    let mut builder = Client::builder().cookie_provider(jar);
    match (&config.http_proxy, &config.https_proxy) {
        (None, None) => builder = builder.no_proxy(),
        (http, https) => {
            if let Some(proxy) = http {
                builder = builder.proxy(Proxy::http(proxy)?);
            }
            if let Some(proxy) = https {
                builder = builder.proxy(Proxy::https(proxy)?);
            }
        }
    }
    let client = builder.build()?;

    let retry_policy = ExponentialBackoff::builder()
        .retry_bounds(Duration::from_millis(100), Duration::from_secs(2))
        .build_with_max_retries(2);
    let bootstrap_client = ClientBuilder::new(client.clone())
        .with(RetryTransientMiddleware::new_with_policy(retry_policy))
        .build();

    Ok((client, bootstrap_client))
}
