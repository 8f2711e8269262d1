//! Anti-automation header sources and the browser header set.
//!
//! The upstream expects a signals blob and a version tag next to the token.
//! Their exact values go stale, so they come from a [`HeaderProvider`]: a
//! static last-known-good set, a provider that scrapes them from the chat
//! landing page, or the latter wrapped in [`FallbackHeaderProvider`].

use async_trait::async_trait;
use chrono::Local;
use lazy_static::lazy_static;
use regex::Regex;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, CONTENT_TYPE};
use reqwest_middleware::ClientWithMiddleware;
use thiserror::Error;

use crate::token::AuxHeaders;

pub const UPSTREAM_ORIGIN: &str = "https://duckduckgo.com";

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/138.0.0.0 Safari/537.36";
const SEC_CH_UA: &str = r#""Not)A;Brand";v="8", "Chromium";v="138", "Brave";v="138""#;
const MIN_SIGNALS_LEN: usize = 50;

lazy_static! {
    static ref BE_VERSION: Regex = Regex::new(r#"__DDG_BE_VERSION__="([^"]+)""#).unwrap();
    static ref FE_CHAT_HASH: Regex = Regex::new(r#"__DDG_FE_CHAT_HASH__="([^"]+)""#).unwrap();
    static ref SIGNALS: Vec<Regex> = [
        r#"fe_signals["\s]*:["\s]*"([^"]+)""#,
        r#""fe_signals":"([^"]+)""#,
        r#"feSignals["\s]*:["\s]*"([^"]+)""#,
        r#"signals["\s]*:["\s]*"([^"]+)""#,
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect();
}

#[derive(Error, Debug)]
pub enum HeaderError {
    #[error("Failed to fetch landing page: {0}")]
    Fetch(String),

    #[error("Landing page returned HTTP {0}")]
    Status(reqwest::StatusCode),

    #[error("No version tag found in landing page")]
    MissingVersion,
}

#[async_trait]
pub trait HeaderProvider: Send + Sync {
    /// Produce a fresh set of auxiliary header values.
    async fn fetch(&self) -> Result<AuxHeaders, HeaderError>;

    fn name(&self) -> &'static str;
}

/// Always returns the same externally supplied values.
#[derive(Debug, Clone)]
pub struct StaticHeaderProvider {
    headers: AuxHeaders,
}

impl StaticHeaderProvider {
    pub fn new(headers: AuxHeaders) -> Self {
        Self { headers }
    }
}

#[async_trait]
impl HeaderProvider for StaticHeaderProvider {
    async fn fetch(&self) -> Result<AuxHeaders, HeaderError> {
        Ok(self.headers.clone())
    }

    fn name(&self) -> &'static str {
        "static"
    }
}

/// Reads the version tag and signals blob from the chat landing page.
pub struct PageHeaderProvider {
    client: ClientWithMiddleware,
    page_url: String,
    last_known: AuxHeaders,
}

impl PageHeaderProvider {
    pub fn new(client: ClientWithMiddleware, page_url: impl Into<String>, last_known: AuxHeaders) -> Self {
        Self {
            client,
            page_url: page_url.into(),
            last_known,
        }
    }
}

#[async_trait]
impl HeaderProvider for PageHeaderProvider {
    async fn fetch(&self) -> Result<AuxHeaders, HeaderError> {
        let response = self
            .client
            .get(&self.page_url)
            .headers(page_headers())
            .send()
            .await
            .map_err(|e| HeaderError::Fetch(e.to_string()))?;

        if !response.status().is_success() {
            return Err(HeaderError::Status(response.status()));
        }
        let html = response
            .text()
            .await
            .map_err(|e| HeaderError::Fetch(e.to_string()))?;

        let fe_version = extract_version(&html).ok_or(HeaderError::MissingVersion)?;
        let fe_signals = extract_signals(&html).unwrap_or_else(|| {
            log::debug!("No signals blob in landing page, keeping last known");
            self.last_known.fe_signals.clone()
        });

        Ok(AuxHeaders {
            fe_signals,
            fe_version,
            vqd_hash_1: self.last_known.vqd_hash_1.clone(),
        })
    }

    fn name(&self) -> &'static str {
        "page"
    }
}

/// Wraps a provider with a last-known-good set used when it fails.
pub struct FallbackHeaderProvider {
    primary: Box<dyn HeaderProvider>,
    fallback: AuxHeaders,
}

impl FallbackHeaderProvider {
    pub fn new(primary: Box<dyn HeaderProvider>, fallback: AuxHeaders) -> Self {
        Self { primary, fallback }
    }

    /// Headers plus whether they came from the fallback set.
    pub async fn fetch_or_fallback(&self) -> (AuxHeaders, bool) {
        match self.primary.fetch().await {
            Ok(headers) => (headers, false),
            Err(e) => {
                log::warn!(
                    "{} header provider failed ({}), using last-known-good headers",
                    self.primary.name(),
                    e
                );
                (self.fallback.clone(), true)
            }
        }
    }
}

#[async_trait]
impl HeaderProvider for FallbackHeaderProvider {
    async fn fetch(&self) -> Result<AuxHeaders, HeaderError> {
        Ok(self.fetch_or_fallback().await.0)
    }

    fn name(&self) -> &'static str {
        "fallback"
    }
}

pub fn extract_version(html: &str) -> Option<String> {
    if let Some(caps) = BE_VERSION.captures(html) {
        return Some(caps[1].to_string());
    }
    FE_CHAT_HASH.captures(html).map(|caps| {
        format!(
            "serp_{}_ET-{}",
            Local::now().format("%Y%m%d_%H%M%S"),
            &caps[1]
        )
    })
}

pub fn extract_signals(html: &str) -> Option<String> {
    SIGNALS
        .iter()
        .filter_map(|re| re.captures(html))
        .map(|caps| caps[1].to_string())
        .find(|s| s.len() >= MIN_SIGNALS_LEN)
}

fn insert_browser_identity(headers: &mut HeaderMap) {
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("fr-FR,fr;q=0.5"));
    headers.insert("dnt", HeaderValue::from_static("1"));
    headers.insert("sec-ch-ua", HeaderValue::from_static(SEC_CH_UA));
    headers.insert("sec-ch-ua-mobile", HeaderValue::from_static("?0"));
    headers.insert("sec-ch-ua-platform", HeaderValue::from_static("\"Windows\""));
    headers.insert("sec-gpc", HeaderValue::from_static("1"));
    headers.insert("user-agent", HeaderValue::from_static(USER_AGENT));
}

/// Headers for the token bootstrap exchange.
pub fn status_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    insert_browser_identity(&mut headers);
    headers.insert(ACCEPT, HeaderValue::from_static("*/*"));
    headers.insert("cache-control", HeaderValue::from_static("no-store"));
    headers.insert("priority", HeaderValue::from_static("u=1, i"));
    headers.insert("referer", HeaderValue::from_static("https://duckduckgo.com/"));
    headers.insert("sec-fetch-dest", HeaderValue::from_static("empty"));
    headers.insert("sec-fetch-mode", HeaderValue::from_static("cors"));
    headers.insert("sec-fetch-site", HeaderValue::from_static("same-origin"));
    headers.insert("x-vqd-accept", HeaderValue::from_static("1"));
    headers
}

/// Headers for a chat request carrying `token` and the auxiliary values.
pub fn chat_headers(token: &str, aux: &AuxHeaders) -> Result<HeaderMap, reqwest::header::InvalidHeaderValue> {
    let mut headers = HeaderMap::new();
    insert_browser_identity(&mut headers);
    headers.insert(ACCEPT, HeaderValue::from_static("text/event-stream"));
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert("origin", HeaderValue::from_static(UPSTREAM_ORIGIN));
    headers.insert("priority", HeaderValue::from_static("u=1, i"));
    headers.insert("referer", HeaderValue::from_static("https://duckduckgo.com/"));
    headers.insert("sec-fetch-dest", HeaderValue::from_static("empty"));
    headers.insert("sec-fetch-mode", HeaderValue::from_static("cors"));
    headers.insert("sec-fetch-site", HeaderValue::from_static("same-origin"));
    headers.insert("x-fe-signals", HeaderValue::from_str(&aux.fe_signals)?);
    headers.insert("x-fe-version", HeaderValue::from_str(&aux.fe_version)?);
    headers.insert(HeaderName::from_static(TOKEN_HEADER), HeaderValue::from_str(token)?);
    if let Some(hash) = &aux.vqd_hash_1 {
        headers.insert(HeaderName::from_static(HASH_HEADER), HeaderValue::from_str(hash)?);
    }
    Ok(headers)
}

fn page_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    insert_browser_identity(&mut headers);
    headers.insert(
        ACCEPT,
        HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
    );
    headers.insert("cache-control", HeaderValue::from_static("no-cache"));
    headers.insert("sec-fetch-dest", HeaderValue::from_static("document"));
    headers.insert("sec-fetch-mode", HeaderValue::from_static("navigate"));
    headers.insert("sec-fetch-site", HeaderValue::from_static("none"));
    headers.insert("upgrade-insecure-requests", HeaderValue::from_static("1"));
    headers
}

/// Request and response header carrying the session token.
pub const TOKEN_HEADER: &str = "x-vqd-4";
/// Bootstrap response header carrying the initial token; also the optional
/// client hash request header.
pub const HASH_HEADER: &str = "x-vqd-hash-1";
