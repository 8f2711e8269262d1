use std::time::Duration;

use chat_core::Config;

use crate::headers::UPSTREAM_ORIGIN;
use crate::token::AuxHeaders;

const STATUS_PATH: &str = "/duckchat/v1/status";
const CHAT_PATH: &str = "/duckchat/v1/chat";
const PAGE_PATH: &str = "/?q=DuckDuckGo+AI+Chat&ia=chat&duckai=1";

/// Transport and retry settings for one protocol session.
#[derive(Debug, Clone)]
pub struct ProtocolConfig {
    pub base_url: String,
    pub http_proxy: Option<String>,
    pub https_proxy: Option<String>,
    pub bootstrap_timeout: Duration,
    pub chat_timeout: Duration,
    /// Pause before re-acquiring a token after a challenge
    pub challenge_backoff: Duration,
    pub max_retries: u32,
    /// Used when the landing page cannot be mined for fresh values
    pub last_known_headers: AuxHeaders,
}

impl ProtocolConfig {
    pub fn from_config(config: &Config) -> Self {
        let mut protocol = Self {
            last_known_headers: AuxHeaders::from_overrides(config.headers.as_ref()),
            http_proxy: non_empty(&config.http_proxy),
            https_proxy: non_empty(&config.https_proxy),
            ..Self::default()
        };
        if let Some(base) = config.api_base.as_deref().filter(|b| !b.is_empty()) {
            protocol.base_url = base.trim_end_matches('/').to_string();
        }
        protocol
    }

    /// Point every endpoint at `base_url`, as tests do with a mock server.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.challenge_backoff = backoff;
        self
    }

    pub fn status_url(&self) -> String {
        format!("{}{}", self.base_url, STATUS_PATH)
    }

    pub fn chat_url(&self) -> String {
        format!("{}{}", self.base_url, CHAT_PATH)
    }

    pub fn page_url(&self) -> String {
        format!("{}{}", self.base_url, PAGE_PATH)
    }
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            base_url: UPSTREAM_ORIGIN.to_string(),
            http_proxy: None,
            https_proxy: None,
            bootstrap_timeout: Duration::from_secs(10),
            chat_timeout: Duration::from_secs(30),
            challenge_backoff: Duration::from_secs(2),
            max_retries: 3,
            last_known_headers: AuxHeaders::default(),
        }
    }
}

fn non_empty(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}
