//! Session token bookkeeping.
//!
//! The upstream hands out a fresh opaque token with every successful reply and
//! rejects tokens it has already seen. [`TokenStore`] keeps the current and
//! previous values plus every token that has gone out on the wire, so a
//! superseded token is never sent twice.

use std::collections::HashSet;

use chat_core::HeaderOverrides;

const DEFAULT_FE_VERSION: &str = "serp_20250710_070136_ET-70eaca6aea2948b0bb60";
const DEFAULT_FE_SIGNALS: &str = "eyJzdGFydCI6MTc1MjE1MjA1OTAzMywiZXZlbnRzIjpbeyJuYW1lIjoic3RhcnROZXdDaGF0IiwiZGVsdGEiOjcyfSx7Im5hbWUiOiJyZWNlbnRDaGF0c0xpc3RJbXByZXNzaW9uIiwiZGVsdGEiOjEzOH1dLCJlbmQiOjQ2MDZ9";

/// Auxiliary anti-automation header values sent next to the token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuxHeaders {
    pub fe_signals: String,
    pub fe_version: String,
    /// Optional client hash; omitted from requests when absent
    pub vqd_hash_1: Option<String>,
}

impl AuxHeaders {
    /// Shipped defaults with configured values layered on top.
    pub fn from_overrides(overrides: Option<&HeaderOverrides>) -> Self {
        let mut headers = Self::default();
        if let Some(o) = overrides {
            if let Some(signals) = o.fe_signals.as_ref().filter(|s| !s.is_empty()) {
                headers.fe_signals = signals.clone();
            }
            if let Some(version) = o.fe_version.as_ref().filter(|s| !s.is_empty()) {
                headers.fe_version = version.clone();
            }
            headers.vqd_hash_1 = o.vqd_hash_1.clone().filter(|s| !s.is_empty());
        }
        headers
    }
}

impl Default for AuxHeaders {
    fn default() -> Self {
        Self {
            fe_signals: DEFAULT_FE_SIGNALS.to_string(),
            fe_version: DEFAULT_FE_VERSION.to_string(),
            vqd_hash_1: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TokenStore {
    current: Option<String>,
    previous: Option<String>,
    aux: AuxHeaders,
    retry_count: u32,
    /// Set when the current token may no longer be sent
    stale: bool,
    spent: HashSet<String>,
}

impl TokenStore {
    pub fn new(aux: AuxHeaders) -> Self {
        Self {
            current: None,
            previous: None,
            aux,
            retry_count: 0,
            stale: false,
            spent: HashSet::new(),
        }
    }

    pub fn current(&self) -> Option<&str> {
        self.current.as_deref()
    }

    pub fn previous(&self) -> Option<&str> {
        self.previous.as_deref()
    }

    pub fn aux(&self) -> &AuxHeaders {
        &self.aux
    }

    pub fn set_aux(&mut self, aux: AuxHeaders) {
        self.aux = aux;
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    /// True when there is no token that can go out on the next request.
    pub fn needs_bootstrap(&self) -> bool {
        self.current.is_none() || self.stale
    }

    /// Adopt a token from the bootstrap exchange. Refuses a token that was
    /// already sent.
    pub fn adopt_bootstrap(&mut self, token: String) -> bool {
        if token.is_empty() || self.spent.contains(&token) {
            return false;
        }
        self.previous = self.current.replace(token);
        self.stale = false;
        true
    }

    /// Take the token for an outgoing request and remember it as spent.
    pub fn take_for_request(&mut self) -> Option<String> {
        if self.stale {
            return None;
        }
        let token = self.current.clone()?;
        self.spent.insert(token.clone());
        Some(token)
    }

    /// Rotate to the token the upstream returned. Without a usable fresh
    /// token the current one is marked stale and the next send bootstraps.
    pub fn rotate(&mut self, fresh: Option<&str>) -> bool {
        match fresh.filter(|t| !t.is_empty() && !self.spent.contains(*t)) {
            Some(token) => {
                self.previous = self.current.replace(token.to_string());
                self.stale = false;
                true
            }
            None => {
                self.stale = true;
                false
            }
        }
    }

    /// A 200 arrived: rotate and close the retry window.
    pub fn record_success(&mut self, fresh: Option<&str>) -> bool {
        self.retry_count = 0;
        self.rotate(fresh)
    }

    pub fn can_retry(&self, max_retries: u32) -> bool {
        self.retry_count < max_retries
    }

    pub fn begin_retry(&mut self) -> u32 {
        self.retry_count += 1;
        self.retry_count
    }

    pub fn invalidate(&mut self) {
        self.stale = true;
    }

    /// Forget the token pair and retry window for a fresh conversation.
    /// Spent tokens stay remembered.
    pub fn reset(&mut self) {
        self.current = None;
        self.previous = None;
        self.retry_count = 0;
        self.stale = false;
    }
}
