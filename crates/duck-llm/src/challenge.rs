//! Response classification.

use std::fmt;

use chat_metrics::ChallengeClass;
use reqwest::StatusCode;

/// Body marker the upstream uses when it no longer accepts the session token.
pub const INVALID_TOKEN_MARKER: &str = "ERR_INVALID_VQD";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChallengeKind {
    /// 429: rate or behaviour challenge
    RateLimited,
    /// 418: teapot-style bot challenge
    BotChallenge,
    InvalidToken,
}

impl fmt::Display for ChallengeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ChallengeKind::RateLimited => "rate limited (429)",
            ChallengeKind::BotChallenge => "bot challenge (418)",
            ChallengeKind::InvalidToken => "invalid token",
        };
        f.write_str(label)
    }
}

impl From<ChallengeKind> for ChallengeClass {
    fn from(kind: ChallengeKind) -> Self {
        match kind {
            ChallengeKind::RateLimited => ChallengeClass::RateLimited,
            ChallengeKind::BotChallenge => ChallengeClass::BotChallenge,
            ChallengeKind::InvalidToken => ChallengeClass::InvalidToken,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseClass {
    Success,
    Challenge(ChallengeKind),
    HardFailure,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ChallengeDetector;

impl ChallengeDetector {
    pub fn new() -> Self {
        Self
    }

    /// Only a 200 counts as success. Status codes take precedence over the
    /// body marker.
    pub fn classify(&self, status: StatusCode, body: &str) -> ResponseClass {
        if status == StatusCode::OK {
            return ResponseClass::Success;
        }
        match status.as_u16() {
            418 => ResponseClass::Challenge(ChallengeKind::BotChallenge),
            429 => ResponseClass::Challenge(ChallengeKind::RateLimited),
            _ if body.contains(INVALID_TOKEN_MARKER) => {
                ResponseClass::Challenge(ChallengeKind::InvalidToken)
            }
            _ => ResponseClass::HardFailure,
        }
    }
}
