use reqwest::StatusCode;
use thiserror::Error;

use crate::challenge::ChallengeKind;

#[derive(Error, Debug)]
pub enum ProtocolError {
    /// The bootstrap exchange did not yield a usable token
    #[error("Token acquisition failed: {0}")]
    TokenAcquisition(String),

    #[error("Upstream challenge: {0}")]
    TransientChallenge(ChallengeKind),

    #[error("Upstream rejected the session token")]
    InvalidToken,

    #[error("Gave up after {retries} retries (last challenge: {last})")]
    ExhaustedRetries { retries: u32, last: ChallengeKind },

    #[error("HTTP error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Upstream error: HTTP {status}: {body}")]
    Upstream { status: StatusCode, body: String },

    #[error("JSON error: {0}")]
    Payload(#[from] serde_json::Error),
}

impl ProtocolError {
    /// Challenge-class errors leave the session usable for the next turn.
    pub fn is_challenge(&self) -> bool {
        matches!(
            self,
            ProtocolError::TransientChallenge(_)
                | ProtocolError::InvalidToken
                | ProtocolError::ExhaustedRetries { .. }
        )
    }
}

impl From<ChallengeKind> for ProtocolError {
    fn from(kind: ChallengeKind) -> Self {
        match kind {
            ChallengeKind::InvalidToken => ProtocolError::InvalidToken,
            other => ProtocolError::TransientChallenge(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, ProtocolError>;
