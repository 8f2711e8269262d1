//! duck-llm - session protocol for the duckchat upstream
//!
//! - `token` - current/previous token pair and auxiliary header values
//! - `challenge` - classifies replies into success, challenge or hard failure
//! - `headers` - header providers and the browser header set
//! - `sse` - reply stream decoding
//! - `manager` - bootstrap, dispatch and bounded challenge retry

pub mod challenge;
pub mod config;
pub mod error;
pub mod headers;
pub mod manager;
pub mod payload;
pub mod sse;
pub mod token;

pub use challenge::{ChallengeDetector, ChallengeKind, ResponseClass};
pub use config::ProtocolConfig;
pub use error::{ProtocolError, Result};
pub use headers::{FallbackHeaderProvider, HeaderError, HeaderProvider, PageHeaderProvider, StaticHeaderProvider};
pub use manager::{ProtocolState, SessionProtocolManager};
pub use payload::ChatPayload;
pub use sse::ChatStream;
pub use token::{AuxHeaders, TokenStore};
