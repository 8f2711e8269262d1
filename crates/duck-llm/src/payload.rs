//! Outbound chat request body.

use chat_core::{Message, WireRole};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatPayload {
    pub model: String,
    pub metadata: Metadata,
    pub messages: Vec<WireMessage>,
    pub can_use_tools: bool,
    pub can_use_approx_location: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    pub tool_choice: ToolChoice,
}

/// Upstream tool toggles. All off: the client never asks for tool use.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolChoice {
    #[serde(rename = "NewsSearch")]
    pub news_search: bool,
    #[serde(rename = "VideosSearch")]
    pub videos_search: bool,
    #[serde(rename = "LocalSearch")]
    pub local_search: bool,
    #[serde(rename = "WeatherForecast")]
    pub weather_forecast: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireMessage {
    pub role: WireRole,
    pub content: String,
}

impl ChatPayload {
    /// The full transcript, injected context included, goes out on every call.
    pub fn from_transcript(model: &str, transcript: &[Message]) -> Self {
        Self {
            model: model.to_string(),
            metadata: Metadata::default(),
            messages: transcript
                .iter()
                .map(|m| WireMessage {
                    role: m.wire_role(),
                    content: m.content.clone(),
                })
                .collect(),
            can_use_tools: true,
            can_use_approx_location: true,
        }
    }
}
