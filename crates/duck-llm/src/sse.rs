//! SSE reply decoding.
//!
//! The reply body is framed as `data: <json>` lines ending with `data: [DONE]`.
//! Decoding runs on a background task that feeds an unbounded channel, so a
//! caller that stops reading never stalls the decoder.

use std::pin::Pin;
use std::task::{Context, Poll};

use eventsource_stream::Eventsource;
use futures::Stream;
use futures_util::StreamExt;
use reqwest::Response;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

const DONE_SENTINEL: &str = "[DONE]";

/// One decoded `data:` payload.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StreamMessage {
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub created: Option<i64>,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
}

#[derive(Debug, PartialEq, Eq)]
pub enum LineOutcome {
    Text(String),
    /// Valid payload without text (role or metadata frames)
    Empty,
    Done,
}

/// Decode the payload of a single `data:` line.
pub fn decode_data_line(data: &str) -> Result<LineOutcome, serde_json::Error> {
    let data = data.trim();
    if data == DONE_SENTINEL {
        return Ok(LineOutcome::Done);
    }
    let message: StreamMessage = serde_json::from_str(data)?;
    Ok(match message.message {
        Some(text) if !text.is_empty() => LineOutcome::Text(text),
        _ => LineOutcome::Empty,
    })
}

/// Incremental reply text. Ends after the sentinel or when the connection
/// closes; chunks already delivered stay valid either way.
pub struct ChatStream {
    inner: UnboundedReceiverStream<String>,
}

impl ChatStream {
    pub(crate) fn new(rx: mpsc::UnboundedReceiver<String>) -> Self {
        Self {
            inner: UnboundedReceiverStream::new(rx),
        }
    }

    /// Spawn the decoder for an SSE response.
    pub fn from_response(response: Response) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(decode_response(response, tx));
        Self::new(rx)
    }

    /// Drain the stream into one string.
    pub async fn collect_text(mut self) -> String {
        let mut text = String::new();
        while let Some(chunk) = self.next().await {
            text.push_str(&chunk);
        }
        text
    }
}

impl Stream for ChatStream {
    type Item = String;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

async fn decode_response(response: Response, tx: mpsc::UnboundedSender<String>) {
    let mut events = response.bytes_stream().eventsource();

    while let Some(event) = events.next().await {
        let event = match event {
            Ok(event) => event,
            Err(e) => {
                log::warn!("SSE stream ended with error: {}", e);
                return;
            }
        };

        // consecutive data lines arrive joined by newlines
        for line in event.data.split('\n').filter(|l| !l.trim().is_empty()) {
            match decode_data_line(line) {
                Ok(LineOutcome::Text(text)) => {
                    if tx.send(text).is_err() {
                        log::debug!("Stream reader went away, stopping decoder");
                        return;
                    }
                }
                Ok(LineOutcome::Empty) => {}
                Ok(LineOutcome::Done) => return,
                Err(e) => log::warn!("Skipping malformed SSE line ({}): {}", e, line),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_text_and_sentinel() {
        assert_eq!(
            decode_data_line(r#"{"role":"assistant","message":"Hi","created":1,"id":"x","action":"success","model":"m"}"#)
                .unwrap(),
            LineOutcome::Text("Hi".to_string())
        );
        assert_eq!(decode_data_line("[DONE]").unwrap(), LineOutcome::Done);
        assert_eq!(decode_data_line(r#"{"role":"assistant"}"#).unwrap(), LineOutcome::Empty);
        assert!(decode_data_line("{not json").is_err());
    }

    #[tokio::test]
    async fn collects_from_channel() {
        let (tx, rx) = mpsc::unbounded_channel();
        tx.send("a".to_string()).unwrap();
        tx.send("b".to_string()).unwrap();
        drop(tx);
        assert_eq!(ChatStream::new(rx).collect_text().await, "ab");
    }
}
