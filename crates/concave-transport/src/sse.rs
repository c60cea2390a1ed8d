//! Parsing for the `GET /<resource>/subscribe` event stream: named SSE
//! events `connected {seq}` and `message {type, seq, object|objectId|reason,
//! meta?}`.

use futures_util::{Stream, StreamExt};
use serde::{Deserialize, Serialize};

use crate::error::TransportError;

/// Metadata the server optionally echoes back on a create, carrying the
/// client-generated optimistic id.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct EventMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub optimistic_id: Option<String>,
}

/// A single item in the tagged union the subscription stream carries.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SubscriptionEvent {
    Existing { object: serde_json::Value, seq: u64 },
    Added { object: serde_json::Value, seq: u64, meta: Option<EventMeta> },
    Changed {
        object: serde_json::Value,
        seq: u64,
        #[serde(rename = "previousObjectId")]
        previous_object_id: Option<String>,
    },
    Removed { object_id: String, seq: u64 },
    Invalidate { reason: Option<String>, seq: u64 },
}

impl SubscriptionEvent {
    pub fn seq(&self) -> u64 {
        match self {
            SubscriptionEvent::Existing { seq, .. }
            | SubscriptionEvent::Added { seq, .. }
            | SubscriptionEvent::Changed { seq, .. }
            | SubscriptionEvent::Removed { seq, .. }
            | SubscriptionEvent::Invalidate { seq, .. } => *seq,
        }
    }

    /// Extracts the id this event addresses, when it carries one up front
    /// (objects carry their own `id` field which the reconciler reads).
    pub fn object_id_hint(&self) -> Option<&str> {
        match self {
            SubscriptionEvent::Removed { object_id, .. } => Some(object_id),
            _ => None,
        }
    }
}

/// A connection-level frame: either the initial handshake or a data event.
#[derive(Debug, Clone)]
pub enum SseFrame {
    Connected { seq: u64 },
    Message(SubscriptionEvent),
}

#[derive(Debug, Deserialize)]
struct ConnectedPayload {
    seq: u64,
}

/// Parses one complete SSE frame (the accumulated `event:`/`data:` lines
/// between blank-line boundaries) into a typed frame. Unknown event names
/// and malformed JSON bodies are reported so the caller can log and skip
/// rather than terminate the stream.
pub fn parse_frame(event_name: &str, data: &str) -> Result<SseFrame, TransportError> {
    match event_name {
        "connected" => {
            let payload: ConnectedPayload = serde_json::from_str(data)
                .map_err(|e| TransportError::Serialization(e.to_string()))?;
            Ok(SseFrame::Connected { seq: payload.seq })
        }
        "message" => {
            let event: SubscriptionEvent = serde_json::from_str(data)
                .map_err(|e| TransportError::Serialization(e.to_string()))?;
            Ok(SseFrame::Message(event))
        }
        other => Err(TransportError::Serialization(format!("unknown SSE event: {other}"))),
    }
}

/// Accumulates raw SSE lines (`event: foo` / `data: {...}`) emitted on a
/// byte stream into parsed frames, one per blank-line-delimited block.
/// Parse errors on a single event are yielded as `Err` so the caller can log
/// and continue without tearing down the underlying connection.
pub fn frame_stream(
    bytes: impl Stream<Item = reqwest::Result<bytes::Bytes>> + Send + 'static,
) -> impl Stream<Item = Result<SseFrame, TransportError>> {
    async_stream::stream! {
        let mut buffer = String::new();
        let mut event_name = String::new();
        let mut data_lines: Vec<String> = Vec::new();
        futures_util::pin_mut!(bytes);

        while let Some(chunk) = bytes.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(err) => {
                    yield Err(TransportError::Network(err.to_string()));
                    continue;
                }
            };
            buffer.push_str(&String::from_utf8_lossy(&chunk));

            while let Some(pos) = buffer.find('\n') {
                let line = buffer[..pos].trim_end_matches('\r').to_string();
                buffer.drain(..=pos);

                if line.is_empty() {
                    if !data_lines.is_empty() {
                        let data = data_lines.join("\n");
                        let name = if event_name.is_empty() { "message" } else { event_name.as_str() };
                        yield parse_frame(name, &data);
                    }
                    event_name.clear();
                    data_lines.clear();
                    continue;
                }

                if let Some(rest) = line.strip_prefix("event:") {
                    event_name = rest.trim().to_string();
                } else if let Some(rest) = line.strip_prefix("data:") {
                    data_lines.push(rest.trim_start().to_string());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_connected_frame() {
        let frame = parse_frame("connected", r#"{"seq":5}"#).unwrap();
        assert!(matches!(frame, SseFrame::Connected { seq: 5 }));
    }

    #[test]
    fn parses_added_message() {
        let frame = parse_frame(
            "message",
            r#"{"type":"added","object":{"id":"x"},"seq":1,"meta":{"optimisticId":"opt_1"}}"#,
        )
        .unwrap();
        match frame {
            SseFrame::Message(SubscriptionEvent::Added { meta, seq, .. }) => {
                assert_eq!(seq, 1);
                assert_eq!(meta.unwrap().optimistic_id.as_deref(), Some("opt_1"));
            }
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[test]
    fn unknown_event_name_is_an_error_not_a_panic() {
        assert!(parse_frame("bogus", "{}").is_err());
    }

    #[test]
    fn malformed_json_is_an_error_not_a_panic() {
        assert!(parse_frame("message", "not json").is_err());
    }
}
