//! Text framing for canonical events.
//!
//! A frame is exactly two lines followed by a blank line:
//!
//! ```text
//! event: message.delta
//! data: {"messageId":"msg_1","content":"Hel"}
//!
//! ```
//!
//! Decoding is fail-fast: a buffer must hold only complete frames. Partial
//! frames are a caller error and are never buffered across calls.

use bytes::Bytes;
use serde_json::Value;
use std::str::FromStr;
use thiserror::Error;

use super::event::{CanonicalEvent, EventKind};

pub const FRAME_SEPARATOR: &str = "\n\n";
const EVENT_PREFIX: &str = "event: ";
const DATA_PREFIX: &str = "data: ";

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("buffer does not end with a frame separator")]
    UnterminatedBuffer,

    #[error("frame {index} is malformed: {reason}")]
    MalformedFrame { index: usize, reason: String },

    #[error("frame {index} has unknown event kind '{kind}'")]
    UnknownEventKind { index: usize, kind: String },

    #[error("frame {index} has invalid data: {source}")]
    InvalidData {
        index: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("frame {index} data is not a JSON object")]
    NonObjectPayload { index: usize },
}

/// Encode one event as a complete frame.
pub fn encode(event: &CanonicalEvent) -> String {
    let data = Value::Object(event.payload.clone());
    format!(
        "{EVENT_PREFIX}{}\n{DATA_PREFIX}{}{FRAME_SEPARATOR}",
        event.kind, data
    )
}

pub fn encode_bytes(event: &CanonicalEvent) -> Bytes {
    Bytes::from(encode(event))
}

/// Decode a buffer of zero or more complete frames.
pub fn decode(buffer: &str) -> Result<Vec<CanonicalEvent>, ProtocolError> {
    if buffer.is_empty() {
        return Ok(Vec::new());
    }
    let body = buffer
        .strip_suffix(FRAME_SEPARATOR)
        .ok_or(ProtocolError::UnterminatedBuffer)?;

    body.split(FRAME_SEPARATOR)
        .enumerate()
        .map(|(index, frame)| decode_frame(index, frame))
        .collect()
}

fn decode_frame(index: usize, frame: &str) -> Result<CanonicalEvent, ProtocolError> {
    let malformed = |reason: &str| ProtocolError::MalformedFrame {
        index,
        reason: reason.to_string(),
    };

    let lines: Vec<&str> = frame.split('\n').collect();
    let [event_line, data_line] = lines.as_slice() else {
        return Err(malformed(&format!(
            "expected 2 lines, found {}",
            lines.len()
        )));
    };

    let kind = event_line
        .strip_prefix(EVENT_PREFIX)
        .ok_or_else(|| malformed("first line must start with 'event: '"))?;
    let data = data_line
        .strip_prefix(DATA_PREFIX)
        .ok_or_else(|| malformed("second line must start with 'data: '"))?;

    let kind = EventKind::from_str(kind).map_err(|_| ProtocolError::UnknownEventKind {
        index,
        kind: kind.to_string(),
    })?;
    let payload = match serde_json::from_str::<Value>(data)
        .map_err(|source| ProtocolError::InvalidData { index, source })?
    {
        Value::Object(map) => map,
        _ => return Err(ProtocolError::NonObjectPayload { index }),
    };

    Ok(CanonicalEvent::new(kind, payload))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_events() -> Vec<CanonicalEvent> {
        vec![
            CanonicalEvent::conversation_started("conv_1", Some("resp_1")),
            CanonicalEvent::message_delta("msg_1", "line one\nline two \"quoted\""),
            CanonicalEvent::function_pending("call_1", None),
            CanonicalEvent::vector_store_created("vs_1"),
            CanonicalEvent::vector_store_file_uploaded("file_1", "notes.txt"),
            CanonicalEvent::vector_store_files_processed("vs_1", &["file_1".to_string()]),
            CanonicalEvent::message_ended(27),
            CanonicalEvent::error("vendor unavailable"),
        ]
    }

    #[test]
    fn test_encode_exact_bytes() {
        let frame = encode(&CanonicalEvent::message_ended(27));
        assert_eq!(frame, "event: message.ended\ndata: {\"totalTokens\":27}\n\n");

        let frame = encode(&CanonicalEvent::error("line one\nline two"));
        assert_eq!(
            frame,
            "event: error\ndata: {\"message\":\"line one\\nline two\"}\n\n"
        );
    }

    #[test]
    fn test_round_trip_each_kind() {
        for event in sample_events() {
            let decoded = decode(&encode(&event)).unwrap();
            assert_eq!(decoded, vec![event]);
        }
    }

    #[test]
    fn test_decode_concatenated_frames_in_order() {
        let events = sample_events();
        let buffer: String = events.iter().map(encode).collect();
        assert_eq!(decode(&buffer).unwrap(), events);
    }

    #[test]
    fn test_decode_empty_buffer() {
        assert!(decode("").unwrap().is_empty());
    }

    #[test]
    fn test_decode_rejects_unterminated_buffers() {
        let frame = encode(&CanonicalEvent::message_ended(1));
        for cut in 1..frame.len() - 1 {
            let partial = &frame[..cut];
            assert!(
                matches!(decode(partial), Err(ProtocolError::UnterminatedBuffer)),
                "accepted partial frame {partial:?}"
            );
        }
        assert!(matches!(
            decode("event: error\ndata: {}\n"),
            Err(ProtocolError::UnterminatedBuffer)
        ));
    }

    #[test]
    fn test_decode_rejects_unknown_kind() {
        let err = decode("event: message.started\ndata: {}\n\n").unwrap_err();
        assert!(matches!(err, ProtocolError::UnknownEventKind { kind, .. } if kind == "message.started"));
    }

    #[test]
    fn test_decode_rejects_malformed_frames() {
        assert!(matches!(
            decode("event: error\n\n"),
            Err(ProtocolError::MalformedFrame { index: 0, .. })
        ));
        assert!(matches!(
            decode("event: error\ndata: {}\nextra: 1\n\n"),
            Err(ProtocolError::MalformedFrame { .. })
        ));
        assert!(matches!(
            decode("kind: error\ndata: {}\n\n"),
            Err(ProtocolError::MalformedFrame { .. })
        ));
        assert!(matches!(
            decode("event: error\ndata:{}\n\n"),
            Err(ProtocolError::MalformedFrame { .. })
        ));
    }

    #[test]
    fn test_decode_rejects_bad_json() {
        let good = encode(&CanonicalEvent::message_ended(3));
        let buffer = format!("{good}event: error\ndata: {{\"message\": }}\n\n");
        assert!(matches!(
            decode(&buffer),
            Err(ProtocolError::InvalidData { index: 1, .. })
        ));
        assert!(matches!(
            decode("event: error\ndata: [1,2]\n\n"),
            Err(ProtocolError::NonObjectPayload { index: 0 })
        ));
    }

    #[test]
    fn test_payload_survives_nested_json() {
        let mut event = CanonicalEvent::error("x");
        event
            .payload
            .insert("detail".into(), json!({"nested": [1, {"deep": null}]}));
        assert_eq!(decode(&encode(&event)).unwrap()[0], event);
    }
}
