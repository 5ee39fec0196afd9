//! Server-sent event reader for vendor streams.
use anyhow::{anyhow, Result};
use bytes::Bytes;
use futures::{Stream, StreamExt};
use serde_json::Value;

use super::base::{RawEvent, RawEventStream};

const DONE_SENTINEL: &str = "[DONE]";

/// Incremental SSE parser. Bytes may arrive split anywhere, including inside
/// a multi-byte character, so only complete lines are decoded.
#[derive(Debug, Default)]
pub(crate) struct SseParser {
    buffer: Vec<u8>,
    event: Option<String>,
    data: Vec<String>,
}

impl SseParser {
    pub(crate) fn feed(&mut self, chunk: &[u8]) -> Result<Vec<RawEvent>> {
        self.buffer.extend_from_slice(chunk);
        let mut events = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = std::str::from_utf8(&line)
                .map_err(|e| anyhow!("invalid utf-8 in event stream: {}", e))?
                .trim_end_matches(['\n', '\r']);
            if let Some(event) = self.process_line(line)? {
                events.push(event);
            }
        }
        Ok(events)
    }

    /// Flush whatever is left once the body ends
    pub(crate) fn finish(&mut self) -> Result<Option<RawEvent>> {
        if !self.buffer.is_empty() {
            let rest = std::mem::take(&mut self.buffer);
            let line = String::from_utf8(rest)
                .map_err(|e| anyhow!("invalid utf-8 in event stream: {}", e))?;
            if let Some(event) = self.process_line(line.trim_end_matches('\r'))? {
                return Ok(Some(event));
            }
        }
        self.dispatch()
    }

    fn process_line(&mut self, line: &str) -> Result<Option<RawEvent>> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return Ok(None);
        }
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "event" => self.event = Some(value.to_string()),
            "data" => self.data.push(value.to_string()),
            _ => {}
        }
        Ok(None)
    }

    fn dispatch(&mut self) -> Result<Option<RawEvent>> {
        let event = self.event.take();
        if self.data.is_empty() {
            return Ok(None);
        }
        let data = std::mem::take(&mut self.data).join("\n");
        if data.trim() == DONE_SENTINEL {
            return Ok(None);
        }

        let data: Value = serde_json::from_str(&data)
            .map_err(|e| anyhow!("malformed event data: {}: {}", e, data))?;
        let kind = event
            .or_else(|| data.get("type").and_then(Value::as_str).map(str::to_string))
            .unwrap_or_else(|| "message".to_string());
        Ok(Some(RawEvent::new(kind, data)))
    }
}

/// Turn a byte stream into raw events, ending at the first error.
pub fn parse_sse_stream<S, E>(bytes: S) -> RawEventStream
where
    S: Stream<Item = std::result::Result<Bytes, E>> + Send + 'static,
    E: std::error::Error + Send + Sync + 'static,
{
    Box::pin(async_stream::try_stream! {
        let mut parser = SseParser::default();
        let mut bytes = Box::pin(bytes);
        while let Some(chunk) = bytes.next().await {
            let chunk = chunk.map_err(anyhow::Error::from)?;
            for event in parser.feed(&chunk)? {
                yield event;
            }
        }
        if let Some(event) = parser.finish()? {
            yield event;
        }
    })
}

pub fn sse_events(response: reqwest::Response) -> RawEventStream {
    parse_sse_stream(response.bytes_stream())
}
