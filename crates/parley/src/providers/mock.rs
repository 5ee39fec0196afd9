use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use super::base::{
    EventTranslator, RawEvent, RawEventStream, Usage, VendorAdapter, VendorEvent, VendorRequest,
};
use crate::models::tool::ToolOutput;

/// One step of a scripted vendor stream
#[derive(Debug, Clone)]
pub enum MockStep {
    Event(RawEvent),
    /// The transport breaks with this message
    Fail(String),
    /// The stream stops producing without ending
    Hang,
}

impl MockStep {
    pub fn started(handle: &str) -> Self {
        Self::Event(RawEvent::new("started", json!({"handle": handle})))
    }

    pub fn text(message_id: &str, content: &str) -> Self {
        Self::Event(RawEvent::new(
            "text",
            json!({"id": message_id, "content": content}),
        ))
    }

    pub fn call(tool_call_id: &str, name: Option<&str>, arguments: &str) -> Self {
        Self::Event(RawEvent::new(
            "call",
            json!({"id": tool_call_id, "name": name, "arguments": arguments}),
        ))
    }

    pub fn done(total_tokens: i32) -> Self {
        Self::Event(RawEvent::new("done", json!({"total_tokens": total_tokens})))
    }

    pub fn failed(message: &str) -> Self {
        Self::Event(RawEvent::new("failed", json!({"message": message})))
    }

    pub fn raw(kind: &str) -> Self {
        Self::Event(RawEvent::new(kind, json!({})))
    }
}

/// A call the normalizer made against the mock
#[derive(Debug, Clone, PartialEq)]
pub enum AdapterCall {
    Start(VendorRequest),
    Append(String, VendorRequest),
    Continue(String, Vec<ToolOutput>),
}

/// A vendor adapter that plays back scripted streams in order and records
/// every call made against it.
#[derive(Clone, Default)]
pub struct MockAdapter {
    scripts: Arc<Mutex<VecDeque<Result<Vec<MockStep>, String>>>>,
    calls: Arc<Mutex<Vec<AdapterCall>>>,
}

impl MockAdapter {
    pub fn new(streams: Vec<Vec<MockStep>>) -> Self {
        let adapter = Self::default();
        for steps in streams {
            adapter.push_stream(steps);
        }
        adapter
    }

    pub fn push_stream(&self, steps: Vec<MockStep>) {
        if let Ok(mut scripts) = self.scripts.lock() {
            scripts.push_back(Ok(steps));
        }
    }

    /// The next stream request is refused outright
    pub fn push_rejection(&self, message: &str) {
        if let Ok(mut scripts) = self.scripts.lock() {
            scripts.push_back(Err(message.to_string()));
        }
    }

    pub fn calls(&self) -> Vec<AdapterCall> {
        self.calls
            .lock()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }

    fn next_stream(&self, call: AdapterCall) -> Result<RawEventStream> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
        let script = self
            .scripts
            .lock()
            .map_err(|_| anyhow!("mock adapter poisoned"))?
            .pop_front()
            .ok_or_else(|| anyhow!("no scripted response left"))?;
        let steps = script.map_err(|message| anyhow!(message))?;
        Ok(Box::pin(async_stream::try_stream! {
            for step in steps {
                match step {
                    MockStep::Event(event) => yield event,
                    MockStep::Fail(message) => Err::<(), _>(anyhow!(message))?,
                    MockStep::Hang => futures::future::pending::<()>().await,
                }
            }
        }))
    }
}

#[async_trait]
impl VendorAdapter for MockAdapter {
    fn name(&self) -> &str {
        "mock"
    }

    fn translator(&self) -> Box<dyn EventTranslator> {
        Box::new(MockTranslator)
    }

    async fn start_stream(&self, request: &VendorRequest) -> Result<RawEventStream> {
        self.next_stream(AdapterCall::Start(request.clone()))
    }

    async fn append_stream(
        &self,
        handle: &str,
        request: &VendorRequest,
    ) -> Result<RawEventStream> {
        self.next_stream(AdapterCall::Append(handle.to_string(), request.clone()))
    }

    async fn continue_with_function_results(
        &self,
        handle: &str,
        outputs: &[ToolOutput],
    ) -> Result<RawEventStream> {
        self.next_stream(AdapterCall::Continue(handle.to_string(), outputs.to_vec()))
    }
}

pub struct MockTranslator;

fn field(data: &Value, key: &str) -> String {
    data.get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

impl EventTranslator for MockTranslator {
    fn translate(&mut self, event: &RawEvent) -> VendorEvent {
        let data = &event.data;
        match event.kind.as_str() {
            "started" => VendorEvent::Started {
                handle: field(data, "handle"),
            },
            "text" => VendorEvent::TextDelta {
                message_id: field(data, "id"),
                content: field(data, "content"),
            },
            "call" => VendorEvent::FunctionCallDelta {
                tool_call_id: field(data, "id"),
                name: data.get("name").and_then(Value::as_str).map(str::to_string),
                arguments: field(data, "arguments"),
            },
            "done" => VendorEvent::ResponseDone {
                usage: Usage::new(
                    None,
                    None,
                    data.get("total_tokens")
                        .and_then(Value::as_i64)
                        .map(|v| v as i32),
                ),
            },
            "failed" => VendorEvent::ResponseError {
                message: field(data, "message"),
            },
            "noop" => VendorEvent::Ignored,
            other => VendorEvent::Unrecognized(other.to_string()),
        }
    }
}
