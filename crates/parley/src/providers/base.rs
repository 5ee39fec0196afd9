use anyhow::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::tool::ToolOutput;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: Option<i32>,
    pub output_tokens: Option<i32>,
    pub total_tokens: Option<i32>,
}

impl Usage {
    pub fn new(
        input_tokens: Option<i32>,
        output_tokens: Option<i32>,
        total_tokens: Option<i32>,
    ) -> Self {
        Self {
            input_tokens,
            output_tokens,
            total_tokens,
        }
    }

    /// The reported total, falling back to input + output, then zero
    pub fn total(&self) -> i64 {
        match (self.total_tokens, self.input_tokens, self.output_tokens) {
            (Some(total), _, _) => i64::from(total),
            (None, input, output) => {
                i64::from(input.unwrap_or(0)) + i64::from(output.unwrap_or(0))
            }
        }
    }
}

/// One event exactly as the vendor sent it: its type tag and JSON body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEvent {
    pub kind: String,
    pub data: Value,
}

impl RawEvent {
    pub fn new<S: Into<String>>(kind: S, data: Value) -> Self {
        Self {
            kind: kind.into(),
            data,
        }
    }
}

pub type RawEventStream = BoxStream<'static, Result<RawEvent>>;

/// What a raw vendor event means to the normalizer.
#[derive(Debug, Clone, PartialEq)]
pub enum VendorEvent {
    /// The vendor assigned (or confirmed) its handle for this conversation
    Started { handle: String },
    TextDelta { message_id: String, content: String },
    /// A fragment of a tool call's JSON arguments; `name` is present when the
    /// vendor announces it
    FunctionCallDelta {
        tool_call_id: String,
        name: Option<String>,
        arguments: String,
    },
    ResponseDone { usage: Usage },
    ResponseError { message: String },
    /// A known event type that carries nothing the normalizer needs
    Ignored,
    /// An event type this translator has never heard of
    Unrecognized(String),
}

/// Maps one vendor's raw events onto [`VendorEvent`]s.
///
/// A fresh translator is created for every stream invocation, so any state it
/// keeps (item ids, block indexes) never outlives that stream.
pub trait EventTranslator: Send {
    fn translate(&mut self, event: &RawEvent) -> VendorEvent;
}

/// The user-facing input of one turn as it is sent to a vendor
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VendorRequest {
    pub prompt: String,
    /// Retrieved context to place ahead of the prompt
    pub context: Option<String>,
}

impl VendorRequest {
    pub fn new<S: Into<String>>(prompt: S) -> Self {
        Self {
            prompt: prompt.into(),
            context: None,
        }
    }

    pub fn with_context(mut self, context: Option<String>) -> Self {
        self.context = context;
        self
    }
}

/// Capability interface implemented once per vendor.
///
/// Configuration (model, credentials, instructions, tools) is bound when the
/// adapter is built; each call only carries the turn-specific input.
#[async_trait]
pub trait VendorAdapter: Send + Sync {
    fn name(&self) -> &str;

    fn translator(&self) -> Box<dyn EventTranslator>;

    /// Open a new vendor conversation
    async fn start_stream(&self, request: &VendorRequest) -> Result<RawEventStream>;

    /// Add a user turn to an existing vendor conversation
    async fn append_stream(&self, handle: &str, request: &VendorRequest)
        -> Result<RawEventStream>;

    /// Hand function results back so generation can resume
    async fn continue_with_function_results(
        &self,
        handle: &str,
        outputs: &[ToolOutput],
    ) -> Result<RawEventStream>;
}
