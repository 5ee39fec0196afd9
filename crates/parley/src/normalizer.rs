//! Turns a vendor's raw event stream into canonical events.
//!
//! One [`Normalizer::normalize`] call covers a whole turn: it opens the vendor
//! stream, reads ahead until the vendor handle is known, forwards text deltas
//! as they arrive, and runs the function-call continuation loop until the
//! vendor finishes without asking for more calls. The stream it returns always
//! ends with either `message.ended` or `error`.
pub mod pending;
pub mod read_ahead;

use futures::stream::{BoxStream, StreamExt};
use std::sync::Arc;
use tracing::{debug, warn};

pub use pending::{PendingCalls, PendingFunctionCall};
pub use read_ahead::{read_ahead, ReadAhead};

use crate::errors::ParleyError;
use crate::functions::FunctionExecutor;
use crate::models::tool::ToolOutput;
use crate::protocol::CanonicalEvent;
use crate::providers::base::{
    EventTranslator, RawEventStream, VendorAdapter, VendorEvent, VendorRequest,
};

pub const DEFAULT_MAX_FUNCTION_ROUNDS: usize = 8;

/// How the turn reaches the vendor
#[derive(Debug, Clone, PartialEq)]
pub enum StreamRequest {
    /// A brand new vendor conversation for our `conversation_id`
    Start {
        conversation_id: String,
        request: VendorRequest,
    },
    /// Another user turn on an existing vendor conversation
    Append {
        handle: String,
        request: VendorRequest,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum NormalizedEvent {
    /// The vendor handle changed; later turns must use this one
    Handle(String),
    Frame(CanonicalEvent),
}

impl NormalizedEvent {
    pub fn frame(&self) -> Option<&CanonicalEvent> {
        match self {
            NormalizedEvent::Frame(event) => Some(event),
            NormalizedEvent::Handle(_) => None,
        }
    }
}

type VendorEvents = BoxStream<'static, anyhow::Result<VendorEvent>>;

fn translated(raw: RawEventStream, mut translator: Box<dyn EventTranslator>) -> VendorEvents {
    raw.map(move |item| item.map(|event| translator.translate(&event)))
        .boxed()
}

fn error_frame(error: ParleyError) -> NormalizedEvent {
    NormalizedEvent::Frame(CanonicalEvent::error(error.to_string()))
}

#[derive(Clone)]
pub struct Normalizer {
    adapter: Arc<dyn VendorAdapter>,
    executor: Arc<dyn FunctionExecutor>,
    max_rounds: usize,
}

impl Normalizer {
    pub fn new(adapter: Arc<dyn VendorAdapter>, executor: Arc<dyn FunctionExecutor>) -> Self {
        Self {
            adapter,
            executor,
            max_rounds: DEFAULT_MAX_FUNCTION_ROUNDS,
        }
    }

    pub fn with_max_rounds(mut self, max_rounds: usize) -> Self {
        self.max_rounds = max_rounds;
        self
    }

    /// Run every pending call in order. A failing call becomes an error
    /// result for that call only.
    async fn execute_calls(&self, calls: Vec<PendingFunctionCall>) -> Vec<ToolOutput> {
        let mut outputs = Vec::with_capacity(calls.len());
        for call in calls {
            let tool_call_id = call.tool_call_id.clone();
            let result = match call.into_tool_call() {
                Ok(tool_call) => {
                    debug!("Executing function {} for {}", tool_call.name, tool_call.id);
                    self.executor
                        .execute(&tool_call.name, tool_call.arguments)
                        .await
                }
                Err(e) => Err(e),
            };
            let output = match result {
                Ok(output) => ToolOutput::success(tool_call_id, output),
                Err(e) => {
                    warn!("Function call {} failed: {}", tool_call_id, e);
                    ToolOutput::failure(tool_call_id, ParleyError::FunctionExecution(e))
                }
            };
            outputs.push(output);
        }
        outputs
    }

    /// Normalize one turn. Dropping the returned stream stops reading from
    /// the vendor.
    pub fn normalize(&self, request: StreamRequest) -> BoxStream<'static, NormalizedEvent> {
        let this = self.clone();
        Box::pin(async_stream::stream! {
            let (opened, conversation_id, mut handle) = match request {
                StreamRequest::Start { conversation_id, request } => {
                    (this.adapter.start_stream(&request).await, Some(conversation_id), None)
                }
                StreamRequest::Append { handle, request } => {
                    (this.adapter.append_stream(&handle, &request).await, None, Some(handle))
                }
            };
            let raw = match opened {
                Ok(raw) => raw,
                Err(e) => {
                    yield error_frame(ParleyError::VendorStream(e.to_string()));
                    return;
                }
            };

            let ahead = read_ahead(translated(raw, this.adapter.translator()), |event| {
                match event {
                    VendorEvent::Started { handle } => Some(handle.clone()),
                    _ => None,
                }
            })
            .await;
            let mut events = ahead.items;

            if let Some(key) = &ahead.key {
                if handle.as_deref() != Some(key.as_str()) {
                    handle = Some(key.clone());
                    yield NormalizedEvent::Handle(key.clone());
                }
            }
            if let Some(conversation_id) = conversation_id {
                match &ahead.key {
                    Some(key) => {
                        yield NormalizedEvent::Frame(CanonicalEvent::conversation_started(
                            conversation_id,
                            Some(key.as_str()),
                        ));
                    }
                    None => {
                        // Report the vendor's own error when it sent one
                        let mut message =
                            "stream ended before the vendor assigned a conversation id".to_string();
                        while let Some(item) = events.next().await {
                            match item {
                                Err(e) => {
                                    message = e.to_string();
                                    break;
                                }
                                Ok(VendorEvent::ResponseError { message: reported }) => {
                                    message = reported;
                                    break;
                                }
                                Ok(_) => {}
                            }
                        }
                        yield error_frame(ParleyError::VendorStream(message));
                        return;
                    }
                }
            }

            let mut total_tokens: i64 = 0;
            let mut rounds = 0usize;
            loop {
                let mut pending = PendingCalls::new();
                let mut usage = None;

                while let Some(item) = events.next().await {
                    let event = match item {
                        Ok(event) => event,
                        Err(e) => {
                            yield error_frame(ParleyError::VendorStream(e.to_string()));
                            return;
                        }
                    };
                    match event {
                        VendorEvent::Started { handle: started } => {
                            if handle.as_deref() != Some(started.as_str()) {
                                handle = Some(started.clone());
                                yield NormalizedEvent::Handle(started);
                            }
                        }
                        VendorEvent::TextDelta { message_id, content } => {
                            yield NormalizedEvent::Frame(CanonicalEvent::message_delta(message_id, content));
                        }
                        VendorEvent::FunctionCallDelta { tool_call_id, name, arguments } => {
                            let call = pending.append(&tool_call_id, name, &arguments);
                            yield NormalizedEvent::Frame(CanonicalEvent::function_pending(
                                tool_call_id.as_str(),
                                call.name.as_deref(),
                            ));
                        }
                        VendorEvent::ResponseDone { usage: done } => {
                            usage = Some(done);
                            break;
                        }
                        VendorEvent::ResponseError { message } => {
                            yield error_frame(ParleyError::VendorStream(message));
                            return;
                        }
                        VendorEvent::Ignored => {}
                        VendorEvent::Unrecognized(kind) => {
                            warn!("Skipping unrecognized {} event: {}", this.adapter.name(), kind);
                        }
                    }
                }

                let Some(usage) = usage else {
                    yield error_frame(ParleyError::VendorStream(
                        "stream ended before the response completed".to_string(),
                    ));
                    return;
                };
                total_tokens += usage.total();

                if pending.is_empty() {
                    yield NormalizedEvent::Frame(CanonicalEvent::message_ended(total_tokens));
                    return;
                }

                rounds += 1;
                if rounds > this.max_rounds {
                    yield error_frame(ParleyError::VendorStream(format!(
                        "exceeded the limit of {} function call rounds",
                        this.max_rounds
                    )));
                    return;
                }

                let Some(current) = handle.clone() else {
                    yield error_frame(ParleyError::VendorStream(
                        "no vendor conversation to continue".to_string(),
                    ));
                    return;
                };

                debug!("Continuing {} after {} function calls", current, pending.len());
                let outputs = this.execute_calls(pending.drain()).await;
                match this.adapter.continue_with_function_results(&current, &outputs).await {
                    Ok(raw) => events = translated(raw, this.adapter.translator()),
                    Err(e) => {
                        yield error_frame(ParleyError::VendorStream(e.to_string()));
                        return;
                    }
                }
            }
        })
    }
}
