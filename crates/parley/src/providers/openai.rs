use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::time::Duration;

use super::base::{
    EventTranslator, RawEvent, RawEventStream, VendorAdapter, VendorEvent, VendorRequest,
};
use super::configs::OpenAiProviderConfig;
use super::utils::{insert_optional, post_stream, tools_to_responses_spec, usage_from};
use crate::models::tool::{Tool, ToolOutput};

/// Adapter for the OpenAI Responses API, which keeps conversation state on
/// the server: every turn chains onto the previous response id.
pub struct OpenAiAdapter {
    client: Client,
    config: OpenAiProviderConfig,
    instructions: Option<String>,
    tools: Vec<Value>,
}

impl OpenAiAdapter {
    pub fn new(
        config: OpenAiProviderConfig,
        instructions: Option<String>,
        tools: &[Tool],
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(600)) // 10 minutes timeout
            .build()?;

        Ok(Self {
            client,
            config,
            instructions,
            tools: tools_to_responses_spec(tools)?,
        })
    }

    fn url(&self) -> String {
        format!("{}/v1/responses", self.config.host.trim_end_matches('/'))
    }

    fn payload(&self, input: Value, previous_response_id: Option<&str>) -> Value {
        let mut payload = json!({
            "model": self.config.model,
            "input": input,
            "stream": true,
        });
        insert_optional(&mut payload, "previous_response_id", previous_response_id);
        insert_optional(&mut payload, "instructions", self.instructions.as_deref());
        if !self.tools.is_empty() {
            insert_optional(&mut payload, "tools", Some(&self.tools));
        }
        insert_optional(&mut payload, "temperature", self.config.temperature);
        insert_optional(&mut payload, "max_output_tokens", self.config.max_tokens);
        payload
    }

    fn request_input(request: &VendorRequest) -> Value {
        let mut input = Vec::new();
        if let Some(context) = &request.context {
            input.push(json!({"role": "developer", "content": context}));
        }
        input.push(json!({"role": "user", "content": request.prompt}));
        Value::Array(input)
    }

    async fn post(&self, payload: Value) -> Result<RawEventStream> {
        post_stream(&self.client, &self.url(), &self.config.api_key, &payload).await
    }
}

#[async_trait]
impl VendorAdapter for OpenAiAdapter {
    fn name(&self) -> &str {
        "openai"
    }

    fn translator(&self) -> Box<dyn EventTranslator> {
        Box::new(OpenAiTranslator::default())
    }

    async fn start_stream(&self, request: &VendorRequest) -> Result<RawEventStream> {
        self.post(self.payload(Self::request_input(request), None))
            .await
    }

    async fn append_stream(
        &self,
        handle: &str,
        request: &VendorRequest,
    ) -> Result<RawEventStream> {
        self.post(self.payload(Self::request_input(request), Some(handle)))
            .await
    }

    async fn continue_with_function_results(
        &self,
        handle: &str,
        outputs: &[ToolOutput],
    ) -> Result<RawEventStream> {
        let input: Vec<Value> = outputs
            .iter()
            .map(|output| {
                json!({
                    "type": "function_call_output",
                    "call_id": output.tool_call_id,
                    "output": output.output,
                })
            })
            .collect();
        self.post(self.payload(Value::Array(input), Some(handle)))
            .await
    }
}

/// Argument deltas reference the output item id, while results must be sent
/// back under the call id, so the mapping is remembered per stream.
#[derive(Debug, Default)]
pub struct OpenAiTranslator {
    call_ids: HashMap<String, String>,
}

fn str_at<'a>(value: &'a Value, pointer: &str) -> &'a str {
    value.pointer(pointer).and_then(Value::as_str).unwrap_or_default()
}

impl EventTranslator for OpenAiTranslator {
    fn translate(&mut self, event: &RawEvent) -> VendorEvent {
        let data = &event.data;
        match event.kind.as_str() {
            "response.created" => VendorEvent::Started {
                handle: str_at(data, "/response/id").to_string(),
            },
            "response.output_text.delta" => VendorEvent::TextDelta {
                message_id: str_at(data, "/item_id").to_string(),
                content: str_at(data, "/delta").to_string(),
            },
            "response.output_item.added" => {
                if str_at(data, "/item/type") != "function_call" {
                    return VendorEvent::Ignored;
                }
                let item_id = str_at(data, "/item/id").to_string();
                let call_id = str_at(data, "/item/call_id").to_string();
                self.call_ids.insert(item_id, call_id.clone());
                VendorEvent::FunctionCallDelta {
                    tool_call_id: call_id,
                    name: Some(str_at(data, "/item/name").to_string()),
                    arguments: str_at(data, "/item/arguments").to_string(),
                }
            }
            "response.function_call_arguments.delta" => {
                let item_id = str_at(data, "/item_id");
                let tool_call_id = self
                    .call_ids
                    .get(item_id)
                    .cloned()
                    .unwrap_or_else(|| item_id.to_string());
                VendorEvent::FunctionCallDelta {
                    tool_call_id,
                    name: None,
                    arguments: str_at(data, "/delta").to_string(),
                }
            }
            "response.completed" => VendorEvent::ResponseDone {
                usage: usage_from(
                    data.pointer("/response/usage"),
                    "input_tokens",
                    "output_tokens",
                ),
            },
            "response.failed" => VendorEvent::ResponseError {
                message: data
                    .pointer("/response/error/message")
                    .and_then(Value::as_str)
                    .unwrap_or("response failed")
                    .to_string(),
            },
            "response.incomplete" => VendorEvent::ResponseError {
                message: format!(
                    "response incomplete: {}",
                    data.pointer("/response/incomplete_details/reason")
                        .and_then(Value::as_str)
                        .unwrap_or("unknown reason")
                ),
            },
            "error" => VendorEvent::ResponseError {
                message: data
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown vendor error")
                    .to_string(),
            },
            "response.in_progress"
            | "response.queued"
            | "response.output_item.done"
            | "response.content_part.added"
            | "response.content_part.done"
            | "response.output_text.done"
            | "response.output_text.annotation.added"
            | "response.function_call_arguments.done"
            | "response.refusal.delta"
            | "response.refusal.done" => VendorEvent::Ignored,
            other => VendorEvent::Unrecognized(other.to_string()),
        }
    }
}
