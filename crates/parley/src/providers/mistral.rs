use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;

use super::base::{
    EventTranslator, RawEvent, RawEventStream, VendorAdapter, VendorEvent, VendorRequest,
};
use super::configs::MistralProviderConfig;
use super::utils::{insert_optional, post_stream, tools_to_function_spec, usage_from};
use crate::models::tool::{Tool, ToolOutput};

/// Adapter for the Mistral Conversations API. The vendor conversation id is
/// the handle and stays the same for the life of the conversation.
pub struct MistralAdapter {
    client: Client,
    config: MistralProviderConfig,
    instructions: Option<String>,
    tools: Vec<Value>,
}

impl MistralAdapter {
    pub fn new(
        config: MistralProviderConfig,
        instructions: Option<String>,
        tools: &[Tool],
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(600))
            .build()?;

        Ok(Self {
            client,
            config,
            instructions,
            tools: tools_to_function_spec(tools)?,
        })
    }

    fn base_url(&self) -> String {
        format!("{}/v1/conversations", self.config.host.trim_end_matches('/'))
    }

    fn completion_args(&self) -> Option<Value> {
        let mut args = json!({});
        insert_optional(&mut args, "temperature", self.config.temperature);
        insert_optional(&mut args, "max_tokens", self.config.max_tokens);
        match args.as_object() {
            Some(object) if !object.is_empty() => Some(args),
            _ => None,
        }
    }

    /// Mistral has no developer role for conversation inputs, so retrieved
    /// context travels in the same user entry, ahead of the prompt.
    fn request_inputs(request: &VendorRequest) -> Value {
        let content = match &request.context {
            Some(context) => format!("{}\n\n{}", context, request.prompt),
            None => request.prompt.clone(),
        };
        json!([{
            "type": "message.input",
            "role": "user",
            "content": content,
        }])
    }

    async fn post(&self, url: String, payload: Value) -> Result<RawEventStream> {
        post_stream(&self.client, &url, &self.config.api_key, &payload).await
    }
}

#[async_trait]
impl VendorAdapter for MistralAdapter {
    fn name(&self) -> &str {
        "mistral"
    }

    fn translator(&self) -> Box<dyn EventTranslator> {
        Box::new(MistralTranslator)
    }

    async fn start_stream(&self, request: &VendorRequest) -> Result<RawEventStream> {
        let mut payload = json!({
            "model": self.config.model,
            "inputs": Self::request_inputs(request),
            "stream": true,
        });
        insert_optional(&mut payload, "instructions", self.instructions.as_deref());
        if !self.tools.is_empty() {
            insert_optional(&mut payload, "tools", Some(&self.tools));
        }
        insert_optional(&mut payload, "completion_args", self.completion_args());
        self.post(self.base_url(), payload).await
    }

    async fn append_stream(
        &self,
        handle: &str,
        request: &VendorRequest,
    ) -> Result<RawEventStream> {
        let payload = json!({
            "inputs": Self::request_inputs(request),
            "stream": true,
        });
        self.post(format!("{}/{}", self.base_url(), handle), payload)
            .await
    }

    async fn continue_with_function_results(
        &self,
        handle: &str,
        outputs: &[ToolOutput],
    ) -> Result<RawEventStream> {
        let inputs: Vec<Value> = outputs
            .iter()
            .map(|output| {
                json!({
                    "type": "function.result",
                    "tool_call_id": output.tool_call_id,
                    "result": output.output,
                })
            })
            .collect();
        let payload = json!({"inputs": inputs, "stream": true});
        self.post(format!("{}/{}", self.base_url(), handle), payload)
            .await
    }
}

#[derive(Debug, Default)]
pub struct MistralTranslator;

/// Message content arrives either as a plain string or as a typed chunk
fn delta_text(content: Option<&Value>) -> String {
    match content {
        Some(Value::String(text)) => text.clone(),
        Some(Value::Object(chunk)) => chunk
            .get("text")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        Some(Value::Array(chunks)) => chunks
            .iter()
            .filter_map(|chunk| chunk.get("text").and_then(Value::as_str))
            .collect(),
        _ => String::new(),
    }
}

fn str_field(data: &Value, key: &str) -> String {
    data.get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

impl EventTranslator for MistralTranslator {
    fn translate(&mut self, event: &RawEvent) -> VendorEvent {
        let data = &event.data;
        match event.kind.as_str() {
            "conversation.response.started" => VendorEvent::Started {
                handle: str_field(data, "conversation_id"),
            },
            "message.output.delta" => VendorEvent::TextDelta {
                message_id: str_field(data, "id"),
                content: delta_text(data.get("content")),
            },
            "function.call.delta" => VendorEvent::FunctionCallDelta {
                tool_call_id: str_field(data, "tool_call_id"),
                name: data
                    .get("name")
                    .and_then(Value::as_str)
                    .filter(|name| !name.is_empty())
                    .map(str::to_string),
                arguments: str_field(data, "arguments"),
            },
            "conversation.response.done" => VendorEvent::ResponseDone {
                usage: usage_from(data.get("usage"), "prompt_tokens", "completion_tokens"),
            },
            "conversation.response.error" => VendorEvent::ResponseError {
                message: data
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("conversation error")
                    .to_string(),
            },
            "tool.execution.started"
            | "tool.execution.delta"
            | "tool.execution.done"
            | "agent.handoff.started"
            | "agent.handoff.done" => VendorEvent::Ignored,
            other => VendorEvent::Unrecognized(other.to_string()),
        }
    }
}
