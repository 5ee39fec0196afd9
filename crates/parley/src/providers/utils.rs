use anyhow::{anyhow, Result};
use regex::Regex;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::OnceLock;

use super::base::{RawEventStream, Usage};
use super::sse::sse_events;
use crate::models::tool::Tool;

fn function_name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[a-zA-Z0-9_-]+$").expect("static regex"))
}

pub fn is_valid_function_name(name: &str) -> bool {
    function_name_pattern().is_match(name)
}

fn check_tools(tools: &[Tool]) -> Result<()> {
    let mut tool_names = HashSet::new();
    for tool in tools {
        if !is_valid_function_name(&tool.name) {
            return Err(anyhow!(
                "Invalid tool name '{}', it must match [a-zA-Z0-9_-]+",
                tool.name
            ));
        }
        if !tool_names.insert(&tool.name) {
            return Err(anyhow!("Duplicate tool name: {}", tool.name));
        }
    }
    Ok(())
}

/// Tool list in the flat shape of the OpenAI Responses API
pub fn tools_to_responses_spec(tools: &[Tool]) -> Result<Vec<Value>> {
    check_tools(tools)?;
    Ok(tools
        .iter()
        .map(|tool| {
            json!({
                "type": "function",
                "name": tool.name,
                "description": tool.description,
                "parameters": tool.parameters,
            })
        })
        .collect())
}

/// Tool list in the nested `function` shape used by chat-style APIs
pub fn tools_to_function_spec(tools: &[Tool]) -> Result<Vec<Value>> {
    check_tools(tools)?;
    Ok(tools
        .iter()
        .map(|tool| {
            json!({
                "type": "function",
                "function": {
                    "name": tool.name,
                    "description": tool.description,
                    "parameters": tool.parameters,
                }
            })
        })
        .collect())
}

/// Read token counts from a vendor usage object
pub fn usage_from(usage: Option<&Value>, input_key: &str, output_key: &str) -> Usage {
    let Some(usage) = usage else {
        return Usage::default();
    };
    let count = |key: &str| usage.get(key).and_then(Value::as_i64).map(|v| v as i32);

    let input_tokens = count(input_key);
    let output_tokens = count(output_key);
    let total_tokens = count("total_tokens").or_else(|| match (input_tokens, output_tokens) {
        (Some(input), Some(output)) => Some(input + output),
        _ => None,
    });

    Usage::new(input_tokens, output_tokens, total_tokens)
}

/// Set `key` on a JSON object payload when `value` is present
pub fn insert_optional<T: Serialize>(payload: &mut Value, key: &str, value: Option<T>) {
    if let (Some(object), Some(value)) = (payload.as_object_mut(), value) {
        object.insert(key.to_string(), json!(value));
    }
}

fn error_detail(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|value| {
            value
                .pointer("/error/message")
                .or_else(|| value.get("message"))
                .or_else(|| value.get("detail"))
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.to_string())
}

/// POST a streaming request and hand back its server-sent events.
pub async fn post_stream(
    client: &Client,
    url: &str,
    api_key: &str,
    payload: &Value,
) -> Result<RawEventStream> {
    let response = client
        .post(url)
        .header("Authorization", format!("Bearer {}", api_key))
        .header("Accept", "text/event-stream")
        .json(payload)
        .send()
        .await?;

    match response.status() {
        status if status.is_success() => Ok(sse_events(response)),
        status if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() => {
            let body = response.text().await.unwrap_or_default();
            Err(anyhow!("Server error: {}: {}", status, error_detail(&body)))
        }
        status => {
            let body = response.text().await.unwrap_or_default();
            Err(anyhow!("Request failed: {}: {}", status, error_detail(&body)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tool(name: &str) -> Tool {
        Tool::new(
            name,
            "A test tool",
            json!({
                "type": "object",
                "properties": {
                    "input": {
                        "type": "string",
                        "description": "Test parameter"
                    }
                },
                "required": ["input"]
            }),
        )
    }

    #[test]
    fn test_tools_to_responses_spec() -> Result<()> {
        let spec = tools_to_responses_spec(&[tool("test_tool")])?;
        assert_eq!(spec.len(), 1);
        assert_eq!(spec[0]["type"], "function");
        assert_eq!(spec[0]["name"], "test_tool");
        assert_eq!(spec[0]["parameters"]["required"][0], "input");
        Ok(())
    }

    #[test]
    fn test_tools_to_function_spec() -> Result<()> {
        let spec = tools_to_function_spec(&[tool("test_tool")])?;
        assert_eq!(spec[0]["function"]["name"], "test_tool");
        assert_eq!(spec[0]["function"]["description"], "A test tool");
        Ok(())
    }

    #[test]
    fn test_tools_spec_duplicate() {
        let result = tools_to_function_spec(&[tool("test_tool"), tool("test_tool")]);
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Duplicate tool name"));
    }

    #[test]
    fn test_tools_spec_invalid_name() {
        let result = tools_to_responses_spec(&[tool("hello world")]);
        assert!(result.unwrap_err().to_string().contains("Invalid tool name"));
    }

    #[test]
    fn test_is_valid_function_name() {
        assert!(is_valid_function_name("hello-world"));
        assert!(is_valid_function_name("hello_world"));
        assert!(!is_valid_function_name("hello world"));
        assert!(!is_valid_function_name("hello@world"));
        assert!(!is_valid_function_name(""));
    }

    #[test]
    fn test_usage_from_fills_total() {
        let usage = json!({"prompt_tokens": 12, "completion_tokens": 30});
        let parsed = usage_from(Some(&usage), "prompt_tokens", "completion_tokens");
        assert_eq!(parsed, Usage::new(Some(12), Some(30), Some(42)));
        assert_eq!(usage_from(None, "a", "b"), Usage::default());
    }

    #[test]
    fn test_error_detail_prefers_vendor_message() {
        assert_eq!(
            error_detail(r#"{"error": {"message": "bad key"}}"#),
            "bad key"
        );
        assert_eq!(error_detail(r#"{"message": "no model"}"#), "no model");
        assert_eq!(error_detail("gateway timeout"), "gateway timeout");
    }

    #[test]
    fn test_insert_optional() {
        let mut payload = json!({"model": "m"});
        insert_optional(&mut payload, "temperature", Some(0.5));
        insert_optional::<i32>(&mut payload, "max_tokens", None);
        assert_eq!(payload, json!({"model": "m", "temperature": 0.5}));
    }
}
