use serde_json::Value;
use std::collections::HashMap;

use crate::errors::{FunctionError, FunctionResult};
use crate::models::tool::ToolCall;
use crate::providers::utils::is_valid_function_name;

/// A function call whose arguments are still streaming in
#[derive(Debug, Clone, PartialEq)]
pub struct PendingFunctionCall {
    pub tool_call_id: String,
    pub name: Option<String>,
    pub arguments_so_far: String,
}

impl PendingFunctionCall {
    /// Validate the name and parse the accumulated arguments.
    pub fn into_tool_call(self) -> FunctionResult<ToolCall> {
        let name = self.name.ok_or_else(|| {
            FunctionError::NotFound(format!("no function name for call {}", self.tool_call_id))
        })?;
        if !is_valid_function_name(&name) {
            return Err(FunctionError::NotFound(format!(
                "The provided function name '{}' had invalid characters, it must match this regex [a-zA-Z0-9_-]+",
                name
            )));
        }

        let arguments = if self.arguments_so_far.trim().is_empty() {
            Value::Object(Default::default())
        } else {
            serde_json::from_str::<Value>(&self.arguments_so_far).map_err(|e| {
                FunctionError::InvalidParameters(format!(
                    "Could not interpret tool use parameters for id {}: {}",
                    self.tool_call_id, e
                ))
            })?
        };

        Ok(ToolCall::new(self.tool_call_id, name, arguments))
    }
}

/// Calls accumulated during one stream invocation, in the order they were
/// first seen.
#[derive(Debug, Default)]
pub struct PendingCalls {
    order: Vec<String>,
    calls: HashMap<String, PendingFunctionCall>,
}

impl PendingCalls {
    pub fn new() -> Self {
        Self::default()
    }

    /// Concatenate `fragment` onto the call's arguments, creating the call on
    /// first sight. A name is kept once known.
    pub fn append(
        &mut self,
        tool_call_id: &str,
        name: Option<String>,
        fragment: &str,
    ) -> &PendingFunctionCall {
        if !self.calls.contains_key(tool_call_id) {
            self.order.push(tool_call_id.to_string());
        }
        let call = self
            .calls
            .entry(tool_call_id.to_string())
            .or_insert_with(|| PendingFunctionCall {
                tool_call_id: tool_call_id.to_string(),
                name: None,
                arguments_so_far: String::new(),
            });
        if call.name.is_none() {
            call.name = name;
        }
        call.arguments_so_far.push_str(fragment);
        call
    }

    pub fn get(&self, tool_call_id: &str) -> Option<&PendingFunctionCall> {
        self.calls.get(tool_call_id)
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    /// Take every call out, leaving the map empty
    pub fn drain(&mut self) -> Vec<PendingFunctionCall> {
        let mut calls = std::mem::take(&mut self.calls);
        std::mem::take(&mut self.order)
            .into_iter()
            .filter_map(|id| calls.remove(&id))
            .collect()
    }
}
