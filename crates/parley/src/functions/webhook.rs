use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;

use super::Function;
use crate::errors::{FunctionError, FunctionResult};
use crate::models::tool::Tool;

/// A function implemented by an HTTP endpoint: the arguments are POSTed as
/// JSON and the response body is the result.
pub struct WebhookFunction {
    tool: Tool,
    url: String,
    client: Client,
}

impl WebhookFunction {
    pub fn new<U: Into<String>>(tool: Tool, url: U) -> Self {
        Self {
            tool,
            url: url.into(),
            client: Client::new(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| Client::new());
        self
    }
}

#[async_trait]
impl Function for WebhookFunction {
    fn tool(&self) -> &Tool {
        &self.tool
    }

    async fn call(&self, arguments: Value) -> FunctionResult<String> {
        let response = self
            .client
            .post(&self.url)
            .json(&arguments)
            .send()
            .await
            .map_err(|e| FunctionError::ExecutionError(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| FunctionError::ExecutionError(e.to_string()))?;

        if status.is_success() {
            Ok(body)
        } else if status.is_client_error() {
            Err(FunctionError::InvalidParameters(format!("{}: {}", status, body)))
        } else {
            Err(FunctionError::ExecutionError(format!("{}: {}", status, body)))
        }
    }
}
