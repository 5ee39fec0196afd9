//! Functions the agent can call mid-stream.
//!
//! The normalizer only sees [`FunctionExecutor`]; [`FunctionRegistry`] is the
//! usual implementation, dispatching by name to registered [`Function`]s.
pub mod webhook;

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use crate::errors::{FunctionError, FunctionResult};
use crate::models::tool::Tool;

pub use webhook::WebhookFunction;

/// A single callable function
#[async_trait]
pub trait Function: Send + Sync {
    /// The tool definition advertised to the vendor
    fn tool(&self) -> &Tool;

    /// Run the function with already-parsed arguments
    async fn call(&self, arguments: Value) -> FunctionResult<String>;
}

/// Executes a named function call. One call failing never affects another.
#[async_trait]
pub trait FunctionExecutor: Send + Sync {
    /// The tools to advertise to the vendor
    fn tools(&self) -> Vec<Tool>;

    async fn execute(&self, name: &str, arguments: Value) -> FunctionResult<String>;
}

#[derive(Default, Clone)]
pub struct FunctionRegistry {
    functions: HashMap<String, Arc<dyn Function>>,
    order: Vec<String>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a function, replacing any previous one with the same name
    pub fn register(&mut self, function: Arc<dyn Function>) {
        let name = function.tool().name.clone();
        if self.functions.insert(name.clone(), function).is_none() {
            self.order.push(name);
        }
    }

    pub fn with(mut self, function: Arc<dyn Function>) -> Self {
        self.register(function);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

#[async_trait]
impl FunctionExecutor for FunctionRegistry {
    fn tools(&self) -> Vec<Tool> {
        self.order
            .iter()
            .filter_map(|name| self.functions.get(name))
            .map(|function| function.tool().clone())
            .collect()
    }

    async fn execute(&self, name: &str, arguments: Value) -> FunctionResult<String> {
        let function = self
            .functions
            .get(name)
            .ok_or_else(|| FunctionError::NotFound(name.to_string()))?;
        function.call(arguments).await
    }
}
