//! # Mock Tools for Testing
//!
//! Mock tools return canned responses keyed by their arguments and keep a
//! shared call history, so a clone held by the test sees every call the
//! session made.

use async_trait::async_trait;
use conclave_core::{StateDelta, ToolName};
use conclave_tools::{InMemoryToolRegistry, RegistryResult, Tool, ToolOutput, ToolSchema};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

type Response = Result<Value, String>;

/// A mock tool that returns predefined responses based on its arguments
#[derive(Debug, Clone)]
pub struct MockTool {
    name: ToolName,
    schema: ToolSchema,
    responses: HashMap<String, Response>,
    default_response: Option<Response>,
    delta: Option<StateDelta>,
    delay: Option<Duration>,
    calls: Arc<Mutex<Vec<Value>>>,
}

impl MockTool {
    /// Create a new mock tool that accepts any arguments
    pub fn new(name: ToolName) -> Self {
        Self {
            name,
            schema: ToolSchema::any("Mock tool"),
            responses: HashMap::new(),
            default_response: None,
            delta: None,
            delay: None,
            calls: Arc::default(),
        }
    }

    /// Validate arguments against `schema` before the mock sees them
    pub fn with_schema(mut self, schema: ToolSchema) -> Self {
        self.schema = schema;
        self
    }

    /// Respond with `response` when called with exactly `arguments`
    pub fn with_response(mut self, arguments: Value, response: impl Into<Value>) -> Self {
        self.responses
            .insert(arguments.to_string(), Ok(response.into()));
        self
    }

    /// Fail with `error` when called with exactly `arguments`
    pub fn with_failure(mut self, arguments: Value, error: impl Into<String>) -> Self {
        self.responses
            .insert(arguments.to_string(), Err(error.into()));
        self
    }

    /// Set a default response for any unmatched arguments
    pub fn with_default_response(mut self, response: impl Into<Value>) -> Self {
        self.default_response = Some(Ok(response.into()));
        self
    }

    /// Set a default failure for any unmatched arguments
    pub fn with_default_failure(mut self, error: impl Into<String>) -> Self {
        self.default_response = Some(Err(error.into()));
        self
    }

    /// Propose `delta` with every successful call
    pub fn with_delta(mut self, delta: StateDelta) -> Self {
        self.delta = Some(delta);
        self
    }

    /// Sleep before answering, e.g. to trip a registry timeout
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Get the number of times this tool has been called
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Get the arguments of every call, oldest first
    pub fn call_history(&self) -> Vec<Value> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Check if the tool was called with specific arguments
    pub fn was_called_with(&self, arguments: &Value) -> bool {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(arguments)
    }

    /// Reset call history
    pub fn reset(&self) {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    fn respond(&self, arguments: &Value) -> Response {
        self.responses
            .get(&arguments.to_string())
            .or(self.default_response.as_ref())
            .cloned()
            .unwrap_or_else(|| Ok(json!({ "mock": self.name.as_str(), "arguments": arguments })))
    }
}

#[async_trait]
impl Tool for MockTool {
    fn name(&self) -> &ToolName {
        &self.name
    }

    fn schema(&self) -> &ToolSchema {
        &self.schema
    }

    async fn call(&self, arguments: Value) -> Result<ToolOutput, String> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(arguments.clone());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let value = self.respond(&arguments)?;
        let output = ToolOutput::value(value);
        Ok(match &self.delta {
            Some(delta) => output.with_delta(delta.clone()),
            None => output,
        })
    }
}

/// A collection of mock tools that builds into a real registry
#[derive(Debug, Clone, Default)]
pub struct MockToolRegistry {
    tools: Vec<MockTool>,
}

impl MockToolRegistry {
    /// Create a new empty mock tool registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a mock tool to the registry
    pub fn with_tool(mut self, tool: MockTool) -> Self {
        self.tools.retain(|existing| existing.name != tool.name);
        self.tools.push(tool);
        self
    }

    /// Add a tool named `name` that always succeeds with `"success"`
    pub fn with_success_tool(self, name: ToolName) -> Self {
        self.with_tool(MockTool::new(name).with_default_response("success"))
    }

    /// Add a tool named `name` that always fails
    pub fn with_failure_tool(self, name: ToolName) -> Self {
        self.with_tool(MockTool::new(name).with_default_failure("mock failure"))
    }

    /// Get a handle to a mock tool for inspection
    ///
    /// The handle shares call history with the registered tool.
    pub fn get_mock_tool(&self, name: &str) -> Option<MockTool> {
        self.tools
            .iter()
            .find(|tool| tool.name.as_str() == name)
            .cloned()
    }

    /// Reset all mock tools' call tracking
    pub fn reset_all(&self) {
        for tool in &self.tools {
            tool.reset();
        }
    }

    /// Register every mock in a fresh [`InMemoryToolRegistry`]
    pub fn build(&self) -> RegistryResult<InMemoryToolRegistry> {
        let registry = InMemoryToolRegistry::new();
        for tool in &self.tools {
            registry.register_tool(Arc::new(tool.clone()))?;
        }
        Ok(registry)
    }
}
