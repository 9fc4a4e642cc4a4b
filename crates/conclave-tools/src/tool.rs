//! The tool abstraction.

use async_trait::async_trait;
use conclave_core::{StateDelta, ToolName};
use futures::future::BoxFuture;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;

use crate::schema::ToolSchema;

/// What a handler produced.
///
/// `delta` lets a tool propose state changes. The orchestrator commits it
/// together with the rest of the turn's effects; the tool never writes
/// state itself.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolOutput {
    pub value: Value,
    pub delta: StateDelta,
}

impl ToolOutput {
    pub fn value(value: impl Into<Value>) -> Self {
        Self {
            value: value.into(),
            delta: StateDelta::new(),
        }
    }

    pub fn with_delta(mut self, delta: StateDelta) -> Self {
        self.delta = delta;
        self
    }
}

/// A named, schema-described capability agents can invoke.
///
/// Handlers report failures as a plain message; the registry attaches the
/// tool name and turns it into a failed `ToolResult`.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &ToolName;

    fn schema(&self) -> &ToolSchema;

    async fn call(&self, arguments: Value) -> Result<ToolOutput, String>;
}

type Handler = Arc<dyn Fn(Value) -> BoxFuture<'static, Result<ToolOutput, String>> + Send + Sync>;

/// Adapts an async closure into a [`Tool`].
///
/// ```rust
/// use conclave_core::ToolName;
/// use conclave_tools::{FnTool, Tool, ToolOutput, ToolSchema};
/// use serde_json::json;
///
/// # tokio_test::block_on(async {
/// let shout = FnTool::new(
///     ToolName::parse("shout").unwrap(),
///     ToolSchema::any("Uppercase a string"),
///     |args| async move {
///         let text = args.as_str().ok_or("expected a string")?;
///         Ok(ToolOutput::value(text.to_uppercase()))
///     },
/// );
///
/// let output = shout.call(json!("hi")).await.unwrap();
/// assert_eq!(output.value, json!("HI"));
/// # });
/// ```
#[derive(Clone)]
pub struct FnTool {
    name: ToolName,
    schema: ToolSchema,
    handler: Handler,
}

impl FnTool {
    pub fn new<F, Fut>(name: ToolName, schema: ToolSchema, handler: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ToolOutput, String>> + Send + 'static,
    {
        Self {
            name,
            schema,
            handler: Arc::new(
                move |arguments| -> BoxFuture<'static, Result<ToolOutput, String>> {
                    Box::pin(handler(arguments))
                },
            ),
        }
    }
}

impl std::fmt::Debug for FnTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnTool")
            .field("name", &self.name)
            .field("schema", &self.schema)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Tool for FnTool {
    fn name(&self) -> &ToolName {
        &self.name
    }

    fn schema(&self) -> &ToolSchema {
        &self.schema
    }

    async fn call(&self, arguments: Value) -> Result<ToolOutput, String> {
        (self.handler)(arguments).await
    }
}
