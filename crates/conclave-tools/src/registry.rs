use async_trait::async_trait;
use conclave_core::{Capabilities, CorrelationId, StateDelta, ToolName, ToolResult};
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use crate::error::{RegistryResult, ToolError};
use crate::schema::ToolSchema;
use crate::standard::StandardTool;
use crate::tool::{FnTool, Tool, ToolOutput};

/// Outcome of [`ToolRegistry::invoke`]: the result to publish on the bus
/// and any state changes the tool proposed.
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    pub result: ToolResult,
    pub delta: StateDelta,
}

/// Trait for looking up and invoking tools on behalf of agents.
///
/// Every invocation is checked, in order, against the caller's
/// capabilities, the registry contents and the tool's schema before the
/// handler runs. Each call runs the handler at most once; retrying is the
/// caller's decision.
#[async_trait]
pub trait ToolRegistry: Send + Sync {
    /// Names of all registered tools, sorted.
    fn tool_names(&self) -> Vec<ToolName>;

    fn contains(&self, name: &ToolName) -> bool;

    fn schema(&self, name: &ToolName) -> Option<ToolSchema>;

    /// Invoke a tool with structured error handling.
    ///
    /// # Errors
    ///
    /// - `ToolError::Unauthorized` if `name` is not in `capabilities`
    /// - `ToolError::NotFound` if no such tool is registered
    /// - `ToolError::SchemaValidation` if `arguments` do not fit the schema
    /// - `ToolError::Execution` / `ToolError::Timeout` if the handler fails
    async fn try_invoke(
        &self,
        name: &ToolName,
        arguments: Value,
        capabilities: &Capabilities,
    ) -> RegistryResult<ToolOutput>;

    /// Invoke a tool, folding every failure into the returned `ToolResult`.
    async fn invoke(
        &self,
        name: &ToolName,
        arguments: Value,
        capabilities: &Capabilities,
        correlation_id: CorrelationId,
    ) -> Invocation {
        match self.try_invoke(name, arguments, capabilities).await {
            Ok(output) => Invocation {
                result: ToolResult::success(name.clone(), correlation_id, output.value),
                delta: output.delta,
            },
            Err(err) => {
                tracing::warn!(
                    tool = %name,
                    %correlation_id,
                    code = err.error_code(),
                    error = %err,
                    "tool invocation failed"
                );
                Invocation {
                    result: ToolResult::failure(name.clone(), correlation_id, err.to_failure()),
                    delta: StateDelta::new(),
                }
            }
        }
    }
}

/// In-memory tool registry for single-process sessions.
///
/// Tools are stored behind a shared lock, so clones of the registry see the
/// same tools and registration may happen after the registry is shared.
///
/// # Example
///
/// ```rust
/// use conclave_core::{Capabilities, CorrelationId, ToolName};
/// use conclave_tools::{InMemoryToolRegistry, ToolRegistry};
/// use serde_json::json;
///
/// # tokio_test::block_on(async {
/// let registry = InMemoryToolRegistry::with_standard_tools();
/// let echo = ToolName::parse("echo").unwrap();
/// let caps: Capabilities = [echo.clone()].into_iter().collect();
///
/// let invocation = registry
///     .invoke(&echo, json!({"text": "hi"}), &caps, CorrelationId::new())
///     .await;
/// assert_eq!(invocation.result.value(), Some(&json!({"text": "hi"})));
/// # });
/// ```
#[derive(Clone, Default)]
pub struct InMemoryToolRegistry {
    tools: Arc<RwLock<HashMap<ToolName, Arc<dyn Tool>>>>,
    timeout: Option<Duration>,
}

impl InMemoryToolRegistry {
    /// Create a new empty tool registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry holding every [`StandardTool`].
    pub fn with_standard_tools() -> Self {
        let tools: HashMap<ToolName, Arc<dyn Tool>> = StandardTool::ALL
            .iter()
            .map(|standard| {
                let tool = standard.build();
                (tool.name().clone(), tool)
            })
            .collect();
        Self {
            tools: Arc::new(RwLock::new(tools)),
            timeout: None,
        }
    }

    /// Bound every handler call by `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Add a tool using the builder pattern.
    ///
    /// # Errors
    ///
    /// Returns `ToolError::AlreadyRegistered` if the name is taken.
    pub fn with_tool(self, tool: Arc<dyn Tool>) -> RegistryResult<Self> {
        self.register_tool(tool)?;
        Ok(self)
    }

    /// Register a tool.
    ///
    /// # Errors
    ///
    /// Returns `ToolError::AlreadyRegistered` if the name is taken.
    pub fn register_tool(&self, tool: Arc<dyn Tool>) -> RegistryResult<()> {
        let mut tools = self
            .tools
            .write()
            .map_err(|_| ToolError::LockPoisoned("register"))?;

        let name = tool.name().clone();
        if tools.contains_key(&name) {
            return Err(ToolError::AlreadyRegistered { tool: name });
        }

        tracing::debug!(tool = %name, "tool registered");
        tools.insert(name, tool);
        Ok(())
    }

    /// Register an async closure as a tool.
    pub fn register<F, Fut>(
        &self,
        name: ToolName,
        schema: ToolSchema,
        handler: F,
    ) -> RegistryResult<()>
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ToolOutput, String>> + Send + 'static,
    {
        self.register_tool(Arc::new(FnTool::new(name, schema, handler)))
    }

    pub fn get_tool(&self, name: &ToolName) -> Option<Arc<dyn Tool>> {
        self.tools.read().ok()?.get(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.tools.read().map(|tools| tools.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for InMemoryToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryToolRegistry")
            .field("tools", &self.tool_names())
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[async_trait]
impl ToolRegistry for InMemoryToolRegistry {
    fn tool_names(&self) -> Vec<ToolName> {
        let mut names: Vec<ToolName> = match self.tools.read() {
            Ok(tools) => tools.keys().cloned().collect(),
            Err(_) => Vec::new(),
        };
        names.sort();
        names
    }

    fn contains(&self, name: &ToolName) -> bool {
        self.get_tool(name).is_some()
    }

    fn schema(&self, name: &ToolName) -> Option<ToolSchema> {
        self.get_tool(name).map(|tool| tool.schema().clone())
    }

    async fn try_invoke(
        &self,
        name: &ToolName,
        arguments: Value,
        capabilities: &Capabilities,
    ) -> RegistryResult<ToolOutput> {
        if !capabilities.allows(name) {
            return Err(ToolError::Unauthorized { tool: name.clone() });
        }

        let tool = self
            .get_tool(name)
            .ok_or_else(|| ToolError::NotFound { tool: name.clone() })?;

        tool.schema()
            .validate(&arguments)
            .map_err(|violations| ToolError::SchemaValidation {
                tool: name.clone(),
                violations,
            })?;

        tracing::debug!(tool = %name, "invoking tool");
        let call = tool.call(arguments);
        let outcome = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, call)
                .await
                .map_err(|_| ToolError::Timeout {
                    tool: name.clone(),
                    duration_ms: limit.as_millis() as u64,
                })?,
            None => call.await,
        };

        outcome.map_err(|message| ToolError::Execution {
            tool: name.clone(),
            message,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ParamType;
    use conclave_core::{StateKey, ToolFailureKind};
    use serde_json::json;

    fn name(n: &str) -> ToolName {
        ToolName::parse(n).unwrap()
    }

    fn caps(names: &[&str]) -> Capabilities {
        names.iter().map(|n| name(n)).collect()
    }

    fn registry() -> InMemoryToolRegistry {
        let registry = InMemoryToolRegistry::new();
        registry
            .register(
                name("add"),
                ToolSchema::new("add two integers")
                    .required("a", ParamType::Integer)
                    .required("b", ParamType::Integer),
                |args| async move {
                    let a = args["a"].as_i64().unwrap_or_default();
                    let b = args["b"].as_i64().unwrap_or_default();
                    Ok(ToolOutput::value(a + b))
                },
            )
            .unwrap();
        registry
            .register(name("explode"), ToolSchema::any("always fails"), |_| async {
                Err("boom".to_string())
            })
            .unwrap();
        registry
    }

    #[tokio::test]
    async fn registry_dispatches_to_correct_tool() {
        let registry = registry();
        let output = registry
            .try_invoke(&name("add"), json!({"a": 2, "b": 3}), &caps(&["add"]))
            .await
            .unwrap();
        assert_eq!(output.value, json!(5));
    }

    #[tokio::test]
    async fn unauthorized_is_checked_before_lookup() {
        let registry = registry();
        let err = registry
            .try_invoke(&name("add"), json!({"a": 1, "b": 1}), &caps(&["explode"]))
            .await
            .unwrap_err();
        assert_eq!(err, ToolError::Unauthorized { tool: name("add") });

        let err = registry
            .try_invoke(&name("missing"), Value::Null, &Capabilities::none())
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Unauthorized { .. }));
    }

    #[tokio::test]
    async fn failures_become_tool_results() {
        let registry = registry();
        let all = caps(&["add", "explode", "missing"]);

        let cases = [
            ("explode", json!({}), ToolFailureKind::Execution),
            ("add", json!({"a": "x"}), ToolFailureKind::SchemaValidation),
            ("missing", json!({}), ToolFailureKind::NotFound),
        ];

        for (tool, args, expected) in cases {
            let correlation_id = CorrelationId::new();
            let invocation = registry.invoke(&name(tool), args, &all, correlation_id).await;
            assert_eq!(invocation.result.failure_kind(), Some(expected), "{tool}");
            assert_eq!(invocation.result.correlation_id, correlation_id);
            assert!(invocation.delta.is_empty());
        }
    }

    #[tokio::test]
    async fn duplicate_registration_is_rejected() {
        let registry = registry();
        let err = registry
            .register(name("add"), ToolSchema::any("again"), |_| async {
                Ok(ToolOutput::default())
            })
            .unwrap_err();
        assert_eq!(err, ToolError::AlreadyRegistered { tool: name("add") });
        assert_eq!(registry.len(), 2);
    }

    #[tokio::test]
    async fn slow_tools_time_out() {
        let registry = InMemoryToolRegistry::new().with_timeout(Duration::from_millis(10));
        registry
            .register(name("sleepy"), ToolSchema::any("sleeps"), |_| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(ToolOutput::default())
            })
            .unwrap();

        let invocation = registry
            .invoke(
                &name("sleepy"),
                Value::Null,
                &caps(&["sleepy"]),
                CorrelationId::new(),
            )
            .await;
        assert_eq!(
            invocation.result.failure_kind(),
            Some(ToolFailureKind::Timeout)
        );
    }

    #[tokio::test]
    async fn tool_deltas_are_passed_through() {
        let registry = InMemoryToolRegistry::new();
        registry
            .register(name("mark"), ToolSchema::any("marks state"), |_| async {
                let key = StateKey::new("marked").map_err(|e| e.to_string())?;
                Ok(ToolOutput::value(true).with_delta(StateDelta::new().set(key, true)))
            })
            .unwrap();

        let invocation = registry
            .invoke(&name("mark"), Value::Null, &caps(&["mark"]), CorrelationId::new())
            .await;
        assert!(invocation.result.is_success());
        assert_eq!(invocation.delta.len(), 1);
    }

    #[test]
    fn tool_names_are_sorted() {
        let names = registry().tool_names();
        assert_eq!(names, vec![name("add"), name("explode")]);
    }
}
