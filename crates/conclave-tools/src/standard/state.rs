use async_trait::async_trait;
use conclave_core::{StateDelta, StateKey, ToolName};
use serde_json::{Value, json};

use super::{StandardTool, standard_name};
use crate::schema::{ParamType, ToolSchema};
use crate::tool::{Tool, ToolOutput};

fn key_argument(arguments: &Value) -> Result<StateKey, String> {
    let raw = arguments
        .get("key")
        .and_then(Value::as_str)
        .ok_or_else(|| "missing string argument 'key'".to_string())?;
    StateKey::new(raw).map_err(|e| format!("invalid key '{raw}': {e}"))
}

/// Proposes `key = value`.
///
/// Arguments: `{"key": string, "value": any}`.
#[derive(Debug, Clone)]
pub struct StateWriteTool {
    name: ToolName,
    schema: ToolSchema,
}

impl StateWriteTool {
    pub fn new() -> Self {
        Self {
            name: standard_name(StandardTool::StateWrite),
            schema: ToolSchema::new("Set a key in the session state")
                .required("key", ParamType::String)
                .required("value", ParamType::Any),
        }
    }
}

impl Default for StateWriteTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for StateWriteTool {
    fn name(&self) -> &ToolName {
        &self.name
    }

    fn schema(&self) -> &ToolSchema {
        &self.schema
    }

    async fn call(&self, arguments: Value) -> Result<ToolOutput, String> {
        let key = key_argument(&arguments)?;
        let value = arguments.get("value").cloned().unwrap_or(Value::Null);

        Ok(ToolOutput::value(json!({"written": key.as_str()}))
            .with_delta(StateDelta::new().set(key, value)))
    }
}

/// Proposes removing `key`.
///
/// Arguments: `{"key": string}`.
#[derive(Debug, Clone)]
pub struct StateRemoveTool {
    name: ToolName,
    schema: ToolSchema,
}

impl StateRemoveTool {
    pub fn new() -> Self {
        Self {
            name: standard_name(StandardTool::StateRemove),
            schema: ToolSchema::new("Remove a key from the session state")
                .required("key", ParamType::String),
        }
    }
}

impl Default for StateRemoveTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for StateRemoveTool {
    fn name(&self) -> &ToolName {
        &self.name
    }

    fn schema(&self) -> &ToolSchema {
        &self.schema
    }

    async fn call(&self, arguments: Value) -> Result<ToolOutput, String> {
        let key = key_argument(&arguments)?;

        Ok(ToolOutput::value(json!({"removed": key.as_str()}))
            .with_delta(StateDelta::new().remove(key)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conclave_core::StateOp;

    #[tokio::test]
    async fn write_proposes_a_set() {
        let output = StateWriteTool::new()
            .call(json!({"key": "blog.title", "value": "Ownership"}))
            .await
            .unwrap();

        assert_eq!(output.value, json!({"written": "blog.title"}));
        assert_eq!(
            output.delta.ops(),
            &[StateOp::Set {
                key: StateKey::new("blog.title").unwrap(),
                value: json!("Ownership")
            }]
        );
    }

    #[tokio::test]
    async fn remove_proposes_a_remove() {
        let output = StateRemoveTool::new()
            .call(json!({"key": "draft"}))
            .await
            .unwrap();
        assert!(matches!(output.delta.ops(), [StateOp::Remove { .. }]));
    }

    #[tokio::test]
    async fn invalid_keys_fail_the_call() {
        let err = StateWriteTool::new()
            .call(json!({"key": "../escape", "value": 1}))
            .await
            .unwrap_err();
        assert!(err.contains("invalid key"));
    }
}
