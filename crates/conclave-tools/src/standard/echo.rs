use async_trait::async_trait;
use conclave_core::ToolName;
use serde_json::Value;

use super::{StandardTool, standard_name};
use crate::schema::ToolSchema;
use crate::tool::{Tool, ToolOutput};

/// Returns its arguments unchanged.
#[derive(Debug, Clone)]
pub struct EchoTool {
    name: ToolName,
    schema: ToolSchema,
}

impl EchoTool {
    pub fn new() -> Self {
        Self {
            name: standard_name(StandardTool::Echo),
            schema: ToolSchema::any("Return the arguments unchanged"),
        }
    }
}

impl Default for EchoTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for EchoTool {
    fn name(&self) -> &ToolName {
        &self.name
    }

    fn schema(&self) -> &ToolSchema {
        &self.schema
    }

    async fn call(&self, arguments: Value) -> Result<ToolOutput, String> {
        Ok(ToolOutput::value(arguments))
    }
}
