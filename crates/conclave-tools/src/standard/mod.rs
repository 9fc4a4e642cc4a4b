//! # Standard Tool Library
//!
//! Tools every session can grant without extra setup.
//!
//! - `echo`: returns its arguments unchanged
//! - `state_write`: proposes setting a state key
//! - `state_remove`: proposes removing a state key
//!
//! The state tools only *propose* a delta; it is committed by the
//! orchestrator as part of the invoking turn.

mod echo;
mod state;

pub use echo::EchoTool;
pub use state::{StateRemoveTool, StateWriteTool};

use conclave_core::ToolName;
use std::sync::Arc;

use crate::tool::Tool;

/// Built-in tools, addressable by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StandardTool {
    Echo,
    StateWrite,
    StateRemove,
}

impl StandardTool {
    pub const ALL: [StandardTool; 3] = [
        StandardTool::Echo,
        StandardTool::StateWrite,
        StandardTool::StateRemove,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            StandardTool::Echo => "echo",
            StandardTool::StateWrite => "state_write",
            StandardTool::StateRemove => "state_remove",
        }
    }

    /// Try to parse a tool name string into a StandardTool.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "echo" => Some(StandardTool::Echo),
            "state_write" => Some(StandardTool::StateWrite),
            "state_remove" => Some(StandardTool::StateRemove),
            _ => None,
        }
    }

    pub fn build(&self) -> Arc<dyn Tool> {
        match self {
            StandardTool::Echo => Arc::new(EchoTool::new()),
            StandardTool::StateWrite => Arc::new(StateWriteTool::new()),
            StandardTool::StateRemove => Arc::new(StateRemoveTool::new()),
        }
    }
}

/// Standard tool names are compile-time constants known to be valid.
pub(crate) fn standard_name(tool: StandardTool) -> ToolName {
    match ToolName::parse(tool.name()) {
        Ok(name) => name,
        Err(e) => unreachable!("standard tool name '{}' is invalid: {e}", tool.name()),
    }
}
