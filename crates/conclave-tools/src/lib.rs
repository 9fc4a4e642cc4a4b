//! # Conclave Tools
//!
//! The tool registry agents invoke through the orchestrator.
//!
//! Tools are registered once per session under a validated [`ToolName`]
//! with a [`ToolSchema`]. Invocations are checked against the caller's
//! [`Capabilities`] and the schema before the handler runs, and every
//! failure is folded into a failed [`ToolResult`] rather than propagated.
//!
//! [`ToolName`]: conclave_core::ToolName
//! [`Capabilities`]: conclave_core::Capabilities
//! [`ToolResult`]: conclave_core::ToolResult

pub mod error;
pub mod registry;
pub mod schema;
pub mod standard;
pub mod tool;

pub use error::{RegistryResult, ToolError};
pub use registry::{InMemoryToolRegistry, Invocation, ToolRegistry};
pub use schema::{ParamSpec, ParamType, SchemaViolation, ToolSchema};
pub use standard::{EchoTool, StandardTool, StateRemoveTool, StateWriteTool};
pub use tool::{FnTool, Tool, ToolOutput};
