//! # Conclave Core
//!
//! Core types for the Conclave multi-agent orchestration kernel: validated
//! identifiers, the versioned session state store, agent actions, bus
//! messages, tool results and the observation handed to an agent when it
//! decides.
//!
//! Higher-level crates build on these:
//!
//! - `conclave-mesh`: the append-only message bus
//! - `conclave-tools`: the tool registry
//! - `conclave-agent`: the agent runtime and orchestrator

pub mod action;
pub mod error;
pub mod identifiers;
pub mod in_memory;
pub mod message;
pub mod observation;
pub mod state;
pub mod tool_result;
pub mod validation;

pub use action::{Action, Utterance};
pub use error::{DecisionError, DecisionResult, StateError, StateResult};
pub use identifiers::{AgentId, Capabilities, CorrelationId, SessionId, ToolName};
pub use in_memory::InMemoryStateStore;
pub use message::{Message, MessageDraft, MessagePayload, Sender, SeqNo};
pub use observation::Observation;
pub use state::{
    CommitRecord, StateDelta, StateKey, StateOp, StateSnapshot, StateStore, StateView, Version,
};
pub use tool_result::{ToolFailure, ToolFailureKind, ToolOutcome, ToolResult};
pub use validation::{NameKind, ValidationError};
