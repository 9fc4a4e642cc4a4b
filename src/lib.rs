//! # Conclave
//!
//! Conclave is a Rust-native orchestration kernel for multi-agent sessions.
//! Several agents take turns against one shared, versioned state, talk
//! through an append-only message bus and call capability-checked tools.
//! Every turn ends up in a replayable transcript.
//!
//! ## Core Components
//!
//! - **[MessageBus]**: append-only, totally ordered session log
//! - **[ToolRegistry]**: named tools behind per-agent capabilities
//! - **[Agent]**: one decision per turn, run with timeouts and retries
//! - **[Session]**: scheduling, staged effects and optimistic commits
//! - **[StateStore]**: versioned state, rejecting commits from stale versions
//!
//! ## Quick Start
//!
//! ```rust
//! use conclave::{Action, AgentId, RosterEntry, Session, StateKey, TerminationReason};
//! use conclave::agents::ScriptedAgent;
//!
//! # tokio_test::block_on(async {
//! let transcript = Session::builder()
//!     .agent(
//!         RosterEntry::new(
//!             AgentId::parse("a-writer").unwrap(),
//!             ScriptedAgent::new([Action::speak("hi"), Action::terminate("done")]),
//!         )
//!         .with_output_key(StateKey::new("draft").unwrap()),
//!     )
//!     .agent(RosterEntry::new(
//!         AgentId::parse("b-reader").unwrap(),
//!         ScriptedAgent::new([Action::Yield]),
//!     ))
//!     .build()
//!     .unwrap()
//!     .run()
//!     .await
//!     .unwrap();
//!
//! assert_eq!(transcript.messages.len(), 1);
//! assert!(matches!(
//!     transcript.termination(),
//!     TerminationReason::AgentTerminated { .. }
//! ));
//! # });
//! ```

// ============================================================================
// Module aliases for namespaced access
// ============================================================================

pub use conclave_agent as agent;
pub use conclave_agent::agents;
pub use conclave_core as core;
pub use conclave_mesh as mesh;
pub use conclave_tools as tools;

#[cfg(feature = "testing")]
pub use conclave_testing as testing;

// ============================================================================
// Identifiers, actions and messages
// ============================================================================

pub use conclave_core::{
    Action, AgentId, Capabilities, CorrelationId, NameKind, SessionId, ToolName, Utterance,
    ValidationError,
};
pub use conclave_core::{Message, MessageDraft, MessagePayload, Observation, Sender, SeqNo};

// ============================================================================
// Session state
// ============================================================================

pub use conclave_core::{
    CommitRecord, InMemoryStateStore, StateDelta, StateError, StateKey, StateSnapshot,
    StateStore, StateView, Version,
};

// ============================================================================
// Message bus
// ============================================================================

pub use conclave_mesh::{BusCursor, InMemoryBus, MeshError, MessageBus, MessageLog};

// ============================================================================
// Tools
// ============================================================================

pub use conclave_core::{ToolFailure, ToolFailureKind, ToolOutcome, ToolResult};
pub use conclave_tools::{
    FnTool, InMemoryToolRegistry, StandardTool, Tool, ToolError, ToolOutput, ToolRegistry,
    ToolSchema,
};

// ============================================================================
// Agents, sessions and transcripts
// ============================================================================

pub use conclave_agent::{
    Agent, DispatchMode, EffectResult, Fault, FaultKind, RosterEntry, SchedulingPolicy, Session,
    SessionBuilder, SessionConfig, SessionError, SessionEvent, SessionMetadata, StateKeyEquals,
    StateKeyPresent, TerminationPredicate, TerminationReason, Transcript, TranscriptRecord,
};
pub use conclave_core::{DecisionError, DecisionResult};
