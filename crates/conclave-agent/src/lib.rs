//! # Conclave Agent - Sessions, Runtime and Orchestration
//!
//! This crate runs multi-agent sessions on top of the Conclave message bus,
//! tool registry and state store.
//!
//! ## Features
//!
//! - **Agent Runtime**: turn timeouts, bounded retries with backoff, fatal deactivation
//! - **Orchestrator**: scheduling, staged effects, optimistic commits with re-decide on conflict
//! - **Scheduling Policies**: round-robin, priority, reactive and sequential
//! - **Transcripts**: every turn recorded, serializable and replayable
//! - **Built-in Agents**: scripted, model-backed, human-in-the-loop and replay
//!
//! ## Example: Two Agents Sharing State
//!
//! ```rust
//! use conclave_agent::{RosterEntry, SessionBuilder, SessionConfig, agents::ScriptedAgent};
//! use conclave_core::{Action, AgentId, StateKey};
//!
//! # tokio_test::block_on(async {
//! let config = SessionConfig::builder().max_steps(10).build().unwrap();
//!
//! let writer = RosterEntry::new(
//!     AgentId::parse("a-writer").unwrap(),
//!     ScriptedAgent::new([Action::speak("Ownership, explained")]),
//! )
//! .with_output_key(StateKey::new("draft").unwrap());
//!
//! let editor = RosterEntry::new(
//!     AgentId::parse("b-editor").unwrap(),
//!     ScriptedAgent::new([Action::terminate("looks good")]),
//! );
//!
//! let transcript = SessionBuilder::new()
//!     .config(config)
//!     .agents([writer, editor])
//!     .build()
//!     .unwrap()
//!     .run()
//!     .await
//!     .unwrap();
//!
//! assert_eq!(transcript.header.final_version.get(), 1);
//! assert_eq!(transcript.messages.len(), 1);
//! # });
//! ```

pub mod agent;
pub mod agents;
pub mod config;
pub mod error;
pub mod events;
pub mod orchestrator;
pub mod runtime;
pub mod scheduler;
pub mod session;
pub mod termination;
pub mod transcript;

pub use agent::{Agent, RosterEntry};
pub use config::{DispatchMode, SchedulingPolicy, SessionConfig, SessionConfigBuilder};
pub use error::{ConfigError, SessionError, SessionResult};
pub use events::{EventStream, SessionEvent};
pub use orchestrator::Phase;
pub use runtime::{AgentRuntime, Fault, FaultKind, RuntimePolicy, TurnOutcome};
pub use scheduler::{
    AgentView, PriorityScheduler, Reactive, RoundRobin, Schedule, Scheduler, Sequential,
};
pub use session::{Session, SessionBuilder, SessionMetadata};
pub use termination::{
    StateKeyEquals, StateKeyPresent, TerminationContext, TerminationPredicate, TerminationReason,
};
pub use transcript::{EffectResult, Transcript, TranscriptHeader, TranscriptRecord};
