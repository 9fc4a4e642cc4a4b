//! # Conclave Testing Framework
//!
//! Utilities for testing agents, tools and whole sessions.
//!
//! ## Components
//!
//! - **Mock Tools**: tools with canned responses and call tracking
//! - **Mock Agents**: agents that fail, stall or record what they observe
//! - **Contended Store**: a state store that loses commit races on purpose
//! - **Session Harness**: run a session and check expectations against the transcript
//!
//! ## Usage
//!
//! ```rust
//! use conclave_agent::{RosterEntry, TerminationReason, agents::ScriptedAgent};
//! use conclave_core::{Action, AgentId, Version};
//! use conclave_testing::{Expectation, SessionHarness};
//!
//! # tokio_test::block_on(async {
//! let result = SessionHarness::new("single_speaker")
//!     .agent(RosterEntry::new(
//!         AgentId::parse("speaker").unwrap(),
//!         ScriptedAgent::new([Action::speak("hi"), Action::terminate("done")]),
//!     ))
//!     .expect(Expectation::MessageCount(1))
//!     .expect(Expectation::FinalVersion(Version::INITIAL))
//!     .run()
//!     .await;
//!
//! assert!(result.is_success(), "{result}");
//! # });
//! ```

/// Contended state store for commit-conflict testing
pub mod contended_store;
/// Agents with predictable failure behavior
pub mod mock_agents;
/// Mock tools for predictable testing
pub mod mock_tools;
/// Session test harness with transcript expectations
pub mod test_harness;

pub use contended_store::ContendedStateStore;
pub use mock_agents::{FailingAgent, FlakyAgent, RecordingAgent, SlowAgent};
pub use mock_tools::{MockTool, MockToolRegistry};
pub use test_harness::{AssertionResult, Expectation, SessionHarness, TestResult};
