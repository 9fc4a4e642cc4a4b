//! Error Types
//!
//! Domain errors shared by every conclave crate. Crate-specific failures
//! (bus, tools, session construction) live next to the code that raises
//! them; this module only holds what agents and the state store report.
//!
//! - `decision`: failures of an agent's decision step
//! - `state`: state store and commit failures

mod decision;
mod state;

pub use decision::{DecisionError, DecisionResult};
pub use state::{StateError, StateResult};
