//! Built-in agent implementations.
//!
//! - [`ScriptedAgent`]: plays back a fixed list of actions and failures
//! - [`ModelAgent`]: renders an instruction and asks a [`ModelClient`]
//! - [`HumanAgent`]: forwards each turn to a person through a [`HumanHandle`]
//! - [`ReplayAgent`]: repeats actions recorded in a transcript

mod human;
mod model;
mod replay;
mod scripted;

pub use human::{HumanAgent, HumanHandle, HumanPrompt, human_agent};
pub use model::{ModelAgent, ModelClient, ModelError, ModelRequest, parse_reply, render_instruction};
pub use replay::ReplayAgent;
pub use scripted::{FailureMode, OnExhausted, ScriptStep, ScriptedAgent};
