use serde::Serialize;

use crate::identifiers::AgentId;
use crate::message::{Message, SeqNo};
use crate::state::{StateView, Version};
use crate::tool_result::ToolResult;

/// Everything an agent sees when it decides.
///
/// `messages` holds the bus entries appended since the agent's previous
/// turn, oldest first (possibly capped to the most recent ones by the
/// session's history limit).
#[derive(Debug, Clone, Serialize)]
pub struct Observation {
    pub agent_id: AgentId,
    /// Orchestrator step this turn belongs to, starting at 1.
    pub step: u64,
    pub state_version: Version,
    pub state: StateView,
    pub messages: Vec<Message>,
}

impl Observation {
    /// Sequence number of the newest message in the observation, if any.
    pub fn last_seq(&self) -> Option<SeqNo> {
        self.messages.last().map(|m| m.seq_no)
    }

    /// Tool results delivered since the agent last acted.
    pub fn tool_results(&self) -> impl Iterator<Item = &ToolResult> {
        self.messages
            .iter()
            .filter_map(|m| m.payload.as_tool_result())
    }

    /// Text of the most recent plain-text message, if any.
    pub fn latest_text(&self) -> Option<&str> {
        self.messages.iter().rev().find_map(|m| m.payload.as_text())
    }
}
