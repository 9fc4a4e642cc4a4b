//! Bus messages.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::identifiers::{AgentId, ToolName};
use crate::tool_result::ToolResult;

/// Position of a message in the session log.
///
/// Appends are numbered from 1; [`SeqNo::ZERO`] means "nothing seen yet" and
/// is the natural starting cursor for `read_since`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct SeqNo(u64);

impl SeqNo {
    pub const ZERO: SeqNo = SeqNo(0);

    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn get(self) -> u64 {
        self.0
    }

    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for SeqNo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Who a message is attributed to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Sender {
    Agent(AgentId),
    Tool(ToolName),
    System,
}

impl fmt::Display for Sender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sender::Agent(id) => write!(f, "agent:{id}"),
            Sender::Tool(name) => write!(f, "tool:{name}"),
            Sender::System => f.write_str("system"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "body", rename_all = "snake_case")]
pub enum MessagePayload {
    Text(String),
    Json(Value),
    ToolResult(ToolResult),
}

impl MessagePayload {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            MessagePayload::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_tool_result(&self) -> Option<&ToolResult> {
        match self {
            MessagePayload::ToolResult(result) => Some(result),
            _ => None,
        }
    }
}

/// A message waiting to be appended. The bus assigns the sequence number
/// and timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageDraft {
    pub sender: Sender,
    pub payload: MessagePayload,
}

impl MessageDraft {
    pub fn new(sender: Sender, payload: MessagePayload) -> Self {
        Self { sender, payload }
    }

    pub fn text(sender: Sender, text: impl Into<String>) -> Self {
        Self::new(sender, MessagePayload::Text(text.into()))
    }

    pub fn tool_result(result: ToolResult) -> Self {
        Self::new(
            Sender::Tool(result.tool.clone()),
            MessagePayload::ToolResult(result),
        )
    }

    /// Seal the draft with its log position.
    pub fn seal(self, seq_no: SeqNo, timestamp: DateTime<Utc>) -> Message {
        Message {
            seq_no,
            sender: self.sender,
            payload: self.payload,
            timestamp,
        }
    }
}

/// An appended, immutable bus entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub seq_no: SeqNo,
    pub sender: Sender,
    pub payload: MessagePayload,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn is_from_agent(&self, agent: &AgentId) -> bool {
        matches!(&self.sender, Sender::Agent(id) if id == agent)
    }
}
