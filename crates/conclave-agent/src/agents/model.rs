//! Model-backed agents.
//!
//! The model itself sits behind [`ModelClient`]; this module only renders
//! the instruction, packages the observation and turns the reply back into
//! an [`Action`].

use async_trait::async_trait;
use conclave_core::{
    Action, AgentId, DecisionError, DecisionResult, Message, MessagePayload, Observation,
    StateKey, StateView, ToolName,
};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::agent::Agent;

/// What the model is asked for one turn.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelRequest {
    pub agent_id: AgentId,
    /// Instruction with state placeholders filled in.
    pub instruction: String,
    /// New bus messages, one `sender: content` line each.
    pub history: Vec<String>,
    /// Tools the agent may ask to invoke.
    pub tools: Vec<ToolName>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    /// Rate limits, dropped connections and the like; worth retrying.
    #[error("model temporarily unavailable: {0}")]
    Transient(String),

    #[error("model request failed: {0}")]
    Fatal(String),
}

impl From<ModelError> for DecisionError {
    fn from(err: ModelError) -> Self {
        match err {
            ModelError::Transient(reason) => DecisionError::transient(reason),
            ModelError::Fatal(reason) => DecisionError::fatal(reason),
        }
    }
}

/// A text-completion backend.
#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn complete(&self, request: ModelRequest) -> Result<String, ModelError>;
}

/// Agent that delegates each decision to a [`ModelClient`].
///
/// The instruction may reference state with `{key}` (required: a missing
/// key fails the turn fatally) or `{key?}` (optional: renders empty).
/// A reply that parses as an action JSON object is taken as that action;
/// anything else is spoken as text.
pub struct ModelAgent<C> {
    client: C,
    instruction: String,
    tools: Vec<ToolName>,
}

impl<C: ModelClient> ModelAgent<C> {
    pub fn new(client: C, instruction: impl Into<String>) -> Self {
        Self {
            client,
            instruction: instruction.into(),
            tools: Vec::new(),
        }
    }

    pub fn with_tools(mut self, tools: impl IntoIterator<Item = ToolName>) -> Self {
        self.tools = tools.into_iter().collect();
        self
    }
}

#[async_trait]
impl<C: ModelClient> Agent for ModelAgent<C> {
    async fn decide(&mut self, observation: &Observation) -> DecisionResult<Action> {
        let request = ModelRequest {
            agent_id: observation.agent_id.clone(),
            instruction: render_instruction(&self.instruction, &observation.state)?,
            history: observation.messages.iter().map(history_line).collect(),
            tools: self.tools.clone(),
        };

        let reply = self.client.complete(request).await?;
        Ok(parse_reply(&reply))
    }

    fn kind(&self) -> &'static str {
        "model"
    }
}

fn history_line(message: &Message) -> String {
    let content = match &message.payload {
        MessagePayload::Text(text) => text.clone(),
        MessagePayload::Json(value) => value.to_string(),
        MessagePayload::ToolResult(result) => {
            serde_json::to_string(result).unwrap_or_else(|_| format!("{} result", result.tool))
        }
    };
    format!("{}: {}", message.sender, content)
}

/// Fill `{key}` and `{key?}` placeholders from `state`.
///
/// Braces around anything that is not a valid state key are left alone, so
/// JSON snippets in an instruction survive rendering.
pub fn render_instruction(template: &str, state: &StateView) -> DecisionResult<String> {
    let mut rendered = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        rendered.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let Some(close) = after.find('}') else {
            rest = &rest[open..];
            break;
        };

        let token = &after[..close];
        let (name, optional) = match token.strip_suffix('?') {
            Some(name) => (name, true),
            None => (token, false),
        };
        if name.trim() != name || StateKey::new(name).is_err() {
            rendered.push('{');
            rest = after;
            continue;
        }

        match state.get(name) {
            Some(Value::String(text)) => rendered.push_str(text),
            Some(value) => rendered.push_str(&value.to_string()),
            None if optional => {}
            None => {
                return Err(DecisionError::fatal(format!(
                    "instruction references missing state key '{name}'"
                )));
            }
        }
        rest = &after[close + 1..];
    }

    rendered.push_str(rest);
    Ok(rendered)
}

/// Interpret a model reply.
///
/// Code fences are stripped; a JSON action object becomes that action, an
/// empty reply yields, and any other text is spoken.
pub fn parse_reply(reply: &str) -> Action {
    let body = strip_fences(reply.trim());
    if body.is_empty() {
        return Action::Yield;
    }
    serde_json::from_str::<Action>(body).unwrap_or_else(|_| Action::speak(body))
}

fn strip_fences(text: &str) -> &str {
    let Some(inner) = text.strip_prefix("```") else {
        return text;
    };
    // Drop the language tag line, e.g. ```json
    let inner = inner.split_once('\n').map_or("", |(_, body)| body);
    inner.strip_suffix("```").unwrap_or(inner).trim()
}
