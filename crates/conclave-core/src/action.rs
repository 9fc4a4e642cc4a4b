//! Agent actions.
//!
//! Every turn produces exactly one [`Action`]. Agents never touch the bus,
//! the registry or the state store themselves; the orchestrator turns the
//! action into effects.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::identifiers::ToolName;
use crate::message::MessagePayload;

/// Content of a `Speak` action.
///
/// Serialized untagged: a JSON string is text, anything else is structured.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Utterance {
    Text(String),
    Json(Value),
}

impl Utterance {
    /// The value written under an agent's output key.
    pub fn to_state_value(&self) -> Value {
        match self {
            Utterance::Text(text) => Value::String(text.clone()),
            Utterance::Json(value) => value.clone(),
        }
    }

    pub fn into_payload(self) -> MessagePayload {
        match self {
            Utterance::Text(text) => MessagePayload::Text(text),
            Utterance::Json(value) => MessagePayload::Json(value),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Utterance::Text(text) => Some(text),
            Utterance::Json(_) => None,
        }
    }
}

impl From<&str> for Utterance {
    fn from(text: &str) -> Self {
        Utterance::Text(text.to_string())
    }
}

impl From<String> for Utterance {
    fn from(text: String) -> Self {
        Utterance::Text(text)
    }
}

/// What an agent decided to do this turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    /// Append a message to the bus.
    Speak { content: Utterance },
    /// Call a registered tool.
    Invoke {
        tool: ToolName,
        #[serde(default)]
        arguments: Value,
    },
    /// Do nothing this turn.
    Yield,
    /// End the session.
    Terminate { reason: String },
}

impl Action {
    pub fn speak(content: impl Into<Utterance>) -> Self {
        Action::Speak {
            content: content.into(),
        }
    }

    pub fn invoke(tool: ToolName, arguments: Value) -> Self {
        Action::Invoke { tool, arguments }
    }

    pub fn terminate(reason: impl Into<String>) -> Self {
        Action::Terminate {
            reason: reason.into(),
        }
    }

    /// Short name of the variant, used as a structured log field.
    pub fn kind(&self) -> &'static str {
        match self {
            Action::Speak { .. } => "speak",
            Action::Invoke { .. } => "invoke",
            Action::Yield => "yield",
            Action::Terminate { .. } => "terminate",
        }
    }

    pub fn is_terminate(&self) -> bool {
        matches!(self, Action::Terminate { .. })
    }

    pub fn is_yield(&self) -> bool {
        matches!(self, Action::Yield)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Speak { content } => match content {
                Utterance::Text(text) => write!(f, "speak({text:?})"),
                Utterance::Json(value) => write!(f, "speak({value})"),
            },
            Action::Invoke { tool, .. } => write!(f, "invoke({tool})"),
            Action::Yield => f.write_str("yield"),
            Action::Terminate { reason } => write!(f, "terminate({reason:?})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn actions_use_a_flat_tagged_encoding() {
        let invoke = Action::invoke(ToolName::parse("echo").unwrap(), json!({"text": "hi"}));
        assert_eq!(
            serde_json::to_value(&invoke).unwrap(),
            json!({"action": "invoke", "tool": "echo", "arguments": {"text": "hi"}})
        );

        let speak: Action =
            serde_json::from_value(json!({"action": "speak", "content": "hello"})).unwrap();
        assert_eq!(speak, Action::speak("hello"));

        let structured: Action =
            serde_json::from_value(json!({"action": "speak", "content": {"score": 7}})).unwrap();
        assert!(matches!(
            structured,
            Action::Speak {
                content: Utterance::Json(_)
            }
        ));
    }

    #[test]
    fn invoke_arguments_default_to_null() {
        let action: Action =
            serde_json::from_value(json!({"action": "invoke", "tool": "echo"})).unwrap();
        assert_eq!(
            action,
            Action::invoke(ToolName::parse("echo").unwrap(), Value::Null)
        );
    }

    #[test]
    fn utterance_state_value() {
        assert_eq!(Utterance::from("draft").to_state_value(), json!("draft"));
        assert_eq!(
            Utterance::Json(json!({"a": 1})).to_state_value(),
            json!({"a": 1})
        );
    }
}
