//! Why sessions end.

use conclave_core::{AgentId, StateKey, StateView, Version};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TerminationReason {
    /// An agent returned `Terminate`.
    AgentTerminated { agent_id: AgentId, reason: String },
    /// The configured step budget was used up.
    StepBudgetExhausted { max_steps: u64 },
    /// Every agent was deactivated by fatal errors.
    AllAgentsInactive,
    /// The scheduling policy ran out of turns (sequential, `max_rounds`).
    ScheduleComplete,
    /// A termination predicate matched.
    Predicate { reason: String },
    /// The session's cancellation token fired.
    Cancelled,
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TerminationReason::AgentTerminated { agent_id, reason } => {
                write!(f, "agent '{agent_id}' terminated: {reason}")
            }
            TerminationReason::StepBudgetExhausted { max_steps } => {
                write!(f, "step budget of {max_steps} exhausted")
            }
            TerminationReason::AllAgentsInactive => f.write_str("all agents inactive"),
            TerminationReason::ScheduleComplete => f.write_str("schedule complete"),
            TerminationReason::Predicate { reason } => write!(f, "predicate matched: {reason}"),
            TerminationReason::Cancelled => f.write_str("cancelled"),
        }
    }
}

/// What a predicate is evaluated against, once per scheduling step.
#[derive(Debug, Clone, Copy)]
pub struct TerminationContext<'a> {
    pub state: &'a StateView,
    pub version: Version,
    /// Steps taken so far.
    pub step: u64,
}

/// Extra, state-driven end conditions.
///
/// Returns `Some(reason)` to end the session.
pub trait TerminationPredicate: Send + Sync {
    fn check(&self, context: &TerminationContext<'_>) -> Option<String>;
}

impl<F> TerminationPredicate for F
where
    F: Fn(&TerminationContext<'_>) -> Option<String> + Send + Sync,
{
    fn check(&self, context: &TerminationContext<'_>) -> Option<String> {
        self(context)
    }
}

/// Ends the session as soon as `key` exists in the state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateKeyPresent(pub StateKey);

impl TerminationPredicate for StateKeyPresent {
    fn check(&self, context: &TerminationContext<'_>) -> Option<String> {
        context
            .state
            .contains_key(self.0.as_str())
            .then(|| format!("state key '{}' is present", self.0))
    }
}

/// Ends the session when `key` holds exactly `value`.
#[derive(Debug, Clone, PartialEq)]
pub struct StateKeyEquals {
    pub key: StateKey,
    pub value: Value,
}

impl TerminationPredicate for StateKeyEquals {
    fn check(&self, context: &TerminationContext<'_>) -> Option<String> {
        (context.state.get(self.key.as_str()) == Some(&self.value))
            .then(|| format!("state key '{}' equals {}", self.key, self.value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn state(entries: &[(&str, Value)]) -> StateView {
        StateView::new(
            entries
                .iter()
                .map(|(k, v)| (StateKey::new(k).unwrap(), v.clone()))
                .collect::<BTreeMap<_, _>>(),
        )
    }

    #[test]
    fn key_present() {
        let predicate = StateKeyPresent(StateKey::new("blog_structure").unwrap());
        let empty = state(&[]);
        let ready = state(&[("blog_structure", json!("outline"))]);

        fn ctx(state: &StateView) -> TerminationContext<'_> {
            TerminationContext {
                state,
                version: Version::INITIAL,
                step: 0,
            }
        }
        assert_eq!(predicate.check(&ctx(&empty)), None);
        assert!(predicate.check(&ctx(&ready)).is_some());
    }

    #[test]
    fn key_equals_and_closures() {
        let view = state(&[("status", json!("approved"))]);
        let ctx = TerminationContext {
            state: &view,
            version: Version::new(3),
            step: 9,
        };

        let equals = StateKeyEquals {
            key: StateKey::new("status").unwrap(),
            value: json!("approved"),
        };
        assert!(equals.check(&ctx).is_some());

        let late = |ctx: &TerminationContext<'_>| (ctx.step > 5).then(|| "late".to_string());
        assert_eq!(late.check(&ctx), Some("late".to_string()));
    }
}
