use async_trait::async_trait;
use conclave_core::{Action, DecisionError, DecisionResult, Observation};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::agent::Agent;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureMode {
    Transient,
    Fatal,
}

/// One entry of a script: an action, or a decision failure to raise.
///
/// In YAML a step is either an action (`{action: speak, content: hi}`) or a
/// failure (`{fail: transient, reason: flaky}`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScriptStep {
    Act(Action),
    Fail {
        fail: FailureMode,
        #[serde(default)]
        reason: String,
    },
}

impl ScriptStep {
    pub fn transient(reason: impl Into<String>) -> Self {
        ScriptStep::Fail {
            fail: FailureMode::Transient,
            reason: reason.into(),
        }
    }

    pub fn fatal(reason: impl Into<String>) -> Self {
        ScriptStep::Fail {
            fail: FailureMode::Fatal,
            reason: reason.into(),
        }
    }
}

impl From<Action> for ScriptStep {
    fn from(action: Action) -> Self {
        ScriptStep::Act(action)
    }
}

/// What a scripted agent does once its script runs out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnExhausted {
    #[default]
    Yield,
    Terminate,
}

/// Plays back a fixed script, one step per `decide` call.
///
/// Failure steps consume a call too, so `[transient, speak]` fails the first
/// attempt and succeeds on the retry.
#[derive(Debug, Clone, Default)]
pub struct ScriptedAgent {
    steps: VecDeque<ScriptStep>,
    on_exhausted: OnExhausted,
}

impl ScriptedAgent {
    pub fn new<I, S>(steps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<ScriptStep>,
    {
        Self {
            steps: steps.into_iter().map(Into::into).collect(),
            on_exhausted: OnExhausted::default(),
        }
    }

    pub fn on_exhausted(mut self, behavior: OnExhausted) -> Self {
        self.on_exhausted = behavior;
        self
    }

    pub fn remaining(&self) -> usize {
        self.steps.len()
    }
}

#[async_trait]
impl Agent for ScriptedAgent {
    async fn decide(&mut self, _observation: &Observation) -> DecisionResult<Action> {
        match self.steps.pop_front() {
            Some(ScriptStep::Act(action)) => Ok(action),
            Some(ScriptStep::Fail {
                fail: FailureMode::Transient,
                reason,
            }) => Err(DecisionError::transient(reason)),
            Some(ScriptStep::Fail {
                fail: FailureMode::Fatal,
                reason,
            }) => Err(DecisionError::fatal(reason)),
            None => Ok(match self.on_exhausted {
                OnExhausted::Yield => Action::Yield,
                OnExhausted::Terminate => Action::terminate("script exhausted"),
            }),
        }
    }

    fn kind(&self) -> &'static str {
        "scripted"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conclave_core::{AgentId, StateView, Version};

    fn observation() -> Observation {
        Observation {
            agent_id: AgentId::parse("scripted").unwrap(),
            step: 1,
            state_version: Version::INITIAL,
            state: StateView::default(),
            messages: Vec::new(),
        }
    }

    #[tokio::test]
    async fn plays_steps_in_order_then_yields() {
        let mut agent = ScriptedAgent::new([
            ScriptStep::from(Action::speak("one")),
            ScriptStep::transient("flaky"),
            ScriptStep::from(Action::speak("two")),
        ]);
        let obs = observation();

        assert_eq!(agent.decide(&obs).await.unwrap(), Action::speak("one"));
        assert!(agent.decide(&obs).await.unwrap_err().is_retryable());
        assert_eq!(agent.decide(&obs).await.unwrap(), Action::speak("two"));
        assert_eq!(agent.decide(&obs).await.unwrap(), Action::Yield);
    }

    #[tokio::test]
    async fn can_terminate_when_exhausted() {
        let mut agent = ScriptedAgent::new(Vec::<Action>::new()).on_exhausted(OnExhausted::Terminate);
        assert!(agent.decide(&observation()).await.unwrap().is_terminate());
    }

    #[test]
    fn steps_parse_from_yaml() {
        let steps: Vec<ScriptStep> = serde_yaml::from_str(
            r#"
- action: speak
  content: hello
- fail: fatal
  reason: broken
- action: invoke
  tool: echo
  arguments: {text: hi}
"#,
        )
        .unwrap();

        assert_eq!(steps[0], ScriptStep::Act(Action::speak("hello")));
        assert_eq!(steps[1], ScriptStep::fatal("broken"));
        assert!(matches!(&steps[2], ScriptStep::Act(Action::Invoke { tool, .. }) if tool.as_str() == "echo"));
    }
}
