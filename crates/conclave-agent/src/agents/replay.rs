use async_trait::async_trait;
use conclave_core::{Action, DecisionError, DecisionResult, Observation};
use std::collections::VecDeque;

use crate::agent::Agent;

/// Replays recorded decisions verbatim, then yields forever.
///
/// A recorded decision is either the action the agent took or the fatal
/// error that deactivated it, so a replayed agent leaves the roster at the
/// same turn it did originally.
#[derive(Debug, Clone, Default)]
pub struct ReplayAgent {
    decisions: VecDeque<DecisionResult<Action>>,
}

impl ReplayAgent {
    pub fn new(actions: impl IntoIterator<Item = Action>) -> Self {
        Self::from_decisions(actions.into_iter().map(Ok))
    }

    pub fn from_decisions(decisions: impl IntoIterator<Item = DecisionResult<Action>>) -> Self {
        Self {
            decisions: decisions.into_iter().collect(),
        }
    }

    pub fn remaining(&self) -> usize {
        self.decisions.len()
    }
}

#[async_trait]
impl Agent for ReplayAgent {
    async fn decide(&mut self, _observation: &Observation) -> DecisionResult<Action> {
        self.decisions.pop_front().unwrap_or(Ok(Action::Yield))
    }

    fn kind(&self) -> &'static str {
        "replay"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conclave_core::{AgentId, StateView, Version};

    fn observation() -> Observation {
        Observation {
            agent_id: AgentId::parse("replayer").unwrap(),
            step: 1,
            state_version: Version::INITIAL,
            state: StateView::default(),
            messages: Vec::new(),
        }
    }

    #[tokio::test]
    async fn replays_fatal_errors_then_yields() {
        let mut agent = ReplayAgent::from_decisions([
            Ok(Action::speak("hello")),
            Err(DecisionError::fatal("credentials revoked")),
        ]);
        let observation = observation();

        assert_eq!(agent.decide(&observation).await, Ok(Action::speak("hello")));
        assert_eq!(
            agent.decide(&observation).await,
            Err(DecisionError::fatal("credentials revoked"))
        );
        assert_eq!(agent.remaining(), 0);
        assert_eq!(agent.decide(&observation).await, Ok(Action::Yield));
    }
}
