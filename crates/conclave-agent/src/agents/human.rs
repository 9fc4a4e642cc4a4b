use async_trait::async_trait;
use conclave_core::{Action, DecisionError, DecisionResult, Observation};
use tokio::sync::{mpsc, oneshot};

use crate::agent::Agent;

/// One turn waiting for a human answer.
#[derive(Debug)]
pub struct HumanPrompt {
    pub observation: Observation,
    reply: oneshot::Sender<Action>,
}

impl HumanPrompt {
    /// Answer the prompt. Returns `false` if the turn was already abandoned
    /// (timed out or cancelled).
    pub fn respond(self, action: Action) -> bool {
        self.reply.send(action).is_ok()
    }
}

/// Agent whose decisions come from outside the process, e.g. a terminal or
/// a web form. Pair it with the [`HumanHandle`] from [`human_agent`].
///
/// A prompt dropped without an answer fails the attempt transiently; a
/// dropped handle fails it fatally. Slow answers are bounded by the turn
/// timeout like any other agent.
#[derive(Debug)]
pub struct HumanAgent {
    prompts: mpsc::Sender<HumanPrompt>,
}

/// The human side of a [`HumanAgent`].
#[derive(Debug)]
pub struct HumanHandle {
    prompts: mpsc::Receiver<HumanPrompt>,
}

impl HumanHandle {
    /// Wait for the next turn. `None` once the agent is gone.
    pub async fn next_prompt(&mut self) -> Option<HumanPrompt> {
        self.prompts.recv().await
    }
}

/// Create a connected agent and handle.
pub fn human_agent(buffer: usize) -> (HumanAgent, HumanHandle) {
    let (tx, rx) = mpsc::channel(buffer.max(1));
    (HumanAgent { prompts: tx }, HumanHandle { prompts: rx })
}

#[async_trait]
impl Agent for HumanAgent {
    async fn decide(&mut self, observation: &Observation) -> DecisionResult<Action> {
        let (reply, answer) = oneshot::channel();
        let prompt = HumanPrompt {
            observation: observation.clone(),
            reply,
        };
        self.prompts
            .send(prompt)
            .await
            .map_err(|_| DecisionError::fatal("human handle was dropped"))?;

        answer
            .await
            .map_err(|_| DecisionError::transient("prompt dismissed without an answer"))
    }

    fn kind(&self) -> &'static str {
        "human"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conclave_core::{AgentId, StateView, Version};

    fn observation() -> Observation {
        Observation {
            agent_id: AgentId::parse("reviewer").unwrap(),
            step: 3,
            state_version: Version::new(2),
            state: StateView::default(),
            messages: Vec::new(),
        }
    }

    #[tokio::test]
    async fn answers_flow_back_to_the_agent() {
        let (mut agent, mut handle) = human_agent(1);
        let responder = tokio::spawn(async move {
            let prompt = handle.next_prompt().await.unwrap();
            assert_eq!(prompt.observation.step, 3);
            prompt.respond(Action::speak("approved"))
        });

        let action = agent.decide(&observation()).await.unwrap();
        assert_eq!(action, Action::speak("approved"));
        assert!(responder.await.unwrap());
    }

    #[tokio::test]
    async fn dismissed_prompt_is_transient() {
        let (mut agent, mut handle) = human_agent(1);
        tokio::spawn(async move {
            let prompt = handle.next_prompt().await.unwrap();
            drop(prompt);
            // Keep the handle alive until the agent has seen the dismissal.
            handle.next_prompt().await
        });

        let err = agent.decide(&observation()).await.unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn dropped_handle_is_fatal() {
        let (mut agent, handle) = human_agent(1);
        drop(handle);
        let err = agent.decide(&observation()).await.unwrap_err();
        assert!(!err.is_retryable());
    }
}
