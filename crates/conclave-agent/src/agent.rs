//! The agent decision interface and roster entries.

use async_trait::async_trait;
use conclave_core::{Action, AgentId, Capabilities, DecisionResult, Observation, StateKey};

/// Anything that can take a turn in a session.
///
/// `decide` is called once per turn (more if it fails transiently or its
/// commit conflicts) and must return exactly one [`Action`]. Agents only see
/// the observation; every effect is applied by the orchestrator.
///
/// # Example
///
/// ```rust
/// use async_trait::async_trait;
/// use conclave_agent::Agent;
/// use conclave_core::{Action, DecisionResult, Observation};
///
/// struct Greeter;
///
/// #[async_trait]
/// impl Agent for Greeter {
///     async fn decide(&mut self, observation: &Observation) -> DecisionResult<Action> {
///         if observation.messages.is_empty() {
///             Ok(Action::speak("hello"))
///         } else {
///             Ok(Action::terminate("greeted"))
///         }
///     }
/// }
/// ```
#[async_trait]
pub trait Agent: Send {
    async fn decide(&mut self, observation: &Observation) -> DecisionResult<Action>;

    /// Short label for logs.
    fn kind(&self) -> &'static str {
        "custom"
    }
}

#[async_trait]
impl<A: Agent + ?Sized> Agent for Box<A> {
    async fn decide(&mut self, observation: &Observation) -> DecisionResult<Action> {
        (**self).decide(observation).await
    }

    fn kind(&self) -> &'static str {
        (**self).kind()
    }
}

/// One agent in a session roster.
pub struct RosterEntry {
    pub id: AgentId,
    pub agent: Box<dyn Agent>,
    pub capabilities: Capabilities,
    /// Used by the priority policy; higher runs first.
    pub priority: i32,
    /// When set, everything the agent speaks is also written to this key.
    pub output_key: Option<StateKey>,
}

impl RosterEntry {
    pub fn new(id: AgentId, agent: impl Agent + 'static) -> Self {
        Self {
            id,
            agent: Box::new(agent),
            capabilities: Capabilities::none(),
            priority: 0,
            output_key: None,
        }
    }

    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_output_key(mut self, key: StateKey) -> Self {
        self.output_key = Some(key);
        self
    }
}

impl std::fmt::Debug for RosterEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RosterEntry")
            .field("id", &self.id)
            .field("kind", &self.agent.kind())
            .field("capabilities", &self.capabilities)
            .field("priority", &self.priority)
            .field("output_key", &self.output_key)
            .finish()
    }
}
