//! Session assembly.
//!
//! [`SessionBuilder`] validates a roster against the configuration and the
//! tool registry, wires up the state store and bus, and hands back a
//! [`Session`] that can be observed, cancelled and run to completion.

use conclave_core::{InMemoryStateStore, SessionId, StateKey, StateStore};
use conclave_mesh::{InMemoryBus, MessageBus};
use conclave_tools::{InMemoryToolRegistry, ToolRegistry};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::agent::RosterEntry;
use crate::config::{SessionConfig, SessionConfigBuilder};
use crate::error::{ConfigError, SessionError, SessionResult};
use crate::events::{EVENT_CAPACITY, EventStream, SessionEvent, event_stream};
use crate::orchestrator::{AgentSlot, Orchestrator, OrchestratorParts};
use crate::runtime::{AgentRuntime, RuntimePolicy};
use crate::scheduler::{Scheduler, scheduler_for};
use crate::termination::TerminationPredicate;
use crate::transcript::Transcript;

/// Who a session belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionMetadata {
    pub session_id: SessionId,
    pub app_name: String,
    pub user_id: String,
}

impl SessionMetadata {
    /// Metadata with a freshly generated session id.
    pub fn new(app_name: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            session_id: SessionId::generate(),
            app_name: app_name.into(),
            user_id: user_id.into(),
        }
    }

    pub fn with_session_id(mut self, session_id: SessionId) -> Self {
        self.session_id = session_id;
        self
    }
}

impl Default for SessionMetadata {
    fn default() -> Self {
        Self::new("conclave", "anonymous")
    }
}

/// Builder for [`Session`].
///
/// # Example
///
/// ```rust
/// use conclave_agent::{RosterEntry, SessionBuilder, agents::ScriptedAgent};
/// use conclave_core::{Action, AgentId};
///
/// # tokio_test::block_on(async {
/// let session = SessionBuilder::new()
///     .agent(RosterEntry::new(
///         AgentId::parse("greeter").unwrap(),
///         ScriptedAgent::new([Action::speak("hello"), Action::terminate("done")]),
///     ))
///     .build()
///     .unwrap();
///
/// let transcript = session.run().await.unwrap();
/// assert_eq!(transcript.records.len(), 2);
/// # });
/// ```
#[derive(Default)]
pub struct SessionBuilder {
    metadata: SessionMetadata,
    config: SessionConfig,
    roster: Vec<RosterEntry>,
    initial_state: BTreeMap<StateKey, Value>,
    store: Option<Arc<dyn StateStore>>,
    bus: Option<Arc<dyn MessageBus>>,
    registry: Option<Arc<dyn ToolRegistry>>,
    scheduler: Option<Box<dyn Scheduler>>,
    predicates: Vec<Box<dyn TerminationPredicate>>,
    cancel: Option<CancellationToken>,
}

impl SessionBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn metadata(mut self, metadata: SessionMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    pub fn agent(mut self, entry: RosterEntry) -> Self {
        self.roster.push(entry);
        self
    }

    pub fn agents(mut self, entries: impl IntoIterator<Item = RosterEntry>) -> Self {
        self.roster.extend(entries);
        self
    }

    /// Seed the default in-memory store. Conflicts with [`state_store`](Self::state_store).
    pub fn initial_state(mut self, entries: BTreeMap<StateKey, Value>) -> Self {
        self.initial_state.extend(entries);
        self
    }

    pub fn state_entry(mut self, key: StateKey, value: impl Into<Value>) -> Self {
        self.initial_state.insert(key, value.into());
        self
    }

    /// Use an existing store instead of a fresh in-memory one.
    pub fn state_store(mut self, store: Arc<dyn StateStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn bus(mut self, bus: Arc<dyn MessageBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Use a custom registry. Without one the session gets the standard
    /// tools, with the configured tool timeout.
    pub fn tools(mut self, registry: Arc<dyn ToolRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Override the scheduler chosen by `config.scheduling_policy`.
    pub fn scheduler(mut self, scheduler: Box<dyn Scheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    pub fn terminate_when(mut self, predicate: impl TerminationPredicate + 'static) -> Self {
        self.predicates.push(Box::new(predicate));
        self
    }

    /// Tie the session to an external cancellation token.
    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Validate everything and assemble the session.
    ///
    /// # Errors
    ///
    /// - `SessionError::Config` if the configuration is invalid
    /// - `SessionError::EmptyRoster` / `SessionError::DuplicateAgent` for a bad roster
    /// - `SessionError::UnknownTool` if a capability names an unregistered tool
    /// - `SessionError::InvalidInitialState` if a seeded state is combined with a custom store
    pub fn build(self) -> SessionResult<Session> {
        let config = SessionConfigBuilder::from_config(self.config).build()?;

        if self.roster.is_empty() {
            return Err(SessionError::EmptyRoster);
        }
        let mut roster = self.roster;
        roster.sort_by(|a, b| a.id.cmp(&b.id));
        let mut seen = BTreeSet::new();
        for entry in &roster {
            if !seen.insert(entry.id.clone()) {
                return Err(SessionError::DuplicateAgent(entry.id.clone()));
            }
        }

        let registry: Arc<dyn ToolRegistry> = match self.registry {
            Some(registry) => registry,
            None => {
                let mut registry = InMemoryToolRegistry::with_standard_tools();
                if let Some(timeout) = config.tool_timeout() {
                    registry = registry.with_timeout(timeout);
                }
                Arc::new(registry)
            }
        };
        for entry in &roster {
            if let Some(tool) = entry
                .capabilities
                .iter()
                .find(|tool| !registry.contains(tool))
            {
                return Err(SessionError::UnknownTool {
                    agent: entry.id.clone(),
                    tool: tool.clone(),
                });
            }
        }

        let store: Arc<dyn StateStore> = match self.store {
            Some(_) if !self.initial_state.is_empty() => {
                return Err(SessionError::InvalidInitialState(
                    "initial state cannot be combined with a custom state store".to_string(),
                ));
            }
            Some(store) => store,
            None => Arc::new(InMemoryStateStore::with_initial(self.initial_state)),
        };
        let bus: Arc<dyn MessageBus> = match self.bus {
            Some(bus) if bus.is_closed() => {
                return Err(SessionError::Config(ConfigError::ValidationError(
                    "message bus is already closed".to_string(),
                )));
            }
            Some(bus) => bus,
            None => Arc::new(InMemoryBus::new()),
        };

        let policy = RuntimePolicy::from(&config);
        let slots = roster
            .into_iter()
            .map(|entry| {
                AgentSlot::new(
                    AgentRuntime::new(entry.id, entry.agent, policy),
                    entry.capabilities,
                    entry.priority,
                    entry.output_key,
                )
            })
            .collect();

        let scheduler = self.scheduler.unwrap_or_else(|| scheduler_for(&config));
        let cancel = self.cancel.unwrap_or_default();
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        tracing::debug!(
            session_id = %self.metadata.session_id,
            tools = registry.tool_names().len(),
            "session built"
        );

        let orchestrator = Orchestrator::new(OrchestratorParts {
            metadata: self.metadata.clone(),
            config,
            slots,
            store: Arc::clone(&store),
            bus: Arc::clone(&bus),
            registry,
            scheduler,
            predicates: self.predicates,
            events: events.clone(),
            cancel: cancel.clone(),
        });

        Ok(Session {
            metadata: self.metadata,
            orchestrator,
            store,
            bus,
            events,
            cancel,
        })
    }
}

/// A fully assembled session, ready to run.
pub struct Session {
    metadata: SessionMetadata,
    orchestrator: Orchestrator,
    store: Arc<dyn StateStore>,
    bus: Arc<dyn MessageBus>,
    events: broadcast::Sender<SessionEvent>,
    cancel: CancellationToken,
}

impl Session {
    pub fn builder() -> SessionBuilder {
        SessionBuilder::new()
    }

    pub fn metadata(&self) -> &SessionMetadata {
        &self.metadata
    }

    pub fn state_store(&self) -> Arc<dyn StateStore> {
        Arc::clone(&self.store)
    }

    pub fn bus(&self) -> Arc<dyn MessageBus> {
        Arc::clone(&self.bus)
    }

    /// Token that cancels the session when triggered. In-flight turns are
    /// abandoned and recorded as cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Subscribe to live events. Subscribe before calling [`run`](Self::run)
    /// to see the whole session.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Live events as a stream that ends with the session.
    pub fn events(&self) -> EventStream {
        event_stream(self.events.subscribe())
    }

    /// Run to termination and return the transcript.
    ///
    /// Agent and tool failures never surface here; they are recorded in the
    /// transcript. Errors mean the store or bus itself failed.
    pub async fn run(self) -> SessionResult<Transcript> {
        // Only the orchestrator keeps a sender, so event streams end with it.
        drop(self.events);
        self.orchestrator.run().await
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("metadata", &self.metadata)
            .finish_non_exhaustive()
    }
}
