//! # Agent Runtime
//!
//! Wraps an agent's decision step so that a turn always produces an action.
//! Timeouts, exhausted retries, fatal errors and cancellation all degrade to
//! `Action::Yield` plus a [`Fault`] for the transcript.

use conclave_core::{Action, AgentId, DecisionError, Observation};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::agent::Agent;
use crate::config::SessionConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultKind {
    /// The turn deadline passed before the agent decided.
    Timeout,
    /// A transient decision error (retried if budget remains).
    Transient,
    /// Transient errors outlasted the retry budget.
    RetriesExhausted,
    /// A fatal decision error; the agent is deactivated.
    Fatal,
    /// The session was cancelled mid-turn.
    Cancelled,
    /// A commit conflicted and the turn was re-decided or dropped.
    CommitConflict,
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FaultKind::Timeout => "timeout",
            FaultKind::Transient => "transient",
            FaultKind::RetriesExhausted => "retries_exhausted",
            FaultKind::Fatal => "fatal",
            FaultKind::Cancelled => "cancelled",
            FaultKind::CommitConflict => "commit_conflict",
        };
        f.write_str(name)
    }
}

/// A recoverable malfunction recorded in the transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fault {
    pub agent_id: AgentId,
    pub kind: FaultKind,
    /// 1-based decision attempt within the turn.
    pub attempt: u32,
    pub message: String,
}

/// Result of one turn.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnOutcome {
    pub action: Action,
    pub faults: Vec<Fault>,
    /// The agent failed fatally and must not be scheduled again.
    pub deactivate: bool,
    pub attempts: u32,
}

/// Timeout and retry settings applied to every turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimePolicy {
    pub turn_timeout: Duration,
    pub max_decision_retries: u32,
    pub retry_backoff: Duration,
    pub max_backoff: Duration,
}

impl RuntimePolicy {
    /// Delay before retry number `retry` (0-based): `base * 2^retry`, capped.
    pub fn backoff(&self, retry: u32) -> Duration {
        self.retry_backoff
            .saturating_mul(2u32.saturating_pow(retry))
            .min(self.max_backoff)
    }
}

impl From<&SessionConfig> for RuntimePolicy {
    fn from(config: &SessionConfig) -> Self {
        Self {
            turn_timeout: config.turn_timeout(),
            max_decision_retries: config.max_decision_retries,
            retry_backoff: config.retry_backoff(),
            max_backoff: config.max_backoff(),
        }
    }
}

impl Default for RuntimePolicy {
    fn default() -> Self {
        Self::from(&SessionConfig::default())
    }
}

/// An agent together with the policy its turns run under.
pub struct AgentRuntime {
    id: AgentId,
    agent: Box<dyn Agent>,
    policy: RuntimePolicy,
}

impl AgentRuntime {
    pub fn new(id: AgentId, agent: Box<dyn Agent>, policy: RuntimePolicy) -> Self {
        Self { id, agent, policy }
    }

    pub fn id(&self) -> &AgentId {
        &self.id
    }

    pub fn kind(&self) -> &'static str {
        self.agent.kind()
    }

    /// Run one turn. Never fails: every problem becomes a fault and a yield.
    ///
    /// The deadline covers all attempts and backoff sleeps of the turn.
    pub async fn take_turn(
        &mut self,
        observation: &Observation,
        cancel: &CancellationToken,
    ) -> TurnOutcome {
        let deadline = Instant::now() + self.policy.turn_timeout;
        let mut faults = Vec::new();
        let mut attempt = 0;

        loop {
            attempt += 1;

            let decision = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                decision = tokio::time::timeout_at(deadline, self.agent.decide(observation)) => Some(decision),
            };
            let Some(decision) = decision else {
                return self.abandon(faults, attempt, FaultKind::Cancelled, "session cancelled");
            };

            let error = match decision {
                Ok(Ok(action)) => {
                    return TurnOutcome {
                        action,
                        faults,
                        deactivate: false,
                        attempts: attempt,
                    };
                }
                Ok(Err(error)) => error,
                Err(_) => {
                    let message = format!(
                        "no decision within {}ms",
                        self.policy.turn_timeout.as_millis()
                    );
                    return self.abandon(faults, attempt, FaultKind::Timeout, message);
                }
            };

            if let DecisionError::Fatal { reason } = &error {
                let mut outcome = self.abandon(faults, attempt, FaultKind::Fatal, reason.clone());
                outcome.deactivate = true;
                return outcome;
            }

            faults.push(self.fault(FaultKind::Transient, attempt, error.reason()));
            if attempt > self.policy.max_decision_retries {
                let message = format!("gave up after {attempt} attempts");
                return self.abandon(faults, attempt, FaultKind::RetriesExhausted, message);
            }

            let delay = self.policy.backoff(attempt - 1);
            tracing::debug!(agent = %self.id, attempt, delay_ms = delay.as_millis() as u64, "retrying decision");
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return self.abandon(faults, attempt, FaultKind::Cancelled, "session cancelled");
                }
                _ = tokio::time::sleep_until(deadline) => {
                    let message = format!(
                        "turn deadline of {}ms passed during retry backoff",
                        self.policy.turn_timeout.as_millis()
                    );
                    return self.abandon(faults, attempt, FaultKind::Timeout, message);
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    fn fault(&self, kind: FaultKind, attempt: u32, message: impl Into<String>) -> Fault {
        let fault = Fault {
            agent_id: self.id.clone(),
            kind,
            attempt,
            message: message.into(),
        };
        tracing::warn!(agent = %self.id, kind = %fault.kind, attempt, message = %fault.message, "agent fault");
        fault
    }

    fn abandon(
        &self,
        mut faults: Vec<Fault>,
        attempt: u32,
        kind: FaultKind,
        message: impl Into<String>,
    ) -> TurnOutcome {
        faults.push(self.fault(kind, attempt, message));
        TurnOutcome {
            action: Action::Yield,
            faults,
            deactivate: false,
            attempts: attempt,
        }
    }
}

impl fmt::Debug for AgentRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentRuntime")
            .field("id", &self.id)
            .field("kind", &self.kind())
            .field("policy", &self.policy)
            .finish()
    }
}
