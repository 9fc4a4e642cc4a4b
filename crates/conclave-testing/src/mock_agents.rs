//! # Mock Agents
//!
//! Agents with fixed, predictable misbehavior for exercising the runtime's
//! retry, timeout and deactivation paths.

use async_trait::async_trait;
use conclave_agent::Agent;
use conclave_core::{Action, DecisionError, DecisionResult, Observation};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// Fails transiently a fixed number of times, then returns its action on
/// every call.
#[derive(Debug, Clone)]
pub struct FlakyAgent {
    failures_left: u32,
    action: Action,
    calls: Arc<AtomicU32>,
}

impl FlakyAgent {
    pub fn new(failures: u32, action: Action) -> Self {
        Self {
            failures_left: failures,
            action,
            calls: Arc::default(),
        }
    }

    /// Shared counter of `decide` calls.
    pub fn calls(&self) -> Arc<AtomicU32> {
        Arc::clone(&self.calls)
    }
}

#[async_trait]
impl Agent for FlakyAgent {
    async fn decide(&mut self, _observation: &Observation) -> DecisionResult<Action> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failures_left > 0 {
            self.failures_left -= 1;
            return Err(DecisionError::transient("flaky agent failure"));
        }
        Ok(self.action.clone())
    }

    fn kind(&self) -> &'static str {
        "flaky"
    }
}

/// Takes `delay` to decide every turn.
#[derive(Debug, Clone)]
pub struct SlowAgent {
    delay: Duration,
    action: Action,
}

impl SlowAgent {
    pub fn new(delay: Duration, action: Action) -> Self {
        Self { delay, action }
    }
}

#[async_trait]
impl Agent for SlowAgent {
    async fn decide(&mut self, _observation: &Observation) -> DecisionResult<Action> {
        tokio::time::sleep(self.delay).await;
        Ok(self.action.clone())
    }

    fn kind(&self) -> &'static str {
        "slow"
    }
}

/// Fails fatally on its first turn.
#[derive(Debug, Clone)]
pub struct FailingAgent {
    reason: String,
}

impl FailingAgent {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl Agent for FailingAgent {
    async fn decide(&mut self, _observation: &Observation) -> DecisionResult<Action> {
        Err(DecisionError::fatal(self.reason.clone()))
    }

    fn kind(&self) -> &'static str {
        "failing"
    }
}

/// Wraps another agent and keeps every observation it was shown.
pub struct RecordingAgent<A> {
    inner: A,
    observations: Arc<Mutex<Vec<Observation>>>,
}

impl<A: Agent> RecordingAgent<A> {
    pub fn new(inner: A) -> Self {
        Self {
            inner,
            observations: Arc::default(),
        }
    }

    /// Shared log of observations, readable after the agent is moved into a
    /// session.
    pub fn observations(&self) -> Arc<Mutex<Vec<Observation>>> {
        Arc::clone(&self.observations)
    }
}

#[async_trait]
impl<A: Agent> Agent for RecordingAgent<A> {
    async fn decide(&mut self, observation: &Observation) -> DecisionResult<Action> {
        self.observations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(observation.clone());
        self.inner.decide(observation).await
    }

    fn kind(&self) -> &'static str {
        self.inner.kind()
    }
}
