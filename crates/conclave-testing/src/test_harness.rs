//! # Session Test Harness
//!
//! Runs a whole session under a wall-clock limit and checks a list of
//! [`Expectation`]s against the transcript and the final state.

use conclave_agent::{
    FaultKind, RosterEntry, SessionBuilder, SessionConfig, TerminationReason, Transcript,
};
use conclave_core::{StateKey, StateSnapshot, StateStore, Version};
use conclave_tools::RegistryResult;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::MockToolRegistry;

/// Something a finished session should satisfy.
#[derive(Debug, Clone, PartialEq)]
pub enum Expectation {
    Termination(TerminationReason),
    FinalVersion(Version),
    /// Final state holds `value` under `key`.
    StateEquals { key: StateKey, value: Value },
    StateAbsent(StateKey),
    MessageCount(usize),
    /// Number of recorded actions of a kind (`speak`, `invoke`, ...).
    ActionCount { kind: &'static str, count: usize },
    /// At least one fault of this kind was recorded.
    Fault(FaultKind),
    NoFaults,
}

impl Expectation {
    fn check(&self, transcript: &Transcript, state: &StateSnapshot) -> AssertionResult {
        let (description, passed, expected, actual) = match self {
            Expectation::Termination(reason) => (
                "termination reason".to_string(),
                transcript.termination() == reason,
                reason.to_string(),
                transcript.termination().to_string(),
            ),
            Expectation::FinalVersion(version) => (
                "final state version".to_string(),
                state.version == *version,
                version.to_string(),
                state.version.to_string(),
            ),
            Expectation::StateEquals { key, value } => {
                let actual = state.view.get(key.as_str());
                (
                    format!("state key '{key}'"),
                    actual == Some(value),
                    value.to_string(),
                    actual.map_or_else(|| "<absent>".to_string(), Value::to_string),
                )
            }
            Expectation::StateAbsent(key) => {
                let actual = state.view.get(key.as_str());
                (
                    format!("state key '{key}' absent"),
                    actual.is_none(),
                    "<absent>".to_string(),
                    actual.map_or_else(|| "<absent>".to_string(), Value::to_string),
                )
            }
            Expectation::MessageCount(count) => (
                "bus message count".to_string(),
                transcript.messages.len() == *count,
                count.to_string(),
                transcript.messages.len().to_string(),
            ),
            Expectation::ActionCount { kind, count } => {
                let actual = transcript.count_actions(kind);
                (
                    format!("'{kind}' action count"),
                    actual == *count,
                    count.to_string(),
                    actual.to_string(),
                )
            }
            Expectation::Fault(kind) => {
                let kinds: Vec<String> = transcript.faults().map(|f| f.kind.to_string()).collect();
                (
                    format!("'{kind}' fault recorded"),
                    transcript.faults().any(|fault| fault.kind == *kind),
                    kind.to_string(),
                    kinds.join(", "),
                )
            }
            Expectation::NoFaults => {
                let count = transcript.faults().count();
                (
                    "no faults recorded".to_string(),
                    count == 0,
                    "0".to_string(),
                    count.to_string(),
                )
            }
        };

        AssertionResult {
            description,
            passed,
            expected,
            actual,
        }
    }
}

/// Result of an assertion
#[derive(Debug, Clone, PartialEq)]
pub struct AssertionResult {
    /// Description of the assertion
    pub description: String,
    /// Whether the assertion passed
    pub passed: bool,
    /// Expected value
    pub expected: String,
    /// Actual value
    pub actual: String,
}

/// Result of a harness run
#[derive(Debug)]
pub struct TestResult {
    /// Name of the scenario
    pub scenario_name: String,
    /// Whether the session ran and every expectation held
    pub passed: bool,
    pub transcript: Option<Transcript>,
    pub final_state: Option<StateSnapshot>,
    /// Execution time
    pub execution_time: Duration,
    /// Error message if the session could not be built or run
    pub error: Option<String>,
    pub assertion_results: Vec<AssertionResult>,
}

impl TestResult {
    /// Check if the test passed
    pub fn is_success(&self) -> bool {
        self.passed
    }

    pub fn failed_assertions(&self) -> impl Iterator<Item = &AssertionResult> {
        self.assertion_results.iter().filter(|result| !result.passed)
    }

    /// Get a summary of the test result
    pub fn summary(&self) -> String {
        let status = if self.passed { "PASS" } else { "FAIL" };
        let time = self.execution_time.as_millis();

        if let Some(error) = &self.error {
            return format!("[{status}] {} ({time}ms) - {error}", self.scenario_name);
        }

        let failures: Vec<String> = self
            .failed_assertions()
            .map(|a| format!("{}: expected {}, got {}", a.description, a.expected, a.actual))
            .collect();
        if failures.is_empty() {
            format!("[{status}] {} ({time}ms)", self.scenario_name)
        } else {
            format!(
                "[{status}] {} ({time}ms) - {}",
                self.scenario_name,
                failures.join("; ")
            )
        }
    }
}

impl fmt::Display for TestResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.summary())
    }
}

/// Builds and runs one session scenario.
pub struct SessionHarness {
    name: String,
    builder: SessionBuilder,
    expectations: Vec<Expectation>,
    timeout: Duration,
}

impl SessionHarness {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            builder: SessionBuilder::new(),
            expectations: Vec::new(),
            timeout: Duration::from_secs(30),
        }
    }

    pub fn config(mut self, config: SessionConfig) -> Self {
        self.builder = self.builder.config(config);
        self
    }

    pub fn agent(mut self, entry: RosterEntry) -> Self {
        self.builder = self.builder.agent(entry);
        self
    }

    /// Use the mocks as the session's tool registry.
    pub fn mock_tools(mut self, mocks: &MockToolRegistry) -> RegistryResult<Self> {
        self.builder = self.builder.tools(Arc::new(mocks.build()?));
        Ok(self)
    }

    /// Apply arbitrary builder settings.
    pub fn configure(mut self, configure: impl FnOnce(SessionBuilder) -> SessionBuilder) -> Self {
        self.builder = configure(self.builder);
        self
    }

    pub fn expect(mut self, expectation: Expectation) -> Self {
        self.expectations.push(expectation);
        self
    }

    /// Wall-clock limit for the whole session (default 30s).
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub async fn run(self) -> TestResult {
        let start_time = Instant::now();
        let mut result = TestResult {
            scenario_name: self.name,
            passed: false,
            transcript: None,
            final_state: None,
            execution_time: Duration::default(),
            error: None,
            assertion_results: Vec::new(),
        };

        let session = match self.builder.build() {
            Ok(session) => session,
            Err(err) => {
                result.error = Some(format!("session build failed: {err}"));
                result.execution_time = start_time.elapsed();
                return result;
            }
        };
        let store = session.state_store();

        let transcript = match tokio::time::timeout(self.timeout, session.run()).await {
            Ok(Ok(transcript)) => transcript,
            Ok(Err(err)) => {
                result.error = Some(format!("session failed: {err}"));
                result.execution_time = start_time.elapsed();
                return result;
            }
            Err(_) => {
                result.error = Some(format!(
                    "session did not finish within {}ms",
                    self.timeout.as_millis()
                ));
                result.execution_time = start_time.elapsed();
                return result;
            }
        };

        match store.snapshot() {
            Ok(state) => {
                result.assertion_results = self
                    .expectations
                    .iter()
                    .map(|expectation| expectation.check(&transcript, &state))
                    .collect();
                result.passed = result.assertion_results.iter().all(|a| a.passed);
                result.final_state = Some(state);
            }
            Err(err) => result.error = Some(format!("final snapshot failed: {err}")),
        }

        tracing::debug!(
            scenario = %result.scenario_name,
            passed = result.passed,
            records = transcript.records.len(),
            "harness run finished"
        );
        result.transcript = Some(transcript);
        result.execution_time = start_time.elapsed();
        result
    }
}
