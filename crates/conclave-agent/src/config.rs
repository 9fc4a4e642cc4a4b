//! # Session Configuration
//!
//! Sessions are configured through [`SessionConfigBuilder`], which starts
//! from defaults and can be layered with environment variables or a
//! YAML/TOML document before validation.
//!
//! ## Environment Variables
//!
//! - `CONCLAVE_MAX_STEPS` - Maximum agent turns per session (default: 100)
//! - `CONCLAVE_TURN_TIMEOUT_MS` - Per-turn decision timeout in ms (default: 30000)
//! - `CONCLAVE_SCHEDULING_POLICY` - `round_robin`, `priority`, `reactive` or `sequential`
//!   (default: `round_robin`)
//! - `CONCLAVE_MAX_COMMIT_RETRIES` - Re-decisions after a version conflict (default: 3)
//! - `CONCLAVE_MAX_DECISION_RETRIES` - Retries of transient decision errors (default: 2)
//! - `CONCLAVE_RETRY_BACKOFF_MS` - Base retry backoff in ms (default: 100)
//! - `CONCLAVE_MAX_BACKOFF_MS` - Backoff cap in ms (default: 5000)
//! - `CONCLAVE_DISPATCH_MODE` - `sequential` or `concurrent` (default: `sequential`)
//! - `CONCLAVE_MAX_ROUNDS` - Round limit for round-robin scheduling (default: unset)
//! - `CONCLAVE_TOOL_TIMEOUT_MS` - Per-invocation tool timeout in ms (default: unset)
//! - `CONCLAVE_HISTORY_LIMIT` - Max messages per observation (default: unset)

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;

/// How the orchestrator picks the next agent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulingPolicy {
    /// Cycle through active agents in id order.
    #[default]
    RoundRobin,
    /// Highest priority first; an agent that just yielded waits for progress.
    Priority,
    /// Agents with a fresh tool result go first, otherwise round-robin.
    Reactive,
    /// Every agent once, in id order, then the session ends.
    Sequential,
}

impl FromStr for SchedulingPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "round_robin" => Ok(SchedulingPolicy::RoundRobin),
            "priority" => Ok(SchedulingPolicy::Priority),
            "reactive" => Ok(SchedulingPolicy::Reactive),
            "sequential" => Ok(SchedulingPolicy::Sequential),
            other => Err(format!(
                "unknown scheduling policy '{other}', expected round_robin/priority/reactive/sequential"
            )),
        }
    }
}

impl fmt::Display for SchedulingPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SchedulingPolicy::RoundRobin => "round_robin",
            SchedulingPolicy::Priority => "priority",
            SchedulingPolicy::Reactive => "reactive",
            SchedulingPolicy::Sequential => "sequential",
        };
        f.write_str(name)
    }
}

/// Whether agents decide one at a time or a whole round at once.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchMode {
    #[default]
    Sequential,
    /// All active agents decide against one snapshot; commits stay serialized.
    Concurrent,
}

impl FromStr for DispatchMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sequential" => Ok(DispatchMode::Sequential),
            "concurrent" => Ok(DispatchMode::Concurrent),
            other => Err(format!(
                "unknown dispatch mode '{other}', expected sequential/concurrent"
            )),
        }
    }
}

/// Validated session configuration.
///
/// Deserializable from scenario files; missing fields take their defaults.
/// Always pass a deserialized value through [`SessionConfigBuilder::from_config`]
/// so it is validated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub max_steps: u64,
    pub turn_timeout_ms: u64,
    pub scheduling_policy: SchedulingPolicy,
    pub max_commit_retries: u32,
    pub max_decision_retries: u32,
    pub retry_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub dispatch_mode: DispatchMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_rounds: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_timeout_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub history_limit: Option<usize>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_steps: 100,
            turn_timeout_ms: 30_000,
            scheduling_policy: SchedulingPolicy::RoundRobin,
            max_commit_retries: 3,
            max_decision_retries: 2,
            retry_backoff_ms: 100,
            max_backoff_ms: 5_000,
            dispatch_mode: DispatchMode::Sequential,
            max_rounds: None,
            tool_timeout_ms: None,
            history_limit: None,
        }
    }
}

impl SessionConfig {
    pub fn builder() -> SessionConfigBuilder {
        SessionConfigBuilder::new()
    }

    pub fn turn_timeout(&self) -> Duration {
        Duration::from_millis(self.turn_timeout_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }

    pub fn tool_timeout(&self) -> Option<Duration> {
        self.tool_timeout_ms.map(Duration::from_millis)
    }
}

/// Builder for `SessionConfig` with environment variable support
#[derive(Debug, Clone, Default)]
pub struct SessionConfigBuilder {
    config: SessionConfig,
}

impl SessionConfigBuilder {
    /// Create a new builder with default values
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing (e.g. deserialized) configuration.
    #[must_use]
    pub fn from_config(config: SessionConfig) -> Self {
        Self { config }
    }

    /// Load configuration from environment variables
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if any environment variable has an invalid value.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary variable source.
    ///
    /// `lookup` returns the raw value of a `CONCLAVE_*` variable, if set.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidEnvVar` if a value cannot be parsed.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        Self::default().overlay_lookup(lookup)
    }

    /// Apply `CONCLAVE_*` environment variables on top of this builder.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if any environment variable has an invalid value.
    pub fn overlay_env(self) -> Result<Self, ConfigError> {
        self.overlay_lookup(|key| std::env::var(key).ok())
    }

    /// Apply variables from `lookup` on top of this builder. Unset
    /// variables leave the current values alone.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidEnvVar` if a value cannot be parsed.
    pub fn overlay_lookup<F>(self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = EnvSource(lookup);
        let mut builder = self;

        if let Some(steps) = vars.parse::<u64>("CONCLAVE_MAX_STEPS")? {
            builder = builder.max_steps(steps);
        }
        if let Some(ms) = vars.parse::<u64>("CONCLAVE_TURN_TIMEOUT_MS")? {
            builder = builder.turn_timeout_ms(ms);
        }
        if let Some(policy) = vars.parse::<SchedulingPolicy>("CONCLAVE_SCHEDULING_POLICY")? {
            builder = builder.scheduling_policy(policy);
        }
        if let Some(retries) = vars.parse::<u32>("CONCLAVE_MAX_COMMIT_RETRIES")? {
            builder = builder.max_commit_retries(retries);
        }
        if let Some(retries) = vars.parse::<u32>("CONCLAVE_MAX_DECISION_RETRIES")? {
            builder = builder.max_decision_retries(retries);
        }
        if let Some(ms) = vars.parse::<u64>("CONCLAVE_RETRY_BACKOFF_MS")? {
            builder = builder.retry_backoff_ms(ms);
        }
        if let Some(ms) = vars.parse::<u64>("CONCLAVE_MAX_BACKOFF_MS")? {
            builder = builder.max_backoff_ms(ms);
        }
        if let Some(mode) = vars.parse::<DispatchMode>("CONCLAVE_DISPATCH_MODE")? {
            builder = builder.dispatch_mode(mode);
        }
        if let Some(rounds) = vars.parse::<u64>("CONCLAVE_MAX_ROUNDS")? {
            builder = builder.max_rounds(rounds);
        }
        if let Some(ms) = vars.parse::<u64>("CONCLAVE_TOOL_TIMEOUT_MS")? {
            builder = builder.tool_timeout_ms(ms);
        }
        if let Some(limit) = vars.parse::<usize>("CONCLAVE_HISTORY_LIMIT")? {
            builder = builder.history_limit(limit);
        }

        Ok(builder)
    }

    /// Parse a YAML document into a builder.
    pub fn from_yaml(source: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(source)
            .map(Self::from_config)
            .map_err(|e| ConfigError::Parse {
                format: "YAML",
                message: e.to_string(),
            })
    }

    /// Parse a TOML document into a builder.
    pub fn from_toml(source: &str) -> Result<Self, ConfigError> {
        toml::from_str(source)
            .map(Self::from_config)
            .map_err(|e| ConfigError::Parse {
                format: "TOML",
                message: e.to_string(),
            })
    }

    #[must_use]
    pub fn max_steps(mut self, steps: u64) -> Self {
        self.config.max_steps = steps;
        self
    }

    #[must_use]
    pub fn turn_timeout_ms(mut self, ms: u64) -> Self {
        self.config.turn_timeout_ms = ms;
        self
    }

    #[must_use]
    pub fn turn_timeout(self, timeout: Duration) -> Self {
        self.turn_timeout_ms(timeout.as_millis() as u64)
    }

    #[must_use]
    pub fn scheduling_policy(mut self, policy: SchedulingPolicy) -> Self {
        self.config.scheduling_policy = policy;
        self
    }

    #[must_use]
    pub fn max_commit_retries(mut self, retries: u32) -> Self {
        self.config.max_commit_retries = retries;
        self
    }

    #[must_use]
    pub fn max_decision_retries(mut self, retries: u32) -> Self {
        self.config.max_decision_retries = retries;
        self
    }

    #[must_use]
    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    #[must_use]
    pub fn max_backoff_ms(mut self, ms: u64) -> Self {
        self.config.max_backoff_ms = ms;
        self
    }

    #[must_use]
    pub fn dispatch_mode(mut self, mode: DispatchMode) -> Self {
        self.config.dispatch_mode = mode;
        self
    }

    #[must_use]
    pub fn max_rounds(mut self, rounds: u64) -> Self {
        self.config.max_rounds = Some(rounds);
        self
    }

    #[must_use]
    pub fn tool_timeout_ms(mut self, ms: u64) -> Self {
        self.config.tool_timeout_ms = Some(ms);
        self
    }

    #[must_use]
    pub fn history_limit(mut self, limit: usize) -> Self {
        self.config.history_limit = Some(limit);
        self
    }

    /// Validate configuration and build `SessionConfig`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` if the configuration is invalid.
    pub fn build(self) -> Result<SessionConfig, ConfigError> {
        self.validate()?;
        Ok(self.config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let config = &self.config;

        if config.max_steps == 0 {
            return Err(ConfigError::ValidationError(
                "max_steps must be greater than 0".to_string(),
            ));
        }
        if config.turn_timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "turn_timeout_ms must be greater than 0".to_string(),
            ));
        }
        if config.max_backoff_ms < config.retry_backoff_ms {
            return Err(ConfigError::ValidationError(format!(
                "max_backoff_ms ({}) must be >= retry_backoff_ms ({})",
                config.max_backoff_ms, config.retry_backoff_ms
            )));
        }
        if config.max_rounds == Some(0) {
            return Err(ConfigError::ValidationError(
                "max_rounds must be greater than 0 when set".to_string(),
            ));
        }
        if config.tool_timeout_ms == Some(0) {
            return Err(ConfigError::ValidationError(
                "tool_timeout_ms must be greater than 0 when set".to_string(),
            ));
        }
        if config.history_limit == Some(0) {
            return Err(ConfigError::ValidationError(
                "history_limit must be greater than 0 when set".to_string(),
            ));
        }

        Ok(())
    }
}

struct EnvSource<F>(F);

impl<F> EnvSource<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn parse<T>(&self, key: &str) -> Result<Option<T>, ConfigError>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        match (self.0)(key) {
            Some(val) => val
                .trim()
                .parse::<T>()
                .map(Some)
                .map_err(|e| ConfigError::InvalidEnvVar {
                    key: key.to_string(),
                    message: format!("invalid value '{val}': {e}"),
                }),
            None => Ok(None),
        }
    }
}
