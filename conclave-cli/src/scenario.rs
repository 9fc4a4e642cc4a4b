//! Scenario files: a roster of scripted agents, seed state and extra tools.
//!
//! A scenario is YAML, TOML or JSON, picked by file extension:
//!
//! ```yaml
//! name: blog-pipeline
//! config:
//!   max_steps: 10
//!   scheduling_policy: round_robin
//! initial_state:
//!   topic: ownership
//! tools:
//!   - name: outline
//!     response: {sections: 3}
//!     writes: outline
//! agents:
//!   - id: a-planner
//!     capabilities: [outline]
//!     script:
//!       - {action: invoke, tool: outline, arguments: {topic: ownership}}
//!   - id: b-writer
//!     output_key: draft
//!     script:
//!       - {action: speak, content: "Ownership, explained"}
//!     on_exhausted: terminate
//! terminate_when_present: [approved]
//! ```

use conclave_agent::agents::{OnExhausted, ScriptStep, ScriptedAgent};
use conclave_agent::{
    Agent, RosterEntry, SessionBuilder, SessionConfig, SessionConfigBuilder, SessionMetadata,
    StateKeyPresent,
};
use conclave_core::{AgentId, Capabilities, StateDelta, StateKey, ToolName};
use conclave_tools::{InMemoryToolRegistry, ToolOutput, ToolSchema};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use crate::error::CliError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Yaml,
    Toml,
    Json,
}

impl Format {
    pub fn from_path(path: &Path) -> Result<Self, CliError> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("yaml" | "yml") => Ok(Format::Yaml),
            Some("toml") => Ok(Format::Toml),
            Some("json") => Ok(Format::Json),
            _ => Err(CliError::UnsupportedFormat(path.display().to_string())),
        }
    }

    fn label(self) -> &'static str {
        match self {
            Format::Yaml => "YAML",
            Format::Toml => "TOML",
            Format::Json => "JSON",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Scenario {
    pub name: String,
    #[serde(default = "default_app_name")]
    pub app_name: String,
    #[serde(default = "default_user_id")]
    pub user_id: String,
    #[serde(default)]
    pub config: SessionConfig,
    #[serde(default)]
    pub initial_state: BTreeMap<StateKey, Value>,
    pub agents: Vec<AgentSpec>,
    #[serde(default)]
    pub tools: Vec<ToolSpec>,
    /// End the session as soon as any of these keys exists.
    #[serde(default)]
    pub terminate_when_present: Vec<StateKey>,
}

fn default_app_name() -> String {
    "conclave".to_string()
}

fn default_user_id() -> String {
    "cli".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AgentSpec {
    pub id: AgentId,
    #[serde(default)]
    pub capabilities: Capabilities,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub output_key: Option<StateKey>,
    #[serde(default)]
    pub script: Vec<ScriptStep>,
    #[serde(default)]
    pub on_exhausted: OnExhausted,
}

impl AgentSpec {
    pub fn scripted_agent(&self) -> ScriptedAgent {
        ScriptedAgent::new(self.script.iter().cloned()).on_exhausted(self.on_exhausted)
    }
}

/// A canned tool declared by the scenario.
///
/// Without `response` the tool echoes its arguments. With `writes` the
/// returned value is also proposed as a state write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ToolSpec {
    pub name: ToolName,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub response: Option<Value>,
    #[serde(default)]
    pub failure: Option<String>,
    #[serde(default)]
    pub writes: Option<StateKey>,
}

impl ToolSpec {
    pub fn respond(&self, arguments: Value) -> Result<ToolOutput, String> {
        if let Some(failure) = &self.failure {
            return Err(failure.clone());
        }
        let value = self.response.clone().unwrap_or(arguments);
        let output = ToolOutput::value(value.clone());
        Ok(match &self.writes {
            Some(key) => output.with_delta(StateDelta::new().set(key.clone(), value)),
            None => output,
        })
    }
}

impl Scenario {
    pub fn load(path: &Path) -> Result<Self, CliError> {
        let format = Format::from_path(path)?;
        let source = std::fs::read_to_string(path).map_err(|source| CliError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&source, format)
    }

    pub fn parse(source: &str, format: Format) -> Result<Self, CliError> {
        let parse_error = |message: String| CliError::Parse {
            format: format.label(),
            message,
        };
        let scenario: Scenario = match format {
            Format::Yaml => serde_yaml::from_str(source).map_err(|e| parse_error(e.to_string()))?,
            Format::Toml => toml::from_str(source).map_err(|e| parse_error(e.to_string()))?,
            Format::Json => serde_json::from_str(source).map_err(|e| parse_error(e.to_string()))?,
        };
        SessionConfigBuilder::from_config(scenario.config.clone()).build()?;
        Ok(scenario)
    }

    pub fn metadata(&self) -> SessionMetadata {
        SessionMetadata::new(&self.app_name, &self.user_id)
    }

    /// The standard tools plus every tool the scenario declares.
    pub fn registry(&self, config: &SessionConfig) -> Result<InMemoryToolRegistry, CliError> {
        let mut registry = InMemoryToolRegistry::with_standard_tools();
        if let Some(timeout) = config.tool_timeout() {
            registry = registry.with_timeout(timeout);
        }
        for spec in &self.tools {
            let handler_spec = spec.clone();
            registry.register(
                spec.name.clone(),
                ToolSchema::any(&spec.description),
                move |arguments| {
                    let result = handler_spec.respond(arguments);
                    async move { result }
                },
            )?;
        }
        Ok(registry)
    }

    /// A session builder for this scenario. `agent_for` supplies the
    /// decision logic for each declared agent.
    pub fn builder<F>(
        &self,
        config: SessionConfig,
        mut agent_for: F,
    ) -> Result<SessionBuilder, CliError>
    where
        F: FnMut(&AgentSpec) -> Box<dyn Agent>,
    {
        let registry = self.registry(&config)?;
        let roster = self.agents.iter().map(|spec| {
            let entry = RosterEntry::new(spec.id.clone(), agent_for(spec))
                .with_capabilities(spec.capabilities.clone())
                .with_priority(spec.priority);
            match &spec.output_key {
                Some(key) => entry.with_output_key(key.clone()),
                None => entry,
            }
        });

        let mut builder = SessionBuilder::new()
            .metadata(self.metadata())
            .config(config)
            .agents(roster.collect::<Vec<_>>())
            .initial_state(self.initial_state.clone())
            .tools(Arc::new(registry));
        for key in &self.terminate_when_present {
            builder = builder.terminate_when(StateKeyPresent(key.clone()));
        }
        Ok(builder)
    }

    /// A session builder running every agent's script.
    pub fn scripted_builder(&self, config: SessionConfig) -> Result<SessionBuilder, CliError> {
        self.builder(config, |spec| Box::new(spec.scripted_agent()))
    }
}
