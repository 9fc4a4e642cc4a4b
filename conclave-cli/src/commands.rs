//! Subcommand implementations.

use clap::Args;
use conclave_agent::agents::ReplayAgent;
use conclave_agent::{
    DispatchMode, SchedulingPolicy, Session, SessionConfig, SessionConfigBuilder, Transcript,
};
use conclave_core::AgentId;
use futures::StreamExt;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use crate::error::CliError;
use crate::scenario::Scenario;

/// Flags that override the scenario's `config` section.
///
/// Precedence, lowest first: scenario file, `CONCLAVE_*` environment, flags.
#[derive(Args, Debug, Default, Clone)]
pub struct ConfigOverrides {
    /// Maximum number of scheduling steps
    #[arg(long)]
    pub max_steps: Option<u64>,
    /// Per-turn timeout, e.g. "5s" or "250ms"
    #[arg(long, value_parser = humantime::parse_duration)]
    pub turn_timeout: Option<Duration>,
    /// Scheduling policy (round_robin, priority, reactive, sequential)
    #[arg(long)]
    pub policy: Option<SchedulingPolicy>,
    /// Dispatch mode (sequential, concurrent)
    #[arg(long)]
    pub dispatch: Option<DispatchMode>,
    /// Stop after this many rounds
    #[arg(long)]
    pub max_rounds: Option<u64>,
}

impl ConfigOverrides {
    pub fn apply(&self, base: SessionConfig) -> Result<SessionConfig, CliError> {
        let mut builder = SessionConfigBuilder::from_config(base).overlay_env()?;
        if let Some(steps) = self.max_steps {
            builder = builder.max_steps(steps);
        }
        if let Some(timeout) = self.turn_timeout {
            builder = builder.turn_timeout(timeout);
        }
        if let Some(policy) = self.policy {
            builder = builder.scheduling_policy(policy);
        }
        if let Some(mode) = self.dispatch {
            builder = builder.dispatch_mode(mode);
        }
        if let Some(rounds) = self.max_rounds {
            builder = builder.max_rounds(rounds);
        }
        Ok(builder.build()?)
    }
}

#[derive(Debug, Serialize)]
struct RunSummary<'a> {
    scenario: &'a str,
    session_id: String,
    termination: String,
    turns: usize,
    messages: usize,
    final_version: u64,
    faults: usize,
}

impl<'a> RunSummary<'a> {
    fn new(scenario: &'a str, transcript: &Transcript) -> Self {
        Self {
            scenario,
            session_id: transcript.header.metadata.session_id.to_string(),
            termination: transcript.termination().to_string(),
            turns: transcript.records.len(),
            messages: transcript.messages.len(),
            final_version: transcript.header.final_version.get(),
            faults: transcript.faults().count(),
        }
    }
}

fn read_transcript(path: &Path) -> Result<Transcript, CliError> {
    let json = std::fs::read_to_string(path).map_err(|source| CliError::Read {
        path: path.display().to_string(),
        source,
    })?;
    Ok(Transcript::from_json(&json)?)
}

fn write_transcript(path: &Path, transcript: &Transcript) -> Result<(), CliError> {
    std::fs::write(path, transcript.to_json()?).map_err(|source| CliError::Write {
        path: path.display().to_string(),
        source,
    })
}

/// Cancel the session on Ctrl-C; in-flight turns are recorded as cancelled.
fn cancel_on_interrupt(session: &Session) {
    let token = session.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, cancelling session");
            token.cancel();
        }
    });
}

fn print_json(value: &impl Serialize) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{json}"),
        Err(error) => tracing::warn!(error = %error, "failed to render output"),
    }
}

pub async fn run(
    scenario_path: &Path,
    overrides: &ConfigOverrides,
    transcript_path: Option<&Path>,
    stream_events: bool,
) -> Result<(), CliError> {
    let scenario = Scenario::load(scenario_path)?;
    let config = overrides.apply(scenario.config.clone())?;
    let session = scenario.scripted_builder(config)?.build()?;

    tracing::info!(
        scenario = %scenario.name,
        session_id = %session.metadata().session_id,
        agents = scenario.agents.len(),
        "running scenario"
    );
    cancel_on_interrupt(&session);

    let printer = stream_events.then(|| {
        let mut events = session.events();
        tokio::spawn(async move {
            while let Some(event) = events.next().await {
                match serde_json::to_string(&event) {
                    Ok(line) => println!("{line}"),
                    Err(error) => tracing::warn!(error = %error, "failed to render event"),
                }
            }
        })
    });

    let transcript = session.run().await?;
    if let Some(printer) = printer
        && let Err(error) = printer.await
    {
        tracing::warn!(error = %error, "event printer stopped abnormally");
    }

    if let Some(path) = transcript_path {
        write_transcript(path, &transcript)?;
        tracing::info!(path = %path.display(), "transcript written");
    }
    print_json(&RunSummary::new(&scenario.name, &transcript));
    Ok(())
}

/// Re-run a recorded transcript's actions through the scenario and check
/// that the state goes through the same versions.
pub async fn replay(
    scenario_path: &Path,
    transcript_path: &Path,
    overrides: &ConfigOverrides,
) -> Result<(), CliError> {
    let scenario = Scenario::load(scenario_path)?;
    let recorded = read_transcript(transcript_path)?;
    let config = overrides.apply(scenario.config.clone())?;

    let mut agents: BTreeMap<AgentId, ReplayAgent> =
        recorded.replay_agents().into_iter().collect();
    if let Some(unknown) = agents
        .keys()
        .find(|id| !scenario.agents.iter().any(|spec| &spec.id == *id))
    {
        return Err(CliError::UnknownAgent(unknown.clone()));
    }

    let session = scenario
        .builder(config, |spec| {
            Box::new(agents.remove(&spec.id).unwrap_or_default())
        })?
        .metadata(recorded.header.metadata.clone())
        .build()?;
    cancel_on_interrupt(&session);
    let replayed = session.run().await?;

    let expected: Vec<u64> = recorded.version_sequence().iter().map(|v| v.get()).collect();
    let actual: Vec<u64> = replayed.version_sequence().iter().map(|v| v.get()).collect();
    if expected != actual {
        return Err(CliError::ReplayMismatch { expected, actual });
    }
    if replayed.termination() != recorded.termination() {
        tracing::warn!(
            recorded = %recorded.termination(),
            replayed = %replayed.termination(),
            "replay ended for a different reason"
        );
    }

    tracing::info!(versions = expected.len(), "replay matched recorded versions");
    print_json(&RunSummary::new(&scenario.name, &replayed));
    Ok(())
}

/// Parse the scenario and build its session without running it.
pub fn validate(scenario_path: &Path, overrides: &ConfigOverrides) -> Result<(), CliError> {
    let scenario = Scenario::load(scenario_path)?;
    let config = overrides.apply(scenario.config.clone())?;
    let session = scenario.scripted_builder(config)?.build()?;
    println!(
        "scenario '{}' is valid: {} agents, {} declared tools, session {}",
        scenario.name,
        scenario.agents.len(),
        scenario.tools.len(),
        session.metadata().session_id
    );
    Ok(())
}

/// Print a human-readable digest of a transcript.
pub fn inspect(transcript_path: &Path) -> Result<(), CliError> {
    let transcript = read_transcript(transcript_path)?;
    let header = &transcript.header;

    println!("session      {}", header.metadata.session_id);
    println!("app / user   {} / {}", header.metadata.app_name, header.metadata.user_id);
    println!("termination  {}", header.termination);
    println!(
        "versions     {} -> {}",
        header.initial_version, header.final_version
    );
    println!(
        "duration     {}",
        humantime::format_duration(
            (header.finished_at - header.started_at)
                .to_std()
                .unwrap_or_default()
        )
    );
    println!("messages     {}", transcript.messages.len());

    println!("turns");
    for (agent_id, actions) in transcript.actions_by_agent() {
        let mut kinds: BTreeMap<&str, usize> = BTreeMap::new();
        for action in &actions {
            *kinds.entry(action.kind()).or_default() += 1;
        }
        let kinds = kinds
            .iter()
            .map(|(kind, count)| format!("{kind}={count}"))
            .collect::<Vec<_>>()
            .join(" ");
        println!("  {agent_id:<24} {:>4}  {kinds}", actions.len());
    }

    let faults: Vec<_> = transcript.faults().collect();
    if !faults.is_empty() {
        println!("faults");
        for fault in faults {
            println!("  {}", serde_json::to_string(fault).unwrap_or_default());
        }
    }
    Ok(())
}
