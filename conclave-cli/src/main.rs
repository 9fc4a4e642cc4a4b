use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

mod commands;
mod error;
mod scenario;

use commands::ConfigOverrides;

#[derive(Parser, Debug)]
#[command(name = "conclave", version)]
#[command(about = "Conclave CLI - run, replay and validate multi-agent scenarios")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a scenario with its scripted agents
    Run {
        /// Scenario file (.yaml, .yml, .toml or .json)
        #[arg(long)]
        scenario: PathBuf,
        /// Write the transcript JSON to this file
        #[arg(long)]
        transcript: Option<PathBuf>,
        /// Print live session events as JSON lines
        #[arg(long)]
        events: bool,
        #[command(flatten)]
        overrides: ConfigOverrides,
    },
    /// Replay a transcript against a scenario and compare state versions
    Replay {
        /// Scenario the transcript was recorded from
        #[arg(long)]
        scenario: PathBuf,
        /// Transcript JSON written by `run --transcript`
        #[arg(long)]
        transcript: PathBuf,
        #[command(flatten)]
        overrides: ConfigOverrides,
    },
    /// Check that a scenario parses and its session can be built
    Validate {
        /// Scenario file (.yaml, .yml, .toml or .json)
        #[arg(long)]
        scenario: PathBuf,
        #[command(flatten)]
        overrides: ConfigOverrides,
    },
    /// Summarize a transcript
    Inspect {
        /// Transcript JSON written by `run --transcript`
        #[arg(long)]
        transcript: PathBuf,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    // JSON logs on stderr; stdout carries command output.
    let env_filter = tracing_subscriber::EnvFilter::from_default_env();
    let env_filter = match "info".parse() {
        Ok(directive) => env_filter.add_directive(directive),
        Err(_) => env_filter,
    };

    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .json()
        .try_init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run {
            scenario,
            transcript,
            events,
            overrides,
        } => commands::run(&scenario, &overrides, transcript.as_deref(), events).await,
        Commands::Replay {
            scenario,
            transcript,
            overrides,
        } => commands::replay(&scenario, &transcript, &overrides).await,
        Commands::Validate {
            scenario,
            overrides,
        } => commands::validate(&scenario, &overrides),
        Commands::Inspect { transcript } => commands::inspect(&transcript),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, code = e.error_code(), "Command failed");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn run_flags_parse() {
        let cli = Cli::try_parse_from([
            "conclave",
            "run",
            "--scenario",
            "demos/blog_pipeline.yaml",
            "--turn-timeout",
            "2s",
            "--policy",
            "priority",
            "--dispatch",
            "concurrent",
        ])
        .unwrap();

        let Commands::Run { overrides, .. } = cli.command else {
            panic!("expected run");
        };
        assert_eq!(
            overrides.turn_timeout,
            Some(std::time::Duration::from_secs(2))
        );
        assert_eq!(
            overrides.dispatch,
            Some(conclave_agent::DispatchMode::Concurrent)
        );
    }

    #[test]
    fn unknown_policy_is_rejected() {
        let parsed = Cli::try_parse_from([
            "conclave",
            "validate",
            "--scenario",
            "s.yaml",
            "--policy",
            "lottery",
        ]);
        assert!(parsed.is_err());
    }
}
