//! Property-Based Tests for Session Invariants
//!
//! Random scripts, including decision failures, are run through real
//! sessions under both dispatch modes to check the properties that must hold
//! whatever the agents decide: gapless state versions, strictly increasing
//! bus sequence numbers, exact replay and prompt termination.

use conclave::agents::{ReplayAgent, ScriptStep, ScriptedAgent};
use conclave::{
    Action, AgentId, Capabilities, DispatchMode, EffectResult, InMemoryStateStore, RosterEntry,
    Session, SessionConfig, StateKey, StateStore, ToolName, Transcript,
};
use proptest::prelude::*;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;

const KEYS: [&str; 3] = ["topic", "draft", "status"];

// Strategy for generating one scripted action
fn action_strategy() -> impl Strategy<Value = Action> {
    let key = prop::sample::select(KEYS.to_vec());
    prop_oneof![
        3 => "[a-z ]{1,16}".prop_map(Action::speak),
        2 => Just(Action::Yield),
        2 => (key.clone(), 0u32..100).prop_map(|(key, value)| Action::invoke(
            ToolName::parse("state_write").unwrap(),
            json!({"key": key, "value": value}),
        )),
        1 => key.prop_map(|key| Action::invoke(
            ToolName::parse("state_remove").unwrap(),
            json!({"key": key}),
        )),
    ]
}

// Strategy for one script step: mostly actions, sometimes a failure
fn step_strategy() -> impl Strategy<Value = ScriptStep> {
    prop_oneof![
        12 => action_strategy().prop_map(ScriptStep::from),
        2 => Just(ScriptStep::transient("flaky backend")),
        1 => Just(ScriptStep::fatal("model unavailable")),
    ]
}

// Strategy for a roster of 1-3 scripts
fn scripts_strategy() -> impl Strategy<Value = Vec<Vec<ScriptStep>>> {
    prop::collection::vec(prop::collection::vec(step_strategy(), 0..8), 1..4)
}

fn dispatch_strategy() -> impl Strategy<Value = DispatchMode> {
    prop_oneof![Just(DispatchMode::Sequential), Just(DispatchMode::Concurrent)]
}

fn agent_id(index: usize) -> AgentId {
    AgentId::parse(format!("agent-{index}")).unwrap()
}

// Every agent may write state; the first one also mirrors what it says.
fn entry(index: usize, agent: impl conclave::Agent + 'static) -> RosterEntry {
    let capabilities: Capabilities = ["state_write", "state_remove"]
        .into_iter()
        .map(|name| ToolName::parse(name).unwrap())
        .collect();
    let entry = RosterEntry::new(agent_id(index), agent).with_capabilities(capabilities);
    if index == 0 {
        entry.with_output_key(StateKey::new("said").unwrap())
    } else {
        entry
    }
}

fn config(dispatch: DispatchMode) -> SessionConfig {
    SessionConfig::builder()
        .max_steps(30)
        .dispatch_mode(dispatch)
        .retry_backoff_ms(0)
        .max_backoff_ms(0)
        .build()
        .unwrap()
}

fn run_scripts(
    scripts: &[Vec<ScriptStep>],
    dispatch: DispatchMode,
    store: Arc<InMemoryStateStore>,
) -> Transcript {
    let roster: Vec<RosterEntry> = scripts
        .iter()
        .enumerate()
        .map(|(index, script)| entry(index, ScriptedAgent::new(script.clone())))
        .collect();
    tokio_test::block_on(async {
        Session::builder()
            .config(config(dispatch))
            .state_store(store)
            .agents(roster)
            .build()
            .unwrap()
            .run()
            .await
            .unwrap()
    })
}

proptest! {
    /// Property: committed versions are 1, 2, 3, ... with no gaps, and each
    /// commit builds on the version right before it
    #[test]
    fn prop_committed_versions_are_gapless(
        scripts in scripts_strategy(),
        dispatch in dispatch_strategy(),
    ) {
        let store = Arc::new(InMemoryStateStore::new());
        let transcript = run_scripts(&scripts, dispatch, store.clone());

        let history = store.history().unwrap();
        for (index, commit) in history.iter().enumerate() {
            prop_assert_eq!(commit.version.get(), index as u64 + 1);
            prop_assert_eq!(commit.base_version.next(), commit.version);
        }
        prop_assert_eq!(transcript.header.final_version.get(), history.len() as u64);

        // Turns settle one at a time, so each record commits at most once.
        let mut previous = transcript.header.initial_version;
        for record in &transcript.records {
            prop_assert!(record.state_version_before <= record.state_version_after);
            let advanced = record.state_version_after.get() - previous.get();
            prop_assert!(advanced <= 1, "one turn committed {} versions", advanced);
            previous = record.state_version_after;
        }
    }

    /// Property: bus sequence numbers are unique and strictly increasing in
    /// append order, and every message effect points at a real message
    #[test]
    fn prop_sequence_numbers_strictly_increase(
        scripts in scripts_strategy(),
        dispatch in dispatch_strategy(),
    ) {
        let transcript = run_scripts(&scripts, dispatch, Arc::new(InMemoryStateStore::new()));

        for (index, message) in transcript.messages.iter().enumerate() {
            prop_assert_eq!(message.seq_no.get(), index as u64 + 1);
        }
        for record in &transcript.records {
            if let EffectResult::Message { seq_no } | EffectResult::ToolCall { seq_no, .. } =
                &record.effect
            {
                prop_assert!(transcript.messages.iter().any(|m| &m.seq_no == seq_no));
            }
        }
    }

    /// Property: replaying the recorded decisions reproduces the exact
    /// version sequence, including agents deactivated by fatal errors
    #[test]
    fn prop_replay_reproduces_versions(
        scripts in scripts_strategy(),
        dispatch in dispatch_strategy(),
    ) {
        let recorded = run_scripts(&scripts, dispatch, Arc::new(InMemoryStateStore::new()));

        let mut replay: BTreeMap<AgentId, ReplayAgent> =
            recorded.replay_agents().into_iter().collect();
        let roster: Vec<RosterEntry> = (0..scripts.len())
            .map(|index| entry(index, replay.remove(&agent_id(index)).unwrap_or_default()))
            .collect();
        let replayed = tokio_test::block_on(async {
            Session::builder()
                .config(config(dispatch))
                .agents(roster)
                .build()
                .unwrap()
                .run()
                .await
                .unwrap()
        });

        prop_assert_eq!(recorded.version_sequence(), replayed.version_sequence());
        prop_assert_eq!(recorded.termination(), replayed.termination());
        prop_assert_eq!(recorded.messages.len(), replayed.messages.len());
        prop_assert_eq!(recorded.records.len(), replayed.records.len());
    }

    /// Property: a Terminate action is the last turn to take effect; any
    /// turn recorded after it is superseded and left no trace
    #[test]
    fn prop_terminate_ends_session_immediately(
        mut scripts in scripts_strategy(),
        dispatch in dispatch_strategy(),
        at in 0usize..8,
    ) {
        let script = &mut scripts[0];
        let at = at.min(script.len());
        script.insert(at, Action::terminate("enough").into());

        let transcript = run_scripts(&scripts, dispatch, Arc::new(InMemoryStateStore::new()));

        let terminated = transcript
            .records
            .iter()
            .position(|record| matches!(record.effect, EffectResult::Terminated { .. }));
        if let Some(position) = terminated {
            let final_version = transcript.records[position].state_version_after;
            for record in &transcript.records[position + 1..] {
                prop_assert!(matches!(record.effect, EffectResult::Superseded { .. }), "expected Superseded effect");
                prop_assert_eq!(record.state_version_after, final_version);
            }
            prop_assert_eq!(transcript.header.final_version, final_version);
        }
    }
}
