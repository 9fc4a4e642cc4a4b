//! End-to-end tests for session orchestration

use async_trait::async_trait;
use conclave_agent::agents::{ScriptStep, ScriptedAgent};
use conclave_agent::{
    Agent, DispatchMode, EffectResult, FaultKind, RosterEntry, SchedulingPolicy, SessionBuilder,
    SessionConfig, SessionError, SessionEvent, StateKeyPresent, TerminationReason, Transcript,
};
use conclave_core::{
    Action, AgentId, Capabilities, DecisionResult, InMemoryStateStore, Observation, StateKey,
    ToolFailureKind, ToolName, Version,
};
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn id(name: &str) -> AgentId {
    AgentId::parse(name).unwrap()
}

fn key(name: &str) -> StateKey {
    StateKey::new(name).unwrap()
}

fn tool(name: &str) -> ToolName {
    ToolName::parse(name).unwrap()
}

fn caps(names: &[&str]) -> Capabilities {
    names.iter().map(|name| tool(name)).collect()
}

fn scripted(name: &str, steps: Vec<ScriptStep>) -> RosterEntry {
    RosterEntry::new(id(name), ScriptedAgent::new(steps))
}

fn say(text: &str) -> ScriptStep {
    Action::speak(text).into()
}

async fn run(builder: SessionBuilder) -> Transcript {
    builder.build().unwrap().run().await.unwrap()
}

#[tokio::test]
async fn writer_and_reviewer_share_state() {
    let config = SessionConfig::builder().max_steps(10).build().unwrap();
    let transcript = run(SessionBuilder::new()
        .config(config)
        .agent(scripted("a-writer", vec![say("draft about borrowing")]).with_output_key(key("draft")))
        .agent(scripted(
            "b-reviewer",
            vec![Action::terminate("approved").into()],
        )))
    .await;

    assert_eq!(
        transcript.termination(),
        &TerminationReason::AgentTerminated {
            agent_id: id("b-reviewer"),
            reason: "approved".to_string(),
        }
    );
    assert_eq!(transcript.records.len(), 2);
    assert_eq!(transcript.version_sequence(), vec![Version::new(1), Version::new(1)]);
    assert!(matches!(
        transcript.records[0].effect,
        EffectResult::Message { seq_no } if seq_no.get() == 1
    ));
    assert_eq!(transcript.records[1].state_version_before, Version::new(1));
    assert_eq!(transcript.messages.len(), 1);
}

#[tokio::test]
async fn unauthorized_invoke_is_recorded_without_state_change() {
    let transcript = run(SessionBuilder::new().agent(
        scripted(
            "intruder",
            vec![
                Action::invoke(tool("state_write"), json!({"key": "owned", "value": true})).into(),
                Action::terminate("done").into(),
            ],
        )
        .with_capabilities(caps(&["echo"])),
    ))
    .await;

    let EffectResult::ToolCall { result, .. } = &transcript.records[0].effect else {
        panic!("expected a tool call, got {:?}", transcript.records[0].effect);
    };
    assert_eq!(result.failure_kind(), Some(ToolFailureKind::Unauthorized));
    assert_eq!(transcript.header.final_version, Version::INITIAL);
    assert_eq!(
        transcript.messages[0].payload.as_tool_result(),
        Some(result)
    );
}

#[tokio::test]
async fn tool_deltas_commit_with_the_turn() {
    let store = Arc::new(InMemoryStateStore::new());
    let transcript = run(SessionBuilder::new()
        .state_store(store.clone())
        .agent(
            scripted(
                "keeper",
                vec![
                    Action::invoke(tool("state_write"), json!({"key": "topic", "value": "traits"}))
                        .into(),
                    Action::invoke(tool("state_remove"), json!({"key": "topic"})).into(),
                    Action::terminate("clean").into(),
                ],
            )
            .with_capabilities(caps(&["state_write", "state_remove"])),
        ))
    .await;

    assert_eq!(
        transcript.version_sequence(),
        vec![Version::new(1), Version::new(2), Version::new(2)]
    );
    assert_eq!(conclave_core::StateStore::history(store.as_ref()).unwrap().len(), 2);
    assert_eq!(transcript.count_actions("invoke"), 2);
}

#[tokio::test]
async fn step_budget_ends_idle_sessions() {
    let config = SessionConfig::builder().max_steps(5).build().unwrap();
    let transcript = run(SessionBuilder::new()
        .config(config)
        .agent(scripted("idler", vec![])))
    .await;

    assert_eq!(
        transcript.termination(),
        &TerminationReason::StepBudgetExhausted { max_steps: 5 }
    );
    assert_eq!(transcript.count_actions("yield"), 5);
}

#[tokio::test]
async fn fatal_agents_are_deactivated() {
    let transcript = run(SessionBuilder::new()
        .agent(scripted("broken", vec![ScriptStep::fatal("no credentials")])))
    .await;

    assert_eq!(transcript.termination(), &TerminationReason::AllAgentsInactive);
    let faults: Vec<_> = transcript.faults().collect();
    assert_eq!(faults.len(), 1);
    assert_eq!(faults[0].kind, FaultKind::Fatal);
}

#[tokio::test]
async fn transient_failures_are_retried_within_the_turn() {
    let config = SessionConfig::builder()
        .max_decision_retries(2)
        .retry_backoff_ms(1)
        .build()
        .unwrap();
    let transcript = run(SessionBuilder::new().config(config).agent(scripted(
        "flaky",
        vec![
            ScriptStep::transient("busy"),
            ScriptStep::transient("still busy"),
            Action::terminate("finally").into(),
        ],
    )))
    .await;

    assert_eq!(transcript.records.len(), 1);
    assert!(transcript.records[0].action.is_terminate());
    assert_eq!(transcript.records[0].faults.len(), 2);
}

struct Sleeper;

#[async_trait]
impl Agent for Sleeper {
    async fn decide(&mut self, _observation: &Observation) -> DecisionResult<Action> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(Action::speak("too late"))
    }
}

#[tokio::test(start_paused = true)]
async fn slow_agents_time_out_and_yield() {
    let config = SessionConfig::builder()
        .max_steps(2)
        .turn_timeout_ms(100)
        .build()
        .unwrap();
    let transcript = run(SessionBuilder::new()
        .config(config)
        .agent(RosterEntry::new(id("sleeper"), Sleeper)))
    .await;

    assert_eq!(transcript.count_actions("yield"), 2);
    assert!(transcript.faults().all(|fault| fault.kind == FaultKind::Timeout));
    assert!(transcript.messages.is_empty());
}

#[tokio::test(start_paused = true)]
async fn cancellation_stops_in_flight_turns() {
    let config = SessionConfig::builder()
        .turn_timeout(Duration::from_secs(7200))
        .build()
        .unwrap();
    let session = SessionBuilder::new()
        .config(config)
        .agent(RosterEntry::new(id("sleeper"), Sleeper))
        .build()
        .unwrap();
    let token = session.cancellation_token();

    let handle = tokio::spawn(session.run());
    tokio::time::sleep(Duration::from_millis(50)).await;
    token.cancel();

    let transcript = handle.await.unwrap().unwrap();
    assert_eq!(transcript.termination(), &TerminationReason::Cancelled);
    assert_eq!(transcript.records.len(), 1);
    assert_eq!(transcript.records[0].effect, EffectResult::Cancelled);
}

#[tokio::test]
async fn predicates_end_the_session() {
    let transcript = run(SessionBuilder::new()
        .agent(scripted("writer", vec![say("done"), say("never spoken")]).with_output_key(key("final")))
        .terminate_when(StateKeyPresent(key("final"))))
    .await;

    assert!(matches!(
        transcript.termination(),
        TerminationReason::Predicate { reason } if reason.contains("final")
    ));
    assert_eq!(transcript.records.len(), 1);
}

#[tokio::test]
async fn concurrent_conflicts_are_redecided() {
    let config = SessionConfig::builder()
        .dispatch_mode(DispatchMode::Concurrent)
        .max_rounds(1)
        .build()
        .unwrap();
    let transcript = run(SessionBuilder::new()
        .config(config)
        .agent(scripted("a", vec![say("a1")]).with_output_key(key("a_out")))
        .agent(scripted("b", vec![say("b1"), say("b2")]).with_output_key(key("b_out"))))
    .await;

    assert_eq!(transcript.termination(), &TerminationReason::ScheduleComplete);
    assert_eq!(transcript.records.len(), 2);

    let b = &transcript.records[1];
    assert_eq!(b.action, Action::speak("b2"));
    assert_eq!(b.discarded, vec![Action::speak("b1")]);
    assert_eq!(b.commit_conflicts, 1);
    assert_eq!(b.state_version_before, Version::new(1));
    assert_eq!(b.state_version_after, Version::new(2));
    assert!(b.faults.iter().any(|fault| fault.kind == FaultKind::CommitConflict));

    // The losing draft never reached the bus.
    let texts: Vec<_> = transcript
        .messages
        .iter()
        .filter_map(|message| message.payload.as_text())
        .collect();
    assert_eq!(texts, vec!["a1", "b2"]);
}

#[tokio::test]
async fn concurrent_replay_repeats_conflicting_decisions() {
    let config = || {
        SessionConfig::builder()
            .dispatch_mode(DispatchMode::Concurrent)
            .max_rounds(2)
            .build()
            .unwrap()
    };
    let output = |agent_id: &AgentId| key(&format!("{agent_id}_out"));
    let original = run(SessionBuilder::new()
        .config(config())
        .agent(scripted("a", vec![say("a1"), say("a2")]).with_output_key(key("a_out")))
        .agent(scripted("b", vec![say("b1"), say("b2"), say("b3")]).with_output_key(key("b_out"))))
    .await;
    assert!(original.records.iter().any(|record| !record.discarded.is_empty()));

    let replayed = run(SessionBuilder::new().config(config()).agents(
        original.replay_agents().into_iter().map(|(agent_id, agent)| {
            let output_key = output(&agent_id);
            RosterEntry::new(agent_id, agent).with_output_key(output_key)
        }),
    ))
    .await;

    assert_eq!(replayed.version_sequence(), original.version_sequence());
    assert_eq!(replayed.records.len(), original.records.len());
    let texts = |transcript: &Transcript| -> Vec<String> {
        transcript
            .messages
            .iter()
            .filter_map(|message| message.payload.as_text().map(str::to_string))
            .collect()
    };
    assert_eq!(texts(&replayed), texts(&original));
}

#[tokio::test]
async fn conflicts_beyond_the_budget_drop_the_turn() {
    let config = SessionConfig::builder()
        .dispatch_mode(DispatchMode::Concurrent)
        .max_rounds(1)
        .max_commit_retries(0)
        .build()
        .unwrap();
    let transcript = run(SessionBuilder::new()
        .config(config)
        .agent(scripted("a", vec![say("a1")]).with_output_key(key("a_out")))
        .agent(scripted("b", vec![say("b1")]).with_output_key(key("b_out"))))
    .await;

    assert!(matches!(transcript.records[1].effect, EffectResult::Dropped { .. }));
    assert_eq!(transcript.header.final_version, Version::new(1));
    assert_eq!(transcript.messages.len(), 1);
}

#[tokio::test]
async fn reactive_policy_returns_tool_results_to_the_caller() {
    let config = SessionConfig::builder()
        .scheduling_policy(SchedulingPolicy::Reactive)
        .max_steps(3)
        .build()
        .unwrap();
    let transcript = run(SessionBuilder::new()
        .config(config)
        .agent(
            scripted(
                "a-caller",
                vec![
                    Action::invoke(tool("echo"), json!({"ping": 1})).into(),
                    say("got it"),
                ],
            )
            .with_capabilities(caps(&["echo"])),
        )
        .agent(scripted("b-bystander", vec![say("hello")])))
    .await;

    let order: Vec<_> = transcript
        .records
        .iter()
        .map(|record| record.agent_id.as_str())
        .collect();
    assert_eq!(order, vec!["a-caller", "a-caller", "b-bystander"]);
}

struct Observer {
    seen: Arc<Mutex<Vec<usize>>>,
}

#[async_trait]
impl Agent for Observer {
    async fn decide(&mut self, observation: &Observation) -> DecisionResult<Action> {
        self.seen.lock().unwrap().push(observation.messages.len());
        Ok(Action::Yield)
    }
}

#[tokio::test]
async fn observations_cover_only_unseen_messages() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let config = SessionConfig::builder()
        .max_steps(4)
        .history_limit(2)
        .build()
        .unwrap();
    run(SessionBuilder::new()
        .config(config)
        .agent(scripted("a-talker", vec![say("1"), say("2"), say("3")]))
        .agent(RosterEntry::new(id("b-observer"), Observer { seen: Arc::clone(&seen) })))
    .await;

    // The observer sees message 1, then only message 2 (already saw 1).
    assert_eq!(*seen.lock().unwrap(), vec![1, 1]);
}

#[tokio::test]
async fn history_limit_trims_old_messages() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let config = SessionConfig::builder()
        .scheduling_policy(SchedulingPolicy::Sequential)
        .history_limit(2)
        .build()
        .unwrap();
    run(SessionBuilder::new()
        .config(config)
        .agent(scripted("a", vec![say("1")]))
        .agent(scripted("b", vec![say("2")]))
        .agent(scripted("c", vec![say("3")]))
        .agent(RosterEntry::new(id("d"), Observer { seen: Arc::clone(&seen) })))
    .await;

    assert_eq!(*seen.lock().unwrap(), vec![2]);
}

#[tokio::test]
async fn events_trace_the_session() {
    let session = SessionBuilder::new()
        .agent(scripted("solo", vec![say("hi"), Action::terminate("bye").into()]))
        .build()
        .unwrap();
    let mut events = session.subscribe();
    session.run().await.unwrap();

    let mut collected = Vec::new();
    while let Ok(event) = events.try_recv() {
        collected.push(event);
    }

    assert!(matches!(collected.first(), Some(SessionEvent::TurnStarted { step: 1, .. })));
    assert!(collected
        .iter()
        .any(|event| matches!(event, SessionEvent::MessageAppended { .. })));
    assert!(matches!(collected.last(), Some(SessionEvent::Terminated { .. })));
}

#[tokio::test]
async fn transcripts_replay_to_the_same_versions() {
    let roster = || {
        vec![
            scripted("a", vec![say("one"), say("three")]).with_output_key(key("a_out")),
            scripted("b", vec![say("two"), Action::terminate("enough").into()])
                .with_output_key(key("b_out")),
        ]
    };
    let original = run(SessionBuilder::new().agents(roster())).await;

    let json = original.to_json().unwrap();
    let parsed = Transcript::from_json(&json).unwrap();
    assert_eq!(parsed.records, original.records);

    let replayed = run(SessionBuilder::new().agents(
        parsed
            .replay_agents()
            .into_iter()
            .map(|(agent_id, agent)| {
                let output = format!("{}_out", agent_id);
                RosterEntry::new(agent_id, agent).with_output_key(key(&output))
            }),
    ))
    .await;

    assert_eq!(replayed.version_sequence(), original.version_sequence());
    assert_eq!(replayed.termination(), original.termination());
}

#[tokio::test]
async fn replay_deactivates_agents_that_failed_fatally() {
    let original = run(SessionBuilder::new()
        .agent(scripted("a", vec![ScriptStep::fatal("model unavailable")]))
        .agent(
            scripted(
                "b",
                vec![say("x"), say("y"), Action::terminate("done").into()],
            )
            .with_output_key(key("b_out")),
        ))
    .await;
    assert_eq!(
        original
            .version_sequence()
            .iter()
            .map(|version| version.get())
            .collect::<Vec<_>>(),
        vec![0, 1, 2, 2]
    );

    let replayed = run(SessionBuilder::new().agents(
        original
            .replay_agents()
            .into_iter()
            .map(|(agent_id, agent)| {
                let entry = RosterEntry::new(agent_id.clone(), agent);
                if agent_id == id("b") {
                    entry.with_output_key(key("b_out"))
                } else {
                    entry
                }
            }),
    ))
    .await;

    assert_eq!(replayed.version_sequence(), original.version_sequence());
    assert_eq!(replayed.records_for(&id("a")).count(), 1);
    assert!(replayed
        .faults()
        .any(|fault| fault.kind == FaultKind::Fatal && fault.message == "model unavailable"));
    assert_eq!(replayed.termination(), original.termination());
}

#[tokio::test]
async fn concurrent_turns_after_terminate_are_recorded_not_applied() {
    let config = SessionConfig::builder()
        .dispatch_mode(DispatchMode::Concurrent)
        .build()
        .unwrap();
    let transcript = run(SessionBuilder::new()
        .config(config)
        .agent(scripted("a", vec![Action::terminate("stop").into()]))
        .agent(
            scripted(
                "b",
                vec![Action::invoke(tool("echo"), json!({"ping": 1})).into()],
            )
            .with_capabilities(caps(&["echo"])),
        )
        .agent(scripted("c", vec![say("late")]).with_output_key(key("c_out"))))
    .await;

    let steps: Vec<_> = transcript.records.iter().map(|record| record.step).collect();
    assert_eq!(steps, vec![1, 2, 3]);
    assert!(matches!(
        transcript.records[0].effect,
        EffectResult::Terminated { .. }
    ));
    assert_eq!(
        transcript.records[1].effect,
        EffectResult::Superseded { tool_result: None }
    );
    assert_eq!(transcript.records[1].action.kind(), "invoke");
    assert_eq!(
        transcript.records[2].effect,
        EffectResult::Superseded { tool_result: None }
    );
    assert!(transcript.messages.is_empty());
    assert_eq!(transcript.header.final_version, Version::INITIAL);
}

#[test]
fn build_rejects_invalid_rosters() {
    assert!(matches!(
        SessionBuilder::new().build(),
        Err(SessionError::EmptyRoster)
    ));

    let duplicate = SessionBuilder::new()
        .agent(scripted("twin", vec![]))
        .agent(scripted("twin", vec![]))
        .build();
    assert!(matches!(duplicate, Err(SessionError::DuplicateAgent(agent)) if agent.as_str() == "twin"));

    let unknown = SessionBuilder::new()
        .agent(scripted("caller", vec![]).with_capabilities(caps(&["web_search"])))
        .build();
    assert!(matches!(unknown, Err(SessionError::UnknownTool { tool, .. }) if tool.as_str() == "web_search"));

    let conflicting = SessionBuilder::new()
        .agent(scripted("solo", vec![]))
        .state_entry(key("seed"), 1)
        .state_store(Arc::new(InMemoryStateStore::new()))
        .build();
    assert!(matches!(conflicting, Err(SessionError::InvalidInitialState(_))));
}
