//! Scenario tests for whole sessions, driven through the `conclave` facade.

use conclave::agents::{ScriptStep, ScriptedAgent};
use conclave::{
    Action, AgentId, Capabilities, EffectResult, FaultKind, InMemoryStateStore, RosterEntry,
    SchedulingPolicy, Session, SessionConfig, StateDelta, StateKey, TerminationReason,
    ToolFailureKind, ToolName, Transcript, Version,
};
use conclave_testing::{
    ContendedStateStore, Expectation, MockToolRegistry, SessionHarness,
};
use rstest::rstest;
use serde_json::json;
use std::sync::Arc;

fn id(name: &str) -> AgentId {
    AgentId::parse(name).unwrap()
}

fn key(name: &str) -> StateKey {
    StateKey::new(name).unwrap()
}

fn scripted<S: Into<ScriptStep>>(name: &str, steps: impl IntoIterator<Item = S>) -> RosterEntry {
    RosterEntry::new(id(name), ScriptedAgent::new(steps))
}

fn idle(name: &str) -> RosterEntry {
    scripted(name, Vec::<Action>::new())
}

fn config(policy: SchedulingPolicy) -> SessionConfig {
    SessionConfig::builder()
        .max_steps(20)
        .scheduling_policy(policy)
        .build()
        .unwrap()
}

async fn run(session: Session) -> Transcript {
    session.run().await.unwrap()
}

#[rstest]
#[case(SchedulingPolicy::RoundRobin)]
#[case(SchedulingPolicy::Priority)]
#[case(SchedulingPolicy::Reactive)]
#[tokio::test]
async fn speak_then_terminate_leaves_one_message(#[case] policy: SchedulingPolicy) {
    let session = Session::builder()
        .config(config(policy))
        .agent(scripted(
            "a",
            [Action::speak("hi"), Action::terminate("done")],
        ))
        .agent(idle("b"))
        .build()
        .unwrap();
    let transcript = run(session).await;

    assert_eq!(transcript.messages.len(), 1);
    assert_eq!(transcript.messages[0].payload.as_text(), Some("hi"));
    assert_eq!(transcript.count_actions("terminate"), 1);
    assert_eq!(
        transcript.termination(),
        &TerminationReason::AgentTerminated {
            agent_id: id("a"),
            reason: "done".to_string(),
        }
    );
}

#[rstest]
#[case(SchedulingPolicy::RoundRobin)]
#[case(SchedulingPolicy::Priority)]
#[case(SchedulingPolicy::Reactive)]
#[case(SchedulingPolicy::Sequential)]
#[tokio::test]
async fn terminate_on_first_turn_skips_everyone_else(#[case] policy: SchedulingPolicy) {
    let session = Session::builder()
        .config(config(policy))
        .agent(scripted("a", [Action::terminate("nothing to do")]))
        .agent(scripted("b", [Action::speak("never said")]))
        .build()
        .unwrap();
    let transcript = run(session).await;

    assert_eq!(transcript.records.len(), 1);
    assert_eq!(transcript.records_for(&id("b")).count(), 0);
    assert!(transcript.messages.is_empty());
}

#[tokio::test]
async fn unauthorized_tool_call_reaches_no_handler() {
    let search = ToolName::parse("search").unwrap();
    let mocks = MockToolRegistry::new().with_success_tool(search.clone());

    let result = SessionHarness::new("unauthorized search")
        .mock_tools(&mocks)
        .unwrap()
        .agent(
            scripted(
                "snoop",
                [
                    Action::invoke(search.clone(), json!({"q": "secrets"})),
                    Action::terminate("done"),
                ],
            )
            .with_capabilities(Capabilities::none()),
        )
        .expect(Expectation::FinalVersion(Version::INITIAL))
        .expect(Expectation::MessageCount(1))
        .run()
        .await;

    assert!(result.is_success(), "{}", result.summary());
    let transcript = result.transcript.unwrap();
    let EffectResult::ToolCall { result, .. } = &transcript.records[0].effect else {
        panic!("expected a tool call record");
    };
    assert_eq!(result.failure_kind(), Some(ToolFailureKind::Unauthorized));
    assert_eq!(mocks.get_mock_tool("search").unwrap().call_count(), 0);
}

#[tokio::test]
async fn granted_tool_result_is_delivered() {
    let search = ToolName::parse("search").unwrap();
    let mocks = MockToolRegistry::new().with_success_tool(search.clone());

    let result = SessionHarness::new("granted search")
        .mock_tools(&mocks)
        .unwrap()
        .agent(
            scripted(
                "reader",
                [
                    Action::invoke(search.clone(), json!({"q": "lifetimes"})),
                    Action::terminate("found it"),
                ],
            )
            .with_capabilities([search.clone()].into_iter().collect()),
        )
        .expect(Expectation::NoFaults)
        .expect(Expectation::ActionCount {
            kind: "invoke",
            count: 1,
        })
        .run()
        .await;

    assert!(result.is_success(), "{}", result.summary());
    let tool = mocks.get_mock_tool("search").unwrap();
    assert!(tool.was_called_with(&json!({"q": "lifetimes"})));
}

#[tokio::test]
async fn conflicting_commit_is_redecided_against_fresh_state() {
    let store = ContendedStateStore::new(
        InMemoryStateStore::new(),
        StateDelta::new().set(key("editor_note"), "tighten intro"),
        1,
    );

    let result = SessionHarness::new("racing editor")
        .configure(|builder| builder.state_store(Arc::new(store)))
        .agent(
            scripted(
                "writer",
                [
                    Action::speak("first draft"),
                    Action::speak("second draft"),
                    Action::terminate("done"),
                ],
            )
            .with_output_key(key("draft")),
        )
        .expect(Expectation::Fault(FaultKind::CommitConflict))
        .expect(Expectation::FinalVersion(Version::new(2)))
        .expect(Expectation::StateEquals {
            key: key("draft"),
            value: json!("second draft"),
        })
        .expect(Expectation::MessageCount(1))
        .run()
        .await;

    assert!(result.is_success(), "{}", result.summary());
    let transcript = result.transcript.unwrap();
    let first = &transcript.records[0];
    assert_eq!(first.commit_conflicts, 1);
    assert_eq!(first.state_version_before, Version::new(1));
    assert_eq!(first.state_version_after, Version::new(2));
}

#[tokio::test]
async fn persistent_conflicts_drop_turns_without_stalling() {
    let store = ContendedStateStore::new(
        InMemoryStateStore::new(),
        StateDelta::new().set(key("noise"), true),
        u32::MAX,
    );
    let config = SessionConfig::builder()
        .max_steps(4)
        .max_commit_retries(1)
        .build()
        .unwrap();

    let session = Session::builder()
        .config(config)
        .state_store(Arc::new(store))
        .agent(
            scripted("writer", (0..20).map(|n| Action::speak(format!("draft {n}"))))
                .with_output_key(key("draft")),
        )
        .build()
        .unwrap();
    let transcript = run(session).await;

    assert_eq!(
        transcript.termination(),
        &TerminationReason::StepBudgetExhausted { max_steps: 4 }
    );
    assert_eq!(transcript.records.len(), 4);
    assert!(transcript
        .records
        .iter()
        .all(|record| matches!(record.effect, EffectResult::Dropped { .. })));
    assert!(transcript.messages.is_empty());
}
