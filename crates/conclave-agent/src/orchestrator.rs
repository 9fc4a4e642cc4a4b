//! # Orchestrator
//!
//! Drives a session as a small state machine:
//!
//! ```text
//! Scheduling -> AwaitingDecision -> ApplyingEffects -> CommittingState -> Scheduling
//!      \______________________________________________________________-> Terminated
//! ```
//!
//! Every turn observes one state snapshot, decides, stages its effects
//! (bus drafts and a state delta) and commits the delta against the
//! snapshot's version. Drafts are only published once the commit has
//! succeeded, so a turn whose commit loses a race leaves no trace on the
//! bus and is simply decided again against fresh state.

use chrono::{DateTime, Utc};
use conclave_core::{
    Action, AgentId, Capabilities, CorrelationId, MessageDraft, Observation, SeqNo, Sender,
    StateDelta, StateKey, StateSnapshot, StateStore, ToolFailure, ToolFailureKind, ToolResult,
    Version,
};
use conclave_mesh::MessageBus;
use conclave_tools::{Invocation, ToolRegistry};
use futures::future::join_all;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::config::{DispatchMode, SessionConfig};
use crate::error::SessionResult;
use crate::events::SessionEvent;
use crate::runtime::{AgentRuntime, Fault, FaultKind, TurnOutcome};
use crate::scheduler::{AgentView, Schedule, Scheduler};
use crate::session::SessionMetadata;
use crate::termination::{TerminationContext, TerminationPredicate, TerminationReason};
use crate::transcript::{EffectResult, Transcript, TranscriptHeader, TranscriptRecord};

/// Where the orchestrator is in its loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Scheduling,
    AwaitingDecision,
    ApplyingEffects,
    CommittingState,
    Terminated,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Scheduling => "scheduling",
            Phase::AwaitingDecision => "awaiting_decision",
            Phase::ApplyingEffects => "applying_effects",
            Phase::CommittingState => "committing_state",
            Phase::Terminated => "terminated",
        };
        f.write_str(name)
    }
}

/// Per-agent bookkeeping.
pub(crate) struct AgentSlot {
    pub(crate) runtime: AgentRuntime,
    pub(crate) capabilities: Capabilities,
    pub(crate) priority: i32,
    pub(crate) output_key: Option<StateKey>,
    pub(crate) active: bool,
    /// Bus position this agent has already observed.
    pub(crate) last_seen: SeqNo,
    pub(crate) turns_taken: u64,
    pub(crate) yielded: bool,
    pub(crate) pending_result: bool,
}

impl AgentSlot {
    pub(crate) fn new(
        runtime: AgentRuntime,
        capabilities: Capabilities,
        priority: i32,
        output_key: Option<StateKey>,
    ) -> Self {
        Self {
            runtime,
            capabilities,
            priority,
            output_key,
            active: true,
            last_seen: SeqNo::ZERO,
            turns_taken: 0,
            yielded: false,
            pending_result: false,
        }
    }

    fn id(&self) -> &AgentId {
        self.runtime.id()
    }
}

fn views(slots: &[AgentSlot]) -> Vec<AgentView<'_>> {
    slots
        .iter()
        .map(|slot| AgentView {
            id: slot.id(),
            priority: slot.priority,
            active: slot.active,
            turns_taken: slot.turns_taken,
            yielded: slot.yielded,
            has_pending_result: slot.pending_result,
        })
        .collect()
}

/// Effects of one action, held back until its commit succeeds.
#[derive(Debug, Default)]
struct Staged {
    drafts: Vec<MessageDraft>,
    delta: StateDelta,
    tool_result: Option<ToolResult>,
    terminate: Option<String>,
}

/// A decided turn waiting to be committed.
struct Decided {
    step: u64,
    observation: Observation,
    observed_through: SeqNo,
    outcome: TurnOutcome,
    staged: Staged,
    /// Earlier decisions of this turn lost to commit conflicts.
    discarded: Vec<Action>,
}

/// What an agent is allowed to touch when its action is applied.
#[derive(Debug, Clone)]
struct Grant {
    agent_id: AgentId,
    capabilities: Capabilities,
    output_key: Option<StateKey>,
}

/// Build what an agent sees at `step`: the snapshot plus every bus message
/// after its last observed position, trimmed to `history_limit`.
async fn observe(
    bus: &dyn MessageBus,
    agent_id: &AgentId,
    last_seen: SeqNo,
    history_limit: Option<usize>,
    step: u64,
    snapshot: &StateSnapshot,
) -> SessionResult<(Observation, SeqNo)> {
    let cursor = bus.read_since(last_seen).await?;
    let observed_through = cursor.end();
    let mut messages: Vec<_> = cursor.collect();
    if let Some(limit) = history_limit
        && messages.len() > limit
    {
        messages.drain(..messages.len() - limit);
    }

    let observation = Observation {
        agent_id: agent_id.clone(),
        step,
        state_version: snapshot.version,
        state: snapshot.view.clone(),
        messages,
    };
    Ok((observation, observed_through))
}

/// Turns actions into staged effects. Kept apart from the orchestrator so
/// concurrent turns can stage without borrowing the roster.
struct Effects {
    registry: Arc<dyn ToolRegistry>,
    cancel: CancellationToken,
}

impl Effects {
    async fn stage(&self, grant: &Grant, action: &Action) -> Staged {
        let agent_id = &grant.agent_id;
        match action {
            Action::Speak { content } => {
                let mut delta = StateDelta::new();
                if let Some(key) = &grant.output_key {
                    delta = delta.set(key.clone(), content.to_state_value());
                }
                Staged {
                    drafts: vec![MessageDraft::new(
                        Sender::Agent(agent_id.clone()),
                        content.clone().into_payload(),
                    )],
                    delta,
                    ..Staged::default()
                }
            }
            Action::Invoke { tool, arguments } => {
                let correlation_id = CorrelationId::new();
                let invocation = tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => Invocation {
                        result: ToolResult::failure(
                            tool.clone(),
                            correlation_id,
                            ToolFailure::new(ToolFailureKind::Cancelled, "session cancelled"),
                        ),
                        delta: StateDelta::new(),
                    },
                    invocation = self.registry.invoke(
                        tool,
                        arguments.clone(),
                        &grant.capabilities,
                        correlation_id,
                    ) => invocation,
                };
                tracing::debug!(
                    agent_id = %agent_id,
                    tool = %tool,
                    correlation_id = %correlation_id,
                    success = invocation.result.is_success(),
                    "tool invocation staged"
                );
                Staged {
                    drafts: vec![MessageDraft::tool_result(invocation.result.clone())],
                    delta: invocation.delta,
                    tool_result: Some(invocation.result),
                    terminate: None,
                }
            }
            Action::Yield => Staged::default(),
            Action::Terminate { reason } => Staged {
                terminate: Some(reason.clone()),
                ..Staged::default()
            },
        }
    }
}

/// Everything the orchestrator needs, assembled by the session builder.
pub(crate) struct OrchestratorParts {
    pub(crate) metadata: SessionMetadata,
    pub(crate) config: SessionConfig,
    pub(crate) slots: Vec<AgentSlot>,
    pub(crate) store: Arc<dyn StateStore>,
    pub(crate) bus: Arc<dyn MessageBus>,
    pub(crate) registry: Arc<dyn ToolRegistry>,
    pub(crate) scheduler: Box<dyn Scheduler>,
    pub(crate) predicates: Vec<Box<dyn TerminationPredicate>>,
    pub(crate) events: broadcast::Sender<SessionEvent>,
    pub(crate) cancel: CancellationToken,
}

pub(crate) struct Orchestrator {
    metadata: SessionMetadata,
    config: SessionConfig,
    slots: Vec<AgentSlot>,
    store: Arc<dyn StateStore>,
    bus: Arc<dyn MessageBus>,
    effects: Effects,
    scheduler: Box<dyn Scheduler>,
    predicates: Vec<Box<dyn TerminationPredicate>>,
    events: broadcast::Sender<SessionEvent>,
    phase: Phase,
    step: u64,
    rounds: u64,
    records: Vec<TranscriptRecord>,
    termination: Option<TerminationReason>,
}

impl Orchestrator {
    pub(crate) fn new(parts: OrchestratorParts) -> Self {
        Self {
            metadata: parts.metadata,
            config: parts.config,
            slots: parts.slots,
            store: parts.store,
            bus: parts.bus,
            effects: Effects {
                registry: parts.registry,
                cancel: parts.cancel,
            },
            scheduler: parts.scheduler,
            predicates: parts.predicates,
            events: parts.events,
            phase: Phase::Scheduling,
            step: 0,
            rounds: 0,
            records: Vec::new(),
            termination: None,
        }
    }

    /// Run until a termination condition holds and return the transcript.
    pub(crate) async fn run(self) -> SessionResult<Transcript> {
        let span = tracing::info_span!(
            "session",
            session_id = %self.metadata.session_id,
            app_name = %self.metadata.app_name,
        );
        self.run_loop().instrument(span).await
    }

    async fn run_loop(mut self) -> SessionResult<Transcript> {
        let started_at = Utc::now();
        let initial_version = self.store.version()?;
        tracing::info!(
            agents = self.slots.len(),
            scheduler = self.scheduler.name(),
            dispatch = ?self.config.dispatch_mode,
            max_steps = self.config.max_steps,
            "session started"
        );

        let reason = loop {
            self.enter(Phase::Scheduling);
            if let Some(reason) = self.termination.take() {
                break reason;
            }
            if let Some(reason) = self.check_termination()? {
                break reason;
            }

            match self.config.dispatch_mode {
                DispatchMode::Sequential => {
                    let schedule = self.scheduler.next(&views(&self.slots));
                    match schedule {
                        Schedule::Run(index) => self.sequential_turn(index).await?,
                        Schedule::Done => break TerminationReason::ScheduleComplete,
                    }
                }
                DispatchMode::Concurrent => {
                    if !self.concurrent_round().await? {
                        break TerminationReason::ScheduleComplete;
                    }
                }
            }
        };

        self.finish(reason, initial_version, started_at).await
    }

    fn enter(&mut self, phase: Phase) {
        tracing::trace!(from = %self.phase, to = %phase, step = self.step, "phase transition");
        self.phase = phase;
    }

    fn emit(&self, event: SessionEvent) {
        // No receivers is fine.
        let _ = self.events.send(event);
    }

    fn check_termination(&self) -> SessionResult<Option<TerminationReason>> {
        if self.effects.cancel.is_cancelled() {
            return Ok(Some(TerminationReason::Cancelled));
        }

        if !self.predicates.is_empty() {
            let snapshot = self.store.snapshot()?;
            let context = TerminationContext {
                state: &snapshot.view,
                version: snapshot.version,
                step: self.step,
            };
            if let Some(reason) = self
                .predicates
                .iter()
                .find_map(|predicate| predicate.check(&context))
            {
                return Ok(Some(TerminationReason::Predicate { reason }));
            }
        }

        if !self.slots.iter().any(|slot| slot.active) {
            return Ok(Some(TerminationReason::AllAgentsInactive));
        }

        if self.step >= self.config.max_steps {
            return Ok(Some(TerminationReason::StepBudgetExhausted {
                max_steps: self.config.max_steps,
            }));
        }

        Ok(None)
    }

    async fn sequential_turn(&mut self, index: usize) -> SessionResult<()> {
        self.step += 1;
        let step = self.step;
        self.emit(SessionEvent::TurnStarted {
            step,
            agent_id: self.slots[index].id().clone(),
        });

        let decided = self.decide(index, step).await?;
        self.settle(index, decided).await
    }

    /// Run every active agent against the same snapshot, then settle the
    /// turns in id order. Returns `false` when the round budget is spent.
    async fn concurrent_round(&mut self) -> SessionResult<bool> {
        if self
            .config
            .max_rounds
            .is_some_and(|max_rounds| self.rounds >= max_rounds)
        {
            return Ok(false);
        }
        self.rounds += 1;

        let budget = usize::try_from(self.config.max_steps - self.step).unwrap_or(usize::MAX);
        let indices: Vec<usize> = self
            .slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.active)
            .map(|(index, _)| index)
            .take(budget)
            .collect();

        self.enter(Phase::AwaitingDecision);
        let snapshot = self.store.snapshot()?;
        let mut observations = Vec::with_capacity(indices.len());
        for &index in &indices {
            self.step += 1;
            let step = self.step;
            self.emit(SessionEvent::TurnStarted {
                step,
                agent_id: self.slots[index].id().clone(),
            });
            let agent_id = self.slots[index].id().clone();
            let last_seen = self.slots[index].last_seen;
            let observed = observe(
                self.bus.as_ref(),
                &agent_id,
                last_seen,
                self.config.history_limit,
                step,
                &snapshot,
            )
            .await?;
            observations.push(observed);
        }
        tracing::debug!(
            round = self.rounds,
            agents = indices.len(),
            version = %snapshot.version,
            "concurrent round started"
        );

        let outcomes = {
            let cancel = &self.effects.cancel;
            let turns = self
                .slots
                .iter_mut()
                .enumerate()
                .filter_map(|(index, slot)| {
                    indices
                        .iter()
                        .position(|&candidate| candidate == index)
                        .map(|position| (slot, &observations[position].0))
                })
                .map(|(slot, observation)| async move {
                    let token = cancel.child_token();
                    slot.runtime.take_turn(observation, &token).await
                });
            join_all(turns).await
        };

        for ((&index, outcome), (observation, _)) in
            indices.iter().zip(&outcomes).zip(&observations)
        {
            self.after_decision(index, observation.step, outcome);
        }

        // Turns after the first Terminate in id order can never take effect,
        // so their tool calls are not run.
        let cutoff = outcomes
            .iter()
            .position(|outcome| outcome.action.is_terminate())
            .map_or(outcomes.len(), |position| position + 1);

        self.enter(Phase::ApplyingEffects);
        let grants: Vec<Grant> = indices.iter().map(|&index| self.grant(index)).collect();
        let mut staged: Vec<Option<Staged>> = {
            let effects = &self.effects;
            join_all(
                grants
                    .iter()
                    .zip(&outcomes)
                    .take(cutoff)
                    .map(|(grant, outcome)| effects.stage(grant, &outcome.action)),
            )
            .await
            .into_iter()
            .map(Some)
            .collect()
        };
        staged.resize_with(outcomes.len(), || None);

        let turns = indices
            .into_iter()
            .zip(grants)
            .zip(observations)
            .zip(outcomes.into_iter().zip(staged));
        for (((index, grant), (observation, observed_through)), (outcome, staged)) in turns {
            if self.termination.is_some() {
                let mut decided = Decided {
                    step: observation.step,
                    observation,
                    observed_through,
                    outcome,
                    staged: staged.unwrap_or_default(),
                    discarded: Vec::new(),
                };
                self.supersede(&mut decided)?;
                continue;
            }

            let staged = match staged {
                Some(staged) => staged,
                None => self.effects.stage(&grant, &outcome.action).await,
            };
            let decided = Decided {
                step: observation.step,
                observation,
                observed_through,
                outcome,
                staged,
                discarded: Vec::new(),
            };
            self.settle(index, decided).await?;
        }

        Ok(true)
    }

    async fn decide(&mut self, index: usize, step: u64) -> SessionResult<Decided> {
        self.enter(Phase::AwaitingDecision);
        let snapshot = self.store.snapshot()?;
        let grant = self.grant(index);
        let last_seen = self.slots[index].last_seen;
        let (observation, observed_through) = observe(
            self.bus.as_ref(),
            &grant.agent_id,
            last_seen,
            self.config.history_limit,
            step,
            &snapshot,
        )
        .await?;

        let token = self.effects.cancel.child_token();
        let outcome = self.slots[index]
            .runtime
            .take_turn(&observation, &token)
            .await;
        self.after_decision(index, step, &outcome);

        self.enter(Phase::ApplyingEffects);
        let staged = self.effects.stage(&grant, &outcome.action).await;

        Ok(Decided {
            step,
            observation,
            observed_through,
            outcome,
            staged,
            discarded: Vec::new(),
        })
    }

    fn grant(&self, index: usize) -> Grant {
        let slot = &self.slots[index];
        Grant {
            agent_id: slot.id().clone(),
            capabilities: slot.capabilities.clone(),
            output_key: slot.output_key.clone(),
        }
    }

    fn after_decision(&mut self, index: usize, step: u64, outcome: &TurnOutcome) {
        let slot = &mut self.slots[index];
        let agent_id = slot.id().clone();
        if outcome.deactivate {
            slot.active = false;
            tracing::warn!(agent_id = %agent_id, "agent deactivated after fatal error");
        }
        for fault in &outcome.faults {
            self.emit(SessionEvent::Fault {
                fault: fault.clone(),
            });
        }
        tracing::debug!(
            agent_id = %agent_id,
            action = outcome.action.kind(),
            attempts = outcome.attempts,
            "action decided"
        );
        self.emit(SessionEvent::ActionDecided {
            step,
            agent_id,
            action: outcome.action.clone(),
        });
    }

    /// Commit a decided turn, re-deciding on version conflicts until the
    /// retry budget runs out.
    async fn settle(&mut self, index: usize, mut decided: Decided) -> SessionResult<()> {
        let mut faults = std::mem::take(&mut decided.outcome.faults);
        let mut conflicts = 0u32;

        loop {
            self.enter(Phase::CommittingState);
            let agent_id = self.slots[index].id().clone();

            if self.effects.cancel.is_cancelled() {
                let version = self.store.version()?;
                self.record(&decided, EffectResult::Cancelled, version, conflicts, faults);
                self.termination = Some(TerminationReason::Cancelled);
                return Ok(());
            }

            let base = decided.observation.state_version;
            let committed = if decided.staged.delta.is_empty() {
                Ok(None)
            } else {
                match self.store.commit(base, &decided.staged.delta) {
                    Ok(version) => Ok(Some(version)),
                    Err(err) if err.is_conflict() => Err(err),
                    Err(err) => return Err(err.into()),
                }
            };

            match committed {
                Ok(committed) => {
                    let version_after = match committed {
                        Some(version) => {
                            tracing::debug!(
                                agent_id = %agent_id,
                                base = %base,
                                version = %version,
                                ops = decided.staged.delta.len(),
                                "turn committed"
                            );
                            self.emit(SessionEvent::StateCommitted {
                                version,
                                agent_id: agent_id.clone(),
                            });
                            version
                        }
                        None => self.store.version()?,
                    };

                    let effect = self.publish(&decided).await?;
                    self.bookkeep(index, &decided);
                    if let Some(reason) = &decided.staged.terminate {
                        tracing::info!(agent_id = %agent_id, reason = %reason, "agent requested termination");
                        self.termination = Some(TerminationReason::AgentTerminated {
                            agent_id,
                            reason: reason.clone(),
                        });
                    }
                    self.record(&decided, effect, version_after, conflicts, faults);
                    return Ok(());
                }
                Err(conflict) => {
                    conflicts += 1;
                    let fault = Fault {
                        agent_id: agent_id.clone(),
                        kind: FaultKind::CommitConflict,
                        attempt: conflicts,
                        message: conflict.to_string(),
                    };
                    tracing::warn!(
                        agent_id = %agent_id,
                        conflicts,
                        error = %conflict,
                        "commit conflicted"
                    );
                    self.emit(SessionEvent::Fault {
                        fault: fault.clone(),
                    });
                    faults.push(fault);

                    if conflicts > self.config.max_commit_retries {
                        let version = self.store.version()?;
                        let slot = &mut self.slots[index];
                        slot.turns_taken += 1;
                        slot.yielded = true;
                        let reason = format!("dropped after {conflicts} conflicting commits");
                        tracing::warn!(agent_id = %agent_id, "{reason}");
                        self.record(
                            &decided,
                            EffectResult::Dropped { reason },
                            version,
                            conflicts,
                            faults,
                        );
                        return Ok(());
                    }

                    let mut discarded = std::mem::take(&mut decided.discarded);
                    discarded.push(decided.outcome.action.clone());
                    decided = self.decide(index, decided.step).await?;
                    decided.discarded = discarded;
                    faults.append(&mut decided.outcome.faults);
                }
            }
        }
    }

    /// Record a concurrent turn that was decided but never applied because
    /// an earlier turn of the round ended the session.
    fn supersede(&mut self, decided: &mut Decided) -> SessionResult<()> {
        let version = self.store.version()?;
        let faults = std::mem::take(&mut decided.outcome.faults);
        tracing::debug!(
            agent_id = %decided.observation.agent_id,
            step = decided.step,
            action = decided.outcome.action.kind(),
            "turn superseded by session end"
        );
        let effect = EffectResult::Superseded {
            tool_result: decided.staged.tool_result.take(),
        };
        self.record(decided, effect, version, 0, faults);
        Ok(())
    }

    /// Append the staged drafts to the bus, after a successful commit.
    async fn publish(&mut self, decided: &Decided) -> SessionResult<EffectResult> {
        let mut last_seq = None;
        for draft in &decided.staged.drafts {
            let sender = draft.sender.clone();
            let seq_no = self.bus.append(draft.clone()).await?;
            self.emit(SessionEvent::MessageAppended { seq_no, sender });
            last_seq = Some(seq_no);
        }

        let effect = match (last_seq, &decided.staged.tool_result, &decided.staged.terminate) {
            (Some(seq_no), Some(result), _) => EffectResult::ToolCall {
                result: result.clone(),
                seq_no,
            },
            (Some(seq_no), None, _) => EffectResult::Message { seq_no },
            (None, _, Some(reason)) => EffectResult::Terminated {
                reason: reason.clone(),
            },
            (None, _, None) => EffectResult::None,
        };
        Ok(effect)
    }

    fn bookkeep(&mut self, index: usize, decided: &Decided) {
        let progressed = !decided.outcome.action.is_yield();
        if progressed {
            for slot in &mut self.slots {
                slot.yielded = false;
            }
        }

        let slot = &mut self.slots[index];
        slot.turns_taken += 1;
        slot.last_seen = decided.observed_through;
        slot.pending_result = decided.staged.tool_result.is_some();
        if !progressed {
            slot.yielded = true;
        }
    }

    fn record(
        &mut self,
        decided: &Decided,
        effect: EffectResult,
        state_version_after: Version,
        commit_conflicts: u32,
        faults: Vec<Fault>,
    ) {
        let record = TranscriptRecord {
            seq_no: self.records.len() as u64 + 1,
            step: decided.step,
            agent_id: decided.observation.agent_id.clone(),
            action: decided.outcome.action.clone(),
            discarded: decided.discarded.clone(),
            effect,
            state_version_before: decided.observation.state_version,
            state_version_after,
            observed_through: decided.observed_through,
            commit_conflicts,
            faults,
            recorded_at: Utc::now(),
        };
        self.records.push(record);
    }

    async fn finish(
        mut self,
        reason: TerminationReason,
        initial_version: Version,
        started_at: DateTime<Utc>,
    ) -> SessionResult<Transcript> {
        self.enter(Phase::Terminated);
        self.bus.close().await;

        let messages: Vec<_> = self.bus.read_since(SeqNo::ZERO).await?.collect();
        let final_version = self.store.version()?;
        tracing::info!(
            reason = %reason,
            steps = self.step,
            records = self.records.len(),
            messages = messages.len(),
            final_version = %final_version,
            "session terminated"
        );
        self.emit(SessionEvent::Terminated {
            reason: reason.clone(),
        });

        Ok(Transcript {
            header: TranscriptHeader {
                metadata: self.metadata,
                initial_version,
                final_version,
                termination: reason,
                record_count: self.records.len(),
                started_at,
                finished_at: Utc::now(),
            },
            records: self.records,
            messages,
        })
    }
}
