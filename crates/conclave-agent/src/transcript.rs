//! Immutable session transcripts.
//!
//! A transcript is the finalized record of a session: one entry per agent
//! turn plus the full bus log, serialized as JSON for replay or offline
//! analysis.

use chrono::{DateTime, Utc};
use conclave_core::{
    Action, AgentId, DecisionError, DecisionResult, Message, SeqNo, ToolResult, Version,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::agents::ReplayAgent;
use crate::error::{SessionError, SessionResult};
use crate::runtime::{Fault, FaultKind};
use crate::session::SessionMetadata;
use crate::termination::TerminationReason;

/// What applying a turn's action did.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EffectResult {
    /// `Yield`, or an action with nothing to publish.
    None,
    /// A `Speak` appended to the bus.
    Message { seq_no: SeqNo },
    /// An `Invoke` whose result was appended to the bus.
    ToolCall { result: ToolResult, seq_no: SeqNo },
    /// A `Terminate` ended the session.
    Terminated { reason: String },
    /// Commit conflicts exhausted the retry budget; nothing was applied.
    Dropped { reason: String },
    /// The session was cancelled before the turn could commit.
    Cancelled,
    /// A concurrent turn decided in the same round as the one that ended
    /// the session. Nothing was committed or published; a tool that already
    /// ran reports its result here.
    Superseded {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tool_result: Option<ToolResult>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptRecord {
    /// Position in the transcript, starting at 1.
    pub seq_no: u64,
    pub step: u64,
    pub agent_id: AgentId,
    pub action: Action,
    /// Actions decided earlier in the turn whose commits conflicted, oldest
    /// first. `action` is the decision that was finally settled.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub discarded: Vec<Action>,
    pub effect: EffectResult,
    /// Version of the snapshot the final decision was made against.
    pub state_version_before: Version,
    pub state_version_after: Version,
    /// Last bus sequence number the agent's observation covered.
    pub observed_through: SeqNo,
    /// Commits that failed with a version conflict during this turn.
    #[serde(default)]
    pub commit_conflicts: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub faults: Vec<Fault>,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptHeader {
    pub metadata: SessionMetadata,
    pub initial_version: Version,
    pub final_version: Version,
    pub termination: TerminationReason,
    pub record_count: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transcript {
    pub header: TranscriptHeader,
    pub records: Vec<TranscriptRecord>,
    pub messages: Vec<Message>,
}

impl Transcript {
    pub fn to_json(&self) -> SessionResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse a transcript, checking the header agrees with the body.
    pub fn from_json(json: &str) -> SessionResult<Self> {
        let transcript: Transcript = serde_json::from_str(json)?;
        if transcript.header.record_count != transcript.records.len() {
            return Err(SessionError::Serialization(format!(
                "header declares {} records but transcript holds {}",
                transcript.header.record_count,
                transcript.records.len()
            )));
        }
        Ok(transcript)
    }

    pub fn termination(&self) -> &TerminationReason {
        &self.header.termination
    }

    /// State version after each record, in order.
    pub fn version_sequence(&self) -> Vec<Version> {
        self.records
            .iter()
            .map(|record| record.state_version_after)
            .collect()
    }

    /// Number of records whose action is of the given kind
    /// (`speak`, `invoke`, `yield`, `terminate`).
    pub fn count_actions(&self, kind: &str) -> usize {
        self.records
            .iter()
            .filter(|record| record.action.kind() == kind)
            .count()
    }

    pub fn records_for<'a>(
        &'a self,
        agent_id: &'a AgentId,
    ) -> impl Iterator<Item = &'a TranscriptRecord> + 'a {
        self.records
            .iter()
            .filter(move |record| &record.agent_id == agent_id)
    }

    /// Every fault recorded during the session.
    pub fn faults(&self) -> impl Iterator<Item = &Fault> {
        self.records.iter().flat_map(|record| record.faults.iter())
    }

    /// Recorded actions grouped by agent, in turn order.
    pub fn actions_by_agent(&self) -> BTreeMap<AgentId, Vec<Action>> {
        let mut actions: BTreeMap<AgentId, Vec<Action>> = BTreeMap::new();
        for record in &self.records {
            actions
                .entry(record.agent_id.clone())
                .or_default()
                .push(record.action.clone());
        }
        actions
    }

    /// Stub agents that replay each agent's recorded decisions.
    ///
    /// A turn that ended in a fatal fault replays as that fatal error, so the
    /// agent is deactivated at the same point. Decisions discarded by commit
    /// conflicts are replayed ahead of the settled one. Running the stubs
    /// against the same roster settings, initial state and tools reproduces
    /// the recorded version sequence unless the original store was also
    /// written from outside the session.
    pub fn replay_agents(&self) -> Vec<(AgentId, ReplayAgent)> {
        let mut decisions: BTreeMap<AgentId, Vec<DecisionResult<Action>>> = BTreeMap::new();
        for record in &self.records {
            let agent_decisions = decisions.entry(record.agent_id.clone()).or_default();
            agent_decisions.extend(record.discarded.iter().cloned().map(Ok));
            let fatal = record
                .faults
                .iter()
                .find(|fault| fault.kind == FaultKind::Fatal);
            let decision = match fatal {
                Some(fault) => Err(DecisionError::fatal(fault.message.clone())),
                None => Ok(record.action.clone()),
            };
            agent_decisions.push(decision);
        }
        decisions
            .into_iter()
            .map(|(agent_id, decisions)| (agent_id, ReplayAgent::from_decisions(decisions)))
            .collect()
    }
}
