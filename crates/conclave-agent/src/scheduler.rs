//! Scheduling policies.
//!
//! The orchestrator keeps its roster sorted by agent id and hands the
//! scheduler a view of every slot. Returning the lowest eligible index is
//! therefore the "lowest agent id wins" tie-break.

use conclave_core::AgentId;

use crate::config::{SchedulingPolicy, SessionConfig};

/// What the scheduler knows about one roster slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentView<'a> {
    pub id: &'a AgentId,
    pub priority: i32,
    pub active: bool,
    pub turns_taken: u64,
    /// Yielded and no agent has made progress since.
    pub yielded: bool,
    /// An `Invoke` of this agent produced a result it has not seen yet.
    pub has_pending_result: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schedule {
    /// Run the agent at this roster index.
    Run(usize),
    /// The policy has nothing more to schedule; the session ends.
    Done,
}

/// Picks the next agent to run.
///
/// Implementations only see active agents as candidates; the orchestrator
/// ends the session before asking when no agent is active.
pub trait Scheduler: Send {
    fn next(&mut self, agents: &[AgentView<'_>]) -> Schedule;

    fn name(&self) -> &'static str;
}

/// Build the scheduler configured for a session.
pub fn scheduler_for(config: &SessionConfig) -> Box<dyn Scheduler> {
    match config.scheduling_policy {
        SchedulingPolicy::RoundRobin => Box::new(RoundRobin::new(config.max_rounds)),
        SchedulingPolicy::Priority => Box::new(PriorityScheduler),
        SchedulingPolicy::Reactive => Box::new(Reactive::new(config.max_rounds)),
        SchedulingPolicy::Sequential => Box::new(Sequential::default()),
    }
}

/// Cycle through active agents in id order, optionally for a bounded
/// number of rounds.
#[derive(Debug, Clone, Default)]
pub struct RoundRobin {
    last: Option<usize>,
    rounds_completed: u64,
    max_rounds: Option<u64>,
}

impl RoundRobin {
    pub fn new(max_rounds: Option<u64>) -> Self {
        Self {
            max_rounds,
            ..Self::default()
        }
    }

    pub fn rounds_completed(&self) -> u64 {
        self.rounds_completed
    }
}

impl Scheduler for RoundRobin {
    fn next(&mut self, agents: &[AgentView<'_>]) -> Schedule {
        let start = self.last.map_or(0, |last| last + 1);
        let Some(index) = (0..agents.len())
            .map(|offset| (start + offset) % agents.len())
            .find(|&index| agents[index].active)
        else {
            return Schedule::Done;
        };

        // Wrapping to an index at or before the previous one starts a new round.
        if let Some(last) = self.last
            && index <= last
        {
            self.rounds_completed += 1;
            if self.max_rounds.is_some_and(|max| self.rounds_completed >= max) {
                return Schedule::Done;
            }
        }

        self.last = Some(index);
        Schedule::Run(index)
    }

    fn name(&self) -> &'static str {
        "round_robin"
    }
}

/// Highest priority first, ties to the lowest id.
///
/// An agent that yielded is passed over until some agent makes progress,
/// so a high-priority agent with nothing to do cannot starve the others.
/// If every active agent has yielded, all become eligible again.
#[derive(Debug, Clone, Copy, Default)]
pub struct PriorityScheduler;

impl Scheduler for PriorityScheduler {
    fn next(&mut self, agents: &[AgentView<'_>]) -> Schedule {
        let pick = |skip_yielded: bool| {
            agents
                .iter()
                .enumerate()
                .filter(|(_, agent)| agent.active && !(skip_yielded && agent.yielded))
                // max_by_key keeps the last maximum; reverse so the lowest index wins.
                .rev()
                .max_by_key(|(_, agent)| agent.priority)
                .map(|(index, _)| index)
        };

        match pick(true).or_else(|| pick(false)) {
            Some(index) => Schedule::Run(index),
            None => Schedule::Done,
        }
    }

    fn name(&self) -> &'static str {
        "priority"
    }
}

/// First agent with an unseen tool result; otherwise round-robin.
#[derive(Debug, Clone, Default)]
pub struct Reactive {
    fallback: RoundRobin,
}

impl Reactive {
    pub fn new(max_rounds: Option<u64>) -> Self {
        Self {
            fallback: RoundRobin::new(max_rounds),
        }
    }
}

impl Scheduler for Reactive {
    fn next(&mut self, agents: &[AgentView<'_>]) -> Schedule {
        match agents
            .iter()
            .position(|agent| agent.active && agent.has_pending_result)
        {
            Some(index) => {
                // Round-robin resumes after the agent that just ran.
                self.fallback.last = Some(index);
                Schedule::Run(index)
            }
            None => self.fallback.next(agents),
        }
    }

    fn name(&self) -> &'static str {
        "reactive"
    }
}

/// Each agent exactly once, in id order: a pipeline.
#[derive(Debug, Clone, Default)]
pub struct Sequential {
    next: usize,
}

impl Scheduler for Sequential {
    fn next(&mut self, agents: &[AgentView<'_>]) -> Schedule {
        match (self.next..agents.len()).find(|&index| agents[index].active) {
            Some(index) => {
                self.next = index + 1;
                Schedule::Run(index)
            }
            None => Schedule::Done,
        }
    }

    fn name(&self) -> &'static str {
        "sequential"
    }
}
