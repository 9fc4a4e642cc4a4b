//! Live session events for observers outside the core.

use conclave_core::{Action, AgentId, SeqNo, Sender, Version};
use futures::Stream;
use serde::Serialize;
use std::pin::Pin;
use tokio::sync::broadcast;

use crate::runtime::Fault;
use crate::termination::TerminationReason;

/// Capacity of the event channel. Observers that fall further behind skip
/// events rather than slowing the session down.
pub const EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    TurnStarted { step: u64, agent_id: AgentId },
    ActionDecided {
        step: u64,
        agent_id: AgentId,
        action: Action,
    },
    MessageAppended { seq_no: SeqNo, sender: Sender },
    StateCommitted { version: Version, agent_id: AgentId },
    Fault { fault: Fault },
    Terminated { reason: TerminationReason },
}

pub type EventStream = Pin<Box<dyn Stream<Item = SessionEvent> + Send + 'static>>;

/// Turn a receiver into a stream that ends when the session does.
pub fn event_stream(mut receiver: broadcast::Receiver<SessionEvent>) -> EventStream {
    let stream = async_stream::stream! {
        loop {
            match receiver.recv().await {
                Ok(event) => yield event,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "event observer lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    };
    Box::pin(stream)
}
