//! Core MessageBus trait for the session log

use async_trait::async_trait;
use conclave_core::{Message, MessageDraft, SeqNo};
use futures::Stream;
use std::pin::Pin;
use std::sync::Arc;

use crate::{error::MeshResult, metrics::MeshMetrics};

/// Stream type for live subscriptions
pub type MessageStream = Pin<Box<dyn Stream<Item = MeshResult<Message>> + Send + 'static>>;

/// Append-only, totally ordered log of session messages.
///
/// Only the orchestrator appends; agents see the log through the
/// observations it builds. Sequence numbers start at 1 and increase by one
/// per append.
///
/// # Example
///
/// ```rust
/// use conclave_core::{MessageDraft, SeqNo, Sender};
/// use conclave_mesh::{InMemoryBus, MessageBus};
///
/// # tokio_test::block_on(async {
/// let bus = InMemoryBus::new();
/// let first = bus.append(MessageDraft::text(Sender::System, "hello")).await?;
/// bus.append(MessageDraft::text(Sender::System, "world")).await?;
///
/// let later: Vec<_> = bus.read_since(first).await?.collect();
/// assert_eq!(later.len(), 1);
/// assert_eq!(later[0].seq_no, SeqNo::new(2));
/// # Ok::<(), conclave_mesh::MeshError>(())
/// # }).unwrap();
/// ```
#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Append a message, returning its sequence number.
    ///
    /// # Errors
    ///
    /// Returns `MeshError::Closed` once the bus has been closed.
    async fn append(&self, draft: MessageDraft) -> MeshResult<SeqNo>;

    /// Messages with a sequence number strictly greater than `seq_no`.
    ///
    /// The cursor is bounded by the log length at the time of the call, so
    /// it always terminates. Reading is allowed after the bus is closed.
    ///
    /// # Errors
    ///
    /// Returns `MeshError::InvalidCursor` if `seq_no` is past the end.
    async fn read_since(&self, seq_no: SeqNo) -> MeshResult<BusCursor>;

    /// Sequence number of the newest message, or `SeqNo::ZERO` if empty.
    async fn last_seq(&self) -> MeshResult<SeqNo>;

    async fn len(&self) -> MeshResult<usize>;

    async fn is_empty(&self) -> MeshResult<bool> {
        Ok(self.len().await? == 0)
    }

    /// Reject further appends and end all live subscriptions.
    async fn close(&self);

    fn is_closed(&self) -> bool;

    /// Live stream of messages appended after this call.
    async fn subscribe(&self) -> MeshResult<MessageStream>;

    async fn metrics(&self) -> MeshMetrics;
}

/// Random access to stored messages, used by [`BusCursor`].
pub trait MessageLog: Send + Sync {
    fn entry(&self, seq_no: SeqNo) -> Option<Message>;
}

/// Lazy, finite iterator over a window of the log.
///
/// Messages are fetched one at a time as the cursor advances; nothing is
/// copied up front.
pub struct BusCursor {
    log: Arc<dyn MessageLog>,
    next: SeqNo,
    end: SeqNo,
}

impl BusCursor {
    /// Cursor yielding `(after, end]`.
    pub fn new(log: Arc<dyn MessageLog>, after: SeqNo, end: SeqNo) -> Self {
        Self {
            log,
            next: after.next(),
            end,
        }
    }

    /// Rewind or skip ahead so the next item is the one after `seq_no`.
    ///
    /// The upper bound is unchanged.
    pub fn restart_from(&mut self, seq_no: SeqNo) {
        self.next = seq_no.next();
    }

    /// Last sequence number this cursor will yield.
    pub fn end(&self) -> SeqNo {
        self.end
    }

    pub fn remaining(&self) -> usize {
        if self.next > self.end {
            0
        } else {
            (self.end.get() - self.next.get() + 1) as usize
        }
    }
}

impl Iterator for BusCursor {
    type Item = Message;

    fn next(&mut self) -> Option<Message> {
        if self.next > self.end {
            return None;
        }
        let message = self.log.entry(self.next)?;
        self.next = self.next.next();
        Some(message)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.remaining()))
    }
}

impl std::fmt::Debug for BusCursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BusCursor")
            .field("next", &self.next)
            .field("end", &self.end)
            .finish()
    }
}
