use async_trait::async_trait;
use chrono::Utc;
use conclave_core::{Message, MessageDraft, SeqNo};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::broadcast;

use crate::bus::{BusCursor, MessageBus, MessageLog, MessageStream};
use crate::error::{MeshError, MeshResult};
use crate::metrics::{MeshMetrics, MeshMetricsCollector};

/// Capacity of the live subscription channel. Slow subscribers past this
/// point receive `MeshError::Lagged`; the log itself is unaffected.
const SUBSCRIPTION_CAPACITY: usize = 1024;

#[derive(Default)]
struct Log {
    // Index i holds sequence number i + 1.
    entries: RwLock<Vec<Message>>,
}

impl MessageLog for Log {
    fn entry(&self, seq_no: SeqNo) -> Option<Message> {
        let index = usize::try_from(seq_no.get().checked_sub(1)?).ok()?;
        let entries = self.entries.read().ok()?;
        entries.get(index).cloned()
    }
}

/// In-process bus backing a single session.
///
/// Appends serialize on the log's write lock, which is also where sequence
/// numbers are assigned, so log order and sequence order always agree.
pub struct InMemoryBus {
    log: Arc<Log>,
    closed: AtomicBool,
    live: Mutex<Option<broadcast::Sender<Message>>>,
    metrics: MeshMetricsCollector,
}

impl InMemoryBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(SUBSCRIPTION_CAPACITY);
        Self {
            log: Arc::new(Log::default()),
            closed: AtomicBool::new(false),
            live: Mutex::new(Some(sender)),
            metrics: MeshMetricsCollector::new(),
        }
    }

    /// Copy of the whole log, oldest first.
    pub fn messages(&self) -> MeshResult<Vec<Message>> {
        let entries = self
            .log
            .entries
            .read()
            .map_err(|_| MeshError::LockPoisoned("messages"))?;
        Ok(entries.clone())
    }

    fn append_locked(&self, draft: MessageDraft) -> MeshResult<Message> {
        let mut entries = self
            .log
            .entries
            .write()
            .map_err(|_| MeshError::LockPoisoned("append"))?;

        // Checked under the write lock so no append can slip in after close.
        if self.closed.load(Ordering::Acquire) {
            return Err(MeshError::Closed);
        }

        let seq_no = SeqNo::new(entries.len() as u64 + 1);
        let message = draft.seal(seq_no, Utc::now());
        entries.push(message.clone());
        Ok(message)
    }
}

impl Default for InMemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InMemoryBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryBus")
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl MessageBus for InMemoryBus {
    async fn append(&self, draft: MessageDraft) -> MeshResult<SeqNo> {
        let message = match self.append_locked(draft) {
            Ok(message) => message,
            Err(MeshError::Closed) => {
                self.metrics.record_rejected_append().await;
                tracing::debug!("append rejected: bus closed");
                return Err(MeshError::Closed);
            }
            Err(e) => return Err(e),
        };

        let seq_no = message.seq_no;
        if let Ok(live) = self.live.lock()
            && let Some(sender) = live.as_ref()
        {
            // No receivers is fine.
            let _ = sender.send(message);
        }

        self.metrics.record_append().await;
        tracing::trace!(%seq_no, "message appended");
        Ok(seq_no)
    }

    async fn read_since(&self, seq_no: SeqNo) -> MeshResult<BusCursor> {
        let last = self.last_seq().await?;
        if seq_no > last {
            return Err(MeshError::InvalidCursor {
                requested: seq_no,
                last,
            });
        }

        self.metrics.record_read().await;
        let log: Arc<dyn MessageLog> = self.log.clone();
        Ok(BusCursor::new(log, seq_no, last))
    }

    async fn last_seq(&self) -> MeshResult<SeqNo> {
        Ok(SeqNo::new(self.len().await? as u64))
    }

    async fn len(&self) -> MeshResult<usize> {
        let entries = self
            .log
            .entries
            .read()
            .map_err(|_| MeshError::LockPoisoned("len"))?;
        Ok(entries.len())
    }

    async fn close(&self) {
        // Take the write lock so close is ordered against in-flight appends.
        let _entries = self.log.entries.write();
        self.closed.store(true, Ordering::Release);
        if let Ok(mut live) = self.live.lock() {
            live.take();
        }
        tracing::debug!("bus closed");
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    async fn subscribe(&self) -> MeshResult<MessageStream> {
        let mut receiver = {
            let live = self
                .live
                .lock()
                .map_err(|_| MeshError::LockPoisoned("subscribe"))?;
            live.as_ref().ok_or(MeshError::Closed)?.subscribe()
        };
        self.metrics.record_subscriber().await;

        let stream = async_stream::stream! {
            loop {
                match receiver.recv().await {
                    Ok(message) => yield Ok(message),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        yield Err(MeshError::Lagged { skipped });
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        };
        Ok(Box::pin(stream))
    }

    async fn metrics(&self) -> MeshMetrics {
        self.metrics.snapshot().await
    }
}
