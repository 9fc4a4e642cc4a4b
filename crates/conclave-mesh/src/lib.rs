//! # Conclave Mesh
//!
//! The session message bus: an append-only, totally ordered log that the
//! orchestrator writes and agents observe.
//!
//! ## Features
//!
//! - **Total order**: sequence numbers are assigned under the append lock
//! - **Lazy reads**: `read_since` returns a bounded cursor, restartable from
//!   any sequence number
//! - **Live tailing**: `subscribe` streams messages appended afterwards
//! - **Metrics**: append, read and rejection counters
//!
//! ## Example
//!
//! ```rust
//! use conclave_core::{MessageDraft, SeqNo, Sender};
//! use conclave_mesh::{InMemoryBus, MessageBus, MeshError};
//!
//! # tokio_test::block_on(async {
//! let bus = InMemoryBus::new();
//! bus.append(MessageDraft::text(Sender::System, "session started")).await?;
//! bus.close().await;
//!
//! let err = bus.append(MessageDraft::text(Sender::System, "late")).await;
//! assert_eq!(err, Err(MeshError::Closed));
//! assert_eq!(bus.read_since(SeqNo::ZERO).await?.count(), 1);
//! # Ok::<(), MeshError>(())
//! # }).unwrap();
//! ```

pub mod bus;
pub mod error;
pub mod in_memory;
pub mod metrics;

pub use bus::{BusCursor, MessageBus, MessageLog, MessageStream};
pub use error::{MeshError, MeshResult};
pub use in_memory::InMemoryBus;
pub use metrics::{MeshMetrics, MeshMetricsCollector};
