//! # Ferry Core
//!
//! An offline-first replication core for local-first applications.
//!
//! Every user edit is recorded as a [`Message`] — a cell-level mutation of
//! `(table, row, column)` — applied to the local cell view immediately,
//! replicated to a remote message log, and merged back on other replicas.
//! Conflicts resolve per cell by last-writer-wins over a hybrid logical
//! clock, so any two replicas that have exchanged the same messages
//! converge to identical cell values regardless of delivery order or
//! clock skew.
//!
//! ## Design Principles
//!
//! - **Storage- and transport-agnostic**: persistence and networking live
//!   behind the [`LocalStore`] and [`RemoteStore`] traits
//! - **Convergent**: merge decisions depend only on message timestamps,
//!   never on arrival order
//! - **Offline-first**: local writes always succeed; syncing is a
//!   background concern that can be off for arbitrarily long
//!
//! ## Core Concepts
//!
//! ### Hybrid logical clock
//!
//! The [`Hlc`] combines wall-clock milliseconds, a logical counter, and a
//! node id into a total order consistent with causality. One [`HlcClock`]
//! engine per replicator stamps outgoing messages (`send`) and folds in
//! remote timestamps (`receive`).
//!
//! ### Messages
//!
//! A [`Message`] is the unit of replication: one cell assignment with a
//! typed payload (see [`Value`]), the writer's packed clock, and identity
//! fields. The local message log is append-only.
//!
//! ### Merging
//!
//! The merge decision ([`merge::decide`]) applies an incoming message to
//! the cell view iff its timestamp is strictly greater than the latest
//! recorded for that cell; everything is kept in the log either way.
//!
//! ### The replicator
//!
//! The [`Replicator`] owns the clock, a debounced push scheduler, the
//! remote live-tail subscription, and a broadcast [`ChangeEvent`] stream.
//!
//! ## Quick Start
//!
//! ```
//! use std::sync::Arc;
//! use ferry_core::{
//!     MemoryLocalStore, MemoryRemoteStore, Replicator, ReplicatorConfig, Value,
//! };
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), ferry_core::Error> {
//! let local = Arc::new(MemoryLocalStore::new());
//! let remote = Arc::new(MemoryRemoteStore::new());
//! let replicator = Replicator::new(
//!     "user-1",
//!     "client-1",
//!     local.clone(),
//!     remote,
//!     ReplicatorConfig::immediate(),
//! );
//!
//! replicator.set_sync_enabled(true).await?;
//! replicator
//!     .save_change("todos", "todo-1", "title", "Buy milk")
//!     .await?;
//!
//! assert_eq!(
//!     local.cell("todos", "todo-1", "title"),
//!     Some(Value::from("Buy milk"))
//! );
//! replicator.dispose().await;
//! # Ok(())
//! # }
//! ```

pub mod clock;
pub mod error;
pub mod event;
pub mod memory;
pub mod merge;
pub mod message;
pub mod replicator;
pub mod store;
pub mod value;

// Re-export main types at crate root
pub use clock::{compare_packed, wall_clock_ms, Hlc, HlcClock};
pub use error::{Error, RemoteError, Result, StoreError};
pub use event::{ChangeEvent, ChangeSource};
pub use memory::{MemoryLocalStore, MemoryRemoteStore};
pub use merge::MergeOutcome;
pub use message::Message;
pub use replicator::{CellWrite, IdGenerator, Replicator, ReplicatorConfig};
pub use store::{BatchSink, LocalStore, RemoteStore, Subscription};
pub use value::Value;

/// Type aliases for clarity
pub type NodeId = String;
pub type MessageId = String;
pub type ServerTimestamp = u64;
