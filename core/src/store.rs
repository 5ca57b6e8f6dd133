//! Capability traits for the two collaborator stores.
//!
//! The core is persistence- and transport-agnostic: it drives a
//! [`LocalStore`] (message log + cell view on this device) and a
//! [`RemoteStore`] (the shared message log) purely through these traits.
//! Concrete stores are values implementing them; the in-memory reference
//! implementations live in [`crate::memory`].

use crate::error::{RemoteError, StoreError};
use crate::merge::{self, MergeOutcome};
use crate::message::Message;
use crate::MessageId;
use async_trait::async_trait;

/// Mailbox for live-tail batches.
///
/// A remote store delivers newly accepted message batches by sending them
/// into this channel; the replicator drains it from its own task, so the
/// subscription never holds a reference back into the replicator.
pub type BatchSink = tokio::sync::mpsc::UnboundedSender<Vec<Message>>;

/// Handle to an active live-tail subscription.
///
/// Dropping the handle without calling [`cancel`](Subscription::cancel)
/// leaves the subscription running until the remote ends it.
pub trait Subscription: Send {
    /// Stop delivery. Idempotent.
    fn cancel(&mut self);
}

/// Local persistence: the message log and the materialized cell view.
///
/// Implementations are responsible for the atomicity of the
/// apply-to-view + append-to-log pair for a single message. Cross-message
/// atomicity is not required.
#[async_trait]
pub trait LocalStore: Send + Sync {
    /// One-time setup (schema creation, file open, ...).
    async fn init(&self) -> Result<(), StoreError>;

    /// Update the cell addressed by `(table, row, column)` with the
    /// message's value. Failure is non-fatal to callers: the message
    /// stays in the log.
    async fn apply_to_view(&self, message: &Message) -> Result<(), StoreError>;

    /// Persist the message in the log. A duplicate `id` is a no-op
    /// success.
    async fn append_to_log(&self, message: &Message) -> Result<(), StoreError>;

    /// The maximum `local_timestamp` recorded for a cell, or `None` if
    /// the cell has never been written.
    async fn latest_cell_timestamp(
        &self,
        table: &str,
        row: &str,
        column: &str,
    ) -> Result<Option<String>, StoreError>;

    /// Local-write path: apply to the view unconditionally, then append
    /// to the log. Local messages carry the newest timestamp this replica
    /// has produced, so no merge decision is needed.
    async fn save_local_change(&self, message: &Message) -> Result<(), StoreError> {
        let mut stored = message.clone();
        match self.apply_to_view(&stored).await {
            Ok(()) => stored.has_been_applied = true,
            Err(err) => {
                tracing::warn!(id = %stored.id, error = %err, "cell view update failed; message kept in log");
            }
        }
        self.append_to_log(&stored).await
    }

    /// Server path for one message: merge-decide against the cell's
    /// latest timestamp, apply to the view iff the message wins, then
    /// append to the log. Returns whether the view was updated.
    /// Replaying an already-logged `id` leaves both log and view intact.
    async fn save_server_message(&self, message: &Message) -> Result<bool, StoreError> {
        let current = self
            .latest_cell_timestamp(&message.table, &message.row, &message.column)
            .await?;
        let mut stored = message.clone();
        stored.has_been_synced = true;
        if merge::decide(&stored.local_timestamp, current.as_deref()) == MergeOutcome::Applied {
            match self.apply_to_view(&stored).await {
                Ok(()) => stored.has_been_applied = true,
                Err(err) => {
                    tracing::warn!(id = %stored.id, error = %err, "cell view update failed; message kept in log");
                }
            }
        }
        self.append_to_log(&stored).await?;
        Ok(stored.has_been_applied)
    }

    /// Server path for a batch: [`save_server_message`] each, then
    /// advance the cursor to the greatest `server_timestamp` in the batch
    /// iff every message persisted. Returns whether all persisted.
    ///
    /// [`save_server_message`]: LocalStore::save_server_message
    async fn save_server_batch(&self, batch: &[Message]) -> Result<bool, StoreError> {
        let mut all_persisted = true;
        for message in batch {
            if let Err(err) = self.save_server_message(message).await {
                tracing::warn!(id = %message.id, error = %err, "failed to persist server message");
                all_persisted = false;
            }
        }
        if all_persisted {
            if let Some(cursor) = batch.iter().filter_map(|m| m.server_timestamp).max() {
                self.write_cursor(cursor).await?;
            }
        }
        Ok(all_persisted)
    }

    /// The highest server timestamp this replica has fully persisted.
    async fn read_cursor(&self) -> Result<Option<u64>, StoreError>;

    /// Record a new cursor position.
    async fn write_cursor(&self, cursor: u64) -> Result<(), StoreError>;

    /// Every message not yet accepted by the remote log, in insertion
    /// order.
    async fn unsynced(&self) -> Result<Vec<Message>, StoreError>;

    /// Flip `has_been_synced` for each id. Unknown ids are ignored.
    async fn mark_synced(&self, ids: &[MessageId]) -> Result<(), StoreError>;
}

/// The shared remote message log.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Messages with `server_timestamp > cursor`, belonging to `user_id`
    /// and originated by a client other than `client_id`, in server
    /// order. A `None` cursor means "from the beginning".
    async fn fetch_since(
        &self,
        cursor: Option<u64>,
        user_id: &str,
        client_id: &str,
    ) -> Result<Vec<Message>, RemoteError>;

    /// Push a single message. `false` means the server declined it; the
    /// caller keeps it queued and retries later.
    async fn send_message(&self, message: &Message) -> Result<bool, RemoteError>;

    /// Push a batch, returning the accepted ids. The default loops
    /// [`send_message`](RemoteStore::send_message); implementations
    /// should override with a true bulk insert.
    async fn send_batch(&self, batch: &[Message]) -> Result<Vec<MessageId>, RemoteError> {
        let mut accepted = Vec::with_capacity(batch.len());
        for message in batch {
            if self.send_message(message).await? {
                accepted.push(message.id.clone());
            }
        }
        Ok(accepted)
    }

    /// Subscribe to the live tail of newly accepted messages, filtered
    /// like [`fetch_since`](RemoteStore::fetch_since). Whether messages
    /// between `cursor` and the subscribe call are redelivered is up to
    /// the implementation; the replicator always follows a subscribe with
    /// a pull, so tail-only implementations lose nothing.
    async fn subscribe(
        &self,
        user_id: &str,
        client_id: &str,
        cursor: Option<u64>,
        sink: BatchSink,
    ) -> Result<Box<dyn Subscription>, RemoteError>;
}
