//! In-memory reference implementations of the store traits.
//!
//! `MemoryLocalStore` is a complete local store (message log, cell view,
//! cursor) and `MemoryRemoteStore` is a complete single-process remote log
//! with live-tail fan-out. Both are the substrate for the integration
//! tests and usable as-is for prototyping and embedding.

use crate::clock::compare_packed;
use crate::error::{RemoteError, StoreError};
use crate::message::Message;
use crate::store::{BatchSink, LocalStore, RemoteStore, Subscription};
use crate::value::Value;
use crate::MessageId;
use async_trait::async_trait;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

type CellKey = (String, String, String);

#[derive(Debug, Default)]
struct LocalState {
    log: Vec<Message>,
    ids: HashSet<MessageId>,
    /// Latest packed timestamp per cell, maintained on append.
    latest: HashMap<CellKey, String>,
    /// Cell view holding the raw `(data_type, value)` pair.
    view: HashMap<CellKey, (String, String)>,
    cursor: Option<u64>,
}

/// An in-memory [`LocalStore`].
#[derive(Debug, Default)]
pub struct MemoryLocalStore {
    state: Mutex<LocalState>,
}

impl MemoryLocalStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, LocalState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of messages in the log.
    pub fn log_len(&self) -> usize {
        self.state().log.len()
    }

    /// Snapshot of the full log, in insertion order.
    pub fn messages(&self) -> Vec<Message> {
        self.state().log.clone()
    }

    /// Number of messages not yet accepted remotely.
    pub fn unsynced_len(&self) -> usize {
        self.state()
            .log
            .iter()
            .filter(|m| !m.has_been_synced)
            .count()
    }

    /// Raw `(data_type, value)` pair for a cell.
    pub fn cell_raw(&self, table: &str, row: &str, column: &str) -> Option<(String, String)> {
        self.state()
            .view
            .get(&(table.to_string(), row.to_string(), column.to_string()))
            .cloned()
    }

    /// Decoded value for a cell.
    pub fn cell(&self, table: &str, row: &str, column: &str) -> Option<Value> {
        self.cell_raw(table, row, column)
            .map(|(data_type, raw)| Value::decode(&data_type, &raw))
    }

    /// Current cursor position.
    pub fn cursor(&self) -> Option<u64> {
        self.state().cursor
    }
}

#[async_trait]
impl LocalStore for MemoryLocalStore {
    async fn init(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn apply_to_view(&self, message: &Message) -> Result<(), StoreError> {
        let mut state = self.state();
        state.view.insert(
            (
                message.table.clone(),
                message.row.clone(),
                message.column.clone(),
            ),
            (message.data_type.clone(), message.value.clone()),
        );
        Ok(())
    }

    async fn append_to_log(&self, message: &Message) -> Result<(), StoreError> {
        let mut state = self.state();
        if state.ids.contains(&message.id) {
            return Ok(());
        }
        state.ids.insert(message.id.clone());
        let key = (
            message.table.clone(),
            message.row.clone(),
            message.column.clone(),
        );
        let newer = state.latest.get(&key).map_or(true, |current| {
            compare_packed(&message.local_timestamp, current) == Ordering::Greater
        });
        if newer {
            state.latest.insert(key, message.local_timestamp.clone());
        }
        state.log.push(message.clone());
        Ok(())
    }

    async fn latest_cell_timestamp(
        &self,
        table: &str,
        row: &str,
        column: &str,
    ) -> Result<Option<String>, StoreError> {
        Ok(self
            .state()
            .latest
            .get(&(table.to_string(), row.to_string(), column.to_string()))
            .cloned())
    }

    async fn read_cursor(&self) -> Result<Option<u64>, StoreError> {
        Ok(self.state().cursor)
    }

    async fn write_cursor(&self, cursor: u64) -> Result<(), StoreError> {
        let mut state = self.state();
        state.cursor = Some(state.cursor.map_or(cursor, |current| current.max(cursor)));
        Ok(())
    }

    async fn unsynced(&self) -> Result<Vec<Message>, StoreError> {
        Ok(self
            .state()
            .log
            .iter()
            .filter(|m| !m.has_been_synced)
            .cloned()
            .collect())
    }

    async fn mark_synced(&self, ids: &[MessageId]) -> Result<(), StoreError> {
        let mut state = self.state();
        for id in ids {
            match state.log.iter_mut().find(|m| &m.id == id) {
                Some(message) => message.has_been_synced = true,
                None => {
                    tracing::warn!(id = %id, "mark_synced for unknown message id");
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
struct RemoteState {
    log: Vec<Message>,
    ids: HashSet<MessageId>,
    next_timestamp: u64,
    accept_limit: Option<usize>,
    subscribers: Vec<Subscriber>,
    next_subscription: u64,
}

#[derive(Debug)]
struct Subscriber {
    id: u64,
    user_id: String,
    client_id: String,
    sink: BatchSink,
}

enum Acceptance {
    Stored(Message),
    Duplicate,
    Declined,
}

/// An in-memory [`RemoteStore`]: a single-process stand-in for the shared
/// message log, with server-assigned timestamps and live-tail fan-out.
///
/// The live tail is tail-only: a subscription delivers messages accepted
/// after the subscribe call, and catch-up is the puller's job. An optional
/// acceptance cap ([`set_accept_limit`](MemoryRemoteStore::set_accept_limit))
/// makes the store decline messages beyond a total, which is how the tests
/// exercise partial-batch pushes.
#[derive(Debug, Default, Clone)]
pub struct MemoryRemoteStore {
    state: Arc<Mutex<RemoteState>>,
}

impl MemoryRemoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, RemoteState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Decline messages once the log holds `limit` entries; `None` lifts
    /// the cap.
    pub fn set_accept_limit(&self, limit: Option<usize>) {
        self.state().accept_limit = limit;
    }

    /// Number of accepted messages.
    pub fn log_len(&self) -> usize {
        self.state().log.len()
    }

    /// Snapshot of the accepted log, in server order.
    pub fn messages(&self) -> Vec<Message> {
        self.state().log.clone()
    }

    fn try_accept(state: &mut RemoteState, message: &Message) -> Acceptance {
        if state.ids.contains(&message.id) {
            return Acceptance::Duplicate;
        }
        if let Some(limit) = state.accept_limit {
            if state.log.len() >= limit {
                return Acceptance::Declined;
            }
        }
        state.next_timestamp += 1;
        let mut stored = message.clone();
        stored.server_timestamp = Some(state.next_timestamp);
        // local bookkeeping does not travel with the message
        stored.has_been_applied = false;
        stored.has_been_synced = false;
        state.ids.insert(stored.id.clone());
        state.log.push(stored.clone());
        Acceptance::Stored(stored)
    }

    fn fan_out(state: &mut RemoteState, accepted: &[Message]) {
        for subscriber in &state.subscribers {
            let batch: Vec<Message> = accepted
                .iter()
                .filter(|m| m.user_id == subscriber.user_id && m.client_id != subscriber.client_id)
                .cloned()
                .collect();
            if !batch.is_empty() {
                let _ = subscriber.sink.send(batch);
            }
        }
    }
}

#[async_trait]
impl RemoteStore for MemoryRemoteStore {
    async fn fetch_since(
        &self,
        cursor: Option<u64>,
        user_id: &str,
        client_id: &str,
    ) -> Result<Vec<Message>, RemoteError> {
        let floor = cursor.unwrap_or(0);
        Ok(self
            .state()
            .log
            .iter()
            .filter(|m| m.server_timestamp.is_some_and(|ts| ts > floor))
            .filter(|m| m.user_id == user_id && m.client_id != client_id)
            .cloned()
            .collect())
    }

    async fn send_message(&self, message: &Message) -> Result<bool, RemoteError> {
        let mut state = self.state();
        match Self::try_accept(&mut state, message) {
            Acceptance::Stored(stored) => {
                Self::fan_out(&mut state, &[stored]);
                Ok(true)
            }
            Acceptance::Duplicate => Ok(true),
            Acceptance::Declined => Ok(false),
        }
    }

    async fn send_batch(&self, batch: &[Message]) -> Result<Vec<MessageId>, RemoteError> {
        let mut state = self.state();
        let mut accepted_ids = Vec::with_capacity(batch.len());
        let mut stored_batch = Vec::new();
        for message in batch {
            match Self::try_accept(&mut state, message) {
                Acceptance::Stored(stored) => {
                    accepted_ids.push(stored.id.clone());
                    stored_batch.push(stored);
                }
                Acceptance::Duplicate => accepted_ids.push(message.id.clone()),
                Acceptance::Declined => {}
            }
        }
        if !stored_batch.is_empty() {
            Self::fan_out(&mut state, &stored_batch);
        }
        Ok(accepted_ids)
    }

    async fn subscribe(
        &self,
        user_id: &str,
        client_id: &str,
        _cursor: Option<u64>,
        sink: BatchSink,
    ) -> Result<Box<dyn Subscription>, RemoteError> {
        let mut state = self.state();
        state.next_subscription += 1;
        let id = state.next_subscription;
        state.subscribers.push(Subscriber {
            id,
            user_id: user_id.to_string(),
            client_id: client_id.to_string(),
            sink,
        });
        Ok(Box::new(MemorySubscription {
            id,
            state: Arc::clone(&self.state),
        }))
    }
}

struct MemorySubscription {
    id: u64,
    state: Arc<Mutex<RemoteState>>,
}

impl Subscription for MemorySubscription {
    fn cancel(&mut self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.subscribers.retain(|s| s.id != self.id);
    }
}
