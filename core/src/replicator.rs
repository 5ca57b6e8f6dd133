//! The replicator: the long-lived object that orchestrates the clock, the
//! two stores, and the change stream.
//!
//! A replicator starts disabled: local writes persist and emit change
//! events, but nothing touches the network until
//! [`set_sync_enabled`](Replicator::set_sync_enabled) turns syncing on.
//! Enabling subscribes to the remote live tail and runs one immediate
//! push + pull; disabling cancels both. [`dispose`](Replicator::dispose)
//! is terminal.
//!
//! All public operations serialize on one internal lock, so `save_change`,
//! `save_changes`, `push`, `pull`, `set_sync_enabled`, and `dispose` are
//! atomic with respect to each other, and clock values are handed out
//! without tearing.

use crate::clock::{Hlc, HlcClock};
use crate::error::{Error, Result};
use crate::event::ChangeEvent;
use crate::message::Message;
use crate::store::{LocalStore, RemoteStore, Subscription};
use crate::value::Value;
use crate::MessageId;
use std::fmt;
use std::sync::{Arc, PoisonError};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Buffered change events per subscriber; slow subscribers lag and drop
/// the oldest events.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Generates message ids. The default is UUID v4.
pub type IdGenerator = Box<dyn Fn() -> MessageId + Send + Sync>;

/// Tuning knobs for the push scheduler.
#[derive(Debug, Clone)]
pub struct ReplicatorConfig {
    /// Maximum messages per push batch
    pub batch_size: usize,
    /// Delay coalescing multiple writes into one push
    pub push_debounce: Duration,
    /// Run the push inline after each write instead of debouncing
    pub push_immediately: bool,
    /// Reject pulled messages whose clock is further than this ahead of
    /// the local wall clock. `None` (the default) disables the check.
    pub max_drift: Option<Duration>,
}

impl Default for ReplicatorConfig {
    fn default() -> Self {
        Self {
            batch_size: 50,
            push_debounce: Duration::from_millis(500),
            push_immediately: false,
            max_drift: None,
        }
    }
}

impl ReplicatorConfig {
    /// Profile with no debounce: every write pushes inline.
    pub fn immediate() -> Self {
        Self {
            push_debounce: Duration::ZERO,
            push_immediately: true,
            ..Self::default()
        }
    }
}

/// One cell mutation to record, the input to
/// [`save_changes`](Replicator::save_changes).
#[derive(Debug, Clone)]
pub struct CellWrite {
    pub table: String,
    pub row: String,
    pub column: String,
    pub value: Value,
}

impl CellWrite {
    pub fn new(
        table: impl Into<String>,
        row: impl Into<String>,
        column: impl Into<String>,
        value: impl Into<Value>,
    ) -> Self {
        Self {
            table: table.into(),
            row: row.into(),
            column: column.into(),
            value: value.into(),
        }
    }
}

struct State {
    clock: HlcClock,
    sync_enabled: bool,
    disposed: bool,
    subscription: Option<Box<dyn Subscription>>,
    tail_task: Option<JoinHandle<()>>,
    debounce_task: Option<JoinHandle<()>>,
    periodic_task: Option<JoinHandle<()>>,
}

struct Inner {
    user_id: String,
    client_id: String,
    local: Arc<dyn LocalStore>,
    remote: Arc<dyn RemoteStore>,
    id_generator: IdGenerator,
    config: ReplicatorConfig,
    state: Mutex<State>,
    events: std::sync::Mutex<Option<broadcast::Sender<ChangeEvent>>>,
}

/// A per-application replication handle. Cheap to clone; all clones share
/// the same state.
#[derive(Clone)]
pub struct Replicator {
    inner: Arc<Inner>,
}

impl fmt::Debug for Replicator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Replicator")
            .field("user_id", &self.inner.user_id)
            .field("client_id", &self.inner.client_id)
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

impl Replicator {
    /// Create a replicator with UUID v4 message ids.
    pub fn new(
        user_id: impl Into<String>,
        client_id: impl Into<String>,
        local: Arc<dyn LocalStore>,
        remote: Arc<dyn RemoteStore>,
        config: ReplicatorConfig,
    ) -> Self {
        Self::with_id_generator(
            user_id,
            client_id,
            local,
            remote,
            Box::new(|| Uuid::new_v4().to_string()),
            config,
        )
    }

    /// Create a replicator with a caller-supplied message-id generator.
    pub fn with_id_generator(
        user_id: impl Into<String>,
        client_id: impl Into<String>,
        local: Arc<dyn LocalStore>,
        remote: Arc<dyn RemoteStore>,
        id_generator: IdGenerator,
        config: ReplicatorConfig,
    ) -> Self {
        let client_id = client_id.into();
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                user_id: user_id.into(),
                client_id: client_id.clone(),
                local,
                remote,
                id_generator,
                config,
                state: Mutex::new(State {
                    clock: HlcClock::new(client_id),
                    sync_enabled: false,
                    disposed: false,
                    subscription: None,
                    tail_task: None,
                    debounce_task: None,
                    periodic_task: None,
                }),
                events: std::sync::Mutex::new(Some(events)),
            }),
        }
    }

    pub fn user_id(&self) -> &str {
        &self.inner.user_id
    }

    pub fn client_id(&self) -> &str {
        &self.inner.client_id
    }

    pub fn config(&self) -> &ReplicatorConfig {
        &self.inner.config
    }

    /// Subscribe to the change stream. The receiver sees only events
    /// emitted after this call.
    pub fn subscribe(&self) -> Result<broadcast::Receiver<ChangeEvent>> {
        let events = self
            .inner
            .events
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        match events.as_ref() {
            Some(sender) => Ok(sender.subscribe()),
            None => Err(Error::Disposed),
        }
    }

    /// Record one cell mutation: encode, stamp, persist locally, emit one
    /// `local` event, and schedule a push if syncing is enabled.
    ///
    /// Returns the recorded message.
    pub async fn save_change(
        &self,
        table: impl Into<String>,
        row: impl Into<String>,
        column: impl Into<String>,
        value: impl Into<Value>,
    ) -> Result<Message> {
        let write = CellWrite::new(table, row, column, value);
        let mut state = self.inner.state.lock().await;
        self.inner.ensure_live(&state)?;

        let message = self.inner.write_message(&mut state, &write);
        self.inner.local.save_local_change(&message).await?;
        self.inner.emit(ChangeEvent::local(vec![message.clone()]));
        Inner::schedule_push(&self.inner, &mut state).await;
        Ok(message)
    }

    /// Record several cell mutations. Each entry gets a distinct clock
    /// value in submission order; exactly one `local` event carries all of
    /// them, and the push is scheduled once. An empty list does nothing.
    pub async fn save_changes(&self, writes: Vec<CellWrite>) -> Result<Vec<Message>> {
        if writes.is_empty() {
            return Ok(Vec::new());
        }
        let mut state = self.inner.state.lock().await;
        self.inner.ensure_live(&state)?;

        let mut messages = Vec::with_capacity(writes.len());
        for write in &writes {
            let message = self.inner.write_message(&mut state, write);
            self.inner.local.save_local_change(&message).await?;
            messages.push(message);
        }
        self.inner.emit(ChangeEvent::local(messages.clone()));
        Inner::schedule_push(&self.inner, &mut state).await;
        Ok(messages)
    }

    /// Push then pull.
    pub async fn run_sync(&self) -> Result<()> {
        let mut state = self.inner.state.lock().await;
        self.inner.ensure_live(&state)?;
        self.inner.push_locked(&mut state).await;
        self.inner.pull_locked(&mut state).await;
        Ok(())
    }

    /// Push unsynced messages to the remote log in batches. Remote
    /// failures are absorbed; unsynced messages stay queued for the next
    /// attempt.
    pub async fn push(&self) -> Result<()> {
        let mut state = self.inner.state.lock().await;
        self.inner.ensure_live(&state)?;
        self.inner.push_locked(&mut state).await;
        Ok(())
    }

    /// Pull messages newer than the local cursor and merge them in.
    pub async fn pull(&self) -> Result<()> {
        let mut state = self.inner.state.lock().await;
        self.inner.ensure_live(&state)?;
        self.inner.pull_locked(&mut state).await;
        Ok(())
    }

    /// Cancel any pending debounce and push now.
    pub async fn force_push(&self) -> Result<()> {
        let mut state = self.inner.state.lock().await;
        self.inner.ensure_live(&state)?;
        if let Some(task) = state.debounce_task.take() {
            task.abort();
        }
        self.inner.push_locked(&mut state).await;
        Ok(())
    }

    /// Turn syncing on or off.
    ///
    /// Enabling subscribes to the remote live tail (re-subscribing if a
    /// previous tail died) and runs one immediate push + pull. Disabling
    /// cancels the subscription and any pending debounce; local writes
    /// keep persisting.
    pub async fn set_sync_enabled(&self, enabled: bool) -> Result<()> {
        let mut state = self.inner.state.lock().await;
        self.inner.ensure_live(&state)?;
        if enabled {
            state.sync_enabled = true;
            Inner::resubscribe(&self.inner, &mut state).await;
            self.inner.push_locked(&mut state).await;
            self.inner.pull_locked(&mut state).await;
        } else {
            state.sync_enabled = false;
            self.inner.cancel_subscription(&mut state);
            if let Some(task) = state.debounce_task.take() {
                task.abort();
            }
        }
        Ok(())
    }

    /// Run a push + pull every `interval` while syncing is enabled.
    /// Replaces any previous schedule.
    pub async fn start_periodic_sync(&self, interval: Duration) -> Result<()> {
        let mut state = self.inner.state.lock().await;
        self.inner.ensure_live(&state)?;
        if let Some(task) = state.periodic_task.take() {
            task.abort();
        }
        let inner = Arc::clone(&self.inner);
        state.periodic_task = Some(tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                let mut state = inner.state.lock().await;
                if state.disposed {
                    break;
                }
                if !state.sync_enabled {
                    continue;
                }
                inner.push_locked(&mut state).await;
                inner.pull_locked(&mut state).await;
            }
        }));
        Ok(())
    }

    /// Cancel the periodic schedule.
    pub async fn stop_periodic_sync(&self) -> Result<()> {
        let mut state = self.inner.state.lock().await;
        self.inner.ensure_live(&state)?;
        if let Some(task) = state.periodic_task.take() {
            task.abort();
        }
        Ok(())
    }

    /// Tear down: cancel the subscription and all timers, close the
    /// change stream. Idempotent; every other operation fails afterwards.
    pub async fn dispose(&self) {
        let mut state = self.inner.state.lock().await;
        if state.disposed {
            return;
        }
        state.disposed = true;
        state.sync_enabled = false;
        self.inner.cancel_subscription(&mut state);
        if let Some(task) = state.debounce_task.take() {
            task.abort();
        }
        if let Some(task) = state.periodic_task.take() {
            task.abort();
        }
        self.inner.close_events();
    }
}

impl Inner {
    fn ensure_live(&self, state: &State) -> Result<()> {
        if state.disposed {
            Err(Error::Disposed)
        } else {
            Ok(())
        }
    }

    fn write_message(&self, state: &mut State, write: &CellWrite) -> Message {
        let timestamp = state.clock.send();
        Message::new(
            (self.id_generator)(),
            write.table.clone(),
            write.row.clone(),
            write.column.clone(),
            &write.value,
            &timestamp,
            self.user_id.clone(),
            self.client_id.clone(),
        )
    }

    fn emit(&self, event: ChangeEvent) {
        let events = self.events.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(sender) = events.as_ref() {
            // no live subscribers is not an error
            let _ = sender.send(event);
        }
    }

    fn close_events(&self) {
        let mut events = self.events.lock().unwrap_or_else(PoisonError::into_inner);
        *events = None;
    }

    async fn schedule_push(inner: &Arc<Inner>, state: &mut State) {
        if state.disposed || !state.sync_enabled {
            return;
        }
        if let Some(task) = state.debounce_task.take() {
            task.abort();
        }
        if inner.config.push_immediately {
            inner.push_locked(state).await;
            return;
        }
        let task_inner = Arc::clone(inner);
        let delay = inner.config.push_debounce;
        state.debounce_task = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let mut state = task_inner.state.lock().await;
            if state.disposed || !state.sync_enabled {
                return;
            }
            task_inner.push_locked(&mut state).await;
        }));
    }

    async fn push_locked(&self, _state: &mut State) {
        let unsynced = match self.local.unsynced().await {
            Ok(unsynced) => unsynced,
            Err(err) => {
                tracing::warn!(error = %err, "failed to read unsynced messages");
                return;
            }
        };
        if unsynced.is_empty() {
            return;
        }
        let batch_size = self.config.batch_size.max(1);
        for batch in unsynced.chunks(batch_size) {
            let accepted = match self.remote.send_batch(batch).await {
                Ok(accepted) => accepted,
                Err(err) => {
                    tracing::warn!(error = %err, "push failed; messages stay queued");
                    return;
                }
            };
            if !accepted.is_empty() {
                if let Err(err) = self.local.mark_synced(&accepted).await {
                    tracing::warn!(error = %err, "failed to mark messages synced");
                    return;
                }
            }
            if accepted.len() < batch.len() {
                tracing::debug!(
                    accepted = accepted.len(),
                    batch = batch.len(),
                    "partial batch; push stopped"
                );
                return;
            }
        }
        tracing::debug!(count = unsynced.len(), "push complete");
    }

    async fn pull_locked(&self, state: &mut State) {
        let cursor = match self.local.read_cursor().await {
            Ok(cursor) => cursor,
            Err(err) => {
                tracing::warn!(error = %err, "failed to read cursor");
                return;
            }
        };
        let batch = match self
            .remote
            .fetch_since(cursor, &self.user_id, &self.client_id)
            .await
        {
            Ok(batch) => batch,
            Err(err) => {
                tracing::warn!(error = %err, "pull failed");
                return;
            }
        };
        tracing::debug!(count = batch.len(), cursor = ?cursor, "pulled from remote");
        self.apply_server_batch(state, batch).await;
    }

    /// Merge a batch of remote messages: filter to this user and other
    /// clients, fold each timestamp into the clock, persist through the
    /// local store, and emit one `server` event for the non-empty batch.
    async fn apply_server_batch(&self, state: &mut State, batch: Vec<Message>) {
        let mut admitted = Vec::with_capacity(batch.len());
        for message in batch {
            if message.user_id != self.user_id || message.client_id == self.client_id {
                continue;
            }
            match Hlc::parse(&message.local_timestamp) {
                Some(remote) => match state.clock.receive(&remote, self.config.max_drift) {
                    Ok(_) => admitted.push(message),
                    Err(err) => {
                        tracing::warn!(id = %message.id, error = %err, "message outside drift bound; skipped");
                    }
                },
                // a malformed timestamp loses every merge; keep it in the log
                None => admitted.push(message),
            }
        }
        if admitted.is_empty() {
            return;
        }
        match self.local.save_server_batch(&admitted).await {
            Ok(all_persisted) => {
                if !all_persisted {
                    tracing::warn!("server batch partially persisted; cursor unchanged");
                }
                self.emit(ChangeEvent::server(admitted));
            }
            Err(err) => {
                tracing::warn!(error = %err, "failed to persist server batch");
            }
        }
    }

    async fn resubscribe(inner: &Arc<Inner>, state: &mut State) {
        inner.cancel_subscription(state);
        let cursor = match inner.local.read_cursor().await {
            Ok(cursor) => cursor,
            Err(err) => {
                tracing::warn!(error = %err, "failed to read cursor for subscription");
                None
            }
        };
        let (sink, mut tail) = mpsc::unbounded_channel();
        match inner
            .remote
            .subscribe(&inner.user_id, &inner.client_id, cursor, sink)
            .await
        {
            Ok(subscription) => {
                state.subscription = Some(subscription);
                let task_inner = Arc::clone(inner);
                state.tail_task = Some(tokio::spawn(async move {
                    while let Some(batch) = tail.recv().await {
                        let mut state = task_inner.state.lock().await;
                        if state.disposed {
                            break;
                        }
                        task_inner.apply_server_batch(&mut state, batch).await;
                    }
                }));
            }
            Err(err) => {
                tracing::warn!(error = %err, "live tail subscription failed; pull still available");
            }
        }
    }

    fn cancel_subscription(&self, state: &mut State) {
        if let Some(mut subscription) = state.subscription.take() {
            subscription.cancel();
        }
        if let Some(task) = state.tail_task.take() {
            task.abort();
        }
    }
}
