//! Offline message queue.
//!
//! Holds messages that could not be delivered yet and replays them on
//! request. A message stays queued until a send succeeds or the caller
//! deletes it; there is no "delivered" state.
//!
//! ```text
//!             enqueue                 retry                  send ok
//!   (none) ───────────> pending ───────────────> sending ─────────────> (removed)
//!                                                 │   ▲
//!                                       send err  │   │ retry
//!                                                 ▼   │
//!                                                failed
//!
//!   delete / clear: any state ──> (removed); a send still in flight is ignored
//! ```
//!
//! Each queued entry carries a generation number. A send applies its outcome
//! only to the generation it started from, so a late resolution after a
//! delete (or a delete followed by a fresh enqueue of the same id) is a
//! no-op.
//!
//! Connectivity is an input: [`OfflineQueue::set_online`] records it and
//! reports transitions, but the queue never retries on its own.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::CourierConfig;
use crate::delivery::{DeliveryAttempt, DeliveryStatusBoard, MessageSender, run_sender};
use crate::error::{DeliveryFailure, QueueError};

/// Default cap on queued messages.
pub const DEFAULT_MAX_QUEUED: usize = 500;

/// A file or link carried with a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub name: String,
    pub uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
}

/// A message awaiting delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuedMessage {
    /// Caller-supplied id, unique within the queue.
    pub id: String,
    pub content: String,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    pub created_at: DateTime<Utc>,
    /// Channel the message targets; sends of tagged messages are recorded
    /// on the status board.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<String>,
}

impl QueuedMessage {
    pub fn new(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            attachments: Vec::new(),
            created_at: Utc::now(),
            channel_id: None,
        }
    }

    /// Create a message with a random id.
    pub fn with_generated_id(content: impl Into<String>) -> Self {
        Self::new(Uuid::new_v4().to_string(), content)
    }

    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }

    pub fn for_channel(mut self, channel_id: impl Into<String>) -> Self {
        self.channel_id = Some(channel_id.into());
        self
    }
}

/// Where a queued message is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    /// Queued, never attempted.
    Pending,
    /// A send is in flight.
    Sending,
    /// The most recent send failed.
    Failed,
}

/// A queued message as shown to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuedMessageView {
    #[serde(flatten)]
    pub message: QueuedMessage,
    pub status: MessageStatus,
    pub attempts: u32,
    pub last_error: Option<String>,
}

/// Point-in-time copy of the queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueueSnapshot {
    pub online: bool,
    pub messages: Vec<QueuedMessageView>,
    pub pending: usize,
    pub sending: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Queued,
    /// The id was already queued; nothing changed.
    AlreadyQueued,
}

/// How a single send settled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryOutcome {
    /// Sent and removed from the queue.
    Delivered,
    /// Send failed; the message stays queued as `failed`.
    Failed { reason: String },
    /// The message was deleted while the send was in flight; the result
    /// was ignored.
    Discarded,
}

/// What [`OfflineQueue::send_or_enqueue`] did with a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// Sent right away; never queued.
    Delivered,
    /// Offline: queued as `pending`.
    Queued,
    /// Online but the send failed: queued as `failed`.
    QueuedAfterFailure { reason: String },
    /// The id was already queued; nothing was sent.
    AlreadyQueued,
    /// Deleted while the immediate send was in flight.
    Discarded,
}

/// A failed message in a [`RetryBatchReport`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedRetry {
    pub id: String,
    pub reason: String,
}

/// Result of [`OfflineQueue::retry_all`]. Partial failure is a normal
/// outcome.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RetryBatchReport {
    pub delivered: Vec<String>,
    pub failed: Vec<FailedRetry>,
    /// Ids that were deleted or already sending by the time their retry ran.
    pub skipped: Vec<String>,
}

impl RetryBatchReport {
    pub fn attempted(&self) -> usize {
        self.delivered.len() + self.failed.len()
    }
}

/// Connectivity change reported by [`OfflineQueue::set_online`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityChange {
    WentOnline,
    WentOffline,
    Unchanged,
}

#[derive(Debug)]
struct QueueEntry {
    message: QueuedMessage,
    status: MessageStatus,
    generation: u64,
    attempts: u32,
    last_error: Option<String>,
}

impl QueueEntry {
    fn view(&self) -> QueuedMessageView {
        QueuedMessageView {
            message: self.message.clone(),
            status: self.status,
            attempts: self.attempts,
            last_error: self.last_error.clone(),
        }
    }
}

#[derive(Debug)]
struct QueueState {
    entries: Vec<QueueEntry>,
    online: bool,
    next_generation: u64,
}

impl QueueState {
    fn position(&self, id: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.message.id == id)
    }

    fn find_mut(&mut self, id: &str) -> Option<&mut QueueEntry> {
        self.entries.iter_mut().find(|e| e.message.id == id)
    }

    fn position_of_generation(&self, id: &str, generation: u64) -> Option<usize> {
        self.entries
            .iter()
            .position(|e| e.message.id == id && e.generation == generation)
    }

    fn push(&mut self, message: QueuedMessage, status: MessageStatus) -> u64 {
        let generation = self.next_generation;
        self.next_generation += 1;
        self.entries.push(QueueEntry {
            message,
            status,
            generation,
            attempts: 0,
            last_error: None,
        });
        generation
    }
}

/// Client-side queue of undelivered messages.
pub struct OfflineQueue {
    state: Mutex<QueueState>,
    sender: Arc<dyn MessageSender>,
    board: Option<Arc<DeliveryStatusBoard>>,
    timeout: Option<Duration>,
    max_messages: usize,
}

impl OfflineQueue {
    /// Create an empty queue that starts online.
    pub fn new(sender: Arc<dyn MessageSender>) -> Self {
        Self {
            state: Mutex::new(QueueState {
                entries: Vec::new(),
                online: true,
                next_generation: 0,
            }),
            sender,
            board: None,
            timeout: None,
            max_messages: DEFAULT_MAX_QUEUED,
        }
    }

    /// Create a queue using the runtime knobs in `config`.
    pub fn from_config(sender: Arc<dyn MessageSender>, config: &CourierConfig) -> Self {
        Self::new(sender)
            .with_online(config.start_online)
            .with_timeout(config.send_timeout())
            .with_capacity(config.max_queued_messages)
    }

    /// Record sends of channel-tagged messages on `board`.
    pub fn with_board(mut self, board: Arc<DeliveryStatusBoard>) -> Self {
        self.board = Some(board);
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_capacity(mut self, max_messages: usize) -> Self {
        self.max_messages = max_messages;
        self
    }

    pub fn with_online(self, online: bool) -> Self {
        self.lock().online = online;
        self
    }

    /// Queue a message as `pending`.
    ///
    /// Re-enqueuing an id that is still queued (in any state) is a no-op.
    pub fn enqueue(&self, message: QueuedMessage) -> Result<EnqueueOutcome, QueueError> {
        let mut state = self.lock();
        if state.position(&message.id).is_some() {
            tracing::debug!(message_id = %message.id, "Message already queued");
            return Ok(EnqueueOutcome::AlreadyQueued);
        }
        if state.entries.len() >= self.max_messages {
            return Err(QueueError::QueueFull {
                size: state.entries.len(),
                max: self.max_messages,
            });
        }
        tracing::debug!(message_id = %message.id, "Message queued");
        state.push(message, MessageStatus::Pending);
        Ok(EnqueueOutcome::Queued)
    }

    /// Send a queued message.
    ///
    /// Valid from `pending` or `failed`. A message that is already `sending`
    /// is rejected with [`QueueError::RetryInProgress`], so the same message
    /// is never sent twice at once.
    pub async fn retry(&self, id: &str) -> Result<RetryOutcome, QueueError> {
        let (message, generation) = {
            let mut state = self.lock();
            let entry = state
                .find_mut(id)
                .ok_or_else(|| QueueError::NotFound { id: id.to_string() })?;
            if entry.status == MessageStatus::Sending {
                return Err(QueueError::RetryInProgress { id: id.to_string() });
            }
            entry.status = MessageStatus::Sending;
            entry.attempts += 1;
            (entry.message.clone(), entry.generation)
        };

        Ok(self.dispatch(message, generation).await)
    }

    /// Retry every message that is not already sending, concurrently.
    ///
    /// Returns once every attempt has settled.
    pub async fn retry_all(&self) -> RetryBatchReport {
        let ids: Vec<String> = self
            .lock()
            .entries
            .iter()
            .filter(|e| e.status != MessageStatus::Sending)
            .map(|e| e.message.id.clone())
            .collect();

        if ids.is_empty() {
            return RetryBatchReport::default();
        }

        let results = join_all(ids.iter().map(|id| self.retry(id))).await;

        let mut report = RetryBatchReport::default();
        for (id, result) in ids.into_iter().zip(results) {
            match result {
                Ok(RetryOutcome::Delivered) => report.delivered.push(id),
                Ok(RetryOutcome::Failed { reason }) => {
                    report.failed.push(FailedRetry { id, reason })
                }
                Ok(RetryOutcome::Discarded) | Err(_) => report.skipped.push(id),
            }
        }

        tracing::info!(
            delivered = report.delivered.len(),
            failed = report.failed.len(),
            skipped = report.skipped.len(),
            "Queue retry batch settled"
        );
        report
    }

    /// Send now if online, otherwise queue.
    ///
    /// An online send holds the message in the queue as `sending` while in
    /// flight, so a concurrent retry cannot double-send it. A failed send
    /// leaves it queued as `failed`.
    pub async fn send_or_enqueue(&self, message: QueuedMessage) -> Result<SendOutcome, QueueError> {
        let generation = {
            let mut state = self.lock();
            if state.position(&message.id).is_some() {
                return Ok(SendOutcome::AlreadyQueued);
            }
            if state.entries.len() >= self.max_messages {
                return Err(QueueError::QueueFull {
                    size: state.entries.len(),
                    max: self.max_messages,
                });
            }
            if !state.online {
                tracing::debug!(message_id = %message.id, "Offline, message queued");
                state.push(message, MessageStatus::Pending);
                return Ok(SendOutcome::Queued);
            }
            let generation = state.push(message.clone(), MessageStatus::Sending);
            if let Some(entry) = state.entries.last_mut() {
                entry.attempts = 1;
            }
            generation
        };

        Ok(match self.dispatch(message, generation).await {
            RetryOutcome::Delivered => SendOutcome::Delivered,
            RetryOutcome::Failed { reason } => SendOutcome::QueuedAfterFailure { reason },
            RetryOutcome::Discarded => SendOutcome::Discarded,
        })
    }

    /// Remove a message in any state. Returns whether it was queued.
    pub fn delete(&self, id: &str) -> bool {
        let mut state = self.lock();
        match state.position(id) {
            Some(pos) => {
                let entry = state.entries.remove(pos);
                tracing::debug!(message_id = id, status = ?entry.status, "Message deleted");
                true
            }
            None => false,
        }
    }

    /// Remove every message. Returns how many were removed.
    pub fn clear(&self) -> usize {
        let mut state = self.lock();
        let removed = state.entries.len();
        state.entries.clear();
        tracing::debug!(removed, "Queue cleared");
        removed
    }

    /// Record the connectivity input and report the transition.
    ///
    /// Going online does not trigger any sends.
    pub fn set_online(&self, online: bool) -> ConnectivityChange {
        let mut state = self.lock();
        let change = match (state.online, online) {
            (false, true) => ConnectivityChange::WentOnline,
            (true, false) => ConnectivityChange::WentOffline,
            _ => ConnectivityChange::Unchanged,
        };
        state.online = online;
        if change != ConnectivityChange::Unchanged {
            tracing::info!(online, queued = state.entries.len(), "Connectivity changed");
        }
        change
    }

    pub fn is_online(&self) -> bool {
        self.lock().online
    }

    pub fn get(&self, id: &str) -> Option<QueuedMessageView> {
        let state = self.lock();
        state.position(id).map(|pos| state.entries[pos].view())
    }

    pub fn status(&self, id: &str) -> Option<MessageStatus> {
        let state = self.lock();
        state.position(id).map(|pos| state.entries[pos].status)
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    /// Messages in enqueue order, with per-status counts.
    pub fn snapshot(&self) -> QueueSnapshot {
        let state = self.lock();
        let messages: Vec<QueuedMessageView> = state.entries.iter().map(QueueEntry::view).collect();
        let count = |s: MessageStatus| messages.iter().filter(|m| m.status == s).count();
        QueueSnapshot {
            online: state.online,
            pending: count(MessageStatus::Pending),
            sending: count(MessageStatus::Sending),
            failed: count(MessageStatus::Failed),
            messages,
        }
    }

    /// Run one send for an entry already marked `sending`.
    async fn dispatch(&self, message: QueuedMessage, generation: u64) -> RetryOutcome {
        let mut flight = InFlight::start(self, &message, generation);
        tracing::debug!(message_id = %message.id, "Sending queued message");
        let result = run_sender(self.sender.send_message(&message), self.timeout).await;
        flight.settle(result)
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// One send in flight. Applies the outcome on [`InFlight::settle`]; if
/// dropped unsettled (the caller cancelled the future) the entry goes back
/// to `failed` so it can be retried.
struct InFlight<'a> {
    queue: &'a OfflineQueue,
    id: String,
    channel_id: Option<String>,
    generation: u64,
    settled: bool,
}

impl<'a> InFlight<'a> {
    fn start(queue: &'a OfflineQueue, message: &QueuedMessage, generation: u64) -> Self {
        if let (Some(board), Some(channel)) = (&queue.board, &message.channel_id) {
            board.begin(channel);
        }
        Self {
            queue,
            id: message.id.clone(),
            channel_id: message.channel_id.clone(),
            generation,
            settled: false,
        }
    }

    fn settle(&mut self, result: Result<(), DeliveryFailure>) -> RetryOutcome {
        self.settled = true;

        let outcome = {
            let mut state = self.queue.lock();
            match state.position_of_generation(&self.id, self.generation) {
                None => RetryOutcome::Discarded,
                Some(pos) => match result {
                    Ok(()) => {
                        state.entries.remove(pos);
                        RetryOutcome::Delivered
                    }
                    Err(e) => {
                        let entry = &mut state.entries[pos];
                        entry.status = MessageStatus::Failed;
                        entry.last_error = Some(e.reason.clone());
                        RetryOutcome::Failed { reason: e.reason }
                    }
                },
            }
        };

        match &outcome {
            RetryOutcome::Delivered => {
                tracing::debug!(message_id = %self.id, "Queued message delivered");
            }
            RetryOutcome::Failed { reason } => {
                tracing::warn!(
                    message_id = %self.id,
                    error = %reason,
                    "Queued message send failed"
                );
            }
            RetryOutcome::Discarded => {
                tracing::debug!(message_id = %self.id, "Message removed mid-send, result ignored");
            }
        }

        if let (Some(board), Some(channel)) = (&self.queue.board, &self.channel_id) {
            match &outcome {
                RetryOutcome::Delivered => {
                    board.finish(DeliveryAttempt::success(channel, "Message delivered"));
                }
                RetryOutcome::Failed { reason } => {
                    board.finish(DeliveryAttempt::failure(channel, reason.clone()));
                }
                RetryOutcome::Discarded => board.abandon(channel),
            }
        }

        outcome
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        {
            let mut state = self.queue.lock();
            if let Some(pos) = state.position_of_generation(&self.id, self.generation) {
                let entry = &mut state.entries[pos];
                entry.status = MessageStatus::Failed;
                entry.last_error = Some("send cancelled".to_string());
            }
        }
        if let (Some(board), Some(channel)) = (&self.queue.board, &self.channel_id) {
            board.abandon(channel);
        }
        tracing::debug!(message_id = %self.id, "Queued message send cancelled");
    }
}
