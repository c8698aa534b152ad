//! Per-channel delivery outcome board.
//!
//! Keeps the latest [`DeliveryAttempt`] per channel plus how many sends are
//! currently in flight on it. Counts are derived on read.
//!
//! ```text
//! send starts      --> begin(channel)           channel counts as pending
//! send settles     --> finish(attempt)          latest outcome replaces the old one
//! send abandoned   --> abandon(channel)         pending cleared, outcome untouched
//! dashboard reads  --> counts(), snapshot()
//! ```

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::Serialize;

use crate::delivery::{DeliveryAttempt, DeliveryOutcome};

/// Aggregate counts across channels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DeliveryCounts {
    pub success: usize,
    pub failed: usize,
    /// Channels with a test or send currently in flight.
    pub pending: usize,
}

/// Derived state of one channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryState {
    /// Nothing attempted yet.
    Idle,
    Pending,
    Success,
    Failed,
}

/// Status of one channel for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChannelDeliveryStatus {
    pub channel_id: String,
    pub state: DeliveryState,
    pub last_attempt: Option<DeliveryAttempt>,
}

#[derive(Debug, Default)]
struct ChannelEntry {
    in_flight: usize,
    last: Option<DeliveryAttempt>,
}

impl ChannelEntry {
    fn state(&self) -> DeliveryState {
        if self.in_flight > 0 {
            return DeliveryState::Pending;
        }
        match self.last.as_ref().map(|a| a.outcome) {
            Some(DeliveryOutcome::Success) => DeliveryState::Success,
            Some(DeliveryOutcome::Failure) => DeliveryState::Failed,
            None => DeliveryState::Idle,
        }
    }
}

/// Latest delivery outcome per channel.
#[derive(Debug, Default)]
pub struct DeliveryStatusBoard {
    channels: Mutex<HashMap<String, ChannelEntry>>,
}

impl DeliveryStatusBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a send as in flight on `channel_id`.
    pub fn begin(&self, channel_id: &str) {
        let mut channels = self.lock();
        channels.entry(channel_id.to_string()).or_default().in_flight += 1;
    }

    /// Record a settled attempt, replacing the channel's previous outcome.
    pub fn finish(&self, attempt: DeliveryAttempt) {
        let mut channels = self.lock();
        let entry = channels.entry(attempt.channel_id.clone()).or_default();
        entry.in_flight = entry.in_flight.saturating_sub(1);
        entry.last = Some(attempt);
    }

    /// Drop an in-flight marker without recording an outcome.
    pub fn abandon(&self, channel_id: &str) {
        let mut channels = self.lock();
        if let Some(entry) = channels.get_mut(channel_id) {
            entry.in_flight = entry.in_flight.saturating_sub(1);
        }
    }

    pub fn counts(&self) -> DeliveryCounts {
        let channels = self.lock();
        let mut counts = DeliveryCounts::default();
        for entry in channels.values() {
            match entry.state() {
                DeliveryState::Pending => counts.pending += 1,
                DeliveryState::Success => counts.success += 1,
                DeliveryState::Failed => counts.failed += 1,
                DeliveryState::Idle => {}
            }
        }
        counts
    }

    pub fn last_attempt(&self, channel_id: &str) -> Option<DeliveryAttempt> {
        self.lock().get(channel_id).and_then(|e| e.last.clone())
    }

    pub fn state(&self, channel_id: &str) -> DeliveryState {
        self.lock()
            .get(channel_id)
            .map(ChannelEntry::state)
            .unwrap_or(DeliveryState::Idle)
    }

    /// Status of every channel seen so far, sorted by id.
    pub fn snapshot(&self) -> Vec<ChannelDeliveryStatus> {
        let channels = self.lock();
        let mut result: Vec<ChannelDeliveryStatus> = channels
            .iter()
            .map(|(id, entry)| ChannelDeliveryStatus {
                channel_id: id.clone(),
                state: entry.state(),
                last_attempt: entry.last.clone(),
            })
            .collect();
        result.sort_by(|a, b| a.channel_id.cmp(&b.channel_id));
        result
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, ChannelEntry>> {
        self.channels.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
