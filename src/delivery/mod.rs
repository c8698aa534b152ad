//! Delivery attempts, sender contracts, and per-channel outcome tracking.
//!
//! The core never talks to a transport itself. Test sends and queued
//! message sends go through caller-supplied [`TestSender`] and
//! [`MessageSender`] implementations; every outcome is folded into a
//! [`DeliveryAttempt`] or a queued message status, never returned as a
//! hard error.

pub mod status_board;
pub mod tester;

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde::{Deserialize, Serialize};

use crate::error::DeliveryFailure;
use crate::queue::QueuedMessage;

pub use status_board::{ChannelDeliveryStatus, DeliveryCounts, DeliveryState, DeliveryStatusBoard};
pub use tester::DeliveryTester;

/// Whether a delivery attempt got through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryOutcome {
    Success,
    Failure,
}

/// The record of one test or send for a channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeliveryAttempt {
    pub channel_id: String,
    pub timestamp: DateTime<Utc>,
    pub outcome: DeliveryOutcome,
    /// Human-readable detail for the user.
    pub detail: String,
}

impl DeliveryAttempt {
    pub fn success(channel_id: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::new(channel_id, DeliveryOutcome::Success, detail)
    }

    pub fn failure(channel_id: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::new(channel_id, DeliveryOutcome::Failure, detail)
    }

    fn new(
        channel_id: impl Into<String>,
        outcome: DeliveryOutcome,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            channel_id: channel_id.into(),
            timestamp: Utc::now(),
            outcome,
            detail: detail.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome == DeliveryOutcome::Success
    }
}

/// What a test send resolves with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestReceipt {
    pub success: bool,
    pub message: String,
}

impl TestReceipt {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

/// Sends a one-off test notification through a channel.
#[async_trait]
pub trait TestSender: Send + Sync {
    async fn send_test(&self, channel_id: &str, message: &str)
    -> Result<TestReceipt, DeliveryFailure>;
}

/// Sends a queued message.
#[async_trait]
pub trait MessageSender: Send + Sync {
    async fn send_message(&self, message: &QueuedMessage) -> Result<(), DeliveryFailure>;
}

/// Run a sender operation, folding timeouts and panics into a
/// [`DeliveryFailure`].
pub(crate) async fn run_sender<T, F>(op: F, timeout: Option<Duration>) -> Result<T, DeliveryFailure>
where
    F: Future<Output = Result<T, DeliveryFailure>>,
{
    let op = AssertUnwindSafe(op).catch_unwind();
    let settled = match timeout {
        Some(limit) => match tokio::time::timeout(limit, op).await {
            Ok(settled) => settled,
            Err(_) => {
                tracing::warn!(timeout_ms = limit.as_millis() as u64, "Sender timed out");
                return Err(DeliveryFailure::timed_out(limit));
            }
        },
        None => op.await,
    };

    match settled {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!("Sender panicked, treating as delivery failure");
            Err(DeliveryFailure::panicked())
        }
    }
}
