//! One-off test sends per channel.
//!
//! At most one test runs per channel at a time. A disabled channel never
//! reaches the sender, and every test that does reach it produces exactly
//! one [`DeliveryAttempt`] on the status board.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::channels::PreferenceStore;
use crate::delivery::{DeliveryAttempt, DeliveryStatusBoard, TestSender, run_sender};
use crate::error::{ChannelError, DeliveryError};

/// Drives test sends through the caller's [`TestSender`].
pub struct DeliveryTester {
    preferences: Arc<PreferenceStore>,
    sender: Arc<dyn TestSender>,
    board: Arc<DeliveryStatusBoard>,
    in_flight: Mutex<HashSet<String>>,
    timeout: Option<Duration>,
}

impl DeliveryTester {
    pub fn new(
        preferences: Arc<PreferenceStore>,
        sender: Arc<dyn TestSender>,
        board: Arc<DeliveryStatusBoard>,
    ) -> Self {
        Self {
            preferences,
            sender,
            board,
            in_flight: Mutex::new(HashSet::new()),
            timeout: None,
        }
    }

    /// Fail tests that take longer than `timeout`.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Whether a test is in flight for `channel_id`.
    pub fn is_testing(&self, channel_id: &str) -> bool {
        self.lock().contains(channel_id)
    }

    /// Send a test message through `channel_id`.
    ///
    /// Returns the recorded attempt; a failed send is a failed attempt, not
    /// an error. Errors are reserved for unknown or disabled channels and
    /// for a test already running on the same channel.
    pub async fn test_channel(
        &self,
        channel_id: &str,
        message: &str,
    ) -> Result<DeliveryAttempt, DeliveryError> {
        if !self.preferences.is_enabled(channel_id)? {
            return Err(ChannelError::Disabled {
                id: channel_id.to_string(),
            }
            .into());
        }

        let mut slot = self.claim(channel_id)?;
        tracing::debug!(channel = channel_id, "Sending test notification");

        let send = self.sender.send_test(channel_id, message);
        let attempt = match run_sender(send, self.timeout).await {
            Ok(receipt) if receipt.success => DeliveryAttempt::success(channel_id, receipt.message),
            Ok(receipt) => {
                tracing::warn!(
                    channel = channel_id,
                    detail = %receipt.message,
                    "Test notification rejected"
                );
                DeliveryAttempt::failure(channel_id, receipt.message)
            }
            Err(e) => {
                tracing::warn!(channel = channel_id, error = %e, "Test notification failed");
                DeliveryAttempt::failure(channel_id, e.reason)
            }
        };

        slot.settle(attempt.clone());
        Ok(attempt)
    }

    fn claim(&self, channel_id: &str) -> Result<TestSlot<'_>, DeliveryError> {
        if !self.lock().insert(channel_id.to_string()) {
            return Err(DeliveryError::TestInProgress {
                channel: channel_id.to_string(),
            });
        }
        self.board.begin(channel_id);
        Ok(TestSlot {
            tester: self,
            channel_id: channel_id.to_string(),
            settled: false,
        })
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<String>> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Holds a channel's in-flight marker. Released on drop, so a cancelled
/// test frees the channel and clears its pending state.
struct TestSlot<'a> {
    tester: &'a DeliveryTester,
    channel_id: String,
    settled: bool,
}

impl TestSlot<'_> {
    fn settle(&mut self, attempt: DeliveryAttempt) {
        self.tester.board.finish(attempt);
        self.settled = true;
    }
}

impl Drop for TestSlot<'_> {
    fn drop(&mut self) {
        if !self.settled {
            tracing::debug!(channel = %self.channel_id, "Test notification cancelled");
            self.tester.board.abandon(&self.channel_id);
        }
        self.tester.lock().remove(&self.channel_id);
    }
}
