//! Error types for Courier.

use std::time::Duration;

/// Top-level error type for the notification core.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("Delivery error: {0}")]
    Delivery(#[from] DeliveryError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Channel catalog and preference errors.
///
/// `Duplicate` and `Unknown` indicate a caller bug; `Disabled` is returned
/// when a test is requested for a channel the user switched off.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChannelError {
    #[error("Channel {id} is defined more than once")]
    Duplicate { id: String },

    #[error("Channel {id} is not registered")]
    Unknown { id: String },

    #[error("Channel {id} is disabled")]
    Disabled { id: String },
}

/// Errors from the delivery tester.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeliveryError {
    #[error("A test is already in flight for channel {channel}")]
    TestInProgress { channel: String },

    #[error(transparent)]
    Channel(#[from] ChannelError),
}

/// Errors from the offline queue.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    #[error("Message {id} is already being sent")]
    RetryInProgress { id: String },

    #[error("Message {id} is not queued")]
    NotFound { id: String },

    #[error("Queue full: {size}/{max}")]
    QueueFull { size: usize, max: usize },
}

/// A rejected `send_test`/`send_message` operation.
///
/// Sender implementations return this; the core also builds one when an
/// operation times out or panics. It is always folded into message or
/// channel status and never escapes as a hard error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{reason}")]
pub struct DeliveryFailure {
    pub reason: String,
}

impl DeliveryFailure {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    pub(crate) fn timed_out(after: Duration) -> Self {
        Self::new(format!("delivery timed out after {}ms", after.as_millis()))
    }

    pub(crate) fn panicked() -> Self {
        Self::new("sender panicked")
    }
}

impl From<String> for DeliveryFailure {
    fn from(reason: String) -> Self {
        Self { reason }
    }
}

impl From<&str> for DeliveryFailure {
    fn from(reason: &str) -> Self {
        Self::new(reason)
    }
}

/// Result type alias for the notification core.
pub type Result<T> = std::result::Result<T, Error>;
