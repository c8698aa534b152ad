//! Courier: client-side notification delivery coordination.
//!
//! Courier owns the parts of a notification UI that have real state:
//!
//! - [`channels`]: the channel catalog and per-user preferences merged over
//!   channel defaults.
//! - [`delivery`]: one-off test sends with a per-channel in-flight guard, and
//!   a status board of the latest outcome per channel.
//! - [`queue`]: an offline queue that holds undelivered messages and replays
//!   them on request, never sending the same message twice at once.
//! - [`center`]: a single owned object wiring all of the above together and
//!   exposing a renderable snapshot.
//!
//! Transports are supplied by the caller through the [`TestSender`] and
//! [`MessageSender`] traits. Persistence is the caller's job too: preference
//! changes are pushed through a callback, everything else is read from
//! snapshots.

pub mod center;
pub mod channels;
pub mod cli;
pub mod config;
pub mod delivery;
pub mod error;
pub mod queue;

pub use center::{CenterSnapshot, ChannelView, NotificationCenter, NotificationCenterBuilder};
pub use channels::{
    Channel, ChannelKind, ChannelPreference, ChannelRegistry, EffectiveConfig, PreferenceSet,
    PreferenceStore, Settings,
};
pub use config::{CatalogFormat, ChannelCatalog, CourierConfig};
pub use delivery::{
    DeliveryAttempt, DeliveryCounts, DeliveryOutcome, DeliveryState, DeliveryStatusBoard,
    DeliveryTester, MessageSender, TestReceipt, TestSender,
};
pub use error::{
    ChannelError, ConfigError, DeliveryError, DeliveryFailure, Error, QueueError, Result,
};
pub use queue::{
    Attachment, ConnectivityChange, EnqueueOutcome, MessageStatus, OfflineQueue, QueuedMessage,
    RetryBatchReport, RetryOutcome, SendOutcome,
};
