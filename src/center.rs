//! The notification center: one owned object wiring the channel catalog,
//! preferences, delivery tester, status board and offline queue together.
//!
//! ```text
//! caller ── set_enabled / update_settings ──> PreferenceStore ──> on_update(full set)
//!        ── test_channel ───────────────────> DeliveryTester ──┐
//!        ── enqueue / retry / retry_all ────> OfflineQueue ────┴─> DeliveryStatusBoard
//!        ── set_online ─────────────────────> OfflineQueue (auto-retry only if configured)
//!        ── snapshot ───────────────────────> CenterSnapshot
//! ```

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::channels::{
    Channel, ChannelKind, ChannelRegistry, EffectiveConfig, PreferenceSet, PreferenceStore,
    PreferencesCallback, Settings,
};
use crate::config::{ChannelCatalog, CourierConfig};
use crate::delivery::{
    DeliveryAttempt, DeliveryCounts, DeliveryState, DeliveryStatusBoard, DeliveryTester,
    MessageSender, TestSender,
};
use crate::error::{ChannelError, DeliveryError, Error};
use crate::queue::{ConnectivityChange, OfflineQueue, QueueSnapshot, RetryBatchReport};

/// Builder for [`NotificationCenter`].
pub struct NotificationCenterBuilder {
    custom_channels: Vec<Channel>,
    preferences: PreferenceSet,
    on_update: Option<PreferencesCallback>,
    test_sender: Arc<dyn TestSender>,
    message_sender: Arc<dyn MessageSender>,
    config: CourierConfig,
}

impl NotificationCenterBuilder {
    pub fn custom_channels(mut self, channels: Vec<Channel>) -> Self {
        self.custom_channels = channels;
        self
    }

    pub fn preferences(mut self, preferences: PreferenceSet) -> Self {
        self.preferences = preferences;
        self
    }

    /// Use a loaded catalog's channels and preferences.
    pub fn catalog(self, catalog: ChannelCatalog) -> Self {
        self.custom_channels(catalog.channels)
            .preferences(catalog.preferences)
    }

    /// Called with the full preference set after every preference mutation.
    pub fn on_preferences_update<F>(mut self, callback: F) -> Self
    where
        F: Fn(&PreferenceSet) + Send + Sync + 'static,
    {
        self.on_update = Some(Arc::new(callback));
        self
    }

    pub fn config(mut self, config: CourierConfig) -> Self {
        self.config = config;
        self
    }

    /// Build the center. Fails if two channels share an id.
    pub fn build(self) -> Result<NotificationCenter, Error> {
        let registry = Arc::new(ChannelRegistry::new(self.custom_channels)?);

        let mut store = PreferenceStore::new(Arc::clone(&registry), self.preferences);
        if let Some(cb) = self.on_update {
            store = store.with_callback(cb);
        }
        let preferences = Arc::new(store);

        let board = Arc::new(DeliveryStatusBoard::new());
        let tester = DeliveryTester::new(
            Arc::clone(&preferences),
            self.test_sender,
            Arc::clone(&board),
        )
        .with_timeout(self.config.send_timeout());
        let queue = OfflineQueue::from_config(self.message_sender, &self.config)
            .with_board(Arc::clone(&board));

        tracing::info!(
            channels = registry.len(),
            online = queue.is_online(),
            auto_retry = self.config.auto_retry_on_reconnect,
            "Notification center ready"
        );

        Ok(NotificationCenter {
            registry,
            preferences,
            tester,
            queue,
            board,
            config: self.config,
        })
    }
}

/// Owns the notification subsystem for one user session.
pub struct NotificationCenter {
    registry: Arc<ChannelRegistry>,
    preferences: Arc<PreferenceStore>,
    tester: DeliveryTester,
    queue: OfflineQueue,
    board: Arc<DeliveryStatusBoard>,
    config: CourierConfig,
}

impl NotificationCenter {
    pub fn builder(
        test_sender: Arc<dyn TestSender>,
        message_sender: Arc<dyn MessageSender>,
    ) -> NotificationCenterBuilder {
        NotificationCenterBuilder {
            custom_channels: Vec::new(),
            preferences: PreferenceSet::new(),
            on_update: None,
            test_sender,
            message_sender,
            config: CourierConfig::default(),
        }
    }

    pub fn registry(&self) -> &ChannelRegistry {
        &self.registry
    }

    pub fn preferences(&self) -> &PreferenceStore {
        &self.preferences
    }

    pub fn tester(&self) -> &DeliveryTester {
        &self.tester
    }

    pub fn queue(&self) -> &OfflineQueue {
        &self.queue
    }

    pub fn board(&self) -> &DeliveryStatusBoard {
        &self.board
    }

    pub fn config(&self) -> &CourierConfig {
        &self.config
    }

    pub fn effective_config(&self, channel_id: &str) -> Result<EffectiveConfig, ChannelError> {
        self.preferences.effective_config(channel_id)
    }

    pub fn set_enabled(&self, channel_id: &str, enabled: bool) -> Result<(), ChannelError> {
        self.preferences.set_enabled(channel_id, enabled)
    }

    pub fn update_settings(&self, channel_id: &str, partial: Settings) -> Result<(), ChannelError> {
        self.preferences.update_settings(channel_id, partial)
    }

    pub async fn test_channel(
        &self,
        channel_id: &str,
        message: &str,
    ) -> Result<DeliveryAttempt, DeliveryError> {
        self.tester.test_channel(channel_id, message).await
    }

    /// Feed the connectivity input.
    ///
    /// On an offline to online transition the queue is replayed only when
    /// `auto_retry_on_reconnect` is set; otherwise this returns `None` and
    /// replay is left to an explicit [`OfflineQueue::retry_all`].
    pub async fn set_online(&self, online: bool) -> Option<RetryBatchReport> {
        let change = self.queue.set_online(online);
        if change == ConnectivityChange::WentOnline && self.config.auto_retry_on_reconnect {
            tracing::info!(queued = self.queue.len(), "Back online, replaying queue");
            return Some(self.queue.retry_all().await);
        }
        None
    }

    /// Point-in-time state for rendering.
    pub fn snapshot(&self) -> CenterSnapshot {
        let channels = self
            .preferences
            .effective_configs()
            .into_iter()
            .filter_map(|(id, effective)| {
                let channel = self.registry.get(&id)?;
                Some(ChannelView {
                    display_type: channel.display_type.clone(),
                    priority: channel.priority,
                    enabled: effective.enabled,
                    settings: effective.settings,
                    testing: self.tester.is_testing(&id),
                    delivery: self.board.state(&id),
                    last_attempt: self.board.last_attempt(&id),
                    id,
                })
            })
            .collect();

        CenterSnapshot {
            taken_at: Utc::now(),
            channels,
            delivery: self.board.counts(),
            queue: self.queue.snapshot(),
        }
    }
}

/// One channel in a [`CenterSnapshot`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelView {
    pub id: String,
    pub display_type: ChannelKind,
    pub priority: i32,
    pub enabled: bool,
    pub settings: Settings,
    pub testing: bool,
    pub delivery: DeliveryState,
    pub last_attempt: Option<DeliveryAttempt>,
}

/// Everything a UI needs to render the notification subsystem.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CenterSnapshot {
    pub taken_at: DateTime<Utc>,
    pub channels: Vec<ChannelView>,
    pub delivery: DeliveryCounts,
    pub queue: QueueSnapshot,
}
