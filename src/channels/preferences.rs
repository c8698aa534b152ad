//! Per-user channel preferences layered over channel defaults.
//!
//! The store keeps the user's preference set in memory only. Every mutation
//! hands the complete, updated set to the caller's callback so it can be
//! persisted in one write (local storage, server sync, ...).

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};

use crate::channels::{Channel, ChannelRegistry, Settings, merge_settings};
use crate::error::ChannelError;

/// A user's stored choice for one channel.
///
/// `enabled` is optional because persisted preferences may carry only a
/// settings override; the channel default applies in that case.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChannelPreference {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub settings: Settings,
}

impl ChannelPreference {
    pub fn enabled(enabled: bool) -> Self {
        Self {
            enabled: Some(enabled),
            settings: Settings::new(),
        }
    }

    pub fn with_settings(settings: Settings) -> Self {
        Self {
            enabled: None,
            settings,
        }
    }
}

/// Preferences keyed by channel id.
pub type PreferenceSet = BTreeMap<String, ChannelPreference>;

/// Invoked with the full preference set after every mutation.
pub type PreferencesCallback = Arc<dyn Fn(&PreferenceSet) + Send + Sync>;

/// Stored preference overlaid on the channel defaults.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EffectiveConfig {
    pub enabled: bool,
    pub settings: Settings,
}

impl EffectiveConfig {
    fn resolve(channel: &Channel, stored: Option<&ChannelPreference>) -> Self {
        let mut settings = channel.default_settings.clone();
        let mut enabled = channel.default_enabled;
        if let Some(pref) = stored {
            merge_settings(&mut settings, &pref.settings);
            enabled = pref.enabled.unwrap_or(enabled);
        }
        Self { enabled, settings }
    }
}

/// Merges stored preferences with channel defaults and applies mutations.
pub struct PreferenceStore {
    registry: Arc<ChannelRegistry>,
    preferences: RwLock<PreferenceSet>,
    on_update: Option<PreferencesCallback>,
}

impl PreferenceStore {
    /// Create a store over `stored` preferences.
    ///
    /// Entries for ids the registry does not know are kept so the caller's
    /// next persist does not silently drop them, but they never surface in
    /// an effective config.
    pub fn new(registry: Arc<ChannelRegistry>, stored: PreferenceSet) -> Self {
        for id in stored.keys().filter(|id| !registry.contains(id)) {
            tracing::warn!(channel = %id, "Stored preference references an unknown channel");
        }
        Self {
            registry,
            preferences: RwLock::new(stored),
            on_update: None,
        }
    }

    /// Register the persistence callback.
    pub fn with_callback(mut self, on_update: PreferencesCallback) -> Self {
        self.on_update = Some(on_update);
        self
    }

    pub fn registry(&self) -> &ChannelRegistry {
        &self.registry
    }

    /// The effective configuration of a registered channel.
    pub fn effective_config(&self, channel_id: &str) -> Result<EffectiveConfig, ChannelError> {
        let channel = self.registry.require(channel_id)?;
        let prefs = self.read();
        Ok(EffectiveConfig::resolve(channel, prefs.get(channel_id)))
    }

    /// Effective configurations for every channel, in registry order.
    pub fn effective_configs(&self) -> Vec<(String, EffectiveConfig)> {
        let prefs = self.read();
        self.registry
            .all_channels()
            .iter()
            .map(|c| (c.id.clone(), EffectiveConfig::resolve(c, prefs.get(&c.id))))
            .collect()
    }

    pub fn is_enabled(&self, channel_id: &str) -> Result<bool, ChannelError> {
        Ok(self.effective_config(channel_id)?.enabled)
    }

    /// Toggle a channel and hand the full preference set to the callback.
    pub fn set_enabled(&self, channel_id: &str, enabled: bool) -> Result<(), ChannelError> {
        self.mutate(channel_id, |pref| pref.enabled = Some(enabled))?;
        tracing::debug!(channel = channel_id, enabled, "Channel preference toggled");
        Ok(())
    }

    /// Shallow-merge `partial` into the channel's settings and hand the
    /// full preference set to the callback. Keys absent from `partial` are
    /// preserved.
    pub fn update_settings(&self, channel_id: &str, partial: Settings) -> Result<(), ChannelError> {
        let keys = partial.len();
        self.mutate(channel_id, |pref| merge_settings(&mut pref.settings, &partial))?;
        tracing::debug!(channel = channel_id, keys, "Channel settings updated");
        Ok(())
    }

    /// A copy of the current preference set.
    pub fn preferences(&self) -> PreferenceSet {
        self.read().clone()
    }

    fn mutate<F>(&self, channel_id: &str, apply: F) -> Result<(), ChannelError>
    where
        F: FnOnce(&mut ChannelPreference),
    {
        let channel = self.registry.require(channel_id)?;

        let snapshot = {
            let mut prefs = self
                .preferences
                .write()
                .unwrap_or_else(PoisonError::into_inner);

            // Materialize the full preference (defaults + stored override) so
            // the persisted object is complete, not just the delta.
            let current = EffectiveConfig::resolve(channel, prefs.get(channel_id));
            let pref = prefs.entry(channel_id.to_string()).or_default();
            pref.enabled = Some(current.enabled);
            pref.settings = current.settings;
            apply(pref);

            prefs.clone()
        };

        // Invoked outside the lock so the callback may read the store.
        if let Some(cb) = &self.on_update {
            cb(&snapshot);
        }
        Ok(())
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, PreferenceSet> {
        self.preferences.read().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for PreferenceStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PreferenceStore")
            .field("channels", &self.registry.len())
            .field("preferences", &*self.read())
            .field("has_callback", &self.on_update.is_some())
            .finish()
    }
}
