//! Notification channel catalog and per-user channel preferences.
//!
//! A [`Channel`] is an immutable catalog entry describing one transport
//! (web push, email, SMS, ...). The [`ChannelRegistry`] holds the catalog
//! for the lifetime of the process, and the [`PreferenceStore`] overlays a
//! user's stored choices on top of each channel's defaults.
//!
//! ```text
//! built-ins (by priority) ─┐
//!                          ├─> ChannelRegistry ──> PreferenceStore ──> EffectiveConfig
//! custom (supplied order) ─┘                            │
//!                                                       └─> on_update(full PreferenceSet)
//! ```

pub mod preferences;
pub mod registry;

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use preferences::{
    ChannelPreference, EffectiveConfig, PreferenceSet, PreferenceStore, PreferencesCallback,
};
pub use registry::ChannelRegistry;

/// Channel-specific settings (`frequency`, `phoneNumber`, `htmlFormat`, ...).
pub type Settings = serde_json::Map<String, Value>;

/// The transport a channel delivers through.
///
/// Serialized as a plain string in every catalog format: `"web"`,
/// `"email"`, ... for built-in kinds, `"custom:<name>"` for custom ones. A
/// bare string that names no built-in kind is read as a custom kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ChannelKind {
    Web,
    Mobile,
    Email,
    Sms,
    Webhook,
    /// Caller-defined transport, named by the caller.
    Custom(String),
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Web => write!(f, "web"),
            Self::Mobile => write!(f, "mobile"),
            Self::Email => write!(f, "email"),
            Self::Sms => write!(f, "sms"),
            Self::Webhook => write!(f, "webhook"),
            Self::Custom(name) => write!(f, "custom:{}", name),
        }
    }
}

impl From<String> for ChannelKind {
    fn from(value: String) -> Self {
        match value.as_str() {
            "web" => Self::Web,
            "mobile" => Self::Mobile,
            "email" => Self::Email,
            "sms" => Self::Sms,
            "webhook" => Self::Webhook,
            _ => match value.strip_prefix("custom:") {
                Some(name) => Self::Custom(name.to_string()),
                None => Self::Custom(value),
            },
        }
    }
}

impl From<ChannelKind> for String {
    fn from(kind: ChannelKind) -> Self {
        kind.to_string()
    }
}

/// A notification channel catalog entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Channel {
    /// Stable, unique identifier.
    pub id: String,
    pub display_type: ChannelKind,
    /// Lower values are tried first.
    pub priority: i32,
    #[serde(default = "default_true")]
    pub default_enabled: bool,
    #[serde(default)]
    pub default_settings: Settings,
}

impl Channel {
    /// Create an enabled channel with no default settings.
    pub fn new(id: impl Into<String>, display_type: ChannelKind, priority: i32) -> Self {
        Self {
            id: id.into(),
            display_type,
            priority,
            default_enabled: true,
            default_settings: Settings::new(),
        }
    }

    pub fn with_default_enabled(mut self, enabled: bool) -> Self {
        self.default_enabled = enabled;
        self
    }

    /// Add a default setting. Later calls for the same key win.
    pub fn with_setting(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.default_settings.insert(key.into(), value.into());
        self
    }

    /// The built-in channel catalog, in ascending priority.
    pub fn builtins() -> Vec<Channel> {
        vec![
            Channel::new("web", ChannelKind::Web, 1)
                .with_setting("frequency", "immediate")
                .with_setting("sound", true),
            Channel::new("mobile", ChannelKind::Mobile, 2)
                .with_setting("frequency", "immediate")
                .with_setting("vibrate", true),
            Channel::new("email", ChannelKind::Email, 3)
                .with_setting("frequency", "immediate")
                .with_setting("htmlFormat", true),
            Channel::new("sms", ChannelKind::Sms, 4)
                .with_default_enabled(false)
                .with_setting("frequency", "immediate")
                .with_setting("phoneNumber", ""),
            Channel::new("webhook", ChannelKind::Webhook, 5)
                .with_default_enabled(false)
                .with_setting("url", "")
                .with_setting("secret", ""),
        ]
    }
}

/// Shallow merge: every key in `overlay` replaces the key in `base`.
pub(crate) fn merge_settings(base: &mut Settings, overlay: &Settings) {
    for (key, value) in overlay {
        base.insert(key.clone(), value.clone());
    }
}

fn default_true() -> bool {
    true
}
