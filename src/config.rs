//! Runtime configuration and channel catalog files.
//!
//! [`CourierConfig`] holds the runtime knobs, read from the environment
//! (with `.env` support). [`ChannelCatalog`] is the caller's custom channel
//! definitions plus stored preferences, loaded from JSON, JSON5 or YAML.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::channels::{Channel, ChannelRegistry, PreferenceSet};
use crate::error::{ChannelError, ConfigError};
use crate::queue::DEFAULT_MAX_QUEUED;

/// Runtime knobs for the notification core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourierConfig {
    /// Retry the whole queue when connectivity comes back. Off by default:
    /// replay stays a user action.
    #[serde(default)]
    pub auto_retry_on_reconnect: bool,
    /// Fail a test or send that takes longer than this.
    #[serde(default)]
    pub send_timeout_ms: Option<u64>,
    #[serde(default = "default_max_queued")]
    pub max_queued_messages: usize,
    #[serde(default = "default_true")]
    pub start_online: bool,
}

impl Default for CourierConfig {
    fn default() -> Self {
        Self {
            auto_retry_on_reconnect: false,
            send_timeout_ms: None,
            max_queued_messages: DEFAULT_MAX_QUEUED,
            start_online: true,
        }
    }
}

impl CourierConfig {
    /// Load from the process environment, reading `.env` first if present.
    ///
    /// | Variable                  | Field                     |
    /// |---------------------------|---------------------------|
    /// | `COURIER_AUTO_RETRY`      | `auto_retry_on_reconnect` |
    /// | `COURIER_SEND_TIMEOUT_MS` | `send_timeout_ms`         |
    /// | `COURIER_MAX_QUEUE`       | `max_queued_messages`     |
    /// | `COURIER_START_ONLINE`    | `start_online`            |
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Unset keys keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(raw) = lookup("COURIER_AUTO_RETRY") {
            config.auto_retry_on_reconnect = parse_bool("COURIER_AUTO_RETRY", &raw)?;
        }
        if let Some(raw) = lookup("COURIER_SEND_TIMEOUT_MS") {
            let ms: u64 = parse_number("COURIER_SEND_TIMEOUT_MS", &raw)?;
            // 0 disables the timeout.
            config.send_timeout_ms = (ms > 0).then_some(ms);
        }
        if let Some(raw) = lookup("COURIER_MAX_QUEUE") {
            let max: usize = parse_number("COURIER_MAX_QUEUE", &raw)?;
            if max == 0 {
                return Err(ConfigError::InvalidValue {
                    key: "COURIER_MAX_QUEUE".to_string(),
                    message: "must be greater than zero".to_string(),
                });
            }
            config.max_queued_messages = max;
        }
        if let Some(raw) = lookup("COURIER_START_ONLINE") {
            config.start_online = parse_bool("COURIER_START_ONLINE", &raw)?;
        }

        Ok(config)
    }

    pub fn send_timeout(&self) -> Option<Duration> {
        self.send_timeout_ms.map(Duration::from_millis)
    }
}

fn parse_bool(key: &str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("expected a boolean, got '{}'", other),
        }),
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
        key: key.to_string(),
        message: e.to_string(),
    })
}

fn default_max_queued() -> usize {
    DEFAULT_MAX_QUEUED
}

fn default_true() -> bool {
    true
}

/// Catalog file formats, picked by extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogFormat {
    Json,
    Json5,
    Yaml,
}

impl CatalogFormat {
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        match ext.as_deref() {
            Some("json") => Ok(Self::Json),
            Some("json5") => Ok(Self::Json5),
            Some("yaml") | Some("yml") => Ok(Self::Yaml),
            _ => Err(ConfigError::ParseError(format!(
                "unsupported catalog format: {}",
                path.display()
            ))),
        }
    }
}

/// Custom channels and stored preferences supplied by the caller.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChannelCatalog {
    #[serde(default)]
    pub channels: Vec<Channel>,
    #[serde(default)]
    pub preferences: PreferenceSet,
}

impl ChannelCatalog {
    /// Load a catalog file; the format follows the extension.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let format = CatalogFormat::from_path(path)?;
        let content = std::fs::read_to_string(path)?;
        let catalog = Self::parse(&content, format)?;
        tracing::debug!(
            path = %path.display(),
            channels = catalog.channels.len(),
            preferences = catalog.preferences.len(),
            "Channel catalog loaded"
        );
        Ok(catalog)
    }

    pub fn parse(content: &str, format: CatalogFormat) -> Result<Self, ConfigError> {
        match format {
            CatalogFormat::Json => {
                serde_json::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
            }
            CatalogFormat::Json5 => {
                json5::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
            }
            CatalogFormat::Yaml => {
                serde_yaml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
            }
        }
    }

    /// Build a registry from the built-ins plus this catalog's channels.
    pub fn registry(&self) -> Result<ChannelRegistry, ChannelError> {
        ChannelRegistry::new(self.channels.clone())
    }

    /// Preference ids that do not name a channel in `registry`.
    pub fn unknown_preference_ids(&self, registry: &ChannelRegistry) -> Vec<String> {
        self.preferences
            .keys()
            .filter(|id| !registry.contains(id))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::io::Write;

    use super::*;
    use crate::channels::ChannelKind;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_env_empty() {
        let config = CourierConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, CourierConfig::default());
        assert!(!config.auto_retry_on_reconnect);
        assert!(config.send_timeout().is_none());
    }

    #[test]
    fn test_env_overrides() {
        let config = CourierConfig::from_lookup(lookup(&[
            ("COURIER_AUTO_RETRY", "yes"),
            ("COURIER_SEND_TIMEOUT_MS", "2500"),
            ("COURIER_MAX_QUEUE", "10"),
            ("COURIER_START_ONLINE", "false"),
        ]))
        .unwrap();
        assert!(config.auto_retry_on_reconnect);
        assert_eq!(config.send_timeout(), Some(Duration::from_millis(2500)));
        assert_eq!(config.max_queued_messages, 10);
        assert!(!config.start_online);
    }

    #[test]
    fn test_zero_timeout_disables() {
        let config =
            CourierConfig::from_lookup(lookup(&[("COURIER_SEND_TIMEOUT_MS", "0")])).unwrap();
        assert!(config.send_timeout().is_none());
    }

    #[test]
    fn test_invalid_values_rejected() {
        let err =
            CourierConfig::from_lookup(lookup(&[("COURIER_AUTO_RETRY", "maybe")])).unwrap_err();
        assert!(err.to_string().contains("COURIER_AUTO_RETRY"));

        let err = CourierConfig::from_lookup(lookup(&[("COURIER_MAX_QUEUE", "lots")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key, .. } if key == "COURIER_MAX_QUEUE"));

        let err = CourierConfig::from_lookup(lookup(&[("COURIER_MAX_QUEUE", "0")])).unwrap_err();
        assert!(err.to_string().contains("greater than zero"));
    }

    #[test]
    fn test_catalog_format_from_path() {
        assert_eq!(
            CatalogFormat::from_path(Path::new("c.YAML")).unwrap(),
            CatalogFormat::Yaml
        );
        assert_eq!(
            CatalogFormat::from_path(Path::new("c.json5")).unwrap(),
            CatalogFormat::Json5
        );
        assert!(CatalogFormat::from_path(Path::new("c.toml")).is_err());
    }

    #[test]
    fn test_parse_yaml_catalog() {
        let yaml = r##"
channels:
  - id: slack
    displayType: custom:slack
    priority: 10
    defaultSettings:
      channel: "#alerts"
preferences:
  email:
    settings:
      frequency: daily
"##;
        let catalog = ChannelCatalog::parse(yaml, CatalogFormat::Yaml).unwrap();
        assert_eq!(catalog.channels.len(), 1);
        assert_eq!(catalog.channels[0].default_settings["channel"], "#alerts");
        assert_eq!(
            catalog.channels[0].display_type,
            ChannelKind::Custom("slack".to_string())
        );
        assert_eq!(catalog.preferences["email"].settings["frequency"], "daily");
        assert_eq!(catalog.preferences["email"].enabled, None);
    }

    #[test]
    fn test_parse_json5_catalog() {
        let text = r#"{
            // comments are allowed
            channels: [
                { id: "pager", displayType: "custom:pager", priority: 7, defaultEnabled: false },
            ],
        }"#;
        let catalog = ChannelCatalog::parse(text, CatalogFormat::Json5).unwrap();
        assert!(!catalog.channels[0].default_enabled);
        assert!(catalog.preferences.is_empty());
    }

    #[test]
    fn test_catalog_shape_is_the_same_in_every_format() {
        let json = r#"{"channels": [{"id": "slack", "displayType": "slack", "priority": 1},
            {"id": "fax", "displayType": "custom:fax", "priority": 2}]}"#;
        let json5 = r#"{ channels: [
            { id: "slack", displayType: "slack", priority: 1 },
            { id: "fax", displayType: "custom:fax", priority: 2 },
        ] }"#;
        let yaml = "
channels:
  - id: slack
    displayType: slack
    priority: 1
  - id: fax
    displayType: custom:fax
    priority: 2
";

        let from_json = ChannelCatalog::parse(json, CatalogFormat::Json).unwrap();
        assert_eq!(ChannelCatalog::parse(json5, CatalogFormat::Json5).unwrap(), from_json);
        assert_eq!(ChannelCatalog::parse(yaml, CatalogFormat::Yaml).unwrap(), from_json);
        assert_eq!(
            from_json.channels[1].display_type,
            ChannelKind::Custom("fax".to_string())
        );
    }

    #[test]
    fn test_parse_error_is_reported() {
        let err = ChannelCatalog::parse("{not json", CatalogFormat::Json).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    #[test]
    fn test_load_from_file_and_check_unknown_preferences() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(
            file,
            r#"{{"preferences": {{"fax": {{"enabled": true}}, "web": {{"enabled": false}}}}}}"#
        )
        .unwrap();

        let catalog = ChannelCatalog::load(file.path()).unwrap();
        let registry = catalog.registry().unwrap();
        assert_eq!(catalog.unknown_preference_ids(&registry), vec!["fax".to_string()]);
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let err = ChannelCatalog::load(Path::new("/nonexistent/catalog.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
