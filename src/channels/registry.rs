//! Read-only channel catalog.

use std::collections::HashMap;

use crate::channels::Channel;
use crate::error::ChannelError;

/// The catalog of notification channels available for this session.
///
/// Built-ins come first in ascending priority, followed by caller-supplied
/// custom channels in the order they were supplied. Ids are unique across
/// the whole catalog.
#[derive(Debug, Clone)]
pub struct ChannelRegistry {
    channels: Vec<Channel>,
    index: HashMap<String, usize>,
}

impl ChannelRegistry {
    /// Build a registry from the built-in catalog plus `custom` channels.
    pub fn new(custom: Vec<Channel>) -> Result<Self, ChannelError> {
        Self::from_parts(Channel::builtins(), custom)
    }

    /// Build a registry from explicit built-in and custom lists.
    ///
    /// `builtins` are re-sorted by priority (stable, so equal priorities keep
    /// their given order); `custom` keeps its order.
    pub fn from_parts(
        mut builtins: Vec<Channel>,
        custom: Vec<Channel>,
    ) -> Result<Self, ChannelError> {
        builtins.sort_by_key(|c| c.priority);

        let mut channels = Vec::with_capacity(builtins.len() + custom.len());
        let mut index = HashMap::with_capacity(builtins.len() + custom.len());

        for channel in builtins.into_iter().chain(custom) {
            if index.contains_key(&channel.id) {
                return Err(ChannelError::Duplicate { id: channel.id });
            }
            index.insert(channel.id.clone(), channels.len());
            channels.push(channel);
        }

        tracing::debug!(channels = channels.len(), "Channel registry built");

        Ok(Self { channels, index })
    }

    /// All channels, built-ins first.
    pub fn all_channels(&self) -> &[Channel] {
        &self.channels
    }

    /// Look up a channel by id.
    pub fn get(&self, id: &str) -> Option<&Channel> {
        self.index.get(id).map(|&i| &self.channels[i])
    }

    /// Look up a channel by id, failing with [`ChannelError::Unknown`].
    pub fn require(&self, id: &str) -> Result<&Channel, ChannelError> {
        self.get(id).ok_or_else(|| ChannelError::Unknown { id: id.to_string() })
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}

impl Default for ChannelRegistry {
    fn default() -> Self {
        let channels = Channel::builtins();
        let index = channels
            .iter()
            .enumerate()
            .map(|(i, c)| (c.id.clone(), i))
            .collect();
        Self { channels, index }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::ChannelKind;

    fn custom(id: &str, priority: i32) -> Channel {
        Channel::new(id, ChannelKind::Custom(id.to_string()), priority)
    }

    #[test]
    fn test_default_registry_has_builtins() {
        let registry = ChannelRegistry::default();
        let ids: Vec<&str> = registry.all_channels().iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["web", "mobile", "email", "sms", "webhook"]);
    }

    #[test]
    fn test_custom_channels_follow_builtins_in_supplied_order() {
        // Custom priorities are deliberately lower than the built-ins: order
        // is still built-ins first, customs as supplied.
        let registry = ChannelRegistry::new(vec![custom("slack", 0), custom("pager", -5)]).unwrap();
        let ids: Vec<&str> = registry.all_channels().iter().map(|c| c.id.as_str()).collect();
        assert_eq!(
            ids,
            vec!["web", "mobile", "email", "sms", "webhook", "slack", "pager"]
        );
    }

    #[test]
    fn test_builtins_sorted_by_priority() {
        let registry = ChannelRegistry::from_parts(
            vec![custom("c", 3), custom("a", 1), custom("b", 2)],
            vec![],
        )
        .unwrap();
        let ids: Vec<&str> = registry.all_channels().iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_duplicate_custom_id_rejected() {
        let err = ChannelRegistry::new(vec![custom("slack", 1), custom("slack", 2)]).unwrap_err();
        assert_eq!(
            err,
            ChannelError::Duplicate {
                id: "slack".to_string()
            }
        );
    }

    #[test]
    fn test_custom_shadowing_builtin_rejected() {
        let err = ChannelRegistry::new(vec![custom("email", 9)]).unwrap_err();
        assert!(matches!(err, ChannelError::Duplicate { id } if id == "email"));
    }

    #[test]
    fn test_require_unknown_channel() {
        let registry = ChannelRegistry::default();
        assert!(registry.require("email").is_ok());
        assert_eq!(
            registry.require("fax").unwrap_err(),
            ChannelError::Unknown {
                id: "fax".to_string()
            }
        );
        assert!(!registry.contains("fax"));
        assert_eq!(registry.len(), 5);
    }
}
