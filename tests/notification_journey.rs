//! Integration tests from a caller's perspective.
//!
//! These tests drive the notification core through its public API only,
//! the way a UI layer would: configure channels and preferences, run test
//! sends, queue messages while offline, and replay them.
//!
//! Run: `cargo test --test notification_journey`

/// Scripted transports shared by the journeys below.
mod support {
    use std::collections::{HashMap, HashSet};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use courier::{DeliveryFailure, MessageSender, QueuedMessage, TestReceipt, TestSender};
    use tokio::sync::Notify;

    /// Message sender that fails for selected ids and can hold sends open.
    #[derive(Default)]
    pub struct ScriptedMessages {
        pub failing: Mutex<HashSet<String>>,
        pub held: Mutex<HashSet<String>>,
        pub release: Notify,
        pub calls: Mutex<HashMap<String, usize>>,
    }

    impl ScriptedMessages {
        pub fn fail(&self, id: &str) {
            self.failing.lock().unwrap().insert(id.to_string());
        }

        pub fn hold(&self, id: &str) {
            self.held.lock().unwrap().insert(id.to_string());
        }

        pub fn calls(&self, id: &str) -> usize {
            self.calls.lock().unwrap().get(id).copied().unwrap_or(0)
        }
    }

    #[async_trait]
    impl MessageSender for ScriptedMessages {
        async fn send_message(&self, message: &QueuedMessage) -> Result<(), DeliveryFailure> {
            *self.calls.lock().unwrap().entry(message.id.clone()).or_default() += 1;
            let held = self.held.lock().unwrap().contains(&message.id);
            if held {
                self.release.notified().await;
            }
            if self.failing.lock().unwrap().contains(&message.id) {
                return Err(DeliveryFailure::new(format!("server rejected {}", message.id)));
            }
            Ok(())
        }
    }

    /// Test sender that records which channels it was asked to dial.
    #[derive(Default)]
    pub struct RecordingTests {
        pub dialed: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl TestSender for RecordingTests {
        async fn send_test(
            &self,
            channel_id: &str,
            _message: &str,
        ) -> Result<TestReceipt, DeliveryFailure> {
            self.dialed.lock().unwrap().push(channel_id.to_string());
            if channel_id == "webhook" {
                return Err(DeliveryFailure::new("endpoint returned 502"));
            }
            Ok(TestReceipt::ok(format!("Test notification sent via {}", channel_id)))
        }
    }
}

// ============================================================================
// 1. Preference Journey
// ============================================================================
mod preferences {
    use std::sync::{Arc, Mutex};

    use courier::{ChannelPreference, NotificationCenter, PreferenceSet};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use crate::support::{RecordingTests, ScriptedMessages};

    #[test]
    fn test_stored_preference_overlays_defaults() {
        let mut stored = PreferenceSet::new();
        stored.insert(
            "email".to_string(),
            ChannelPreference::with_settings(
                json!({"frequency": "daily"}).as_object().cloned().unwrap(),
            ),
        );

        let center = NotificationCenter::builder(
            Arc::new(RecordingTests::default()),
            Arc::new(ScriptedMessages::default()),
        )
        .preferences(stored)
        .build()
        .unwrap();

        let config = center.effective_config("email").unwrap();
        assert_eq!(
            serde_json::to_value(&config.settings).unwrap(),
            json!({"frequency": "daily", "htmlFormat": true})
        );
    }

    #[test]
    fn test_update_callback_carries_full_preference() {
        let persisted: Arc<Mutex<Vec<PreferenceSet>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&persisted);

        let center = NotificationCenter::builder(
            Arc::new(RecordingTests::default()),
            Arc::new(ScriptedMessages::default()),
        )
        .on_preferences_update(move |set| sink.lock().unwrap().push(set.clone()))
        .build()
        .unwrap();

        center
            .update_settings("email", json!({"frequency": "hourly"}).as_object().cloned().unwrap())
            .unwrap();
        center.set_enabled("sms", true).unwrap();

        let persisted = persisted.lock().unwrap();
        assert_eq!(persisted.len(), 2);

        let email = &persisted[0]["email"];
        assert_eq!(
            serde_json::to_value(email).unwrap(),
            json!({"enabled": true, "settings": {"frequency": "hourly", "htmlFormat": true}})
        );

        // The second payload is the whole set, email included.
        assert!(persisted[1].contains_key("email"));
        assert_eq!(persisted[1]["sms"].enabled, Some(true));
    }
}

// ============================================================================
// 2. Test-send Journey
// ============================================================================
mod test_sends {
    use std::sync::Arc;

    use courier::{ChannelError, DeliveryError, DeliveryOutcome, DeliveryState, NotificationCenter};
    use pretty_assertions::assert_eq;

    use crate::support::{RecordingTests, ScriptedMessages};

    fn center(tests: Arc<RecordingTests>) -> NotificationCenter {
        NotificationCenter::builder(tests, Arc::new(ScriptedMessages::default()))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_disabled_channel_never_dials_out() {
        let tests = Arc::new(RecordingTests::default());
        let center = center(Arc::clone(&tests));
        center.set_enabled("email", false).unwrap();

        let err = center.test_channel("email", "ping").await.unwrap_err();
        assert_eq!(
            err,
            DeliveryError::Channel(ChannelError::Disabled {
                id: "email".to_string()
            })
        );
        assert!(tests.dialed.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_test_keeps_channel_enabled() {
        let tests = Arc::new(RecordingTests::default());
        let center = center(Arc::clone(&tests));
        center.set_enabled("webhook", true).unwrap();

        let attempt = center.test_channel("webhook", "ping").await.unwrap();
        assert_eq!(attempt.outcome, DeliveryOutcome::Failure);
        assert_eq!(attempt.detail, "endpoint returned 502");
        assert!(center.effective_config("webhook").unwrap().enabled);
        assert_eq!(center.board().state("webhook"), DeliveryState::Failed);
    }

    #[tokio::test]
    async fn test_status_board_counts_across_channels() {
        let tests = Arc::new(RecordingTests::default());
        let center = center(Arc::clone(&tests));
        center.set_enabled("webhook", true).unwrap();

        for channel in ["web", "email", "webhook"] {
            center.test_channel(channel, "ping").await.unwrap();
        }

        let counts = center.snapshot().delivery;
        assert_eq!((counts.success, counts.failed, counts.pending), (2, 1, 0));
        assert_eq!(
            *tests.dialed.lock().unwrap(),
            vec!["web".to_string(), "email".to_string(), "webhook".to_string()]
        );
    }
}

// ============================================================================
// 3. Offline Queue Journey
// ============================================================================
mod offline_queue {
    use std::sync::Arc;

    use courier::{
        CourierConfig, EnqueueOutcome, MessageStatus, NotificationCenter, QueueError,
        QueuedMessage, RetryOutcome, SendOutcome,
    };
    use pretty_assertions::assert_eq;
    use tokio_test::{assert_err, assert_ok};

    use crate::support::{RecordingTests, ScriptedMessages};

    fn offline_center(messages: Arc<ScriptedMessages>) -> NotificationCenter {
        NotificationCenter::builder(Arc::new(RecordingTests::default()), messages)
            .config(CourierConfig {
                start_online: false,
                ..CourierConfig::default()
            })
            .build()
            .unwrap()
    }

    #[test]
    fn test_enqueue_same_id_twice_keeps_one_entry() {
        let center = offline_center(Arc::new(ScriptedMessages::default()));
        let queue = center.queue();

        assert_eq!(
            queue.enqueue(QueuedMessage::new("A", "Interview at 10am")).unwrap(),
            EnqueueOutcome::Queued
        );
        assert_eq!(
            queue.enqueue(QueuedMessage::new("A", "Interview at 10am")).unwrap(),
            EnqueueOutcome::AlreadyQueued
        );
        assert_eq!(queue.len(), 1);
    }

    #[tokio::test]
    async fn test_partial_failure_batch_leaves_only_failed_message() {
        let messages = Arc::new(ScriptedMessages::default());
        messages.fail("B");
        let center = offline_center(Arc::clone(&messages));

        for id in ["A", "B", "C"] {
            center
                .queue()
                .send_or_enqueue(QueuedMessage::new(id, "Document received"))
                .await
                .unwrap();
        }
        assert_eq!(center.queue().len(), 3);

        // Coming back online does not send anything on its own.
        assert!(center.set_online(true).await.is_none());
        assert_eq!(messages.calls("A"), 0);

        let report = center.queue().retry_all().await;
        assert_eq!(report.delivered, vec!["A".to_string(), "C".to_string()]);
        assert_eq!(report.failed.len(), 1);

        let snapshot = center.queue().snapshot();
        assert_eq!(snapshot.messages.len(), 1);
        assert_eq!(snapshot.messages[0].message.id, "B");
        assert_eq!(snapshot.messages[0].status, MessageStatus::Failed);
        assert_eq!(
            snapshot.messages[0].last_error.as_deref(),
            Some("server rejected B")
        );
    }

    #[tokio::test]
    async fn test_two_concurrent_retries_send_once() {
        let messages = Arc::new(ScriptedMessages::default());
        messages.hold("A");
        let center = offline_center(Arc::clone(&messages));
        center.queue().enqueue(QueuedMessage::new("A", "Offer letter")).unwrap();

        let first = center.queue().retry("A");
        let second = async {
            tokio::task::yield_now().await;
            let result = center.queue().retry("A").await;
            messages.release.notify_one();
            result
        };
        let (first, second) = tokio::join!(first, second);

        assert_eq!(assert_ok!(first), RetryOutcome::Delivered);
        assert_eq!(
            assert_err!(second),
            QueueError::RetryInProgress { id: "A".to_string() }
        );
        assert_eq!(messages.calls("A"), 1);
    }

    #[tokio::test]
    async fn test_delete_during_send_ignores_late_success() {
        let messages = Arc::new(ScriptedMessages::default());
        messages.hold("X");
        let center = offline_center(Arc::clone(&messages));
        center.queue().enqueue(QueuedMessage::new("X", "KYC reminder")).unwrap();
        center.queue().enqueue(QueuedMessage::new("Y", "Untouched")).unwrap();

        let retry = center.queue().retry("X");
        let delete = async {
            tokio::task::yield_now().await;
            assert!(center.queue().delete("X"));
            let before = center.queue().snapshot();
            messages.release.notify_one();
            before
        };
        let (outcome, before) = tokio::join!(retry, delete);

        assert_eq!(outcome.unwrap(), RetryOutcome::Discarded);
        let after = center.queue().snapshot();
        assert_eq!(after, before);
        assert!(center.queue().get("X").is_none());
        assert_eq!(center.queue().status("Y"), Some(MessageStatus::Pending));
    }

    #[tokio::test]
    async fn test_online_send_failure_is_queued_for_retry() {
        let messages = Arc::new(ScriptedMessages::default());
        messages.fail("A");
        let center = offline_center(Arc::clone(&messages));
        center.set_online(true).await;

        let outcome = center
            .queue()
            .send_or_enqueue(QueuedMessage::new("A", "Status update"))
            .await
            .unwrap();
        assert!(matches!(outcome, SendOutcome::QueuedAfterFailure { .. }));

        messages.failing.lock().unwrap().clear();
        assert_eq!(center.queue().retry("A").await.unwrap(), RetryOutcome::Delivered);
        assert!(center.queue().is_empty());
        assert_eq!(messages.calls("A"), 2);
    }

    #[tokio::test]
    async fn test_auto_retry_on_reconnect_is_opt_in() {
        let messages = Arc::new(ScriptedMessages::default());
        let center = NotificationCenter::builder(
            Arc::new(RecordingTests::default()),
            Arc::clone(&messages) as _,
        )
        .config(CourierConfig {
            start_online: false,
            auto_retry_on_reconnect: true,
            ..CourierConfig::default()
        })
        .build()
        .unwrap();
        center
            .queue()
            .enqueue(QueuedMessage::new("A", "Queued while offline"))
            .unwrap();

        let report = center.set_online(true).await.expect("auto retry runs");
        assert_eq!(report.delivered, vec!["A".to_string()]);
        assert!(center.queue().is_empty());
    }
}

// ============================================================================
// 4. Catalog Journey
// ============================================================================
mod catalog {
    use std::io::Write;
    use std::sync::Arc;

    use courier::{CatalogFormat, ChannelCatalog, ChannelKind, NotificationCenter};
    use pretty_assertions::assert_eq;

    use crate::support::{RecordingTests, ScriptedMessages};

    #[tokio::test]
    async fn test_yaml_catalog_drives_center() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        file.write_all(
            b"
channels:
  - id: recruiter-slack
    displayType: custom:slack
    priority: 1
preferences:
  web:
    enabled: false
",
        )
        .unwrap();

        let catalog = ChannelCatalog::load(file.path()).unwrap();
        let tests = Arc::new(RecordingTests::default());
        let center = NotificationCenter::builder(
            Arc::clone(&tests) as _,
            Arc::new(ScriptedMessages::default()),
        )
        .catalog(catalog)
        .build()
        .unwrap();

        let ids: Vec<&str> = center
            .registry()
            .all_channels()
            .iter()
            .map(|c| c.id.as_str())
            .collect();
        assert_eq!(
            ids,
            vec!["web", "mobile", "email", "sms", "webhook", "recruiter-slack"]
        );
        assert_eq!(
            center.registry().get("recruiter-slack").unwrap().display_type,
            ChannelKind::Custom("slack".to_string())
        );
        assert!(!center.effective_config("web").unwrap().enabled);

        center.test_channel("recruiter-slack", "ping").await.unwrap();
        assert_eq!(*tests.dialed.lock().unwrap(), vec!["recruiter-slack".to_string()]);
    }

    #[test]
    fn test_duplicate_catalog_channel_is_rejected() {
        let catalog = ChannelCatalog::parse(
            r#"{"channels": [
                {"id": "pager", "displayType": "custom:pager", "priority": 1},
                {"id": "pager", "displayType": "custom:pager", "priority": 2}
            ]}"#,
            CatalogFormat::Json,
        )
        .unwrap();
        assert!(catalog.registry().is_err());
        assert!(
            NotificationCenter::builder(
                Arc::new(RecordingTests::default()),
                Arc::new(ScriptedMessages::default()),
            )
            .catalog(catalog)
            .build()
            .is_err()
        );
    }
}
