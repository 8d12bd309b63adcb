/// View recorder: append-only access events
use crate::{
    access::{ClientSignals, DeviceGroupKey},
    metrics,
    store::{AccessEvent, ContentKind, LearningStore},
};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

/// Result of recording one content open
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum RecordOutcome {
    Recorded { device_fingerprint: DeviceGroupKey },
    /// The store rejected the write; content is still shown
    Dropped { reason: String },
}

impl RecordOutcome {
    pub fn is_recorded(&self) -> bool {
        matches!(self, RecordOutcome::Recorded { .. })
    }
}

/// Appends one access event per content open
#[derive(Clone)]
pub struct ViewRecorder {
    store: Arc<dyn LearningStore>,
}

impl ViewRecorder {
    pub fn new(store: Arc<dyn LearningStore>) -> Self {
        Self { store }
    }

    /// Record an open. Never fails: store errors are logged and reported as `Dropped`.
    pub async fn record_access(
        &self,
        kind: ContentKind,
        content_id: &str,
        learner_id: &str,
        signals: &ClientSignals,
    ) -> RecordOutcome {
        let device_fingerprint = DeviceGroupKey::derive(signals);
        let event = AccessEvent {
            id: Uuid::new_v4().to_string(),
            content_kind: kind,
            content_id: content_id.to_string(),
            learner_id: learner_id.to_string(),
            device_fingerprint: device_fingerprint.clone(),
            occurred_at: Utc::now(),
        };

        match self.store.append_access_event(&event).await {
            Ok(()) => {
                metrics::record_access_event("recorded");
                RecordOutcome::Recorded { device_fingerprint }
            }
            Err(e) => {
                tracing::warn!(
                    "Failed to record access to {} {} for {}: {}",
                    kind.as_str(),
                    content_id,
                    learner_id,
                    e
                );
                metrics::record_access_event("dropped");
                RecordOutcome::Dropped {
                    reason: e.to_string(),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{memory::Fault, MemoryStore};

    #[tokio::test]
    async fn test_record_appends_every_open() {
        let store = Arc::new(MemoryStore::new());
        let recorder = ViewRecorder::new(store.clone());
        let signals = ClientSignals::default();

        for _ in 0..3 {
            let outcome = recorder
                .record_access(ContentKind::Lesson, "l1", "u1", &signals)
                .await;
            assert!(outcome.is_recorded());
        }

        assert_eq!(store.event_count().await, 3);
        let events = store
            .list_access_events(ContentKind::Lesson, "l1", "u1")
            .await
            .unwrap();
        assert!(events.iter().all(|e| e.device_fingerprint.is_unknown()));
    }

    #[tokio::test]
    async fn test_store_failure_is_swallowed() {
        let store = Arc::new(MemoryStore::new());
        store.inject_fault(Fault::AppendAccessEvent).await;
        let recorder = ViewRecorder::new(store.clone());

        let outcome = recorder
            .record_access(ContentKind::Attachment, "a1", "u1", &ClientSignals::default())
            .await;

        assert!(matches!(outcome, RecordOutcome::Dropped { .. }));
        assert_eq!(store.event_count().await, 0);
    }
}
