/// Content access control
///
/// Handles the learner-facing side of content delivery: device grouping,
/// access event recording and view/device ceilings.

pub mod checker;
pub mod fingerprint;
pub mod recorder;

pub use checker::{AccessDecision, EntitlementChecker};
pub use fingerprint::{ClientSignals, DeviceGroupKey};
pub use recorder::{RecordOutcome, ViewRecorder};

use crate::{
    error::{LmsError, LmsResult},
    metrics,
    store::{ContentKind, ContentUnit, LearningStore},
};
use serde::Serialize;
use std::sync::Arc;

/// Result of opening a content unit
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenOutcome {
    pub decision: AccessDecision,
    pub allowed: bool,
    /// True when the decision was made without the learner's event history
    pub degraded: bool,
    pub record: Option<RecordOutcome>,
}

/// Check-then-record gate in front of lessons and attachments.
///
/// The check runs on events recorded before this open, and only allowed
/// opens are recorded, so `view_limit = N` grants exactly N opens.
#[derive(Clone)]
pub struct ContentGate {
    store: Arc<dyn LearningStore>,
    checker: EntitlementChecker,
    recorder: ViewRecorder,
    fail_open: bool,
}

impl ContentGate {
    pub fn new(store: Arc<dyn LearningStore>, fail_open: bool) -> Self {
        Self {
            checker: EntitlementChecker::new(store.clone()),
            recorder: ViewRecorder::new(store.clone()),
            store,
            fail_open,
        }
    }

    /// Current decision without recording an open
    pub async fn status(
        &self,
        kind: ContentKind,
        content_id: &str,
        learner_id: &str,
    ) -> LmsResult<(AccessDecision, bool)> {
        match self.load_unit(kind, content_id).await? {
            Some(unit) => Ok(self.decide(&unit, learner_id).await),
            None => Ok((AccessDecision::without_history(self.fail_open), true)),
        }
    }

    /// Open a content unit: check ceilings, then record the open if allowed
    pub async fn open(
        &self,
        kind: ContentKind,
        content_id: &str,
        learner_id: &str,
        signals: &ClientSignals,
    ) -> LmsResult<OpenOutcome> {
        let (decision, degraded) = match self.load_unit(kind, content_id).await? {
            Some(unit) => self.decide(&unit, learner_id).await,
            None => (AccessDecision::without_history(self.fail_open), true),
        };

        metrics::record_access_decision(decision.label());

        let allowed = decision.allowed();
        let record = if allowed {
            Some(
                self.recorder
                    .record_access(kind, content_id, learner_id, signals)
                    .await,
            )
        } else {
            tracing::info!(
                "Denied {} {} for {} ({})",
                kind.as_str(),
                content_id,
                learner_id,
                decision.label()
            );
            None
        };

        Ok(OpenOutcome {
            decision,
            allowed,
            degraded,
            record,
        })
    }

    /// Fetch the unit. `Ok(None)` means the store could not answer and the
    /// caller should degrade; a missing unit is `NotFound`.
    async fn load_unit(&self, kind: ContentKind, content_id: &str) -> LmsResult<Option<ContentUnit>> {
        match self.store.get_content_unit(kind, content_id).await {
            Ok(Some(unit)) => Ok(Some(unit)),
            Ok(None) => Err(LmsError::NotFound(format!(
                "{} {} not found",
                kind.as_str(),
                content_id
            ))),
            Err(e) if e.is_transient() => {
                tracing::warn!(
                    "Could not load {} {}, deciding without limits: {}",
                    kind.as_str(),
                    content_id,
                    e
                );
                metrics::record_error(e.code(), "access");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn decide(&self, unit: &ContentUnit, learner_id: &str) -> (AccessDecision, bool) {
        match self.checker.check_access(unit, learner_id).await {
            Ok(decision) => (decision, false),
            Err(e) => {
                tracing::warn!(
                    "Access history unavailable for {} {} / {}: {}",
                    unit.kind.as_str(),
                    unit.id,
                    learner_id,
                    e
                );
                metrics::record_error(e.code(), "access");
                (AccessDecision::without_history(self.fail_open), true)
            }
        }
    }
}
