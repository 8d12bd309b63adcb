/// Entitlement checker: view and device ceilings
use crate::{
    error::LmsResult,
    store::{AccessEvent, ContentUnit, LearningStore},
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;

/// Access decision for the next open of a content unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessDecision {
    pub can_view: bool,
    pub can_view_on_device: bool,
    pub view_count: usize,
    pub device_count: usize,
}

impl AccessDecision {
    /// Evaluate ceilings against the events recorded so far.
    ///
    /// Both comparisons are strict: with `view_limit = N` and N recorded
    /// events, the next open is denied.
    pub fn evaluate(unit: &ContentUnit, events: &[AccessEvent]) -> Self {
        let view_count = events.len();
        let device_count = events
            .iter()
            .map(|e| &e.device_fingerprint)
            .collect::<HashSet<_>>()
            .len();

        Self {
            can_view: unit
                .view_limit
                .map_or(true, |limit| view_count < limit as usize),
            can_view_on_device: unit
                .device_limit
                .map_or(true, |limit| device_count < limit as usize),
            view_count,
            device_count,
        }
    }

    /// Decision used when the event history could not be read
    pub fn without_history(allow: bool) -> Self {
        Self {
            can_view: allow,
            can_view_on_device: allow,
            view_count: 0,
            device_count: 0,
        }
    }

    /// Both ceilings must pass
    pub fn allowed(&self) -> bool {
        self.can_view && self.can_view_on_device
    }

    /// Metrics label for the decision
    pub fn label(&self) -> &'static str {
        match (self.can_view, self.can_view_on_device) {
            (true, true) => "allowed",
            (false, true) => "view_limit",
            (true, false) => "device_limit",
            (false, false) => "both_limits",
        }
    }
}

/// Reads accumulated access events and applies the unit's ceilings
#[derive(Clone)]
pub struct EntitlementChecker {
    store: Arc<dyn LearningStore>,
}

impl EntitlementChecker {
    pub fn new(store: Arc<dyn LearningStore>) -> Self {
        Self { store }
    }

    /// Decide whether `learner_id` may open `unit` once more
    pub async fn check_access(&self, unit: &ContentUnit, learner_id: &str) -> LmsResult<AccessDecision> {
        let events = self
            .store
            .list_access_events(unit.kind, &unit.id, learner_id)
            .await?;

        let decision = AccessDecision::evaluate(unit, &events);
        tracing::debug!(
            "Access check {} {} for {}: views {}/{:?}, devices {}/{:?}",
            unit.kind.as_str(),
            unit.id,
            learner_id,
            decision.view_count,
            unit.view_limit,
            decision.device_count,
            unit.device_limit
        );

        Ok(decision)
    }
}
