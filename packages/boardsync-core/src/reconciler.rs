/// Decides how to react to activity reported by other clients.
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::echo::EchoTracker;
use crate::mutation::MutationId;

/// Out-of-band activity notification from the realtime channel.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mutation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub board_version_after: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileDecision {
    /// Our own write echoed back.
    IgnoreEcho,
    /// A drag is in progress; resync once it ends.
    Defer,
    /// Reported version is not newer than what we already know.
    IgnoreStale,
    Resync,
}

pub struct RealtimeReconciler {
    echoes: EchoTracker,
    resync_pending: bool,
}

impl RealtimeReconciler {
    pub fn new(echo_ttl: Duration) -> Self {
        Self {
            echoes: EchoTracker::new(echo_ttl),
            resync_pending: false,
        }
    }

    /// Record an id this client is about to send.
    pub fn register_issued(&mut self, id: &MutationId) {
        self.echoes.register(id);
    }

    pub fn on_activity(
        &mut self,
        event: &ActivityEvent,
        known_version: u64,
        dragging: bool,
    ) -> ReconcileDecision {
        if let Some(id) = event.mutation_id.as_deref() {
            if self.echoes.is_own(id) {
                return ReconcileDecision::IgnoreEcho;
            }
        }
        if dragging {
            self.resync_pending = true;
            return ReconcileDecision::Defer;
        }
        if event
            .board_version_after
            .is_some_and(|version| version <= known_version)
        {
            return ReconcileDecision::IgnoreStale;
        }
        ReconcileDecision::Resync
    }

    /// Hold a resync back until the current drag ends.
    pub fn defer_resync(&mut self) {
        self.resync_pending = true;
    }

    /// Called when a drag ends. True if a deferred resync should fire now.
    pub fn on_drag_end(&mut self) -> bool {
        std::mem::take(&mut self.resync_pending)
    }

    pub fn has_pending_resync(&self) -> bool {
        self.resync_pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(mutation_id: Option<&str>, version: Option<u64>) -> ActivityEvent {
        ActivityEvent {
            action: Some("card.moved".to_string()),
            mutation_id: mutation_id.map(str::to_string),
            board_version_after: version,
        }
    }

    #[test]
    fn test_own_echo_is_ignored() {
        let mut reconciler = RealtimeReconciler::new(Duration::from_secs(120));
        let id = MutationId::generate();
        reconciler.register_issued(&id);
        let decision = reconciler.on_activity(&event(Some(id.as_str()), Some(99)), 1, false);
        assert_eq!(decision, ReconcileDecision::IgnoreEcho);
        // echoes are ignored even mid-drag, without scheduling a resync
        let decision = reconciler.on_activity(&event(Some(id.as_str()), Some(99)), 1, true);
        assert_eq!(decision, ReconcileDecision::IgnoreEcho);
        assert!(!reconciler.has_pending_resync());
    }

    #[test]
    fn test_defers_while_dragging() {
        let mut reconciler = RealtimeReconciler::new(Duration::from_secs(120));
        let decision = reconciler.on_activity(&event(Some("other"), Some(5)), 1, true);
        assert_eq!(decision, ReconcileDecision::Defer);
        assert!(reconciler.on_drag_end());
        assert!(!reconciler.on_drag_end());
    }

    #[test]
    fn test_resync_deferred_after_scheduling_fires_on_drag_end() {
        let mut reconciler = RealtimeReconciler::new(Duration::from_secs(120));
        assert_eq!(
            reconciler.on_activity(&event(Some("other"), Some(5)), 1, false),
            ReconcileDecision::Resync
        );
        // the drag began while the resync was still settling
        reconciler.defer_resync();
        assert!(reconciler.has_pending_resync());
        assert!(reconciler.on_drag_end());
    }

    #[test]
    fn test_stale_version_is_ignored() {
        let mut reconciler = RealtimeReconciler::new(Duration::from_secs(120));
        assert_eq!(
            reconciler.on_activity(&event(None, Some(4)), 4, false),
            ReconcileDecision::IgnoreStale
        );
        assert_eq!(
            reconciler.on_activity(&event(None, Some(3)), 4, false),
            ReconcileDecision::IgnoreStale
        );
    }

    #[test]
    fn test_newer_or_unversioned_activity_resyncs() {
        let mut reconciler = RealtimeReconciler::new(Duration::from_secs(120));
        assert_eq!(
            reconciler.on_activity(&event(Some("other"), Some(5)), 4, false),
            ReconcileDecision::Resync
        );
        assert_eq!(
            reconciler.on_activity(&ActivityEvent::default(), 4, false),
            ReconcileDecision::Resync
        );
    }

    #[test]
    fn test_activity_event_wire_shape() {
        let parsed: ActivityEvent =
            serde_json::from_str(r#"{"action":"list.reordered","boardVersionAfter":8}"#).unwrap();
        assert_eq!(parsed.board_version_after, Some(8));
        assert!(parsed.mutation_id.is_none());
    }
}
