/// Tracker of mutation ids this client issued recently.
///
/// Every attempt registers its id before it is sent. When a realtime
/// notification carries an id we issued within the TTL, it is our own write
/// coming back and is ignored. Ids are not consumed on match: the backend may
/// report the same write more than once. Expired ids are pruned on every
/// register and lookup.
use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;

use crate::mutation::MutationId;

pub struct EchoTracker {
    ttl: Duration,
    issued: HashMap<MutationId, Instant>,
}

impl EchoTracker {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            issued: HashMap::new(),
        }
    }

    /// Remember an id we are about to send.
    pub fn register(&mut self, id: &MutationId) {
        self.cleanup_expired();
        self.issued.insert(id.clone(), Instant::now());
    }

    /// True if `id` was issued by us and has not expired.
    pub fn is_own(&mut self, id: &str) -> bool {
        self.cleanup_expired();
        self.issued.contains_key(&MutationId::from(id))
    }

    /// Remove ids older than the TTL.
    pub fn cleanup_expired(&mut self) {
        let now = Instant::now();
        let ttl = self.ttl;
        self.issued
            .retain(|_, registered_at| now.duration_since(*registered_at) < ttl);
    }

    pub fn len(&self) -> usize {
        self.issued.len()
    }

    pub fn is_empty(&self) -> bool {
        self.issued.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_match() {
        let mut tracker = EchoTracker::new(Duration::from_secs(120));
        let id = MutationId::generate();
        tracker.register(&id);
        assert!(tracker.is_own(id.as_str()));
        // matching does not consume
        assert!(tracker.is_own(id.as_str()));
    }

    #[test]
    fn test_foreign_id_does_not_match() {
        let mut tracker = EchoTracker::new(Duration::from_secs(120));
        tracker.register(&MutationId::generate());
        assert!(!tracker.is_own("someone-else"));
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn test_expired_ids_stop_matching() {
        let mut tracker = EchoTracker::new(Duration::from_millis(1));
        let id = MutationId::generate();
        tracker.register(&id);
        std::thread::sleep(Duration::from_millis(5));
        assert!(!tracker.is_own(id.as_str()));
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_register_prunes_expired_ids() {
        let mut tracker = EchoTracker::new(Duration::from_millis(1));
        tracker.register(&MutationId::generate());
        std::thread::sleep(Duration::from_millis(5));
        tracker.register(&MutationId::generate());
        assert_eq!(tracker.len(), 1);
    }
}
