/// Mutation queue state machine.
///
/// Owns the pending intents, the sequence counter, the in-flight slot and the
/// debounce generation. It never awaits: the session drives it between
/// suspension points and performs the network calls and timers itself.
///
/// Coalescing: at most one list reorder and at most one move per card are
/// queued at any time; a newer entry replaces an older one for the same key.
/// Dequeue: card moves before list reorders, lowest `seq` first.
use std::collections::HashMap;

use serde::Serialize;

use crate::mutation::{CoalesceKey, MutationId, MutationPayload};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum QueueState {
    Idle,
    Debouncing,
    InFlight,
    Draining,
}

/// What the caller must do after an enqueue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueAction {
    /// Nothing is in flight: start draining right away.
    SendNow,
    /// Start a debounce timer tagged with this generation, then drain.
    Debounce { generation: u64 },
    /// A request is in flight; the entry is picked up when it settles.
    Wait,
}

#[derive(Debug)]
pub enum PushOutcome {
    Queued,
    Replaced(MutationPayload),
    /// A newer entry for the same key is already queued.
    Rejected(MutationPayload),
}

/// Ordered set of pending mutations with per-key coalescing.
#[derive(Debug, Default)]
pub struct PendingQueue {
    entries: Vec<MutationPayload>,
}

impl PendingQueue {
    pub fn push(&mut self, payload: MutationPayload) -> PushOutcome {
        let key = payload.key();
        match self.entries.iter().position(|e| e.key() == key) {
            Some(index) if self.entries[index].seq > payload.seq => PushOutcome::Rejected(payload),
            Some(index) => {
                let replaced = std::mem::replace(&mut self.entries[index], payload);
                PushOutcome::Replaced(replaced)
            }
            None => {
                self.entries.push(payload);
                PushOutcome::Queued
            }
        }
    }

    /// Remove the next entry to send: oldest card move, else the list reorder.
    pub fn pop_next(&mut self) -> Option<MutationPayload> {
        let index = self
            .entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.kind.is_card_move())
            .min_by_key(|(_, e)| e.seq)
            .map(|(i, _)| i)
            .or_else(|| {
                self.entries
                    .iter()
                    .enumerate()
                    .min_by_key(|(_, e)| e.seq)
                    .map(|(i, _)| i)
            })?;
        Some(self.entries.remove(index))
    }

    pub fn iter(&self) -> impl Iterator<Item = &MutationPayload> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct MutationQueue {
    pending: PendingQueue,
    in_flight: Option<MutationPayload>,
    next_seq: u64,
    latest_by_key: HashMap<CoalesceKey, u64>,
    debounce_generation: u64,
    debouncing: bool,
}

impl MutationQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> QueueState {
        if self.in_flight.is_some() {
            QueueState::InFlight
        } else if self.debouncing {
            QueueState::Debouncing
        } else if !self.pending.is_empty() {
            QueueState::Draining
        } else {
            QueueState::Idle
        }
    }

    /// Assign the next sequence number to an intent for `key`.
    pub fn allocate_seq(&mut self, key: CoalesceKey) -> u64 {
        self.next_seq += 1;
        self.latest_by_key.insert(key, self.next_seq);
        self.next_seq
    }

    /// True when a newer intent for the same key was enqueued after `payload`.
    pub fn is_superseded(&self, payload: &MutationPayload) -> bool {
        self.latest_by_key
            .get(&payload.key())
            .is_some_and(|&latest| latest > payload.seq)
    }

    pub fn enqueue(&mut self, payload: MutationPayload) -> EnqueueAction {
        let is_card_move = payload.kind.is_card_move();
        match self.pending.push(payload) {
            PushOutcome::Replaced(old) => log::debug!(
                target: "boardsync.queue",
                "Coalesced mutation seq {} into a newer entry",
                old.seq
            ),
            PushOutcome::Rejected(stale) => log::debug!(
                target: "boardsync.queue",
                "Dropped seq {}: a newer entry for the same key is queued",
                stale.seq
            ),
            PushOutcome::Queued => {}
        }

        if is_card_move {
            // card moves never wait out a debounce window
            self.cancel_debounce();
            if self.in_flight.is_some() {
                EnqueueAction::Wait
            } else {
                EnqueueAction::SendNow
            }
        } else if self.in_flight.is_some() {
            EnqueueAction::Wait
        } else {
            self.debounce_generation += 1;
            self.debouncing = true;
            EnqueueAction::Debounce {
                generation: self.debounce_generation,
            }
        }
    }

    /// Put a retry back into the queue without allocating a new seq.
    pub fn requeue(&mut self, payload: MutationPayload) {
        if let PushOutcome::Rejected(stale) = self.pending.push(payload) {
            log::debug!(
                target: "boardsync.queue",
                "Retry of seq {} superseded before requeue",
                stale.seq
            );
        }
    }

    /// Called when a debounce timer fires. True if it is still the live timer.
    pub fn debounce_elapsed(&mut self, generation: u64) -> bool {
        if self.debouncing && generation == self.debounce_generation {
            self.debouncing = false;
            true
        } else {
            false
        }
    }

    pub fn cancel_debounce(&mut self) {
        if self.debouncing {
            self.debouncing = false;
            self.debounce_generation += 1;
        }
    }

    /// Take the next entry and mark it in flight.
    /// Returns `None` if a request is already in flight or nothing is queued.
    pub fn begin_next(&mut self) -> Option<MutationPayload> {
        if self.in_flight.is_some() {
            return None;
        }
        let next = self.pending.pop_next()?;
        self.cancel_debounce();
        self.in_flight = Some(next.clone());
        Some(next)
    }

    /// Clear the in-flight slot after its request settled.
    pub fn finish(&mut self) -> Option<MutationPayload> {
        self.in_flight.take()
    }

    pub fn in_flight(&self) -> Option<&MutationPayload> {
        self.in_flight.as_ref()
    }

    pub fn pending(&self) -> &PendingQueue {
        &self.pending
    }

    /// In-flight and queued entries, oldest seq first.
    pub fn unconfirmed(&self) -> Vec<&MutationPayload> {
        let mut all: Vec<&MutationPayload> =
            self.in_flight.iter().chain(self.pending.iter()).collect();
        all.sort_by_key(|p| p.seq);
        all
    }

    /// Remove a queued, not yet sent entry by id. The newest remaining entry
    /// for the same key becomes the latest again, so an in-flight attempt
    /// is no longer treated as superseded by the discarded one.
    pub fn discard(&mut self, mutation_id: &MutationId) -> Option<MutationPayload> {
        let index = self
            .pending
            .entries
            .iter()
            .position(|p| &p.mutation_id == mutation_id)?;
        let removed = self.pending.entries.remove(index);

        let key = removed.key();
        let remaining = self
            .in_flight
            .iter()
            .chain(self.pending.iter())
            .filter(|p| p.key() == key)
            .map(|p| p.seq)
            .max();
        match remaining {
            Some(seq) => {
                self.latest_by_key.insert(key, seq);
            }
            None => {
                self.latest_by_key.remove(&key);
            }
        }
        Some(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mutation::MutationKind;

    fn card_move(queue: &mut MutationQueue, card: &str, to: &str) -> MutationPayload {
        let kind = MutationKind::CardMove {
            card_id: card.to_string(),
            to_list_id: to.to_string(),
            before_card_id: None,
        };
        let seq = queue.allocate_seq(kind.key());
        MutationPayload::new(kind, seq)
    }

    fn list_reorder(queue: &mut MutationQueue, ids: &[&str]) -> MutationPayload {
        let kind = MutationKind::ListReorder {
            ordered_list_ids: ids.iter().map(|s| s.to_string()).collect(),
        };
        let seq = queue.allocate_seq(kind.key());
        MutationPayload::new(kind, seq)
    }

    #[test]
    fn test_card_move_sends_immediately_when_idle() {
        let mut queue = MutationQueue::new();
        let payload = card_move(&mut queue, "c1", "L2");
        assert_eq!(queue.enqueue(payload), EnqueueAction::SendNow);
        assert_eq!(queue.state(), QueueState::Draining);
    }

    #[test]
    fn test_list_reorder_debounces_and_restarts() {
        let mut queue = MutationQueue::new();
        let first = list_reorder(&mut queue, &["B", "A", "C"]);
        let EnqueueAction::Debounce { generation: g1 } = queue.enqueue(first) else {
            panic!("expected debounce");
        };
        assert_eq!(queue.state(), QueueState::Debouncing);

        let second = list_reorder(&mut queue, &["C", "B", "A"]);
        let EnqueueAction::Debounce { generation: g2 } = queue.enqueue(second) else {
            panic!("expected debounce");
        };
        assert_ne!(g1, g2);
        assert_eq!(queue.pending().len(), 1);

        assert!(!queue.debounce_elapsed(g1));
        assert!(queue.debounce_elapsed(g2));
        let next = queue.begin_next().unwrap();
        assert_eq!(
            next.kind,
            MutationKind::ListReorder {
                ordered_list_ids: vec!["C".into(), "B".into(), "A".into()]
            }
        );
    }

    #[test]
    fn test_card_move_cancels_debounce() {
        let mut queue = MutationQueue::new();
        let reorder = list_reorder(&mut queue, &["B", "A"]);
        let EnqueueAction::Debounce { generation } = queue.enqueue(reorder) else {
            panic!("expected debounce");
        };
        let mv = card_move(&mut queue, "c1", "L1");
        assert_eq!(queue.enqueue(mv), EnqueueAction::SendNow);
        assert!(!queue.debounce_elapsed(generation));

        // card move first, then the reorder continues without a new debounce
        assert!(queue.begin_next().unwrap().kind.is_card_move());
        queue.finish();
        assert!(!queue.begin_next().unwrap().kind.is_card_move());
    }

    #[test]
    fn test_waits_while_in_flight() {
        let mut queue = MutationQueue::new();
        let first = card_move(&mut queue, "c1", "L1");
        queue.enqueue(first);
        queue.begin_next().unwrap();
        assert_eq!(queue.state(), QueueState::InFlight);

        let second = card_move(&mut queue, "c2", "L1");
        assert_eq!(queue.enqueue(second), EnqueueAction::Wait);
        let reorder = list_reorder(&mut queue, &["A"]);
        assert_eq!(queue.enqueue(reorder), EnqueueAction::Wait);

        // only one in flight at a time
        assert!(queue.begin_next().is_none());
        queue.finish();
        assert_eq!(queue.state(), QueueState::Draining);
        assert!(queue.begin_next().is_some());
    }

    #[test]
    fn test_coalesces_moves_of_same_card() {
        let mut queue = MutationQueue::new();
        let reorder = list_reorder(&mut queue, &["A"]);
        queue.enqueue(reorder);
        let mut last = None;
        for to in ["L1", "L2", "L3", "L4"] {
            let payload = card_move(&mut queue, "c1", to);
            last = Some(payload.seq);
            queue.enqueue(payload);
        }
        let moves: Vec<_> = queue
            .pending()
            .iter()
            .filter(|p| p.kind.is_card_move())
            .collect();
        assert_eq!(moves.len(), 1);
        assert_eq!(Some(moves[0].seq), last);
        assert!(matches!(
            &moves[0].kind,
            MutationKind::CardMove { to_list_id, .. } if to_list_id == "L4"
        ));
    }

    #[test]
    fn test_dequeue_prefers_oldest_card_move() {
        let mut queue = MutationQueue::new();
        let reorder = list_reorder(&mut queue, &["A"]);
        let a = card_move(&mut queue, "a", "L1");
        let b = card_move(&mut queue, "b", "L1");
        queue.enqueue(reorder);
        queue.enqueue(b);
        queue.enqueue(a);

        let order: Vec<String> = std::iter::from_fn(|| {
            let next = queue.begin_next();
            queue.finish();
            next
        })
        .map(|p| match p.kind {
            MutationKind::CardMove { card_id, .. } => card_id,
            MutationKind::ListReorder { .. } => "lists".to_string(),
        })
        .collect();
        assert_eq!(order, vec!["a", "b", "lists"]);
    }

    #[test]
    fn test_superseded_detection_is_per_key() {
        let mut queue = MutationQueue::new();
        let first = card_move(&mut queue, "c1", "L1");
        let other = card_move(&mut queue, "c2", "L1");
        assert!(!queue.is_superseded(&first));

        let newer = card_move(&mut queue, "c1", "L2");
        assert!(queue.is_superseded(&first));
        assert!(!queue.is_superseded(&newer));
        assert!(!queue.is_superseded(&other));
    }

    #[test]
    fn test_requeue_does_not_clobber_newer_entry() {
        let mut queue = MutationQueue::new();
        let old = card_move(&mut queue, "c1", "L1");
        let newer = card_move(&mut queue, "c1", "L2");
        queue.enqueue(newer.clone());
        queue.requeue(old.retry(false));
        assert_eq!(queue.pending().len(), 1);
        assert_eq!(queue.pending().iter().next().unwrap().seq, newer.seq);
    }

    #[test]
    fn test_unconfirmed_includes_in_flight() {
        let mut queue = MutationQueue::new();
        let a = card_move(&mut queue, "a", "L1");
        let b = card_move(&mut queue, "b", "L1");
        queue.enqueue(a);
        queue.begin_next();
        queue.enqueue(b);
        let seqs: Vec<u64> = queue.unconfirmed().iter().map(|p| p.seq).collect();
        assert_eq!(seqs, vec![1, 2]);
    }

    #[test]
    fn test_discarding_newer_entry_restores_in_flight_as_latest() {
        let mut queue = MutationQueue::new();
        let sent = card_move(&mut queue, "c1", "L2");
        queue.enqueue(sent.clone());
        queue.begin_next();

        let cancelled = card_move(&mut queue, "c1", "L1");
        queue.enqueue(cancelled.clone());
        assert!(queue.is_superseded(&sent));

        assert!(queue.discard(&cancelled.mutation_id).is_some());
        assert!(!queue.is_superseded(&sent));
        assert!(queue.pending().is_empty());
    }

    #[test]
    fn test_discarding_only_entry_forgets_key() {
        let mut queue = MutationQueue::new();
        let only = card_move(&mut queue, "c1", "L2");
        queue.enqueue(only.clone());
        queue.discard(&only.mutation_id);

        // a stale attempt for the same card is no longer shadowed
        let mut earlier = only.clone();
        earlier.seq = 0;
        assert!(!queue.is_superseded(&earlier));
    }
}
