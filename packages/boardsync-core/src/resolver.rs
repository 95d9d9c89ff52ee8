/// Interprets persistence results and decides retry, acceptance or rollback.
///
/// | result                                   | action                                   |
/// |------------------------------------------|------------------------------------------|
/// | success                                  | adopt version, apply intent to confirmed |
/// | any failure, superseded by newer intent  | adopt version, drop silently             |
/// | conflict, card move, retries left        | adopt version, requeue (last one unanchored) |
/// | conflict, otherwise                      | adopt version, confirm the live layout   |
/// | any other failure                        | roll back to the confirmed layout        |
use std::sync::Arc;

use crate::board::{BoardLayout, LocalBoardState};
use crate::gateway::{ErrorCode, PersistResult};
use crate::mutation::MutationPayload;

/// Last layout known to be accepted by the backend; the rollback target.
#[derive(Debug, Clone)]
pub struct ConfirmedSnapshot {
    layout: Arc<BoardLayout>,
}

impl ConfirmedSnapshot {
    pub fn new(layout: Arc<BoardLayout>) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> &Arc<BoardLayout> {
        &self.layout
    }

    /// Adopt a layout fetched from the backend during a resync.
    pub(crate) fn adopt_fetched(&mut self, layout: Arc<BoardLayout>) {
        self.layout = layout;
    }
}

#[derive(Debug, Clone)]
pub enum Resolution {
    Confirmed {
        board_version: u64,
    },
    Superseded,
    Retry(MutationPayload),
    /// Conflict not worth retrying: the local order stands until the next resync.
    AcceptedLocal,
    RolledBack {
        message: String,
    },
}

#[derive(Debug, Clone)]
pub struct ConflictResolver {
    max_card_move_retries: u32,
}

impl ConflictResolver {
    pub fn new(max_card_move_retries: u32) -> Self {
        Self {
            max_card_move_retries,
        }
    }

    /// Decide what to do with the result of `mutation`. Pure.
    pub fn decide(
        &self,
        mutation: &MutationPayload,
        result: &PersistResult,
        superseded: bool,
    ) -> Resolution {
        let failure = match result {
            Ok(persisted) => {
                return Resolution::Confirmed {
                    board_version: persisted.board_version,
                }
            }
            Err(failure) => failure,
        };

        // a newer local intent for the same target already stands for the user
        if superseded {
            return Resolution::Superseded;
        }
        if failure.code != ErrorCode::Conflict {
            return Resolution::RolledBack {
                message: failure.user_message(&mutation.fallback_message),
            };
        }
        if mutation.kind.is_card_move() && mutation.retry_count < self.max_card_move_retries {
            let drop_anchor = mutation.retry_count + 1 >= self.max_card_move_retries;
            return Resolution::Retry(mutation.retry(drop_anchor));
        }
        Resolution::AcceptedLocal
    }

    /// Decide and apply the outcome to the local state and confirmed snapshot.
    pub fn resolve(
        &self,
        mutation: &MutationPayload,
        result: &PersistResult,
        superseded: bool,
        board: &mut LocalBoardState,
        confirmed: &mut ConfirmedSnapshot,
    ) -> Resolution {
        let resolution = self.decide(mutation, result, superseded);

        if let Err(failure) = result {
            if let Some(latest) = failure.latest_board_version {
                board.advance_version(latest);
            }
        }

        match &resolution {
            Resolution::Confirmed { board_version } => {
                board.advance_version(*board_version);
                match mutation.kind.apply_to(&confirmed.layout) {
                    Ok(layout) => confirmed.layout = Arc::new(layout),
                    Err(e) => log::warn!(
                        target: "boardsync.resolver",
                        "Confirmed seq {} no longer applies to the confirmed layout: {}",
                        mutation.seq,
                        e
                    ),
                }
                log::debug!(
                    target: "boardsync.resolver",
                    "Mutation {} (seq {}) confirmed at version {}",
                    mutation.mutation_id,
                    mutation.seq,
                    board_version
                );
            }
            Resolution::Superseded => {
                log::debug!(
                    target: "boardsync.resolver",
                    "Failure on superseded mutation seq {}, dropping",
                    mutation.seq
                );
            }
            Resolution::Retry(retry) => {
                log::warn!(
                    target: "boardsync.resolver",
                    "Conflict on seq {}, retry {} of {}",
                    mutation.seq,
                    retry.retry_count,
                    self.max_card_move_retries
                );
            }
            Resolution::AcceptedLocal => {
                confirmed.layout = board.layout().clone();
                log::warn!(
                    target: "boardsync.resolver",
                    "Conflict on seq {} not retried; keeping local order",
                    mutation.seq
                );
            }
            Resolution::RolledBack { .. } => {
                board.replace_layout(confirmed.layout.clone());
                if let Err(failure) = result {
                    log::warn!(
                        target: "boardsync.resolver",
                        "Mutation seq {} failed ({}), rolled back",
                        mutation.seq,
                        failure
                    );
                }
            }
        }
        resolution
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::tests::make_board;
    use crate::gateway::{PersistFailure, Persisted};
    use crate::mutation::MutationKind;
    use crate::mutator::{DragResult, OptimisticMutator};

    fn setup() -> (LocalBoardState, ConfirmedSnapshot, MutationPayload) {
        let mut board = LocalBoardState::from_snapshot(make_board(vec![
            ("L1", vec!["c1", "c2"]),
            ("L2", vec!["c3", "c4"]),
        ]));
        let confirmed = ConfirmedSnapshot::new(board.layout().clone());
        let drag = DragResult::CardMove {
            card_id: "c1".into(),
            from_list_id: "L1".into(),
            to_list_id: "L2".into(),
            before_card_id: Some("c3".into()),
        };
        OptimisticMutator::apply(&mut board, &drag).unwrap().unwrap();
        let payload = MutationPayload::new(MutationKind::from(&drag), 1);
        (board, confirmed, payload)
    }

    #[test]
    fn test_success_confirms_and_advances() {
        let (mut board, mut confirmed, payload) = setup();
        let resolver = ConflictResolver::new(2);
        let result = Ok(Persisted { board_version: 9 });
        let resolution = resolver.resolve(&payload, &result, false, &mut board, &mut confirmed);
        assert!(matches!(resolution, Resolution::Confirmed { board_version: 9 }));
        assert_eq!(board.version(), 9);
        assert_eq!(confirmed.layout().list_of_card("c1"), Some("L2"));
        assert!(confirmed.layout().same_order(board.layout()));
    }

    #[test]
    fn test_success_applies_only_its_own_intent() {
        let (mut board, mut confirmed, first) = setup();
        // a second optimistic move is still unconfirmed when the first is accepted
        let drag = DragResult::CardMove {
            card_id: "c2".into(),
            from_list_id: "L1".into(),
            to_list_id: "L2".into(),
            before_card_id: None,
        };
        OptimisticMutator::apply(&mut board, &drag).unwrap().unwrap();

        let resolver = ConflictResolver::new(2);
        resolver.resolve(&first, &Ok(Persisted { board_version: 2 }), false, &mut board, &mut confirmed);
        assert_eq!(confirmed.layout().list_of_card("c1"), Some("L2"));
        assert_eq!(confirmed.layout().list_of_card("c2"), Some("L1"));
        assert_eq!(board.layout().list_of_card("c2"), Some("L2"));
    }

    #[test]
    fn test_success_never_lowers_version() {
        let (mut board, mut confirmed, payload) = setup();
        board.advance_version(20);
        let resolver = ConflictResolver::new(2);
        resolver.resolve(&payload, &Ok(Persisted { board_version: 9 }), false, &mut board, &mut confirmed);
        assert_eq!(board.version(), 20);
    }

    #[test]
    fn test_conflict_on_latest_card_move_retries_with_anchor() {
        let (mut board, mut confirmed, payload) = setup();
        let resolver = ConflictResolver::new(2);
        let result = Err(PersistFailure::conflict(Some(42)));
        let resolution = resolver.resolve(&payload, &result, false, &mut board, &mut confirmed);
        let Resolution::Retry(retry) = resolution else {
            panic!("expected retry");
        };
        assert_eq!(board.version(), 42);
        assert_eq!(retry.retry_count, 1);
        assert_eq!(retry.seq, payload.seq);
        assert!(matches!(
            retry.kind,
            MutationKind::CardMove { ref before_card_id, .. } if before_card_id.as_deref() == Some("c3")
        ));
    }

    #[test]
    fn test_second_retry_drops_anchor_and_third_conflict_is_accepted() {
        let (mut board, mut confirmed, payload) = setup();
        let resolver = ConflictResolver::new(2);
        let conflict: PersistResult = Err(PersistFailure::conflict(None));

        let Resolution::Retry(first) = resolver.decide(&payload, &conflict, false) else {
            panic!("expected first retry");
        };
        let Resolution::Retry(second) = resolver.decide(&first, &conflict, false) else {
            panic!("expected second retry");
        };
        assert_eq!(second.retry_count, 2);
        assert!(matches!(
            second.kind,
            MutationKind::CardMove { before_card_id: None, .. }
        ));

        let resolution = resolver.resolve(&second, &conflict, false, &mut board, &mut confirmed);
        assert!(matches!(resolution, Resolution::AcceptedLocal));
        assert!(Arc::ptr_eq(confirmed.layout(), board.layout()));
    }

    #[test]
    fn test_superseded_conflict_is_dropped() {
        let (mut board, mut confirmed, payload) = setup();
        let before = confirmed.layout().clone();
        let resolver = ConflictResolver::new(2);
        let result = Err(PersistFailure::conflict(Some(7)));
        let resolution = resolver.resolve(&payload, &result, true, &mut board, &mut confirmed);
        assert!(matches!(resolution, Resolution::Superseded));
        assert_eq!(board.version(), 7);
        assert!(Arc::ptr_eq(confirmed.layout(), &before));
    }

    #[test]
    fn test_list_reorder_conflict_is_not_retried() {
        let mut board =
            LocalBoardState::from_snapshot(make_board(vec![("A", vec![]), ("B", vec![])]));
        let mut confirmed = ConfirmedSnapshot::new(board.layout().clone());
        let kind = MutationKind::ListReorder {
            ordered_list_ids: vec!["B".into(), "A".into()],
        };
        board.apply_list_reorder(&["B".to_string(), "A".to_string()]);
        let payload = MutationPayload::new(kind, 1);
        let resolution = ConflictResolver::new(2).resolve(
            &payload,
            &Err(PersistFailure::conflict(Some(3))),
            false,
            &mut board,
            &mut confirmed,
        );
        assert!(matches!(resolution, Resolution::AcceptedLocal));
        assert_eq!(board.layout().list_ids(), vec!["B", "A"]);
    }

    #[test]
    fn test_internal_failure_rolls_back_to_confirmed() {
        let (mut board, mut confirmed, payload) = setup();
        let snapshot = (**confirmed.layout()).clone();
        let result = Err(PersistFailure::new(ErrorCode::Internal, "db down"));
        let resolution =
            ConflictResolver::new(2).resolve(&payload, &result, false, &mut board, &mut confirmed);
        let Resolution::RolledBack { message } = resolution else {
            panic!("expected rollback");
        };
        assert_eq!(message, "Could not save the card move.");
        assert_eq!(**board.layout(), snapshot);
    }

    #[test]
    fn test_non_conflict_failures_roll_back() {
        let resolver = ConflictResolver::new(2);
        let (_, _, payload) = setup();
        for code in [
            ErrorCode::RateLimited,
            ErrorCode::Invalid,
            ErrorCode::NotFound,
            ErrorCode::Forbidden,
            ErrorCode::Internal,
        ] {
            let result = Err(PersistFailure::new(code, "nope"));
            assert!(matches!(
                resolver.decide(&payload, &result, false),
                Resolution::RolledBack { .. }
            ));
            assert!(matches!(
                resolver.decide(&payload, &result, true),
                Resolution::Superseded
            ));
        }
    }
}
