/// Optimistic application of drag results to the local board.
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::board::{BoardLayout, LocalBoardState};
use crate::error::BoardError;

/// The outcome of a finished drag gesture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum DragResult {
    #[serde(rename_all = "camelCase")]
    ListReorder { ordered_list_ids: Vec<String> },
    #[serde(rename_all = "camelCase")]
    CardMove {
        card_id: String,
        from_list_id: String,
        to_list_id: String,
        before_card_id: Option<String>,
    },
}

/// Restores the layout that was live before an optimistic change, but only
/// while the live layout is still the one that change produced. A newer,
/// unrelated change is never stomped.
#[derive(Debug, Clone)]
pub struct Rollback {
    produced: Arc<BoardLayout>,
    restore: Arc<BoardLayout>,
}

impl Rollback {
    /// Returns false when the live layout has moved on and nothing was restored.
    pub fn rollback(self, state: &mut LocalBoardState) -> bool {
        let restored = state.restore_if_current(&self.produced, self.restore);
        if !restored {
            log::debug!(
                target: "boardsync.mutator",
                "Skipping rollback on board {}: layout changed since",
                state.board_id()
            );
        }
        restored
    }
}

/// A drag applied to the live state.
#[derive(Debug, Clone)]
pub struct AppliedDrag {
    pub layout: Arc<BoardLayout>,
    pub rollback: Rollback,
}

pub struct OptimisticMutator;

impl OptimisticMutator {
    /// Apply `drag` to `state` immediately.
    /// Returns `Ok(None)` when the drag did not change the order of anything.
    pub fn apply(
        state: &mut LocalBoardState,
        drag: &DragResult,
    ) -> Result<Option<AppliedDrag>, BoardError> {
        let change = match drag {
            DragResult::ListReorder { ordered_list_ids } => {
                state.apply_list_reorder(ordered_list_ids)
            }
            DragResult::CardMove {
                card_id,
                from_list_id,
                to_list_id,
                before_card_id,
            } => state.apply_card_move(
                card_id,
                from_list_id,
                to_list_id,
                before_card_id.as_deref(),
            )?,
        };

        if !change.changed() {
            return Ok(None);
        }
        Ok(Some(AppliedDrag {
            layout: change.current.clone(),
            rollback: Rollback {
                produced: change.current,
                restore: change.previous,
            },
        }))
    }
}
