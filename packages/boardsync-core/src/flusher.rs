/// Best-effort flush of unconfirmed card moves when the host shuts down.
///
/// Reads the queue, never mutates it, and does not wait for a response.
use std::collections::HashMap;

use crate::gateway::{FlushedMove, UnloadFlushRequest};
use crate::mutation::{MutationKind, MutationPayload};

pub struct UnloadFlusher;

impl UnloadFlusher {
    /// Build the flush payload from in-flight and queued intents, keeping the
    /// most recent move per card. `None` when there is nothing to flush.
    pub fn collect<'a, I>(
        unconfirmed: I,
        board_id: &str,
        expected_board_version: u64,
    ) -> Option<UnloadFlushRequest>
    where
        I: IntoIterator<Item = &'a MutationPayload>,
    {
        let mut latest: HashMap<&str, &MutationPayload> = HashMap::new();
        for payload in unconfirmed {
            let MutationKind::CardMove { card_id, .. } = &payload.kind else {
                continue;
            };
            let newer = latest.get(card_id.as_str()).map_or(true, |current| {
                (payload.seq, payload.retry_count) > (current.seq, current.retry_count)
            });
            if newer {
                latest.insert(card_id.as_str(), payload);
            }
        }
        if latest.is_empty() {
            return None;
        }

        let mut chosen: Vec<&MutationPayload> = latest.into_values().collect();
        chosen.sort_by_key(|p| p.seq);
        let mutations = chosen
            .into_iter()
            .filter_map(|p| match &p.kind {
                MutationKind::CardMove {
                    card_id,
                    to_list_id,
                    before_card_id,
                } => Some(FlushedMove {
                    card_id: card_id.clone(),
                    to_list_id: to_list_id.clone(),
                    before_card_id: before_card_id.clone(),
                    mutation_id: p.mutation_id.clone(),
                }),
                MutationKind::ListReorder { .. } => None,
            })
            .collect();

        Some(UnloadFlushRequest {
            board_id: board_id.to_string(),
            expected_board_version,
            mutations,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn card_move(card: &str, to: &str, seq: u64) -> MutationPayload {
        MutationPayload::new(
            MutationKind::CardMove {
                card_id: card.to_string(),
                to_list_id: to.to_string(),
                before_card_id: None,
            },
            seq,
        )
    }

    #[test]
    fn test_nothing_to_flush() {
        let reorder = MutationPayload::new(
            MutationKind::ListReorder {
                ordered_list_ids: vec!["A".into()],
            },
            1,
        );
        assert!(UnloadFlusher::collect([&reorder], "b", 1).is_none());
        assert!(UnloadFlusher::collect(std::iter::empty::<&MutationPayload>(), "b", 1).is_none());
    }

    #[test]
    fn test_keeps_latest_per_card() {
        let in_flight = card_move("c1", "L1", 1);
        let queued_c1 = card_move("c1", "L3", 3);
        let queued_c2 = card_move("c2", "L2", 2);

        let request =
            UnloadFlusher::collect([&in_flight, &queued_c1, &queued_c2], "board-1", 7).unwrap();
        assert_eq!(request.board_id, "board-1");
        assert_eq!(request.expected_board_version, 7);
        let summary: Vec<(&str, &str)> = request
            .mutations
            .iter()
            .map(|m| (m.card_id.as_str(), m.to_list_id.as_str()))
            .collect();
        assert_eq!(summary, vec![("c2", "L2"), ("c1", "L3")]);
        assert_eq!(request.mutations[1].mutation_id, queued_c1.mutation_id);
    }
}
