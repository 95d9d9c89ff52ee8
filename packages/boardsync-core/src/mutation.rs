/// Mutation intents sent to the backend of record.
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::board::BoardLayout;
use crate::error::BoardError;
use crate::mutator::DragResult;

/// Client-generated token identifying one attempt at a logical intent.
/// Used by the backend to deduplicate and by us to recognize our own echoes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MutationId(String);

impl MutationId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for MutationId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for MutationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum MutationKind {
    #[serde(rename_all = "camelCase")]
    ListReorder { ordered_list_ids: Vec<String> },
    #[serde(rename_all = "camelCase")]
    CardMove {
        card_id: String,
        to_list_id: String,
        before_card_id: Option<String>,
    },
}

/// Queue slot a mutation occupies: one list reorder, or one move per card.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CoalesceKey {
    ListOrder,
    Card(String),
}

impl MutationKind {
    pub fn key(&self) -> CoalesceKey {
        match self {
            MutationKind::ListReorder { .. } => CoalesceKey::ListOrder,
            MutationKind::CardMove { card_id, .. } => CoalesceKey::Card(card_id.clone()),
        }
    }

    pub fn is_card_move(&self) -> bool {
        matches!(self, MutationKind::CardMove { .. })
    }

    pub fn fallback_message(&self) -> &'static str {
        match self {
            MutationKind::ListReorder { .. } => "Could not save the new list order.",
            MutationKind::CardMove { .. } => "Could not save the card move.",
        }
    }

    /// Apply this intent to `layout`. Card moves start from wherever the
    /// card currently is, so the same intent can be replayed on any base.
    pub fn apply_to(&self, layout: &BoardLayout) -> Result<BoardLayout, BoardError> {
        match self {
            MutationKind::ListReorder { ordered_list_ids } => {
                Ok(layout.with_list_order(ordered_list_ids))
            }
            MutationKind::CardMove {
                card_id,
                to_list_id,
                before_card_id,
            } => {
                let from = layout
                    .list_of_card(card_id)
                    .ok_or_else(|| BoardError::CardNotFound(card_id.clone()))?;
                layout.with_card_moved(card_id, from, to_list_id, before_card_id.as_deref())
            }
        }
    }
}

impl From<&DragResult> for MutationKind {
    fn from(drag: &DragResult) -> Self {
        match drag {
            DragResult::ListReorder { ordered_list_ids } => MutationKind::ListReorder {
                ordered_list_ids: ordered_list_ids.clone(),
            },
            DragResult::CardMove {
                card_id,
                to_list_id,
                before_card_id,
                ..
            } => MutationKind::CardMove {
                card_id: card_id.clone(),
                to_list_id: to_list_id.clone(),
                before_card_id: before_card_id.clone(),
            },
        }
    }
}

/// One queued intent plus its bookkeeping.
#[derive(Debug, Clone)]
pub struct MutationPayload {
    pub mutation_id: MutationId,
    /// Assigned at enqueue time; strictly increasing per session.
    pub seq: u64,
    pub retry_count: u32,
    pub enqueued_at: DateTime<Utc>,
    pub fallback_message: String,
    pub kind: MutationKind,
}

impl MutationPayload {
    pub fn new(kind: MutationKind, seq: u64) -> Self {
        Self {
            mutation_id: MutationId::generate(),
            seq,
            retry_count: 0,
            enqueued_at: Utc::now(),
            fallback_message: kind.fallback_message().to_string(),
            kind,
        }
    }

    pub fn key(&self) -> CoalesceKey {
        self.kind.key()
    }

    /// Next attempt of the same intent: same `seq`, fresh id, bumped retry
    /// count, and optionally without its placement anchor.
    pub fn retry(&self, drop_anchor: bool) -> Self {
        let mut next = self.clone();
        next.mutation_id = MutationId::generate();
        next.retry_count += 1;
        next.enqueued_at = Utc::now();
        if drop_anchor {
            if let MutationKind::CardMove { before_card_id, .. } = &mut next.kind {
                *before_card_id = None;
            }
        }
        next
    }
}
