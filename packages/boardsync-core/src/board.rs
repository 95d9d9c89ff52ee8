/// Local, versioned board state.
///
/// The layout (lists and cards) is an immutable `Arc<BoardLayout>` that is
/// swapped wholesale on every change, so holders of an older `Arc` can tell
/// whether the live state is still the one they produced. The board version
/// lives beside the layout and only ever moves forward.
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::BoardError;
use crate::position::{insert_position, is_well_spaced, position_from_index};
use crate::types::{BoardList, BoardSnapshot, Card};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BoardLayout {
    pub lists: Vec<BoardList>,
}

impl BoardLayout {
    /// Build a layout, sorting lists and each list's cards by position.
    pub fn from_lists(mut lists: Vec<BoardList>) -> Self {
        lists.sort_by(|a, b| a.position.total_cmp(&b.position));
        for list in &mut lists {
            list.cards.sort_by(|a, b| a.position.total_cmp(&b.position));
        }
        Self { lists }
    }

    pub fn list(&self, list_id: &str) -> Option<&BoardList> {
        self.lists.iter().find(|l| l.id == list_id)
    }

    pub fn list_ids(&self) -> Vec<&str> {
        self.lists.iter().map(|l| l.id.as_str()).collect()
    }

    pub fn card(&self, card_id: &str) -> Option<&Card> {
        self.lists
            .iter()
            .flat_map(|l| l.cards.iter())
            .find(|c| c.id == card_id)
    }

    /// Id of the list currently holding `card_id`.
    pub fn list_of_card(&self, card_id: &str) -> Option<&str> {
        self.lists
            .iter()
            .find(|l| l.card_index(card_id).is_some())
            .map(|l| l.id.as_str())
    }

    /// (list index, card index) of a card.
    fn locate_card(&self, card_id: &str) -> Option<(usize, usize)> {
        self.lists
            .iter()
            .enumerate()
            .find_map(|(li, list)| list.card_index(card_id).map(|ci| (li, ci)))
    }

    fn list_index(&self, list_id: &str) -> Result<usize, BoardError> {
        self.lists
            .iter()
            .position(|l| l.id == list_id)
            .ok_or_else(|| BoardError::ListNotFound(list_id.to_string()))
    }

    /// True when both layouts order the same lists and cards identically,
    /// regardless of the numeric positions.
    pub fn same_order(&self, other: &BoardLayout) -> bool {
        self.lists.len() == other.lists.len()
            && self.lists.iter().zip(&other.lists).all(|(a, b)| {
                a.id == b.id
                    && a.cards.len() == b.cards.len()
                    && a.cards.iter().zip(&b.cards).all(|(x, y)| x.id == y.id)
            })
    }

    /// Reorder lists. Unknown ids are ignored; lists missing from
    /// `ordered_list_ids` keep their relative order after the named ones.
    pub fn with_list_order(&self, ordered_list_ids: &[String]) -> BoardLayout {
        let mut remaining: Vec<Option<BoardList>> = self.lists.iter().cloned().map(Some).collect();
        let mut lists = Vec::with_capacity(self.lists.len());

        for id in ordered_list_ids {
            if let Some(slot) = remaining
                .iter_mut()
                .find(|slot| slot.as_ref().is_some_and(|l| &l.id == id))
            {
                lists.extend(slot.take());
            }
        }
        lists.extend(remaining.into_iter().flatten());

        for (index, list) in lists.iter_mut().enumerate() {
            list.position = position_from_index(index);
        }
        BoardLayout { lists }
    }

    /// Move a card to `to_list_id`, placing it before `before_card_id`, or at
    /// the end of the target list when the anchor is `None` or not found there.
    pub fn with_card_moved(
        &self,
        card_id: &str,
        from_list_id: &str,
        to_list_id: &str,
        before_card_id: Option<&str>,
    ) -> Result<BoardLayout, BoardError> {
        let from_index = self.list_index(from_list_id)?;
        let to_index = self.list_index(to_list_id)?;
        let Some(card_index) = self.lists[from_index].card_index(card_id) else {
            return Err(if self.card(card_id).is_some() {
                BoardError::CardNotInList {
                    card_id: card_id.to_string(),
                    list_id: from_list_id.to_string(),
                }
            } else {
                BoardError::CardNotFound(card_id.to_string())
            });
        };

        if before_card_id == Some(card_id) {
            return Ok(self.clone());
        }

        let mut next = self.clone();
        let card = next.lists[from_index].cards.remove(card_index);
        if from_index != to_index {
            renormalize_cards(&mut next.lists[from_index]);
        }

        let target = &mut next.lists[to_index];
        let slot = match before_card_id {
            Some(anchor) => match target.card_index(anchor) {
                Some(i) => i + 1,
                None => {
                    log::debug!(
                        target: "boardsync.board",
                        "Anchor card {} not in list {}, appending {}",
                        anchor,
                        to_list_id,
                        card_id
                    );
                    target.cards.len() + 1
                }
            },
            None => target.cards.len() + 1,
        };
        place_card(target, card, slot);
        Ok(next)
    }

    /// Remove a card, renormalizing the list it left.
    pub fn without_card(&self, card_id: &str) -> Result<(BoardLayout, Card), BoardError> {
        let (list_index, card_index) = self
            .locate_card(card_id)
            .ok_or_else(|| BoardError::CardNotFound(card_id.to_string()))?;
        let mut next = self.clone();
        let card = next.lists[list_index].cards.remove(card_index);
        renormalize_cards(&mut next.lists[list_index]);
        Ok((next, card))
    }

    /// Insert a new card at zero-based `target_index` of `target_list_id`.
    pub fn with_card_inserted(
        &self,
        card: Card,
        target_list_id: &str,
        target_index: usize,
    ) -> Result<BoardLayout, BoardError> {
        if self.card(&card.id).is_some() {
            return Err(BoardError::DuplicateCard(card.id));
        }
        let list_index = self.list_index(target_list_id)?;
        let mut next = self.clone();
        place_card(&mut next.lists[list_index], card, target_index + 1);
        Ok(next)
    }
}

/// Reassign card positions to evenly gapped slots, keeping their order.
fn renormalize_cards(list: &mut BoardList) {
    for (index, card) in list.cards.iter_mut().enumerate() {
        card.position = position_from_index(index);
    }
}

/// Insert `card` at one-based `slot`, giving it a fractional position between
/// its neighbours. Falls back to renormalizing the list when the positions
/// run out of room.
fn place_card(list: &mut BoardList, mut card: Card, slot: usize) {
    let slot = slot.clamp(1, list.cards.len() + 1);
    card.position = insert_position(&list.card_positions(), slot);
    card.list_id = list.id.clone();
    list.cards.insert(slot - 1, card);

    if !is_well_spaced(&list.card_positions()) {
        log::debug!(
            target: "boardsync.board",
            "Positions in list {} collapsed, renormalizing {} cards",
            list.id,
            list.cards.len()
        );
        renormalize_cards(list);
    }
}

/// Outcome of a state operation: the layout before and after.
/// Both point at the same `Arc` when nothing changed.
#[derive(Debug, Clone)]
pub struct LayoutChange {
    pub previous: Arc<BoardLayout>,
    pub current: Arc<BoardLayout>,
}

impl LayoutChange {
    pub fn changed(&self) -> bool {
        !Arc::ptr_eq(&self.previous, &self.current)
    }
}

/// In-memory snapshot of one board plus the last observed board version.
#[derive(Debug, Clone)]
pub struct LocalBoardState {
    board_id: String,
    layout: Arc<BoardLayout>,
    version: u64,
}

impl LocalBoardState {
    pub fn from_snapshot(snapshot: BoardSnapshot) -> Self {
        Self {
            board_id: snapshot.board_id,
            layout: Arc::new(BoardLayout::from_lists(snapshot.lists)),
            version: snapshot.version,
        }
    }

    pub fn board_id(&self) -> &str {
        &self.board_id
    }

    pub fn layout(&self) -> &Arc<BoardLayout> {
        &self.layout
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// Adopt `version` only if it is newer than the one already known.
    pub fn advance_version(&mut self, version: u64) -> bool {
        if version > self.version {
            self.version = version;
            true
        } else {
            false
        }
    }

    pub fn apply_list_reorder(&mut self, ordered_list_ids: &[String]) -> LayoutChange {
        let next = self.layout.with_list_order(ordered_list_ids);
        self.commit(next)
    }

    pub fn apply_card_move(
        &mut self,
        card_id: &str,
        from_list_id: &str,
        to_list_id: &str,
        before_card_id: Option<&str>,
    ) -> Result<LayoutChange, BoardError> {
        let next = self
            .layout
            .with_card_moved(card_id, from_list_id, to_list_id, before_card_id)?;
        Ok(self.commit(next))
    }

    pub fn remove_card(&mut self, card_id: &str) -> Result<LayoutChange, BoardError> {
        let (next, _) = self.layout.without_card(card_id)?;
        Ok(self.commit(next))
    }

    pub fn insert_card(
        &mut self,
        card: Card,
        target_list_id: &str,
        target_index: usize,
    ) -> Result<LayoutChange, BoardError> {
        let next = self
            .layout
            .with_card_inserted(card, target_list_id, target_index)?;
        Ok(self.commit(next))
    }

    /// Swap in `layout` unless it deep-equals the live one.
    pub fn replace_layout(&mut self, layout: Arc<BoardLayout>) -> LayoutChange {
        let previous = self.layout.clone();
        if *previous != *layout {
            self.layout = layout;
        }
        LayoutChange {
            previous,
            current: self.layout.clone(),
        }
    }

    /// Restore `restore` only while the live layout is still `expected`.
    pub fn restore_if_current(
        &mut self,
        expected: &Arc<BoardLayout>,
        restore: Arc<BoardLayout>,
    ) -> bool {
        if Arc::ptr_eq(&self.layout, expected) {
            self.layout = restore;
            true
        } else {
            false
        }
    }

    /// Replace the layout with a freshly fetched snapshot. The version still
    /// never moves backwards.
    pub fn reset(&mut self, snapshot: BoardSnapshot) -> LayoutChange {
        self.advance_version(snapshot.version);
        self.replace_layout(Arc::new(BoardLayout::from_lists(snapshot.lists)))
    }

    fn commit(&mut self, next: BoardLayout) -> LayoutChange {
        let previous = self.layout.clone();
        if !previous.same_order(&next) {
            self.layout = Arc::new(next);
        }
        LayoutChange {
            previous,
            current: self.layout.clone(),
        }
    }
}
