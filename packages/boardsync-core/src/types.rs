use serde::{Deserialize, Serialize};

/// A card on a board. Belongs to exactly one list at a time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Card {
    pub id: String,
    pub list_id: String,
    pub position: f64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub title: String,
}

/// A list (column) on a board. `cards` are kept sorted by `position`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardList {
    pub id: String,
    pub title: String,
    pub position: f64,
    #[serde(default)]
    pub cards: Vec<Card>,
}

impl BoardList {
    /// Card positions in list order.
    pub fn card_positions(&self) -> Vec<f64> {
        self.cards.iter().map(|c| c.position).collect()
    }

    pub fn card_index(&self, card_id: &str) -> Option<usize> {
        self.cards.iter().position(|c| c.id == card_id)
    }
}

/// Server-provided board contents plus the board version they correspond to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardSnapshot {
    pub board_id: String,
    pub version: u64,
    pub lists: Vec<BoardList>,
}
