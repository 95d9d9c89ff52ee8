#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BoardError {
    #[error("List not found: {0}")]
    ListNotFound(String),

    #[error("Card not found: {0}")]
    CardNotFound(String),

    #[error("Card {card_id} is not in list {list_id}")]
    CardNotInList { card_id: String, list_id: String },

    #[error("Card already exists: {0}")]
    DuplicateCard(String),

    #[error("Board interaction is locked")]
    InteractionLocked,

    #[error("Board session is closed")]
    SessionClosed,
}
