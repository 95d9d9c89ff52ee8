//! Optimistic board reordering with version-checked persistence.
pub mod board;
pub mod config;
pub mod echo;
pub mod error;
pub mod flusher;
pub mod gateway;
pub mod mutation;
pub mod mutator;
pub mod position;
pub mod queue;
pub mod reconciler;
pub mod resolver;
pub mod session;
pub mod types;

pub use board::{BoardLayout, LocalBoardState};
pub use config::SyncTuning;
pub use error::BoardError;
pub use gateway::{ErrorCode, PersistFailure, PersistResult, Persisted, PersistenceGateway, UnloadBeacon};
pub use mutation::{MutationId, MutationKind};
pub use mutator::DragResult;
pub use reconciler::{ActivityEvent, ReconcileDecision};
pub use session::{BoardSession, DragReceipt, SessionEvent};
pub use types::{BoardList, BoardSnapshot, Card};
