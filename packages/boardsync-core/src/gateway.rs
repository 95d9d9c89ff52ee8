/// Network boundary to the backend of record.
///
/// Implementations turn a mutation into one RPC and report a regular
/// success/failure shape. They perform no retries; retry policy belongs to
/// the conflict resolver. Transport faults must be reported as
/// `ErrorCode::Internal` failures rather than panics.
use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::mutation::{MutationId, MutationKind, MutationPayload};
use crate::types::BoardSnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    Conflict,
    RateLimited,
    Invalid,
    NotFound,
    Forbidden,
    Internal,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorCode::Conflict => "CONFLICT",
            ErrorCode::RateLimited => "RATE_LIMITED",
            ErrorCode::Invalid => "INVALID",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::Forbidden => "FORBIDDEN",
            ErrorCode::Internal => "INTERNAL",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Persisted {
    pub board_version: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistFailure {
    pub code: ErrorCode,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest_board_version: Option<u64>,
    /// Cooldown hint in seconds, for `RATE_LIMITED`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_after_secs: Option<u64>,
}

impl PersistFailure {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            latest_board_version: None,
            retry_after_secs: None,
        }
    }

    pub fn conflict(latest_board_version: Option<u64>) -> Self {
        Self {
            latest_board_version,
            ..Self::new(ErrorCode::Conflict, "Board version is stale")
        }
    }

    /// Message shown to the user when this failure is terminal.
    pub fn user_message(&self, fallback: &str) -> String {
        match self.code {
            ErrorCode::RateLimited => format!(
                "Too many changes at once. Try again in {}s.",
                self.retry_after_secs.unwrap_or(1)
            ),
            ErrorCode::NotFound | ErrorCode::Forbidden => {
                format!("{} The board changed underneath you; refresh to continue.", fallback)
            }
            ErrorCode::Conflict | ErrorCode::Invalid | ErrorCode::Internal => fallback.to_string(),
        }
    }
}

impl fmt::Display for PersistFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

pub type PersistResult = Result<Persisted, PersistFailure>;

/// Response body shared by both reorder RPCs:
/// `{ok: true, boardVersion}` or `{ok: false, code, message, latestBoardVersion?}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistResponse {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub board_version: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<ErrorCode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest_board_version: Option<u64>,
}

impl PersistResponse {
    pub fn into_result(self) -> PersistResult {
        match (self.ok, self.board_version) {
            (true, Some(board_version)) => Ok(Persisted { board_version }),
            (true, None) => Err(PersistFailure::new(
                ErrorCode::Internal,
                "Success response without boardVersion",
            )),
            (false, _) => Err(PersistFailure {
                code: self.code.unwrap_or(ErrorCode::Internal),
                message: self.message.unwrap_or_default(),
                latest_board_version: self.latest_board_version,
                retry_after_secs: None,
            }),
        }
    }
}

impl From<PersistResult> for PersistResponse {
    fn from(result: PersistResult) -> Self {
        match result {
            Ok(p) => Self {
                ok: true,
                board_version: Some(p.board_version),
                ..Self::default()
            },
            Err(f) => Self {
                ok: false,
                code: Some(f.code),
                message: Some(f.message),
                latest_board_version: f.latest_board_version,
                ..Self::default()
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReorderListsRequest {
    pub board_id: String,
    pub workspace_id: String,
    pub mutation_id: MutationId,
    pub expected_board_version: u64,
    pub ordered_list_ids: Vec<String>,
}

/// `before_card_id = None` places the card at the end of the target list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveCardRequest {
    pub board_id: String,
    pub workspace_id: String,
    pub mutation_id: MutationId,
    pub expected_board_version: u64,
    pub card_id: String,
    pub to_list_id: String,
    pub before_card_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlushedMove {
    pub card_id: String,
    pub to_list_id: String,
    pub before_card_id: Option<String>,
    pub mutation_id: MutationId,
}

/// Best-effort payload fired when the host is shutting down.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnloadFlushRequest {
    pub board_id: String,
    pub expected_board_version: u64,
    pub mutations: Vec<FlushedMove>,
}

/// Identifies the board a mutation is written to.
#[derive(Debug, Clone, Copy)]
pub struct WriteTarget<'a> {
    pub board_id: &'a str,
    pub workspace_id: &'a str,
    pub expected_board_version: u64,
}

#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    async fn reorder_lists(&self, request: ReorderListsRequest) -> PersistResult;

    async fn move_card(&self, request: MoveCardRequest) -> PersistResult;

    /// Full board contents for a resync.
    async fn fetch_board(&self, board_id: &str) -> Result<BoardSnapshot, PersistFailure>;

    /// Dispatch `mutation` to the matching RPC.
    async fn send(&self, mutation: &MutationPayload, target: WriteTarget<'_>) -> PersistResult {
        match &mutation.kind {
            MutationKind::ListReorder { ordered_list_ids } => {
                self.reorder_lists(ReorderListsRequest {
                    board_id: target.board_id.to_string(),
                    workspace_id: target.workspace_id.to_string(),
                    mutation_id: mutation.mutation_id.clone(),
                    expected_board_version: target.expected_board_version,
                    ordered_list_ids: ordered_list_ids.clone(),
                })
                .await
            }
            MutationKind::CardMove {
                card_id,
                to_list_id,
                before_card_id,
            } => {
                self.move_card(MoveCardRequest {
                    board_id: target.board_id.to_string(),
                    workspace_id: target.workspace_id.to_string(),
                    mutation_id: mutation.mutation_id.clone(),
                    expected_board_version: target.expected_board_version,
                    card_id: card_id.clone(),
                    to_list_id: to_list_id.clone(),
                    before_card_id: before_card_id.clone(),
                })
                .await
            }
        }
    }
}

/// Fire-and-forget delivery for the unload flush. Must not block.
pub trait UnloadBeacon: Send + Sync {
    fn send_beacon(&self, request: UnloadFlushRequest);
}
