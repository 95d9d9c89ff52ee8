//! Network side of boardsync: HTTP persistence, unload beacon, realtime feed.
pub mod beacon;
pub mod config;
pub mod error;
pub mod http_gateway;
pub mod logging;
pub mod realtime;

use std::sync::Arc;

use boardsync_core::{BoardSession, PersistenceGateway};

use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::http_gateway::HttpGateway;

/// Fetch the configured board and open a session on it.
pub async fn open_session(
    config: &ClientConfig,
    gateway: HttpGateway,
) -> Result<BoardSession, ClientError> {
    config.validate()?;
    let snapshot = gateway
        .fetch_board(&config.board_id)
        .await
        .map_err(ClientError::Backend)?;
    log::info!(
        "Loaded board {} ({} lists) at version {}",
        snapshot.board_id,
        snapshot.lists.len(),
        snapshot.version
    );
    let gateway: Arc<dyn PersistenceGateway> = Arc::new(gateway);
    Ok(BoardSession::open(
        snapshot,
        config.workspace_id.clone(),
        gateway,
        config.tuning.clone(),
    ))
}
