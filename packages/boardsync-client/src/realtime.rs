/// Realtime activity listener.
///
/// Keeps a WebSocket open to the backend's activity feed and hands every
/// notification to the session's reconciler. Notifications missed while
/// disconnected are covered by a resync after each reconnect.
use std::time::Duration;

use boardsync_core::{ActivityEvent, BoardSession};
use futures_util::{SinkExt, StreamExt};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::{HeaderValue, AUTHORIZATION};
use tokio_tungstenite::tungstenite::Message;

use crate::error::ClientError;

const RECONNECT_DELAY: Duration = Duration::from_secs(2);

/// Spawn a listener that reconnects until the handle is aborted.
pub fn spawn_listener(url: String, token: Option<String>, session: BoardSession) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut connected_before = false;
        loop {
            let result = run_listener(&url, token.as_deref(), &session, connected_before).await;
            match result {
                Ok(()) => log::info!(target: "boardsync.realtime", "Feed {} closed", url),
                Err(e) => log::warn!(target: "boardsync.realtime", "Feed {} failed: {}", url, e),
            }
            connected_before = true;
            tokio::time::sleep(RECONNECT_DELAY).await;
        }
    })
}

/// Connect once and forward notifications until the feed closes.
pub async fn run_listener(
    url: &str,
    token: Option<&str>,
    session: &BoardSession,
    resync_on_connect: bool,
) -> Result<(), ClientError> {
    let mut request = url.into_client_request()?;
    if let Some(token) = token {
        request
            .headers_mut()
            .insert(AUTHORIZATION, HeaderValue::from_str(&format!("Bearer {}", token))?);
    }

    let (ws_stream, _) = tokio_tungstenite::connect_async(request).await?;
    log::info!(target: "boardsync.realtime", "Connected to {}", url);
    if resync_on_connect {
        session.resync().await;
    }

    let (mut ws_tx, mut ws_rx) = ws_stream.split();
    while let Some(msg) = ws_rx.next().await {
        let text = match msg? {
            Message::Text(t) => t.to_string(),
            Message::Close(_) => break,
            Message::Ping(data) => {
                let _ = ws_tx.send(Message::Pong(data)).await;
                continue;
            }
            _ => continue,
        };

        match serde_json::from_str::<ActivityEvent>(&text) {
            Ok(event) => {
                session.on_activity(&event);
            }
            Err(e) => log::warn!(
                target: "boardsync.realtime",
                "Ignoring malformed activity message: {}",
                e
            ),
        }
    }
    Ok(())
}
