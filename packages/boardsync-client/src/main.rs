/// boardsync-tail: open the configured board, follow its activity feed and
/// log every session event until interrupted. On exit it repeats the
/// warnings and errors it saw.
///
/// Usage: boardsync-tail [config.json]
use std::path::PathBuf;

use boardsync_client::beacon::HttpBeacon;
use boardsync_client::config::{default_config_path, load_config};
use boardsync_client::http_gateway::HttpGateway;
use boardsync_client::{logging, open_session, realtime};
use tokio::sync::broadcast::error::RecvError;

#[tokio::main]
async fn main() {
    if let Err(e) = logging::init() {
        eprintln!("failed to initialize logger: {}", e);
    }

    let path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(default_config_path);
    let config = load_config(&path);

    let gateway = match HttpGateway::from_config(&config) {
        Ok(gateway) => gateway,
        Err(e) => {
            log::error!("Cannot build HTTP client: {}", e);
            std::process::exit(1);
        }
    };
    let beacon = HttpBeacon::new(gateway.clone());
    let session = match open_session(&config, gateway).await {
        Ok(session) => session,
        Err(e) => {
            log::error!("Cannot open board {}: {}", config.board_id, e);
            std::process::exit(1);
        }
    };

    let listener =
        realtime::spawn_listener(config.realtime_url(), config.token.clone(), session.clone());
    let mut events = session.subscribe();

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => match serde_json::to_string(&event) {
                    Ok(json) => log::info!("{}", json),
                    Err(e) => log::warn!("Unserializable event: {}", e),
                },
                Err(RecvError::Lagged(n)) => log::warn!("Dropped {} session events", n),
                Err(RecvError::Closed) => break,
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    listener.abort();
    session.flush_on_unload(&beacon);
    session.shutdown();
    beacon.wait().await;

    let problems = logging::recent_problems();
    if !problems.is_empty() {
        eprintln!("{} warnings or errors this session:", problems.len());
        for entry in problems {
            match serde_json::to_string(&entry) {
                Ok(json) => eprintln!("{}", json),
                Err(_) => eprintln!("[{}] {}", entry.level, entry.message),
            }
        }
    }
}
