/// Client configuration.
/// Reads client.json from ~/.config/boardsync/client.json (or platform equivalent).
use std::fs;
use std::path::{Path, PathBuf};

use boardsync_core::SyncTuning;
use serde::{Deserialize, Serialize};

use crate::error::ClientError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Activity feed endpoint. Derived from `base_url` when absent.
    #[serde(default)]
    pub realtime_url: Option<String>,
    #[serde(default)]
    pub workspace_id: String,
    #[serde(default)]
    pub board_id: String,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub tuning: SyncTuning,
}

fn default_base_url() -> String {
    "http://localhost:8080".to_string()
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            realtime_url: None,
            workspace_id: String::new(),
            board_id: String::new(),
            token: None,
            tuning: SyncTuning::default(),
        }
    }
}

impl ClientConfig {
    pub fn base_url(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }

    /// `ws(s)://<base>/boards/<board>/activity` unless configured explicitly.
    pub fn realtime_url(&self) -> String {
        match &self.realtime_url {
            Some(url) => url.clone(),
            None => format!(
                "{}/boards/{}/activity",
                self.base_url()
                    .replacen("https://", "wss://", 1)
                    .replacen("http://", "ws://", 1),
                self.board_id
            ),
        }
    }

    pub fn validate(&self) -> Result<(), ClientError> {
        if self.board_id.is_empty() {
            return Err(ClientError::Config("boardId is required".to_string()));
        }
        if self.workspace_id.is_empty() {
            return Err(ClientError::Config("workspaceId is required".to_string()));
        }
        Ok(())
    }
}

/// Default config path: ~/.config/boardsync/client.json
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("boardsync")
        .join("client.json")
}

/// Load config from path. Returns defaults if the file is missing or unreadable.
pub fn load_config(path: &Path) -> ClientConfig {
    match fs::read_to_string(path) {
        Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
            log::warn!("Failed to parse config {}: {}", path.display(), e);
            ClientConfig::default()
        }),
        Err(_) => {
            log::info!("No config at {}, using defaults", path.display());
            ClientConfig::default()
        }
    }
}
