/// Timing and retry knobs for a board session.
use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncTuning {
    /// Quiet window before the first list reorder of a burst is sent.
    #[serde(default = "default_list_reorder_debounce_ms")]
    pub list_reorder_debounce_ms: u64,
    /// Settle delay that batches rapid realtime notifications into one resync.
    #[serde(default = "default_resync_settle_ms")]
    pub resync_settle_ms: u64,
    /// How long our own mutation ids are remembered for echo suppression.
    #[serde(default = "default_echo_ttl_secs")]
    pub echo_ttl_secs: u64,
    /// Conflict retries for a card move before local order is accepted.
    #[serde(default = "default_max_card_move_retries")]
    pub max_card_move_retries: u32,
    /// Capacity of the session event channel.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

fn default_list_reorder_debounce_ms() -> u64 {
    180
}

fn default_resync_settle_ms() -> u64 {
    300
}

fn default_echo_ttl_secs() -> u64 {
    120
}

fn default_max_card_move_retries() -> u32 {
    2
}

fn default_event_capacity() -> usize {
    64
}

impl Default for SyncTuning {
    fn default() -> Self {
        Self {
            list_reorder_debounce_ms: default_list_reorder_debounce_ms(),
            resync_settle_ms: default_resync_settle_ms(),
            echo_ttl_secs: default_echo_ttl_secs(),
            max_card_move_retries: default_max_card_move_retries(),
            event_capacity: default_event_capacity(),
        }
    }
}

impl SyncTuning {
    pub fn list_reorder_debounce(&self) -> Duration {
        Duration::from_millis(self.list_reorder_debounce_ms)
    }

    pub fn resync_settle(&self) -> Duration {
        Duration::from_millis(self.resync_settle_ms)
    }

    pub fn echo_ttl(&self) -> Duration {
        Duration::from_secs(self.echo_ttl_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_fills_defaults() {
        let tuning: SyncTuning = serde_json::from_str(r#"{"listReorderDebounceMs": 50}"#).unwrap();
        assert_eq!(tuning.list_reorder_debounce(), Duration::from_millis(50));
        assert_eq!(tuning.resync_settle(), Duration::from_millis(300));
        assert_eq!(tuning.echo_ttl(), Duration::from_secs(120));
        assert_eq!(tuning.max_card_move_retries, 2);
    }
}
