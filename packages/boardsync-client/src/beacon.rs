/// Fire-and-forget delivery of the unload flush.
use std::sync::{Mutex, PoisonError};

use boardsync_core::gateway::UnloadFlushRequest;
use boardsync_core::UnloadBeacon;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use crate::http_gateway::HttpGateway;

pub struct HttpBeacon {
    gateway: HttpGateway,
    sent: Mutex<Vec<JoinHandle<()>>>,
}

impl HttpBeacon {
    pub fn new(gateway: HttpGateway) -> Self {
        Self {
            gateway,
            sent: Mutex::new(Vec::new()),
        }
    }

    /// Wait for beacons already fired. A host that is about to exit its
    /// runtime calls this so the requests are not cut off.
    pub async fn wait(&self) {
        let sent = std::mem::take(&mut *self.sent.lock().unwrap_or_else(PoisonError::into_inner));
        for handle in sent {
            let _ = handle.await;
        }
    }
}

impl UnloadBeacon for HttpBeacon {
    fn send_beacon(&self, request: UnloadFlushRequest) {
        let Ok(handle) = Handle::try_current() else {
            log::warn!(
                target: "boardsync.flush",
                "No runtime available, dropping flush for board {}",
                request.board_id
            );
            return;
        };
        let gateway = self.gateway.clone();
        let task = handle.spawn(async move {
            match gateway.flush(&request).await {
                Ok(()) => log::debug!(
                    target: "boardsync.flush",
                    "Flush for board {} delivered",
                    request.board_id
                ),
                Err(e) => log::warn!(
                    target: "boardsync.flush",
                    "Flush for board {} failed: {}",
                    request.board_id,
                    e
                ),
            }
        });
        let mut sent = self.sent.lock().unwrap_or_else(PoisonError::into_inner);
        sent.retain(|h| !h.is_finished());
        sent.push(task);
    }
}
