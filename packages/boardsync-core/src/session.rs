/// Board session: the owned engine behind one open board.
///
/// Applies drags optimistically, drains the mutation queue against the
/// gateway with at most one request in flight, feeds results through the
/// conflict resolver, and resyncs on foreign activity.
///
/// All state sits behind one mutex that is never held across an `.await`.
/// The only suspension points are the gateway calls and the debounce and
/// settle timers, so every transition between them is atomic.
/// Methods that start work spawn onto the ambient Tokio runtime.
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::board::{BoardLayout, LocalBoardState};
use crate::config::SyncTuning;
use crate::error::BoardError;
use crate::flusher::UnloadFlusher;
use crate::gateway::{PersistenceGateway, UnloadBeacon, WriteTarget};
use crate::mutation::{MutationId, MutationKind, MutationPayload};
use crate::mutator::{DragResult, OptimisticMutator, Rollback};
use crate::queue::{EnqueueAction, MutationQueue, QueueState};
use crate::reconciler::{ActivityEvent, RealtimeReconciler, ReconcileDecision};
use crate::resolver::{ConfirmedSnapshot, ConflictResolver, Resolution};
use crate::types::BoardSnapshot;

/// Notifications for the host UI.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SessionEvent {
    #[serde(rename_all = "camelCase")]
    Confirmed {
        mutation_id: MutationId,
        board_version: u64,
    },
    #[serde(rename_all = "camelCase")]
    Superseded { mutation_id: MutationId },
    #[serde(rename_all = "camelCase")]
    Retrying {
        mutation_id: MutationId,
        retry_count: u32,
    },
    #[serde(rename_all = "camelCase")]
    ConflictAccepted { mutation_id: MutationId },
    /// Terminal failure; `message` is meant for display.
    #[serde(rename_all = "camelCase")]
    RolledBack {
        mutation_id: MutationId,
        message: String,
    },
    SyncingStarted,
    SyncingFinished,
    #[serde(rename_all = "camelCase")]
    Resynced { board_version: u64 },
    ResyncFailed { message: String },
}

/// Returned for every drag that changed the board.
#[derive(Debug, Clone)]
pub struct DragReceipt {
    pub mutation_id: MutationId,
    rollback: Rollback,
}

struct Inner {
    board: LocalBoardState,
    confirmed: ConfirmedSnapshot,
    queue: MutationQueue,
    reconciler: RealtimeReconciler,
    dragging: bool,
    interaction_locked: bool,
    resync_scheduled: bool,
    closed: bool,
}

struct Shared {
    board_id: String,
    workspace_id: String,
    gateway: Arc<dyn PersistenceGateway>,
    resolver: ConflictResolver,
    tuning: SyncTuning,
    inner: Mutex<Inner>,
    timers: Mutex<Vec<JoinHandle<()>>>,
    events: broadcast::Sender<SessionEvent>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }

    fn track_timer(&self, handle: JoinHandle<()>) {
        let mut timers = self.timers.lock().unwrap_or_else(PoisonError::into_inner);
        timers.retain(|h| !h.is_finished());
        timers.push(handle);
    }
}

#[derive(Clone)]
pub struct BoardSession {
    shared: Arc<Shared>,
}

impl BoardSession {
    /// Open a session seeded from a server snapshot.
    pub fn open(
        snapshot: BoardSnapshot,
        workspace_id: impl Into<String>,
        gateway: Arc<dyn PersistenceGateway>,
        tuning: SyncTuning,
    ) -> Self {
        let board = LocalBoardState::from_snapshot(snapshot);
        let (events, _) = broadcast::channel(tuning.event_capacity.max(1));
        log::info!(
            target: "boardsync.session",
            "Opened board {} at version {}",
            board.board_id(),
            board.version()
        );
        let inner = Inner {
            confirmed: ConfirmedSnapshot::new(board.layout().clone()),
            reconciler: RealtimeReconciler::new(tuning.echo_ttl()),
            queue: MutationQueue::new(),
            dragging: false,
            interaction_locked: false,
            resync_scheduled: false,
            closed: false,
            board,
        };
        Self {
            shared: Arc::new(Shared {
                board_id: inner.board.board_id().to_string(),
                workspace_id: workspace_id.into(),
                gateway,
                resolver: ConflictResolver::new(tuning.max_card_move_retries),
                tuning,
                inner: Mutex::new(inner),
                timers: Mutex::new(Vec::new()),
                events,
            }),
        }
    }

    pub fn board_id(&self) -> &str {
        &self.shared.board_id
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.shared.events.subscribe()
    }

    /// Live layout, including unconfirmed optimistic changes.
    pub fn layout(&self) -> Arc<BoardLayout> {
        self.shared.lock().board.layout().clone()
    }

    pub fn confirmed_layout(&self) -> Arc<BoardLayout> {
        self.shared.lock().confirmed.layout().clone()
    }

    /// Last observed board version. Never decreases.
    pub fn version(&self) -> u64 {
        self.shared.lock().board.version()
    }

    pub fn queue_state(&self) -> QueueState {
        self.shared.lock().queue.state()
    }

    pub fn pending_len(&self) -> usize {
        self.shared.lock().queue.pending().len()
    }

    /// Apply a finished drag locally and queue it for persistence.
    /// Returns `Ok(None)` when the drag changed nothing.
    pub fn apply_drag(&self, drag: DragResult) -> Result<Option<DragReceipt>, BoardError> {
        let (action, receipt) = {
            let mut inner = self.shared.lock();
            if inner.closed {
                return Err(BoardError::SessionClosed);
            }
            if inner.interaction_locked {
                return Err(BoardError::InteractionLocked);
            }
            let Some(applied) = OptimisticMutator::apply(&mut inner.board, &drag)? else {
                log::debug!(target: "boardsync.session", "Drag changed nothing, not queued");
                return Ok(None);
            };

            let kind = MutationKind::from(&drag);
            let seq = inner.queue.allocate_seq(kind.key());
            let payload = MutationPayload::new(kind, seq);
            let receipt = DragReceipt {
                mutation_id: payload.mutation_id.clone(),
                rollback: applied.rollback,
            };
            log::debug!(
                target: "boardsync.queue",
                "Enqueued {} as seq {}",
                payload.mutation_id,
                seq
            );
            (inner.queue.enqueue(payload), receipt)
        };
        self.dispatch(action);
        Ok(Some(receipt))
    }

    /// Undo a drag the user cancelled, if nothing newer happened since.
    /// An entry that has not been sent yet is removed from the queue.
    pub fn revert(&self, receipt: DragReceipt) -> bool {
        let mut inner = self.shared.lock();
        if !receipt.rollback.rollback(&mut inner.board) {
            return false;
        }
        if inner.queue.discard(&receipt.mutation_id).is_some() {
            log::debug!(
                target: "boardsync.queue",
                "Discarded unsent mutation {}",
                receipt.mutation_id
            );
        }
        true
    }

    /// While locked, new drags are rejected. Draining is unaffected.
    pub fn set_interaction_locked(&self, locked: bool) {
        self.shared.lock().interaction_locked = locked;
    }

    /// Report whether a drag gesture is in progress. Ending a drag fires any
    /// resync deferred while it ran.
    pub fn set_dragging(&self, dragging: bool) {
        let mut inner = self.shared.lock();
        let was_dragging = std::mem::replace(&mut inner.dragging, dragging);
        if was_dragging && !dragging && inner.reconciler.on_drag_end() {
            log::debug!(target: "boardsync.realtime", "Drag ended, running deferred resync");
            self.schedule_resync(&mut inner);
        }
    }

    /// Handle an activity notification from the realtime channel.
    pub fn on_activity(&self, event: &ActivityEvent) -> ReconcileDecision {
        let mut inner = self.shared.lock();
        let known = inner.board.version();
        let dragging = inner.dragging;
        let decision = inner.reconciler.on_activity(event, known, dragging);
        log::debug!(
            target: "boardsync.realtime",
            "Activity {:?} (version {:?}) -> {:?}",
            event.action,
            event.board_version_after,
            decision
        );
        if decision == ReconcileDecision::Resync {
            self.schedule_resync(&mut inner);
        }
        decision
    }

    /// Fetch the board now and rebase unconfirmed intents on top of it.
    pub async fn resync(&self) {
        resync(&self.shared).await;
    }

    /// Fire one best-effort request carrying unconfirmed card moves.
    /// Returns false when there was nothing to flush.
    pub fn flush_on_unload(&self, beacon: &dyn UnloadBeacon) -> bool {
        let request = {
            let inner = self.shared.lock();
            UnloadFlusher::collect(
                inner.queue.unconfirmed(),
                &self.shared.board_id,
                inner.board.version(),
            )
        };
        let Some(request) = request else {
            return false;
        };
        log::info!(
            target: "boardsync.flush",
            "Flushing {} unconfirmed card moves for board {}",
            request.mutations.len(),
            request.board_id
        );
        beacon.send_beacon(request);
        true
    }

    /// Stop timers and reject further drags. Queued entries are not sent.
    pub fn shutdown(&self) {
        {
            let mut inner = self.shared.lock();
            inner.closed = true;
            inner.queue.cancel_debounce();
        }
        let timers = std::mem::take(
            &mut *self
                .shared
                .timers
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        for timer in timers {
            timer.abort();
        }
        log::info!(target: "boardsync.session", "Closed board {}", self.shared.board_id);
    }

    fn dispatch(&self, action: EnqueueAction) {
        match action {
            EnqueueAction::SendNow => {
                tokio::spawn(drain(self.shared.clone()));
            }
            EnqueueAction::Debounce { generation } => {
                let shared = self.shared.clone();
                let delay = shared.tuning.list_reorder_debounce();
                let handle = tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    let fire = shared.lock().queue.debounce_elapsed(generation);
                    if fire {
                        drain(shared).await;
                    }
                });
                self.shared.track_timer(handle);
            }
            EnqueueAction::Wait => {}
        }
    }

    /// Start the settle delay unless one is already batching notifications.
    fn schedule_resync(&self, inner: &mut Inner) {
        if inner.closed || inner.resync_scheduled {
            return;
        }
        inner.resync_scheduled = true;
        self.shared.emit(SessionEvent::SyncingStarted);

        let shared = self.shared.clone();
        let delay = shared.tuning.resync_settle();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if !defer_if_dragging(&shared) {
                resync(&shared).await;
            }
        });
        self.shared.track_timer(handle);
    }
}

/// Send queued mutations one at a time until the queue is empty.
async fn drain(shared: Arc<Shared>) {
    loop {
        let next = {
            let mut inner = shared.lock();
            if inner.closed {
                return;
            }
            match inner.queue.begin_next() {
                Some(payload) => {
                    inner.reconciler.register_issued(&payload.mutation_id);
                    Some((payload, inner.board.version()))
                }
                None => None,
            }
        };
        let Some((payload, expected_board_version)) = next else {
            return;
        };

        log::debug!(
            target: "boardsync.queue",
            "Sending {} (seq {}, retry {}) at version {}",
            payload.mutation_id,
            payload.seq,
            payload.retry_count,
            expected_board_version
        );
        let target = WriteTarget {
            board_id: &shared.board_id,
            workspace_id: &shared.workspace_id,
            expected_board_version,
        };
        let result = shared.gateway.send(&payload, target).await;

        let event = {
            let mut inner = shared.lock();
            let payload = inner.queue.finish().unwrap_or(payload);
            let superseded = inner.queue.is_superseded(&payload);
            let Inner {
                board,
                confirmed,
                queue,
                ..
            } = &mut *inner;
            let resolution = shared
                .resolver
                .resolve(&payload, &result, superseded, board, confirmed);
            let mutation_id = payload.mutation_id.clone();
            let event = match resolution {
                Resolution::Confirmed { board_version } => SessionEvent::Confirmed {
                    mutation_id,
                    board_version,
                },
                Resolution::Superseded => SessionEvent::Superseded { mutation_id },
                Resolution::Retry(retry) => {
                    let event = SessionEvent::Retrying {
                        mutation_id: retry.mutation_id.clone(),
                        retry_count: retry.retry_count,
                    };
                    queue.requeue(retry);
                    event
                }
                Resolution::AcceptedLocal => SessionEvent::ConflictAccepted { mutation_id },
                Resolution::RolledBack { message } => SessionEvent::RolledBack {
                    mutation_id,
                    message,
                },
            };
            // drags queued behind the failed one stay visible
            if matches!(event, SessionEvent::RolledBack { .. }) {
                replay_unconfirmed(&mut inner);
            }
            event
        };
        shared.emit(event);
    }
}

/// Replace the local board with a fresh server snapshot, then replay
/// unconfirmed intents on top so pending drags stay visible.
async fn resync(shared: &Arc<Shared>) {
    {
        let mut inner = shared.lock();
        if inner.closed {
            return;
        }
        inner.resync_scheduled = false;
    }

    let fetched = shared.gateway.fetch_board(&shared.board_id).await;
    match fetched {
        Ok(snapshot) => {
            let version = {
                let mut inner = shared.lock();
                rebase(&mut inner, snapshot);
                inner.board.version()
            };
            log::info!(
                target: "boardsync.realtime",
                "Resynced board {} at version {}",
                shared.board_id,
                version
            );
            shared.emit(SessionEvent::Resynced {
                board_version: version,
            });
        }
        Err(failure) => {
            log::warn!(
                target: "boardsync.realtime",
                "Resync of board {} failed: {}",
                shared.board_id,
                failure
            );
            shared.emit(SessionEvent::ResyncFailed {
                message: failure.message,
            });
        }
    }
    shared.emit(SessionEvent::SyncingFinished);
}

/// A drag that started during the settle delay pushes the resync back
/// until it ends. Returns true when the resync was deferred.
fn defer_if_dragging(shared: &Shared) -> bool {
    {
        let mut inner = shared.lock();
        if !inner.dragging {
            return false;
        }
        inner.resync_scheduled = false;
        inner.reconciler.defer_resync();
    }
    log::debug!(target: "boardsync.realtime", "Drag in progress, resync deferred");
    shared.emit(SessionEvent::SyncingFinished);
    true
}

fn rebase(inner: &mut Inner, snapshot: BoardSnapshot) {
    let fetched = Arc::new(BoardLayout::from_lists(snapshot.lists));
    inner.board.advance_version(snapshot.version);
    inner.confirmed.adopt_fetched(fetched);
    replay_unconfirmed(inner);
}

/// Rebuild the live layout as the confirmed layout plus every unconfirmed
/// intent in seq order. Intents that no longer apply are skipped.
fn replay_unconfirmed(inner: &mut Inner) {
    let mut layout = inner.confirmed.layout().clone();
    for payload in inner.queue.unconfirmed() {
        match payload.kind.apply_to(&layout) {
            Ok(next) => layout = Arc::new(next),
            Err(e) => log::debug!(
                target: "boardsync.session",
                "Intent seq {} no longer applies: {}",
                payload.seq,
                e
            ),
        }
    }
    inner.board.replace_layout(layout);
}
