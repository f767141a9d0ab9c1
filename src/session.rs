//! One user's view of the board, kept in step with the store.
//!
//! Moves are applied to the local board before any write is confirmed and
//! are serialized per session, so shift writes of two moves never
//! interleave.

use crate::config::ReorderConfig;
use crate::domain::board::{Board, MoveRequest, Slot};
use crate::domain::task::{TaskId, TaskStatus};
use crate::error::{ReorderError, Result};
use crate::reorder::{ReorderEngine, ReorderPhase};
use crate::storage::TaskStore;
use std::sync::Mutex as StdMutex;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

/// What happened to a move after it reached the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MoveOutcome {
    /// Dropped where it was picked up; nothing written
    Noop,
    /// Every write succeeded
    Persisted { writes: usize },
    /// The moved task could not be written; the board was restored
    Reverted(ReorderError),
    /// The moved task was written but some shifted positions were not.
    /// `refreshed` tells whether the board was reloaded from the store.
    Reconciled {
        failed: Vec<TaskId>,
        refreshed: bool,
    },
}

impl MoveOutcome {
    pub fn is_fully_persisted(&self) -> bool {
        matches!(self, Self::Noop | Self::Persisted { .. })
    }

    /// Converts the outcome back into the engine's error type
    pub fn into_result(self) -> std::result::Result<(), ReorderError> {
        match self {
            Self::Noop | Self::Persisted { .. } => Ok(()),
            Self::Reverted(err) => Err(err),
            Self::Reconciled { failed, .. } => Err(ReorderError::PartialShiftFailure(failed)),
        }
    }
}

pub struct BoardSession<S> {
    store: S,
    engine: ReorderEngine,
    refresh_on_partial_failure: bool,
    board: RwLock<Board>,
    phase: StdMutex<ReorderPhase>,
    moves: Mutex<()>,
}

impl<S: TaskStore> BoardSession<S> {
    pub fn new(store: S, board: Board, config: ReorderConfig) -> Self {
        Self {
            store,
            refresh_on_partial_failure: config.refresh_on_partial_failure,
            engine: ReorderEngine::new(config),
            board: RwLock::new(board),
            phase: StdMutex::new(ReorderPhase::Idle),
            moves: Mutex::new(()),
        }
    }

    /// Builds a session from the store's current contents
    pub async fn hydrate(store: S, config: ReorderConfig) -> Result<Self> {
        let tasks = store.fetch_ordered().await?;
        info!(tasks = tasks.len(), "hydrated board");
        Ok(Self::new(store, Board::load(tasks), config))
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn engine(&self) -> &ReorderEngine {
        &self.engine
    }

    /// Snapshot of the board as the user currently sees it
    pub async fn board(&self) -> Board {
        self.board.read().await.clone()
    }

    /// Phase of the latest move
    pub fn phase(&self) -> ReorderPhase {
        self.phase
            .lock()
            .map(|phase| *phase)
            .unwrap_or_default()
    }

    fn set_phase(&self, phase: ReorderPhase) {
        debug!(?phase, "reorder phase");
        if let Ok(mut current) = self.phase.lock() {
            *current = phase;
        }
    }

    /// Replaces the local board with the store's ordering.
    ///
    /// Waits for an in-flight move to finish first.
    pub async fn refresh(&self) -> Result<()> {
        let _gate = self.moves.lock().await;
        self.reload().await
    }

    async fn reload(&self) -> Result<()> {
        let tasks = self.store.fetch_ordered().await?;
        info!(tasks = tasks.len(), "refreshed board from store");
        *self.board.write().await = Board::load(tasks);
        Ok(())
    }

    pub async fn move_task(
        &self,
        task_id: &TaskId,
        from_status: TaskStatus,
        from_index: usize,
        to_status: TaskStatus,
        to_index: usize,
    ) -> Result<MoveOutcome> {
        let request = MoveRequest::new(
            task_id.clone(),
            Slot::new(from_status, from_index),
            Slot::new(to_status, to_index),
        );
        self.apply_move(&request).await
    }

    /// Applies a drag event locally and persists it.
    ///
    /// Invalid requests fail with a validation error and leave the board
    /// untouched. Store failures are reported through [`MoveOutcome`].
    pub async fn apply_move(&self, request: &MoveRequest) -> Result<MoveOutcome> {
        let _gate = self.moves.lock().await;
        self.set_phase(ReorderPhase::Idle);

        let snapshot = self.board.read().await.clone();
        let (next, descriptor) =
            snapshot.apply_with(request, self.engine.config().compact_source)?;
        if descriptor.is_noop() {
            return Ok(MoveOutcome::Noop);
        }

        *self.board.write().await = next;

        let result = self
            .engine
            .run(&descriptor, &self.store, |phase| self.set_phase(phase))
            .await;

        match result {
            Ok(plan) => Ok(MoveOutcome::Persisted { writes: plan.len() }),
            Err(err @ ReorderError::PrimaryWriteFailed { .. }) => {
                warn!(task_id = %request.task_id, error = %err, "reverting move");
                *self.board.write().await = snapshot;
                Ok(MoveOutcome::Reverted(err))
            }
            Err(ReorderError::PartialShiftFailure(failed)) => {
                let refreshed = if self.refresh_on_partial_failure {
                    match self.reload().await {
                        Ok(()) => true,
                        Err(err) => {
                            warn!(error = %err, "could not refresh after partial move");
                            false
                        }
                    }
                } else {
                    false
                };
                Ok(MoveOutcome::Reconciled { failed, refreshed })
            }
        }
    }
}
