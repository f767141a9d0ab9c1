//! Turns a move into store writes and applies them.
//!
//! The moved task is always written first and confirmed before any other
//! row is touched. If that write fails nothing else is attempted. Shift
//! writes that follow are independent of each other; a failure among them
//! does not undo the primary write.

use crate::config::{ReorderConfig, ShiftDispatch};
use crate::domain::board::{MoveDescriptor, MoveKind};
use crate::domain::task::{TaskId, TaskStatus};
use crate::error::{ReorderError, StoreError};
use crate::storage::TaskStore;
use futures::future::join_all;
use tracing::{debug, warn};

/// A single-row store mutation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOp {
    SetStatusAndPosition {
        id: TaskId,
        status: TaskStatus,
        position: i32,
    },
    SetPosition {
        id: TaskId,
        position: i32,
    },
}

impl WriteOp {
    pub fn task_id(&self) -> &TaskId {
        match self {
            Self::SetStatusAndPosition { id, .. } | Self::SetPosition { id, .. } => id,
        }
    }

    pub fn position(&self) -> i32 {
        match self {
            Self::SetStatusAndPosition { position, .. } | Self::SetPosition { position, .. } => {
                *position
            }
        }
    }

    async fn apply<S: TaskStore + ?Sized>(&self, store: &S) -> Result<(), StoreError> {
        match self {
            Self::SetStatusAndPosition {
                id,
                status,
                position,
            } => store.write_status_and_position(id, *status, *position).await,
            Self::SetPosition { id, position } => store.write_position(id, *position).await,
        }
    }
}

/// Ordered writes for one move.
///
/// When not empty, the first op is the moved task's
/// `SetStatusAndPosition` and every later op is a `SetPosition`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WritePlan {
    ops: Vec<WriteOp>,
}

impl WritePlan {
    pub fn ops(&self) -> &[WriteOp] {
        &self.ops
    }

    pub fn primary(&self) -> Option<&WriteOp> {
        self.ops.first()
    }

    pub fn shifts(&self) -> &[WriteOp] {
        self.ops.get(1..).unwrap_or(&[])
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn into_ops(self) -> Vec<WriteOp> {
        self.ops
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Primary,
    PartialShift,
}

/// Progress of a single move through the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReorderPhase {
    #[default]
    Idle,
    Planning,
    WritingPrimary,
    WritingShifts,
    Done,
    Failed(FailureKind),
}

impl ReorderPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed(_))
    }
}

/// Plans a move with the default settings
pub fn plan(descriptor: &MoveDescriptor) -> WritePlan {
    ReorderEngine::default().plan(descriptor)
}

#[derive(Debug, Clone, Default)]
pub struct ReorderEngine {
    config: ReorderConfig,
}

impl ReorderEngine {
    pub fn new(config: ReorderConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ReorderConfig {
        &self.config
    }

    /// Derives the minimal ordered write set for a move.
    ///
    /// Only tasks whose position actually changed get a shift write,
    /// destination column first. The source column contributes writes only
    /// when the descriptor came from a compacting move.
    pub fn plan(&self, descriptor: &MoveDescriptor) -> WritePlan {
        if descriptor.is_noop() {
            return WritePlan::default();
        }
        let Some(moved) = descriptor.moved() else {
            return WritePlan::default();
        };

        let mut ops = vec![WriteOp::SetStatusAndPosition {
            id: moved.task_id.clone(),
            status: moved.status,
            position: moved.position,
        }];

        let mut columns = vec![descriptor.to.status];
        if descriptor.kind == MoveKind::Transfer {
            columns.push(descriptor.from.status);
        }
        for status in columns {
            ops.extend(
                descriptor
                    .shifted_in(status)
                    .filter(|change| change.position != change.previous_position)
                    .map(|change| WriteOp::SetPosition {
                        id: change.task_id.clone(),
                        position: change.position,
                    }),
            );
        }

        WritePlan { ops }
    }

    /// Applies a plan to the store
    pub async fn execute<S: TaskStore + ?Sized>(
        &self,
        plan: &WritePlan,
        store: &S,
    ) -> Result<(), ReorderError> {
        self.execute_observed(plan, store, |_| {}).await
    }

    /// Plans and applies a move, reporting each phase as it is entered
    pub async fn run<S, F>(
        &self,
        descriptor: &MoveDescriptor,
        store: &S,
        mut on_phase: F,
    ) -> Result<WritePlan, ReorderError>
    where
        S: TaskStore + ?Sized,
        F: FnMut(ReorderPhase) + Send,
    {
        on_phase(ReorderPhase::Planning);
        let plan = self.plan(descriptor);
        debug!(
            task_id = %descriptor.task_id,
            writes = plan.len(),
            "planned move"
        );
        self.execute_observed(&plan, store, on_phase).await?;
        Ok(plan)
    }

    /// Applies a plan, reporting each phase as it is entered
    pub async fn execute_observed<S, F>(
        &self,
        plan: &WritePlan,
        store: &S,
        mut on_phase: F,
    ) -> Result<(), ReorderError>
    where
        S: TaskStore + ?Sized,
        F: FnMut(ReorderPhase) + Send,
    {
        let Some(primary) = plan.primary() else {
            on_phase(ReorderPhase::Done);
            return Ok(());
        };

        on_phase(ReorderPhase::WritingPrimary);
        debug!(task_id = %primary.task_id(), position = primary.position(), "writing moved task");
        if let Err(source) = primary.apply(store).await {
            warn!(task_id = %primary.task_id(), error = %source, "primary write failed");
            on_phase(ReorderPhase::Failed(FailureKind::Primary));
            return Err(ReorderError::PrimaryWriteFailed {
                id: primary.task_id().clone(),
                source,
            });
        }

        let shifts = plan.shifts();
        if shifts.is_empty() {
            on_phase(ReorderPhase::Done);
            return Ok(());
        }

        on_phase(ReorderPhase::WritingShifts);
        let failed = match self.config.shift_dispatch {
            ShiftDispatch::Sequential => {
                let mut failed = Vec::new();
                for op in shifts {
                    if let Err(err) = op.apply(store).await {
                        warn!(task_id = %op.task_id(), error = %err, "shift write failed");
                        failed.push(op.task_id().clone());
                    }
                }
                failed
            }
            ShiftDispatch::Concurrent => {
                let results = join_all(
                    shifts
                        .iter()
                        .map(|op| async move { (op, op.apply(store).await) }),
                )
                .await;
                results
                    .into_iter()
                    .filter_map(|(op, result)| {
                        result.err().map(|err| {
                            warn!(task_id = %op.task_id(), error = %err, "shift write failed");
                            op.task_id().clone()
                        })
                    })
                    .collect()
            }
        };

        if failed.is_empty() {
            debug!(shifted = shifts.len(), "move persisted");
            on_phase(ReorderPhase::Done);
            Ok(())
        } else {
            on_phase(ReorderPhase::Failed(FailureKind::PartialShift));
            Err(ReorderError::PartialShiftFailure(failed))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::board::Board;
    use crate::domain::task::Task;
    use crate::storage::MemoryStorage;

    fn task(id: &str, status: TaskStatus, position: i32) -> Task {
        Task::with_id(TaskId::from(id), id.to_uppercase(), "user-1")
            .with_status(status)
            .with_position(position)
    }

    async fn seeded(tasks: &[Task]) -> MemoryStorage {
        let storage = MemoryStorage::new();
        for t in tasks {
            storage.insert(t.clone()).await;
        }
        storage
    }

    fn set_position(id: &str, position: i32) -> WriteOp {
        WriteOp::SetPosition {
            id: TaskId::from(id),
            position,
        }
    }

    fn abc_todo() -> Vec<Task> {
        vec![
            task("a", TaskStatus::Todo, 0),
            task("b", TaskStatus::Todo, 1),
            task("c", TaskStatus::Todo, 2),
        ]
    }

    #[test]
    fn test_noop_plans_nothing() {
        let board = Board::load(abc_todo());
        let (_, descriptor) = board
            .move_task(&TaskId::from("a"), TaskStatus::Todo, 0, TaskStatus::Todo, 0)
            .unwrap();
        assert!(plan(&descriptor).is_empty());
    }

    #[test]
    fn test_transfer_without_destination_shift() {
        let mut tasks = abc_todo();
        tasks.push(task("d", TaskStatus::Done, 0));
        let board = Board::load(tasks);

        let (_, descriptor) = board
            .move_task(&TaskId::from("b"), TaskStatus::Todo, 1, TaskStatus::Done, 1)
            .unwrap();
        let plan = plan(&descriptor);

        assert_eq!(
            plan.ops(),
            &[WriteOp::SetStatusAndPosition {
                id: TaskId::from("b"),
                status: TaskStatus::Done,
                position: 1,
            }]
        );
    }

    #[test]
    fn test_reorder_shifts_in_board_order() {
        let board = Board::load(abc_todo());
        let (_, descriptor) = board
            .move_task(&TaskId::from("c"), TaskStatus::Todo, 2, TaskStatus::Todo, 0)
            .unwrap();
        let plan = plan(&descriptor);

        assert_eq!(
            plan.into_ops(),
            vec![
                WriteOp::SetStatusAndPosition {
                    id: TaskId::from("c"),
                    status: TaskStatus::Todo,
                    position: 0,
                },
                set_position("a", 1),
                set_position("b", 2),
            ]
        );
    }

    #[test]
    fn test_plan_skips_tasks_outside_shifted_range() {
        let board = Board::load(
            ["a", "b", "c", "d", "e", "f"]
                .iter()
                .enumerate()
                .map(|(i, id)| task(id, TaskStatus::Review, i as i32)),
        );
        let (_, descriptor) = board
            .move_task(&TaskId::from("b"), TaskStatus::Review, 1, TaskStatus::Review, 3)
            .unwrap();
        let plan = plan(&descriptor);

        let touched: Vec<_> = plan.ops().iter().map(|op| op.task_id().as_str()).collect();
        assert_eq!(touched, vec!["b", "c", "d"]);
        assert_eq!(plan.shifts(), &[set_position("c", 1), set_position("d", 2)]);
    }

    #[test]
    fn test_source_shifts_planned_only_when_compacted() {
        let mut tasks = abc_todo();
        tasks.push(task("d", TaskStatus::Done, 0));
        let board = Board::load(tasks);
        let (_, descriptor) = board
            .move_task(&TaskId::from("a"), TaskStatus::Todo, 0, TaskStatus::Done, 0)
            .unwrap();
        assert_eq!(plan(&descriptor).shifts(), &[set_position("d", 1)]);

        let (_, descriptor) = board
            .move_task_compacting(&TaskId::from("a"), TaskStatus::Todo, 0, TaskStatus::Done, 0)
            .unwrap();
        assert_eq!(
            plan(&descriptor).shifts(),
            &[
                set_position("d", 1),
                set_position("b", 0),
                set_position("c", 1),
            ]
        );
    }

    #[tokio::test]
    async fn test_execute_persists_everything() {
        let tasks = abc_todo();
        let storage = seeded(&tasks).await;
        let board = Board::load(tasks);
        let (next, descriptor) = board
            .move_task(&TaskId::from("c"), TaskStatus::Todo, 2, TaskStatus::Todo, 0)
            .unwrap();

        let engine = ReorderEngine::default();
        let plan = engine.plan(&descriptor);
        engine.execute(&plan, &storage).await.unwrap();

        assert_eq!(storage.write_log().await, plan.into_ops());
        let stored = Board::load(storage.fetch_ordered().await.unwrap());
        let layout = |board: &Board| -> Vec<(String, i32)> {
            board
                .column(TaskStatus::Todo)
                .iter()
                .map(|t| (t.id.as_str().to_string(), t.position))
                .collect()
        };
        assert_eq!(layout(&stored), layout(&next));
    }

    #[tokio::test]
    async fn test_primary_failure_attempts_no_shifts() {
        let tasks = abc_todo();
        let storage = seeded(&tasks).await;
        storage.fail_writes_for(&TaskId::from("c")).await;

        let (_, descriptor) = Board::load(tasks)
            .move_task(&TaskId::from("c"), TaskStatus::Todo, 2, TaskStatus::Todo, 0)
            .unwrap();

        let mut phases = Vec::new();
        let err = ReorderEngine::default()
            .run(&descriptor, &storage, |phase| phases.push(phase))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ReorderError::PrimaryWriteFailed { ref id, .. } if id.as_str() == "c"
        ));
        assert!(storage.write_log().await.is_empty());
        assert_eq!(storage.get(&TaskId::from("a")).await.unwrap().position, 0);
        assert_eq!(
            phases,
            vec![
                ReorderPhase::Planning,
                ReorderPhase::WritingPrimary,
                ReorderPhase::Failed(FailureKind::Primary),
            ]
        );
    }

    #[tokio::test]
    async fn test_partial_shift_failure_keeps_primary() {
        let tasks = abc_todo();
        let storage = seeded(&tasks).await;
        storage.fail_writes_for(&TaskId::from("a")).await;

        let (_, descriptor) = Board::load(tasks)
            .move_task(&TaskId::from("c"), TaskStatus::Todo, 2, TaskStatus::Todo, 0)
            .unwrap();

        let mut phases = Vec::new();
        let err = ReorderEngine::default()
            .run(&descriptor, &storage, |phase| phases.push(phase))
            .await
            .unwrap_err();

        assert_eq!(err, ReorderError::PartialShiftFailure(vec![TaskId::from("a")]));
        assert_eq!(storage.get(&TaskId::from("c")).await.unwrap().position, 0);
        assert_eq!(storage.get(&TaskId::from("b")).await.unwrap().position, 2);
        assert_eq!(
            phases,
            vec![
                ReorderPhase::Planning,
                ReorderPhase::WritingPrimary,
                ReorderPhase::WritingShifts,
                ReorderPhase::Failed(FailureKind::PartialShift),
            ]
        );
        assert!(phases.last().unwrap().is_terminal());
    }

    #[tokio::test]
    async fn test_concurrent_dispatch_collects_all_failures() {
        let tasks: Vec<_> = ["a", "b", "c", "d"]
            .iter()
            .enumerate()
            .map(|(i, id)| task(id, TaskStatus::InProgress, i as i32))
            .collect();
        let storage = seeded(&tasks).await;
        storage.fail_writes_for(&TaskId::from("a")).await;
        storage.fail_writes_for(&TaskId::from("c")).await;

        let (_, descriptor) = Board::load(tasks)
            .move_task(
                &TaskId::from("d"),
                TaskStatus::InProgress,
                3,
                TaskStatus::InProgress,
                0,
            )
            .unwrap();

        let engine = ReorderEngine::new(ReorderConfig {
            shift_dispatch: ShiftDispatch::Concurrent,
            ..ReorderConfig::default()
        });
        let plan = engine.plan(&descriptor);
        let err = engine.execute(&plan, &storage).await.unwrap_err();

        let ReorderError::PartialShiftFailure(mut failed) = err else {
            panic!("expected a partial shift failure");
        };
        failed.sort();
        assert_eq!(failed, vec![TaskId::from("a"), TaskId::from("c")]);
        assert_eq!(storage.get(&TaskId::from("b")).await.unwrap().position, 2);
        assert_eq!(storage.get(&TaskId::from("d")).await.unwrap().position, 0);
    }

    #[tokio::test]
    async fn test_empty_plan_is_done_immediately() {
        let storage = MemoryStorage::new();
        storage.set_unavailable(true).await;

        let mut phases = Vec::new();
        ReorderEngine::default()
            .execute_observed(&WritePlan::default(), &storage, |phase| phases.push(phase))
            .await
            .unwrap();
        assert_eq!(phases, vec![ReorderPhase::Done]);
    }
}
