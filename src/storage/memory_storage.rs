use crate::{
    domain::{Task, TaskId, TaskStatus},
    error::StoreError,
    reorder::WriteOp,
    storage::{order_rows, TaskStore},
};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;

#[derive(Default)]
struct State {
    tasks: HashMap<TaskId, Task>,
    unavailable: bool,
    failing: HashSet<TaskId>,
    log: Vec<WriteOp>,
}

/// In-memory task store.
///
/// Backend faults can be simulated with [`MemoryStorage::set_unavailable`]
/// and [`MemoryStorage::fail_writes_for`]. Every successful write is
/// recorded in an ordered log.
#[derive(Default)]
pub struct MemoryStorage {
    user_id: Option<String>,
    state: RwLock<State>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that only returns rows owned by `user_id`
    pub fn for_user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            state: RwLock::default(),
        }
    }

    /// Inserts or replaces a row
    pub async fn insert(&self, task: Task) {
        self.state.write().await.tasks.insert(task.id.clone(), task);
    }

    pub async fn get(&self, id: &TaskId) -> Option<Task> {
        self.state.read().await.tasks.get(id).cloned()
    }

    /// Makes every read and write fail with `StoreError::Unavailable`
    pub async fn set_unavailable(&self, unavailable: bool) {
        self.state.write().await.unavailable = unavailable;
    }

    /// Makes writes addressed to `id` fail
    pub async fn fail_writes_for(&self, id: &TaskId) {
        self.state.write().await.failing.insert(id.clone());
    }

    pub async fn clear_faults(&self) {
        let mut state = self.state.write().await;
        state.unavailable = false;
        state.failing.clear();
    }

    /// Successful writes in the order they were applied
    pub async fn write_log(&self) -> Vec<WriteOp> {
        self.state.read().await.log.clone()
    }

    async fn apply(&self, op: WriteOp) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        if state.unavailable || state.failing.contains(op.task_id()) {
            return Err(StoreError::Unavailable(format!(
                "write to {} rejected",
                op.task_id()
            )));
        }

        let task = state
            .tasks
            .get_mut(op.task_id())
            .ok_or_else(|| StoreError::NotFound(op.task_id().clone()))?;
        match &op {
            WriteOp::SetStatusAndPosition { status, position, .. } => {
                task.status = *status;
                task.position = *position;
            }
            WriteOp::SetPosition { position, .. } => {
                task.position = *position;
            }
        }
        task.updated_at = Utc::now();
        state.log.push(op);
        Ok(())
    }
}

#[async_trait]
impl TaskStore for MemoryStorage {
    async fn fetch_ordered(&self) -> Result<Vec<Task>, StoreError> {
        let state = self.state.read().await;
        if state.unavailable {
            return Err(StoreError::Unavailable("memory store offline".to_string()));
        }

        let mut tasks: Vec<Task> = state
            .tasks
            .values()
            .filter(|t| self.user_id.as_ref().map_or(true, |user| &t.user_id == user))
            .cloned()
            .collect();
        order_rows(&mut tasks);
        Ok(tasks)
    }

    async fn write_status_and_position(
        &self,
        id: &TaskId,
        status: TaskStatus,
        position: i32,
    ) -> Result<(), StoreError> {
        self.apply(WriteOp::SetStatusAndPosition {
            id: id.clone(),
            status,
            position,
        })
        .await
    }

    async fn write_position(&self, id: &TaskId, position: i32) -> Result<(), StoreError> {
        self.apply(WriteOp::SetPosition {
            id: id.clone(),
            position,
        })
        .await
    }
}
