use crate::{
    domain::{Task, TaskId, TaskStatus},
    error::StoreError,
};
use async_trait::async_trait;

#[cfg(feature = "file-storage")]
pub mod file_storage;
pub mod memory_storage;

#[cfg(feature = "sqlite-storage")]
pub mod sqlite_storage;

#[cfg(feature = "file-storage")]
pub use file_storage::FileStorage;
pub use memory_storage::MemoryStorage;

#[cfg(feature = "sqlite-storage")]
pub use sqlite_storage::SqliteStorage;

/// The persistence contract the reorder engine relies on.
///
/// Each write addresses a single row by ID; callers must not assume that
/// several writes are applied atomically.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Returns every task of the current user ordered by status (column
    /// order) and then ascending position
    async fn fetch_ordered(&self) -> Result<Vec<Task>, StoreError>;

    /// Moves a task to another column and position
    async fn write_status_and_position(
        &self,
        id: &TaskId,
        status: TaskStatus,
        position: i32,
    ) -> Result<(), StoreError>;

    /// Updates only the position of a task
    async fn write_position(&self, id: &TaskId, position: i32) -> Result<(), StoreError>;
}

#[async_trait]
impl<S: TaskStore + ?Sized> TaskStore for std::sync::Arc<S> {
    async fn fetch_ordered(&self) -> Result<Vec<Task>, StoreError> {
        (**self).fetch_ordered().await
    }

    async fn write_status_and_position(
        &self,
        id: &TaskId,
        status: TaskStatus,
        position: i32,
    ) -> Result<(), StoreError> {
        (**self).write_status_and_position(id, status, position).await
    }

    async fn write_position(&self, id: &TaskId, position: i32) -> Result<(), StoreError> {
        (**self).write_position(id, position).await
    }
}

/// Sorts rows into the `(status, position)` order `fetch_ordered` promises
pub(crate) fn order_rows(tasks: &mut [Task]) {
    tasks.sort_by(|a, b| {
        a.status
            .cmp(&b.status)
            .then_with(|| a.position.cmp(&b.position))
            .then_with(|| a.created_at.cmp(&b.created_at))
            .then_with(|| a.id.cmp(&b.id))
    });
}
