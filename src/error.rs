use crate::domain::task::{TaskId, TaskStatus};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, TaskboardError>;

#[derive(Debug, Error)]
pub enum TaskboardError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Reorder(#[from] ReorderError),

    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("Storage not initialized. Call initialize() first.")]
    StorageNotInitialized,

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// A move or value was rejected before anything was written
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Index {index} is out of bounds for column {status} (length {len})")]
    IndexOutOfBounds {
        status: TaskStatus,
        index: usize,
        len: usize,
    },

    #[error("Task {expected} is not at index {index} of column {status}")]
    TaskMismatch {
        expected: TaskId,
        status: TaskStatus,
        index: usize,
    },

    #[error("Unknown task: {0}")]
    UnknownTask(TaskId),

    #[error("Invalid task id: {0:?}")]
    InvalidTaskId(String),

    #[error("Invalid task status: {0}")]
    InvalidStatus(String),

    #[error("Invalid task priority: {0}")]
    InvalidPriority(String),
}

/// Failures reported by a task store backend
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Task not found in store: {0}")]
    NotFound(TaskId),
}

/// Outcome of a failed write plan
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReorderError {
    /// Nothing was persisted; the optimistic board must be reverted.
    #[error("Primary write for task {id} failed: {source}")]
    PrimaryWriteFailed {
        id: TaskId,
        #[source]
        source: StoreError,
    },

    /// The moved task was persisted but some shifted positions were not.
    #[error("Shift writes failed for {} task(s): {}", .0.len(), join_ids(.0))]
    PartialShiftFailure(Vec<TaskId>),
}

impl ReorderError {
    /// Returns true when no write of the plan was persisted
    pub fn nothing_persisted(&self) -> bool {
        matches!(self, Self::PrimaryWriteFailed { .. })
    }
}

fn join_ids(ids: &[TaskId]) -> String {
    ids.iter()
        .map(TaskId::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_shift_failure_lists_ids() {
        let err = ReorderError::PartialShiftFailure(vec![
            TaskId::from("a".to_string()),
            TaskId::from("b".to_string()),
        ]);
        assert_eq!(err.to_string(), "Shift writes failed for 2 task(s): a, b");
        assert!(!err.nothing_persisted());
    }

    #[test]
    fn test_primary_failure_wraps_store_error() {
        let err = ReorderError::PrimaryWriteFailed {
            id: TaskId::from("a".to_string()),
            source: StoreError::Unavailable("timeout".to_string()),
        };
        assert!(err.nothing_persisted());
        assert!(err.to_string().contains("timeout"));

        let top: TaskboardError = err.into();
        assert!(matches!(top, TaskboardError::Reorder(_)));
    }
}
