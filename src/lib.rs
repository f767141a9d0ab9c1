//! # Taskboard Core
//!
//! Ordering rules for a kanban task board.
//!
//! A [`Board`] groups tasks by status and keeps each column in position
//! order. Dragging a task produces a new board immediately plus a
//! [`MoveDescriptor`]; the [`ReorderEngine`] turns that descriptor into the
//! smallest ordered set of single-row writes and applies them to a
//! [`TaskStore`]. [`BoardSession`] ties these together and handles the
//! revert and re-fetch paths when writes fail.

pub mod config;
pub mod domain;
pub mod error;
pub mod reorder;
pub mod session;
pub mod storage;

// Re-export commonly used types
pub use config::{ReorderConfig, ShiftDispatch, TaskboardConfig};
pub use domain::{
    board::{Board, BoardConfig, Column, MoveDescriptor, MoveKind, MoveRequest, Slot},
    task::{Task, TaskId, TaskPriority, TaskStatus},
};
pub use error::{ReorderError, Result, StoreError, TaskboardError, ValidationError};
pub use reorder::{ReorderEngine, ReorderPhase, WriteOp, WritePlan};
pub use session::{BoardSession, MoveOutcome};
pub use storage::TaskStore;
