pub mod board;
pub mod filter;
pub mod sorting;
pub mod task;

pub use board::{
    Board, BoardConfig, Column, MoveDescriptor, MoveKind, MoveRequest, PositionChange, Slot,
};
pub use filter::{list_tasks, TaskFilter};
pub use sorting::{sort_tasks, SortField, SortOrder};
pub use task::{Task, TaskId, TaskPriority, TaskStatus};
