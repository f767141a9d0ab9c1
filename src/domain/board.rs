use crate::domain::task::{Task, TaskId, TaskStatus};
use crate::error::ValidationError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Configuration for a kanban board column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub title: String,
    pub status: TaskStatus,
}

impl Column {
    pub fn new(title: impl Into<String>, status: TaskStatus) -> Self {
        Self {
            title: title.into(),
            status,
        }
    }
}

/// Board configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardConfig {
    pub name: String,
    pub columns: Vec<Column>,
}

impl BoardConfig {
    /// Display title for a status, falling back to the status label
    pub fn title_for(&self, status: TaskStatus) -> &str {
        self.columns
            .iter()
            .find(|col| col.status == status)
            .map(|col| col.title.as_str())
            .unwrap_or_else(|| status.label())
    }
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            name: "Default Board".to_string(),
            columns: TaskStatus::ALL
                .into_iter()
                .map(|status| Column::new(status.label(), status))
                .collect(),
        }
    }
}

/// A place on the board: a column and an index into it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    pub status: TaskStatus,
    pub index: usize,
}

impl Slot {
    pub fn new(status: TaskStatus, index: usize) -> Self {
        Self { status, index }
    }
}

/// A drag event as reported by the presentation layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveRequest {
    pub task_id: TaskId,
    pub from: Slot,
    pub to: Slot,
}

impl MoveRequest {
    pub fn new(task_id: TaskId, from: Slot, to: Slot) -> Self {
        Self { task_id, from, to }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveKind {
    /// Dropped where it was picked up
    Noop,
    /// Reordered inside one column
    Reorder,
    /// Moved to another column
    Transfer,
}

/// One task whose column or position changed because of a move
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PositionChange {
    pub task_id: TaskId,
    pub previous_status: TaskStatus,
    pub previous_position: i32,
    pub status: TaskStatus,
    pub position: i32,
}

/// Everything a move changed, in enough detail to persist it.
///
/// The moved task's change, when present, is always the first entry of
/// `changes`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveDescriptor {
    pub task_id: TaskId,
    pub from: Slot,
    pub to: Slot,
    pub kind: MoveKind,
    pub changes: Vec<PositionChange>,
}

impl MoveDescriptor {
    fn noop(task_id: TaskId, slot: Slot) -> Self {
        Self {
            task_id,
            from: slot,
            to: slot,
            kind: MoveKind::Noop,
            changes: Vec::new(),
        }
    }

    pub fn is_noop(&self) -> bool {
        self.kind == MoveKind::Noop
    }

    /// The change record of the moved task itself
    pub fn moved(&self) -> Option<&PositionChange> {
        self.changes.first().filter(|c| c.task_id == self.task_id)
    }

    /// Changes to other tasks that end up in `status`
    pub fn shifted_in(&self, status: TaskStatus) -> impl Iterator<Item = &PositionChange> {
        self.changes
            .iter()
            .filter(move |c| c.task_id != self.task_id && c.status == status)
    }
}

/// Kanban board state: every status column with its tasks in display order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Board {
    columns: BTreeMap<TaskStatus, Vec<Task>>,
}

impl Board {
    /// Creates a board with every column empty
    pub fn new() -> Self {
        Self {
            columns: TaskStatus::ALL
                .into_iter()
                .map(|status| (status, Vec::new()))
                .collect(),
        }
    }

    /// Groups tasks by status and orders each column by ascending position.
    ///
    /// Equal positions fall back to creation time and then ID so the result
    /// does not depend on input order.
    pub fn load(tasks: impl IntoIterator<Item = Task>) -> Self {
        let mut board = Self::new();
        for task in tasks {
            board.column_mut(task.status).push(task);
        }
        for column in board.columns.values_mut() {
            column.sort_by(|a, b| {
                a.position
                    .cmp(&b.position)
                    .then_with(|| a.created_at.cmp(&b.created_at))
                    .then_with(|| a.id.cmp(&b.id))
            });
        }
        board
    }

    pub fn column(&self, status: TaskStatus) -> &[Task] {
        self.columns.get(&status).map(Vec::as_slice).unwrap_or(&[])
    }

    fn column_mut(&mut self, status: TaskStatus) -> &mut Vec<Task> {
        self.columns.entry(status).or_default()
    }

    /// Iterates columns in board order
    pub fn columns(&self) -> impl Iterator<Item = (TaskStatus, &[Task])> {
        self.columns.iter().map(|(status, tasks)| (*status, tasks.as_slice()))
    }

    pub fn task_count(&self) -> usize {
        self.columns.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.task_count() == 0
    }

    /// Locates a task on the board
    pub fn find(&self, task_id: &TaskId) -> Option<Slot> {
        self.columns.iter().find_map(|(status, tasks)| {
            tasks
                .iter()
                .position(|t| &t.id == task_id)
                .map(|index| Slot::new(*status, index))
        })
    }

    pub fn get(&self, task_id: &TaskId) -> Option<&Task> {
        self.find(task_id)
            .map(|slot| &self.column(slot.status)[slot.index])
    }

    pub fn contains(&self, task_id: &TaskId) -> bool {
        self.find(task_id).is_some()
    }

    /// Position a new task should take to land at the bottom of a column
    pub fn next_position(&self, status: TaskStatus) -> i32 {
        self.column(status)
            .iter()
            .map(|t| t.position)
            .max()
            .map(|max| max.saturating_add(1))
            .unwrap_or(0)
    }

    /// Flattens the board in `(status, position)` order
    pub fn into_tasks(self) -> Vec<Task> {
        self.columns.into_values().flatten().collect()
    }

    /// Applies a drag event; see [`Board::move_task`]
    pub fn apply(&self, request: &MoveRequest) -> Result<(Self, MoveDescriptor), ValidationError> {
        self.apply_with(request, false)
    }

    /// Applies a drag event, optionally closing the gap a transfer leaves
    /// in the source column
    pub fn apply_with(
        &self,
        request: &MoveRequest,
        compact_source: bool,
    ) -> Result<(Self, MoveDescriptor), ValidationError> {
        self.relocate(
            &request.task_id,
            request.from,
            request.to,
            compact_source,
        )
    }

    /// Moves a task to `to_index` of the `to_status` column.
    ///
    /// Returns the new board and a descriptor of every task whose column or
    /// position changed. The destination column is reindexed `0..n` in the
    /// new board. On a transfer the source column only loses the moved
    /// task; the others keep their stored positions, gap included.
    /// `self` is left untouched and nothing is persisted.
    pub fn move_task(
        &self,
        task_id: &TaskId,
        from_status: TaskStatus,
        from_index: usize,
        to_status: TaskStatus,
        to_index: usize,
    ) -> Result<(Self, MoveDescriptor), ValidationError> {
        self.relocate(
            task_id,
            Slot::new(from_status, from_index),
            Slot::new(to_status, to_index),
            false,
        )
    }

    /// Like [`Board::move_task`], but a transfer also reindexes the source
    /// column and reports its shifted tasks
    pub fn move_task_compacting(
        &self,
        task_id: &TaskId,
        from_status: TaskStatus,
        from_index: usize,
        to_status: TaskStatus,
        to_index: usize,
    ) -> Result<(Self, MoveDescriptor), ValidationError> {
        self.relocate(
            task_id,
            Slot::new(from_status, from_index),
            Slot::new(to_status, to_index),
            true,
        )
    }

    fn relocate(
        &self,
        task_id: &TaskId,
        from: Slot,
        to: Slot,
        compact_source: bool,
    ) -> Result<(Self, MoveDescriptor), ValidationError> {
        let Slot {
            status: from_status,
            index: from_index,
        } = from;
        let Slot {
            status: to_status,
            index: to_index,
        } = to;
        let source = self.column(from_status);
        let task = source
            .get(from_index)
            .ok_or(ValidationError::IndexOutOfBounds {
                status: from_status,
                index: from_index,
                len: source.len(),
            })?;
        if &task.id != task_id {
            return Err(if self.contains(task_id) {
                ValidationError::TaskMismatch {
                    expected: task_id.clone(),
                    status: from_status,
                    index: from_index,
                }
            } else {
                ValidationError::UnknownTask(task_id.clone())
            });
        }

        if from == to {
            return Ok((self.clone(), MoveDescriptor::noop(task_id.clone(), from)));
        }

        let same_column = from_status == to_status;
        let dest_len = if same_column {
            source.len() - 1
        } else {
            self.column(to_status).len()
        };
        if to_index > dest_len {
            return Err(ValidationError::IndexOutOfBounds {
                status: to_status,
                index: to_index,
                len: dest_len,
            });
        }

        let mut next = self.clone();
        let mut moved = next.column_mut(from_status).remove(from_index);
        let previous_status = moved.status;
        moved.status = to_status;
        next.column_mut(to_status).insert(to_index, moved);

        let mut affected = vec![to_status];
        if !same_column && compact_source {
            affected.push(from_status);
        }

        let mut changes = Vec::new();
        let mut moved_change = None;
        for status in affected {
            for (index, task) in next.column_mut(status).iter_mut().enumerate() {
                let position = to_position(index);
                let is_moved = &task.id == task_id;
                if !is_moved && task.position == position {
                    continue;
                }
                let change = PositionChange {
                    task_id: task.id.clone(),
                    previous_status: if is_moved { previous_status } else { status },
                    previous_position: task.position,
                    status,
                    position,
                };
                task.position = position;
                if is_moved {
                    moved_change = Some(change);
                } else {
                    changes.push(change);
                }
            }
        }
        if let Some(change) = moved_change {
            changes.insert(0, change);
        }

        let descriptor = MoveDescriptor {
            task_id: task_id.clone(),
            from,
            to,
            kind: if same_column {
                MoveKind::Reorder
            } else {
                MoveKind::Transfer
            },
            changes,
        };
        Ok((next, descriptor))
    }
}

impl Default for Board {
    fn default() -> Self {
        Self::new()
    }
}

fn to_position(index: usize) -> i32 {
    i32::try_from(index).unwrap_or(i32::MAX)
}
