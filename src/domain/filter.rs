use crate::domain::sorting::{sort_tasks, SortField, SortOrder};
use crate::domain::task::{Task, TaskPriority, TaskStatus};

/// Filter options for the flat task list
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskFilter {
    pub status: Option<TaskStatus>,
    pub priority: Option<TaskPriority>,
    pub tag: Option<String>,
    /// Case-insensitive match against title and description
    pub query: Option<String>,
}

impl TaskFilter {
    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_priority(mut self, priority: TaskPriority) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.status.is_none()
            && self.priority.is_none()
            && self.tag.is_none()
            && self.query.is_none()
    }

    pub fn matches(&self, task: &Task) -> bool {
        if self.status.is_some_and(|status| task.status != status) {
            return false;
        }
        if self.priority.is_some_and(|priority| task.priority != priority) {
            return false;
        }
        if let Some(tag) = &self.tag {
            if !task.has_tag(tag) {
                return false;
            }
        }
        if let Some(query) = &self.query {
            let query = query.to_lowercase();
            let title_matches = task.title.to_lowercase().contains(&query);
            let description_matches = task
                .description
                .as_ref()
                .map(|d| d.to_lowercase().contains(&query))
                .unwrap_or(false);
            if !title_matches && !description_matches {
                return false;
            }
        }
        true
    }
}

/// Filters then sorts tasks for the list view
pub fn list_tasks(
    tasks: impl IntoIterator<Item = Task>,
    filter: &TaskFilter,
    field: SortField,
    order: SortOrder,
) -> Vec<Task> {
    let mut listed: Vec<Task> = tasks.into_iter().filter(|t| filter.matches(t)).collect();
    sort_tasks(&mut listed, field, order);
    listed
}
