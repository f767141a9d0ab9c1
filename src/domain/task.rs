use crate::error::ValidationError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use uuid::Uuid;

/// Opaque unique identifier for a task, assigned at creation
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TaskId(String);

impl TaskId {
    /// Generates a fresh random identifier
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Returns the string representation
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<String> for TaskId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for TaskId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl FromStr for TaskId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::InvalidTaskId(s.to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Status of a task; decides which board column it lives in.
///
/// Variants are declared in board order, so the derived `Ord` is the
/// column order used when fetching `(status, position)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Todo,
    InProgress,
    Review,
    Done,
}

impl TaskStatus {
    /// Every status in column order
    pub const ALL: [TaskStatus; 4] = [Self::Todo, Self::InProgress, Self::Review, Self::Done];

    /// Wire value shared with the store
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Todo => "todo",
            Self::InProgress => "in_progress",
            Self::Review => "review",
            Self::Done => "done",
        }
    }

    /// Human readable label
    pub fn label(&self) -> &'static str {
        match self {
            Self::Todo => "To Do",
            Self::InProgress => "In Progress",
            Self::Review => "Review",
            Self::Done => "Done",
        }
    }
}

impl Default for TaskStatus {
    fn default() -> Self {
        Self::Todo
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| ValidationError::InvalidStatus(s.to_string()))
    }
}

/// Priority of a task; has no effect on ordering
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskPriority {
    Low,
    Medium,
    High,
    Urgent,
}

impl TaskPriority {
    pub const ALL: [TaskPriority; 4] = [Self::Low, Self::Medium, Self::High, Self::Urgent];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Urgent => "urgent",
        }
    }
}

impl Default for TaskPriority {
    fn default() -> Self {
        Self::Medium
    }
}

impl fmt::Display for TaskPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskPriority {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|priority| priority.as_str() == s)
            .ok_or_else(|| ValidationError::InvalidPriority(s.to_string()))
    }
}

/// A row of the `tasks` table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub title: String,
    pub description: Option<String>,
    pub status: TaskStatus,
    pub priority: TaskPriority,
    pub position: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// Creates a new task in the `todo` column with a generated ID
    pub fn new(title: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self::with_id(TaskId::new(), title, user_id)
    }

    /// Creates a new task with an explicit ID
    pub fn with_id(id: TaskId, title: impl Into<String>, user_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            title: title.into(),
            description: None,
            status: TaskStatus::default(),
            priority: TaskPriority::default(),
            position: 0,
            due_date: None,
            tags: None,
            user_id: user_id.into(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_position(mut self, position: i32) -> Self {
        self.position = position;
        self
    }

    pub fn with_priority(mut self, priority: TaskPriority) -> Self {
        self.priority = priority;
        self
    }

    /// Sets the title
    pub fn set_title(&mut self, title: String) {
        self.title = title;
        self.updated_at = Utc::now();
    }

    /// Sets the description
    pub fn set_description(&mut self, description: String) {
        self.description = Some(description);
        self.updated_at = Utc::now();
    }

    /// Sets the priority
    pub fn set_priority(&mut self, priority: TaskPriority) {
        self.priority = priority;
        self.updated_at = Utc::now();
    }

    /// Sets or clears the due date
    pub fn set_due_date(&mut self, due_date: Option<DateTime<Utc>>) {
        self.due_date = due_date;
        self.updated_at = Utc::now();
    }

    /// Adds a tag unless the task already carries it
    pub fn add_tag(&mut self, tag: impl Into<String>) {
        let tag = tag.into();
        let tags = self.tags.get_or_insert_with(Vec::new);
        if !tags.contains(&tag) {
            tags.push(tag);
            self.updated_at = Utc::now();
        }
    }

    /// Removes a tag, returning whether it was present
    pub fn remove_tag(&mut self, tag: &str) -> bool {
        let Some(tags) = self.tags.as_mut() else {
            return false;
        };
        let before = tags.len();
        tags.retain(|t| t != tag);
        let removed = tags.len() != before;
        if removed {
            self.updated_at = Utc::now();
        }
        removed
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags
            .as_ref()
            .map(|tags| tags.iter().any(|t| t == tag))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_defaults() {
        let task = Task::new("Write docs", "user-1");
        assert_eq!(task.status, TaskStatus::Todo);
        assert_eq!(task.priority, TaskPriority::Medium);
        assert_eq!(task.position, 0);
        assert!(task.tags.is_none());
        assert!(Uuid::parse_str(task.id.as_str()).is_ok());
    }

    #[test]
    fn test_task_ids_are_unique() {
        assert_ne!(TaskId::new(), TaskId::new());
    }

    #[test]
    fn test_task_id_parsing() {
        let id = TaskId::from_str(" abc ").unwrap();
        assert_eq!(id.as_str(), "abc");
        assert_eq!(
            TaskId::from_str("   "),
            Err(ValidationError::InvalidTaskId("   ".to_string()))
        );
    }

    #[test]
    fn test_status_wire_values() {
        assert_eq!(TaskStatus::Todo.as_str(), "todo");
        assert_eq!(TaskStatus::InProgress.as_str(), "in_progress");
        assert_eq!(TaskStatus::Review.as_str(), "review");
        assert_eq!(TaskStatus::Done.as_str(), "done");

        let json = serde_json::to_string(&TaskStatus::InProgress).unwrap();
        assert_eq!(json, "\"in_progress\"");
        let status: TaskStatus = serde_json::from_str("\"review\"").unwrap();
        assert_eq!(status, TaskStatus::Review);
    }

    #[test]
    fn test_status_parsing() {
        assert_eq!(TaskStatus::from_str("done").unwrap(), TaskStatus::Done);
        assert_eq!(
            TaskStatus::from_str("In Progress"),
            Err(ValidationError::InvalidStatus("In Progress".to_string()))
        );
    }

    #[test]
    fn test_status_column_order() {
        assert!(TaskStatus::Todo < TaskStatus::InProgress);
        assert!(TaskStatus::InProgress < TaskStatus::Review);
        assert!(TaskStatus::Review < TaskStatus::Done);
    }

    #[test]
    fn test_priority_parsing() {
        assert_eq!(TaskPriority::from_str("urgent").unwrap(), TaskPriority::Urgent);
        assert!(TaskPriority::from_str("critical").is_err());
        let json = serde_json::to_string(&TaskPriority::High).unwrap();
        assert_eq!(json, "\"high\"");
    }

    #[test]
    fn test_tags() {
        let mut task = Task::new("Tagged", "user-1");
        task.add_tag("backend");
        task.add_tag("backend");
        task.add_tag("api");
        assert_eq!(task.tags.as_ref().map(Vec::len), Some(2));
        assert!(task.has_tag("api"));

        assert!(task.remove_tag("api"));
        assert!(!task.remove_tag("api"));
        assert!(!task.has_tag("api"));
    }

    #[test]
    fn test_set_title_updates_updated_at() {
        let mut task = Task::new("Test", "user-1");
        let initial_updated_at = task.updated_at;

        std::thread::sleep(std::time::Duration::from_millis(10));
        task.set_title("New Title".to_string());

        assert_eq!(task.title, "New Title");
        assert!(task.updated_at > initial_updated_at);
    }

    #[test]
    fn test_row_deserialization_with_nulls() {
        let row = r#"{
            "id": "0b6f1c1e-1111-4c9a-9d7e-123456789abc",
            "title": "From store",
            "description": null,
            "status": "in_progress",
            "priority": "urgent",
            "position": 3,
            "due_date": null,
            "tags": null,
            "user_id": "user-1",
            "created_at": "2024-01-01T00:00:00Z",
            "updated_at": "2024-01-01T00:00:00Z"
        }"#;

        let task: Task = serde_json::from_str(row).unwrap();
        assert_eq!(task.status, TaskStatus::InProgress);
        assert_eq!(task.priority, TaskPriority::Urgent);
        assert_eq!(task.position, 3);
        assert!(task.tags.is_none());
        assert!(task.due_date.is_none());
    }
}
