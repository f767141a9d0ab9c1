use crate::{
    domain::{Task, TaskId, TaskPriority, TaskStatus},
    error::StoreError,
    reorder::{WriteOp, WritePlan},
    storage::TaskStore,
};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS tasks (
    id          TEXT PRIMARY KEY,
    created_at  TEXT NOT NULL,
    updated_at  TEXT NOT NULL,
    title       TEXT NOT NULL,
    description TEXT,
    status      TEXT NOT NULL DEFAULT 'todo'
                CHECK (status IN ('todo', 'in_progress', 'review', 'done')),
    priority    TEXT NOT NULL DEFAULT 'medium'
                CHECK (priority IN ('low', 'medium', 'high', 'urgent')),
    due_date    TEXT,
    user_id     TEXT NOT NULL,
    tags        TEXT,
    position    INTEGER NOT NULL DEFAULT 0
);
CREATE INDEX IF NOT EXISTS idx_tasks_status_position ON tasks (status, position);
";

const SELECT_ORDERED: &str = "
SELECT id, created_at, updated_at, title, description, status, priority,
       due_date, user_id, tags, position
FROM tasks
WHERE ?1 IS NULL OR user_id = ?1
ORDER BY CASE status
             WHEN 'todo' THEN 0
             WHEN 'in_progress' THEN 1
             WHEN 'review' THEN 2
             ELSE 3
         END,
         position, created_at, id
";

/// Columns as stored, before conversion into domain types
struct TaskRow {
    id: String,
    created_at: String,
    updated_at: String,
    title: String,
    description: Option<String>,
    status: String,
    priority: String,
    due_date: Option<String>,
    user_id: String,
    tags: Option<String>,
    position: i32,
}

impl TaskRow {
    fn into_task(self) -> Result<Task, StoreError> {
        let corrupt = |what: &str, err: String| {
            StoreError::Unavailable(format!("corrupt {what} in row {}: {err}", self.id))
        };
        let status = TaskStatus::from_str(&self.status).map_err(|e| corrupt("status", e.to_string()))?;
        let priority =
            TaskPriority::from_str(&self.priority).map_err(|e| corrupt("priority", e.to_string()))?;
        let created_at = parse_time(&self.created_at).map_err(|e| corrupt("created_at", e))?;
        let updated_at = parse_time(&self.updated_at).map_err(|e| corrupt("updated_at", e))?;
        let due_date = self
            .due_date
            .as_deref()
            .map(parse_time)
            .transpose()
            .map_err(|e| corrupt("due_date", e))?;
        let tags = self
            .tags
            .as_deref()
            .map(serde_json::from_str::<Vec<String>>)
            .transpose()
            .map_err(|e| corrupt("tags", e.to_string()))?;

        Ok(Task {
            id: TaskId::from(self.id),
            title: self.title,
            description: self.description,
            status,
            priority,
            position: self.position,
            due_date,
            tags,
            user_id: self.user_id,
            created_at,
            updated_at,
        })
    }
}

fn parse_time(value: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| e.to_string())
}

/// Fixed-width RFC 3339 so text order in SQL matches time order
fn timestamp(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn unavailable(err: rusqlite::Error) -> StoreError {
    StoreError::Unavailable(err.to_string())
}

/// SQLite-backed `tasks` table
pub struct SqliteStorage {
    conn: Mutex<Connection>,
    user_id: Option<String>,
}

impl SqliteStorage {
    /// Opens or creates the database at the given path
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = Connection::open(path).map_err(unavailable)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA busy_timeout=5000;")
            .map_err(unavailable)?;
        Self::with_connection(conn)
    }

    /// Opens an in-memory database
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory().map_err(unavailable)?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA).map_err(unavailable)?;
        Ok(Self {
            conn: Mutex::new(conn),
            user_id: None,
        })
    }

    /// Restricts reads to rows owned by `user_id`
    pub fn scoped_to(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Unavailable("connection lock poisoned".to_string()))
    }

    /// Inserts or replaces a full row
    pub fn insert_task(&self, task: &Task) -> Result<(), StoreError> {
        let tags = task
            .tags
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        self.conn()?
            .execute(
                "INSERT OR REPLACE INTO tasks
                 (id, created_at, updated_at, title, description, status, priority,
                  due_date, user_id, tags, position)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    task.id.as_str(),
                    timestamp(&task.created_at),
                    timestamp(&task.updated_at),
                    task.title,
                    task.description,
                    task.status.as_str(),
                    task.priority.as_str(),
                    task.due_date.as_ref().map(timestamp),
                    task.user_id,
                    tags,
                    task.position,
                ],
            )
            .map_err(unavailable)?;
        Ok(())
    }

    pub fn get_task(&self, id: &TaskId) -> Result<Option<Task>, StoreError> {
        let row = self
            .conn()?
            .query_row(
                "SELECT id, created_at, updated_at, title, description, status, priority,
                        due_date, user_id, tags, position
                 FROM tasks WHERE id = ?1",
                params![id.as_str()],
                read_row,
            )
            .optional()
            .map_err(unavailable)?;
        row.map(TaskRow::into_task).transpose()
    }

    /// Applies a whole plan inside one transaction: either every write
    /// lands or none does
    pub fn apply_in_transaction(&self, plan: &WritePlan) -> Result<(), StoreError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(unavailable)?;
        let now = timestamp(&Utc::now());
        for op in plan.ops() {
            let changed = match op {
                WriteOp::SetStatusAndPosition {
                    id,
                    status,
                    position,
                } => tx.execute(
                    "UPDATE tasks SET status = ?1, position = ?2, updated_at = ?3 WHERE id = ?4",
                    params![status.as_str(), *position, now, id.as_str()],
                ),
                WriteOp::SetPosition { id, position } => tx.execute(
                    "UPDATE tasks SET position = ?1, updated_at = ?2 WHERE id = ?3",
                    params![*position, now, id.as_str()],
                ),
            }
            .map_err(unavailable)?;
            if changed == 0 {
                return Err(StoreError::NotFound(op.task_id().clone()));
            }
        }
        tx.commit().map_err(unavailable)
    }

    fn update(&self, id: &TaskId, sql: &str, params: &[&dyn rusqlite::ToSql]) -> Result<(), StoreError> {
        let changed = self.conn()?.execute(sql, params).map_err(unavailable)?;
        if changed == 0 {
            return Err(StoreError::NotFound(id.clone()));
        }
        Ok(())
    }
}

fn read_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<TaskRow> {
    Ok(TaskRow {
        id: row.get("id")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
        title: row.get("title")?,
        description: row.get("description")?,
        status: row.get("status")?,
        priority: row.get("priority")?,
        due_date: row.get("due_date")?,
        user_id: row.get("user_id")?,
        tags: row.get("tags")?,
        position: row.get("position")?,
    })
}

#[async_trait]
impl TaskStore for SqliteStorage {
    async fn fetch_ordered(&self) -> Result<Vec<Task>, StoreError> {
        let rows = {
            let conn = self.conn()?;
            let mut stmt = conn.prepare(SELECT_ORDERED).map_err(unavailable)?;
            let rows = stmt
                .query_map(params![self.user_id], read_row)
                .map_err(unavailable)?
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(unavailable)?;
            rows
        };
        rows.into_iter().map(TaskRow::into_task).collect()
    }

    async fn write_status_and_position(
        &self,
        id: &TaskId,
        status: TaskStatus,
        position: i32,
    ) -> Result<(), StoreError> {
        self.update(
            id,
            "UPDATE tasks SET status = ?1, position = ?2, updated_at = ?3 WHERE id = ?4",
            params![status.as_str(), position, timestamp(&Utc::now()), id.as_str()],
        )
    }

    async fn write_position(&self, id: &TaskId, position: i32) -> Result<(), StoreError> {
        self.update(
            id,
            "UPDATE tasks SET position = ?1, updated_at = ?2 WHERE id = ?3",
            params![position, timestamp(&Utc::now()), id.as_str()],
        )
    }
}
