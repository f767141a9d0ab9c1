use crate::{
    config::TaskboardConfig,
    domain::{Task, TaskId, TaskStatus},
    error::{Result, StoreError, TaskboardError},
    storage::{order_rows, TaskStore},
};
use async_trait::async_trait;
use chrono::Utc;
use std::path::{Path, PathBuf};
use tokio::fs;

/// File-based storage: one JSON document per task
pub struct FileStorage {
    root_path: PathBuf,
}

impl FileStorage {
    const TASKBOARD_DIR: &'static str = ".taskboard";
    const TASKS_DIR: &'static str = "tasks";
    const CONFIG_FILE: &'static str = "config.toml";

    /// Creates a new FileStorage instance for the given project root
    pub fn new(project_root: impl AsRef<Path>) -> Self {
        Self {
            root_path: project_root.as_ref().join(Self::TASKBOARD_DIR),
        }
    }

    fn tasks_dir(&self) -> PathBuf {
        self.root_path.join(Self::TASKS_DIR)
    }

    pub fn config_file(&self) -> PathBuf {
        self.root_path.join(Self::CONFIG_FILE)
    }

    fn task_file(&self, id: &TaskId) -> PathBuf {
        self.tasks_dir().join(format!("{}.json", id.as_str()))
    }

    async fn ensure_directory_exists(&self, path: &Path) -> Result<()> {
        if !path.exists() {
            fs::create_dir_all(path).await?;
        }
        Ok(())
    }

    /// Creates the directory layout and a default config file
    pub async fn initialize(&self) -> Result<()> {
        self.ensure_directory_exists(&self.root_path).await?;
        self.ensure_directory_exists(&self.tasks_dir()).await?;

        if !self.config_file().exists() {
            TaskboardConfig::default().save(self.config_file()).await?;
        }

        Ok(())
    }

    pub async fn is_initialized(&self) -> bool {
        self.tasks_dir().exists()
    }

    /// Loads the board and reorder settings stored next to the tasks
    pub async fn load_config(&self) -> Result<TaskboardConfig> {
        TaskboardConfig::load(self.config_file()).await
    }

    /// Saves a task, creating or replacing its file
    pub async fn save_task(&self, task: &Task) -> Result<()> {
        self.ensure_directory_exists(&self.tasks_dir()).await?;

        let json = serde_json::to_string_pretty(task)?;
        fs::write(self.task_file(&task.id), json).await?;
        Ok(())
    }

    pub async fn load_task(&self, id: &TaskId) -> Result<Task> {
        let file_path = self.task_file(id);

        if !file_path.exists() {
            return Err(TaskboardError::TaskNotFound(id.to_string()));
        }

        let contents = fs::read_to_string(&file_path).await?;
        let task: Task = serde_json::from_str(&contents)?;

        Ok(task)
    }

    pub async fn delete_task(&self, id: &TaskId) -> Result<()> {
        let file_path = self.task_file(id);

        if !file_path.exists() {
            return Err(TaskboardError::TaskNotFound(id.to_string()));
        }

        fs::remove_file(file_path).await?;
        Ok(())
    }

    async fn load_all(&self) -> Result<Vec<Task>> {
        let tasks_dir = self.tasks_dir();

        if !tasks_dir.exists() {
            return Err(TaskboardError::StorageNotInitialized);
        }

        let mut entries = fs::read_dir(&tasks_dir).await?;
        let mut tasks = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|s| s.to_str()) == Some("json") {
                let contents = fs::read_to_string(&path).await?;
                tasks.push(serde_json::from_str::<Task>(&contents)?);
            }
        }

        Ok(tasks)
    }

    async fn update_task(&self, id: &TaskId, update: impl FnOnce(&mut Task)) -> Result<()> {
        let mut task = self.load_task(id).await?;
        update(&mut task);
        task.updated_at = Utc::now();
        self.save_task(&task).await
    }
}

fn to_store_error(id: Option<&TaskId>, err: TaskboardError) -> StoreError {
    match (id, err) {
        (Some(id), TaskboardError::TaskNotFound(_)) => StoreError::NotFound(id.clone()),
        (_, other) => StoreError::Unavailable(other.to_string()),
    }
}

#[async_trait]
impl TaskStore for FileStorage {
    async fn fetch_ordered(&self) -> std::result::Result<Vec<Task>, StoreError> {
        let mut tasks = self
            .load_all()
            .await
            .map_err(|err| to_store_error(None, err))?;
        order_rows(&mut tasks);
        Ok(tasks)
    }

    async fn write_status_and_position(
        &self,
        id: &TaskId,
        status: TaskStatus,
        position: i32,
    ) -> std::result::Result<(), StoreError> {
        self.update_task(id, |task| {
            task.status = status;
            task.position = position;
        })
        .await
        .map_err(|err| to_store_error(Some(id), err))
    }

    async fn write_position(
        &self,
        id: &TaskId,
        position: i32,
    ) -> std::result::Result<(), StoreError> {
        self.update_task(id, |task| task.position = position)
            .await
            .map_err(|err| to_store_error(Some(id), err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_storage_initialization() {
        let temp_dir = TempDir::new().unwrap();
        let storage = FileStorage::new(temp_dir.path());

        assert!(!storage.is_initialized().await);

        storage.initialize().await.unwrap();

        assert!(storage.is_initialized().await);
        assert!(storage.config_file().exists());
        let config = storage.load_config().await.unwrap();
        assert_eq!(config, TaskboardConfig::default());
    }

    #[tokio::test]
    async fn test_task_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let storage = FileStorage::new(temp_dir.path());
        storage.initialize().await.unwrap();

        let task = Task::new("Test Task", "user-1");
        storage.save_task(&task).await.unwrap();

        let loaded = storage.load_task(&task.id).await.unwrap();
        assert_eq!(loaded, task);
    }

    #[tokio::test]
    async fn test_delete_task() {
        let temp_dir = TempDir::new().unwrap();
        let storage = FileStorage::new(temp_dir.path());
        storage.initialize().await.unwrap();

        let task = Task::new("Short lived", "user-1");
        storage.save_task(&task).await.unwrap();
        storage.delete_task(&task.id).await.unwrap();

        assert!(matches!(
            storage.load_task(&task.id).await,
            Err(TaskboardError::TaskNotFound(_))
        ));
        assert!(storage.delete_task(&task.id).await.is_err());
    }

    #[tokio::test]
    async fn test_fetch_ordered() {
        let temp_dir = TempDir::new().unwrap();
        let storage = FileStorage::new(temp_dir.path());
        storage.initialize().await.unwrap();

        for task in [
            Task::with_id("r".into(), "R", "u").with_status(TaskStatus::Review),
            Task::with_id("t1".into(), "T1", "u").with_position(1),
            Task::with_id("t0".into(), "T0", "u").with_position(0),
        ] {
            storage.save_task(&task).await.unwrap();
        }

        let ids: Vec<_> = storage
            .fetch_ordered()
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.id.as_str().to_string())
            .collect();
        assert_eq!(ids, vec!["t0", "t1", "r"]);
    }

    #[tokio::test]
    async fn test_fetch_before_initialize_is_unavailable() {
        let temp_dir = TempDir::new().unwrap();
        let storage = FileStorage::new(temp_dir.path());

        assert!(matches!(
            storage.fetch_ordered().await,
            Err(StoreError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_partial_row_writes() {
        let temp_dir = TempDir::new().unwrap();
        let storage = FileStorage::new(temp_dir.path());
        storage.initialize().await.unwrap();

        let mut task = Task::new("Movable", "user-1");
        task.set_description("untouched".to_string());
        storage.save_task(&task).await.unwrap();

        storage
            .write_status_and_position(&task.id, TaskStatus::Done, 3)
            .await
            .unwrap();
        storage.write_position(&task.id, 1).await.unwrap();

        let loaded = storage.load_task(&task.id).await.unwrap();
        assert_eq!(loaded.status, TaskStatus::Done);
        assert_eq!(loaded.position, 1);
        assert_eq!(loaded.description.as_deref(), Some("untouched"));
    }

    #[tokio::test]
    async fn test_write_to_missing_task() {
        let temp_dir = TempDir::new().unwrap();
        let storage = FileStorage::new(temp_dir.path());
        storage.initialize().await.unwrap();

        let id = TaskId::from("ghost");
        assert_eq!(
            storage.write_position(&id, 0).await,
            Err(StoreError::NotFound(id.clone()))
        );
    }
}
