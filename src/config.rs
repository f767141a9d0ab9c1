//! Board and reorder settings, stored as TOML.

use crate::domain::board::BoardConfig;
use crate::error::{Result, TaskboardError};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs;

/// How the position-shift writes of one move are dispatched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShiftDispatch {
    /// One write at a time, in board order
    #[default]
    Sequential,
    /// All shift writes in flight together
    Concurrent,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReorderConfig {
    pub shift_dispatch: ShiftDispatch,
    /// Close up and persist the column a task left. Without it that column
    /// keeps a gap in its positions until its next reorder
    pub compact_source: bool,
    /// Re-fetch the board after some shift writes failed
    pub refresh_on_partial_failure: bool,
}

impl Default for ReorderConfig {
    fn default() -> Self {
        Self {
            shift_dispatch: ShiftDispatch::Sequential,
            compact_source: false,
            refresh_on_partial_failure: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskboardConfig {
    pub board: BoardConfig,
    pub reorder: ReorderConfig,
}

impl TaskboardConfig {
    /// Reads a config file; a missing file yields the defaults
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path).await?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        toml::from_str(contents).map_err(|e| TaskboardError::ConfigError(e.to_string()))
    }

    pub async fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let contents =
            toml::to_string_pretty(self).map_err(|e| TaskboardError::ConfigError(e.to_string()))?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(path, contents).await?;
        Ok(())
    }
}
