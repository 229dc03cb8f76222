//! Flat-file stores
//!
//! Goals live in one JSON document (`{"goals": [...]}`) and tasks in a JSON array. Every
//! write replaces the whole file; there is no locking, so concurrent writers race and the
//! last one wins.

use std::fs::{self, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde_json::Value;

use crate::models::{sanitize_goals, GoalData, GoalNode, Task, DEFAULT_GOALS};

/// Store errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Store lock poisoned")]
    LockError,
}

impl StoreError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        StoreError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// What a goal read produced
#[derive(Debug, Clone)]
pub struct GoalSnapshot {
    pub goals: Vec<GoalNode>,
    pub data_file: PathBuf,
    pub used_fallback: bool,
    /// Set when the document was unusable and defaults were served instead
    pub warning: Option<String>,
}

/// Where a write landed
#[derive(Debug, Clone)]
pub struct WriteReceipt {
    pub data_file: PathBuf,
    pub used_fallback: bool,
}

/// Persistence for the goal document
pub trait GoalStore: Send + Sync {
    fn read(&self) -> Result<GoalSnapshot, StoreError>;
    fn write(&self, goals: &[GoalNode]) -> Result<WriteReceipt, StoreError>;
}

/// Persistence for the task list
pub trait TaskStore: Send + Sync {
    fn load(&self) -> Result<Vec<Task>, StoreError>;
    fn save(&self, tasks: &[Task]) -> Result<(), StoreError>;
}

/// Goal document on disk, with a preferred location and a fallback
#[derive(Debug, Clone)]
pub struct JsonGoalStore {
    preferred: Option<PathBuf>,
    fallback: PathBuf,
}

impl JsonGoalStore {
    pub fn new(preferred: Option<PathBuf>, fallback: PathBuf) -> Self {
        Self {
            preferred,
            fallback,
        }
    }

    /// Makes sure `path` exists and is readable and writable, seeding it with the default
    /// goals when it does not exist yet.
    fn ensure_file(path: &Path) -> Result<(), StoreError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
        }

        match OpenOptions::new().read(true).write(true).open(path) {
            Ok(_) => return Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(StoreError::io(path, e)),
        }

        let seed = GoalData {
            goals: DEFAULT_GOALS.clone(),
        };
        write_pretty(path, &seed)?;
        tracing::info!("Seeded goal file {}", path.display());
        Ok(())
    }

    /// Picks the file to use for this operation
    fn resolve(&self) -> Result<(PathBuf, bool), StoreError> {
        if let Some(preferred) = &self.preferred {
            match Self::ensure_file(preferred) {
                Ok(()) => return Ok((preferred.clone(), false)),
                Err(e) => {
                    tracing::warn!(
                        "Preferred goal file unavailable ({}), using {}",
                        e,
                        self.fallback.display()
                    );
                }
            }
        }

        Self::ensure_file(&self.fallback)?;
        Ok((self.fallback.clone(), true))
    }
}

impl GoalStore for JsonGoalStore {
    fn read(&self) -> Result<GoalSnapshot, StoreError> {
        let (data_file, used_fallback) = self.resolve()?;
        let raw = fs::read_to_string(&data_file).map_err(|e| StoreError::io(&data_file, e))?;
        let (goals, warning) = parse_goal_document(&raw);

        Ok(GoalSnapshot {
            goals,
            data_file,
            used_fallback,
            warning,
        })
    }

    fn write(&self, goals: &[GoalNode]) -> Result<WriteReceipt, StoreError> {
        let (data_file, used_fallback) = self.resolve()?;
        let payload = GoalData {
            goals: goals.to_vec(),
        };
        write_pretty(&data_file, &payload)?;

        Ok(WriteReceipt {
            data_file,
            used_fallback,
        })
    }
}

/// Parses a goal document, sanitizing each entry. Unusable documents yield the default
/// goals and a warning.
pub fn parse_goal_document(raw: &str) -> (Vec<GoalNode>, Option<String>) {
    let parsed: Value = match serde_json::from_str(raw) {
        Ok(value) => value,
        Err(_) => {
            return (
                DEFAULT_GOALS.clone(),
                Some("Goal data file contained invalid JSON. Defaults loaded.".to_string()),
            )
        }
    };

    match parsed.get("goals").and_then(Value::as_array) {
        Some(goals) => (sanitize_goals(goals), None),
        None => (
            DEFAULT_GOALS.clone(),
            Some("Goal data file was missing a goals array. Defaults loaded.".to_string()),
        ),
    }
}

fn write_pretty<T: serde::Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    let json = serde_json::to_string_pretty(value)?;
    fs::write(path, json).map_err(|e| StoreError::io(path, e))
}

/// Task list on disk. A missing or unreadable file reads as an empty list.
#[derive(Debug, Clone)]
pub struct JsonTaskStore {
    path: PathBuf,
}

impl JsonTaskStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TaskStore for JsonTaskStore {
    fn load(&self) -> Result<Vec<Task>, StoreError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                tracing::warn!("Could not read {}: {}", self.path.display(), e);
                return Ok(Vec::new());
            }
        };

        match serde_json::from_str(&raw) {
            Ok(tasks) => Ok(tasks),
            Err(e) => {
                tracing::warn!("Ignoring malformed task file {}: {}", self.path.display(), e);
                Ok(Vec::new())
            }
        }
    }

    fn save(&self, tasks: &[Task]) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
        }
        write_pretty(&self.path, &tasks)
    }
}

/// Goal document held in memory
#[derive(Debug, Default)]
pub struct MemoryGoalStore {
    goals: Mutex<Vec<GoalNode>>,
}

impl MemoryGoalStore {
    pub fn new(goals: Vec<GoalNode>) -> Self {
        Self {
            goals: Mutex::new(goals),
        }
    }

    /// Starts from the default seed goals
    pub fn seeded() -> Self {
        Self::new(DEFAULT_GOALS.clone())
    }
}

const MEMORY_LOCATION: &str = "<memory>";

impl GoalStore for MemoryGoalStore {
    fn read(&self) -> Result<GoalSnapshot, StoreError> {
        let goals = self.goals.lock().map_err(|_| StoreError::LockError)?;
        Ok(GoalSnapshot {
            goals: goals.clone(),
            data_file: PathBuf::from(MEMORY_LOCATION),
            used_fallback: false,
            warning: None,
        })
    }

    fn write(&self, goals: &[GoalNode]) -> Result<WriteReceipt, StoreError> {
        let mut stored = self.goals.lock().map_err(|_| StoreError::LockError)?;
        *stored = goals.to_vec();
        Ok(WriteReceipt {
            data_file: PathBuf::from(MEMORY_LOCATION),
            used_fallback: false,
        })
    }
}

/// Task list held in memory
#[derive(Debug, Default)]
pub struct MemoryTaskStore {
    tasks: Mutex<Vec<Task>>,
}

impl TaskStore for MemoryTaskStore {
    fn load(&self) -> Result<Vec<Task>, StoreError> {
        Ok(self.tasks.lock().map_err(|_| StoreError::LockError)?.clone())
    }

    fn save(&self, tasks: &[Task]) -> Result<(), StoreError> {
        *self.tasks.lock().map_err(|_| StoreError::LockError)? = tasks.to_vec();
        Ok(())
    }
}
