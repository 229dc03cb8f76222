//! Core client implementation
//!
//! This module provides a client implementation that wraps Core directly,
//! providing the same interface as HttpClientImpl but without HTTP overhead.

use serde_json::Value;

use super::{Client, ClientError};
use crate::forest::ProgressById;
use crate::github::ProjectSummary;
use crate::models::{CoreError, GoalNode, GoalTree, NewTask, SavedGoals, Task, TaskPatch};
use crate::Core;

/// A client implementation that wraps Core directly
#[derive(Clone)]
pub struct CoreClient {
    core: Core,
}

impl CoreClient {
    /// Create a new CoreClient with the given Core instance
    pub fn new(core: Core) -> Self {
        Self { core }
    }
}

/// Convert CoreError to ClientError for interface compatibility
impl From<CoreError> for ClientError {
    fn from(error: CoreError) -> Self {
        match error {
            CoreError::GoalNotFound(_) | CoreError::TaskNotFound(_) => {
                ClientError::NotFound(error.to_string())
            }
            CoreError::InvalidRequest(_) | CoreError::InvalidParent { .. } => {
                ClientError::Api(error.to_string())
            }
            CoreError::Store(e) => ClientError::Internal(e.to_string()),
        }
    }
}

#[async_trait::async_trait]
impl Client for CoreClient {
    async fn goal_tree(&self) -> Result<GoalTree, ClientError> {
        self.core.goal_tree().map_err(ClientError::from)
    }

    async fn progress(&self) -> Result<ProgressById, ClientError> {
        self.core.progress().map_err(ClientError::from)
    }

    async fn replace_goals(&self, goals: Vec<GoalNode>) -> Result<SavedGoals, ClientError> {
        let raw = goals
            .iter()
            .map(serde_json::to_value)
            .collect::<Result<Vec<Value>, _>>()
            .map_err(|e| ClientError::Internal(e.to_string()))?;
        self.core.replace_goals(&raw).map_err(ClientError::from)
    }

    async fn save_goal(&self, goal: Value) -> Result<GoalNode, ClientError> {
        self.core.save_goal(&goal).map_err(ClientError::from)
    }

    async fn delete_goal(&self, id: &str) -> Result<SavedGoals, ClientError> {
        self.core.delete_goal(id).map_err(ClientError::from)
    }

    async fn list_tasks(&self, project_id: Option<&str>) -> Result<Vec<Task>, ClientError> {
        self.core.list_tasks(project_id).map_err(ClientError::from)
    }

    async fn get_task(&self, id: &str) -> Result<Task, ClientError> {
        self.core.get_task(id).map_err(ClientError::from)
    }

    async fn create_task(&self, task: NewTask) -> Result<Task, ClientError> {
        self.core.create_task(task).map_err(ClientError::from)
    }

    async fn update_task(&self, id: &str, patch: TaskPatch) -> Result<Task, ClientError> {
        self.core.update_task(id, patch).map_err(ClientError::from)
    }

    async fn delete_task(&self, id: &str) -> Result<(), ClientError> {
        self.core.delete_task(id).map_err(ClientError::from)
    }

    async fn projects(&self) -> Result<Vec<ProjectSummary>, ClientError> {
        Ok(self.core.projects().await)
    }
}
