//! Client trait definition
//!
//! This module defines the `Client` trait that abstracts over different client implementations.

use serde_json::Value;

use super::ClientError;
use crate::forest::ProgressById;
use crate::github::ProjectSummary;
use crate::models::{GoalNode, GoalTree, NewTask, SavedGoals, Task, TaskPatch};

/// Trait defining the API client interface for the mission control service
#[async_trait::async_trait]
pub trait Client {
    /// Get every goal together with its rollup progress
    async fn goal_tree(&self) -> Result<GoalTree, ClientError>;

    /// Get the rollup progress of every goal
    async fn progress(&self) -> Result<ProgressById, ClientError>;

    /// Replace the whole goal document
    async fn replace_goals(&self, goals: Vec<GoalNode>) -> Result<SavedGoals, ClientError>;

    /// Create or update one goal. Loose JSON is accepted and sanitized by the receiver.
    async fn save_goal(&self, goal: Value) -> Result<GoalNode, ClientError>;

    /// Delete a goal, moving its children up to its parent
    async fn delete_goal(&self, id: &str) -> Result<SavedGoals, ClientError>;

    /// List tasks, optionally only those of one project
    async fn list_tasks(&self, project_id: Option<&str>) -> Result<Vec<Task>, ClientError>;

    async fn get_task(&self, id: &str) -> Result<Task, ClientError>;

    async fn create_task(&self, task: NewTask) -> Result<Task, ClientError>;

    async fn update_task(&self, id: &str, patch: TaskPatch) -> Result<Task, ClientError>;

    async fn delete_task(&self, id: &str) -> Result<(), ClientError>;

    /// Get the GitHub project feed
    async fn projects(&self) -> Result<Vec<ProjectSummary>, ClientError>;
}
