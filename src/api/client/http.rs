//! HTTP client implementation
//!
//! This module provides the reqwest-backed client for a running mission control server.

use std::sync::Arc;

use reqwest::{Client as ReqwestClient, Error as ReqwestError, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

use super::Client;
use crate::forest::ProgressById;
use crate::github::ProjectSummary;
use crate::models::{GoalNode, GoalTree, NewTask, SavedGoals, Task, TaskPatch};

/// API client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".to_string(),
        }
    }
}

/// Generic API response structure
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    success: bool,
    data: Option<T>,
    error: Option<String>,
}

/// Client errors
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] ReqwestError),

    #[error("API error: {0}")]
    Api(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Missing data in response")]
    MissingData,
}

/// HTTP client for the mission control service
#[derive(Debug, Clone)]
pub struct HttpClientImpl {
    http_client: Arc<ReqwestClient>,
    config: ClientConfig,
}

impl Default for HttpClientImpl {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpClientImpl {
    /// Create a new client with default configuration
    pub fn new() -> Self {
        Self::with_config(ClientConfig::default())
    }

    /// Create a new client with custom configuration
    pub fn with_config(config: ClientConfig) -> Self {
        Self {
            http_client: Arc::new(ReqwestClient::new()),
            config,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    async fn envelope<T: DeserializeOwned>(
        request: RequestBuilder,
    ) -> Result<ApiResponse<T>, ClientError> {
        let response = request.send().await?;
        let status = response.status();
        let api_response: ApiResponse<T> = response.json().await?;

        if api_response.success {
            return Ok(api_response);
        }

        let message = api_response
            .error
            .unwrap_or_else(|| format!("HTTP error: {}", status));
        if status == StatusCode::NOT_FOUND {
            Err(ClientError::NotFound(message))
        } else {
            Err(ClientError::Api(message))
        }
    }

    async fn send<T: DeserializeOwned>(request: RequestBuilder) -> Result<T, ClientError> {
        Self::envelope(request)
            .await?
            .data
            .ok_or(ClientError::MissingData)
    }
}

#[async_trait::async_trait]
impl Client for HttpClientImpl {
    async fn goal_tree(&self) -> Result<GoalTree, ClientError> {
        Self::send(self.http_client.get(self.url("/api/goals"))).await
    }

    async fn progress(&self) -> Result<ProgressById, ClientError> {
        Self::send(self.http_client.get(self.url("/api/goals/progress"))).await
    }

    async fn replace_goals(&self, goals: Vec<GoalNode>) -> Result<SavedGoals, ClientError> {
        let body = json!({ "goals": goals });
        Self::send(self.http_client.post(self.url("/api/goals")).json(&body)).await
    }

    async fn save_goal(&self, goal: Value) -> Result<GoalNode, ClientError> {
        Self::send(self.http_client.post(self.url("/api/goals/node")).json(&goal)).await
    }

    async fn delete_goal(&self, id: &str) -> Result<SavedGoals, ClientError> {
        let url = self.url(&format!("/api/goals/{}", id));
        Self::send(self.http_client.delete(url)).await
    }

    async fn list_tasks(&self, project_id: Option<&str>) -> Result<Vec<Task>, ClientError> {
        let mut request = self.http_client.get(self.url("/api/tasks"));
        if let Some(project) = project_id {
            request = request.query(&[("projectId", project)]);
        }
        Self::send(request).await
    }

    async fn get_task(&self, id: &str) -> Result<Task, ClientError> {
        let url = self.url(&format!("/api/tasks/{}", id));
        Self::send(self.http_client.get(url)).await
    }

    async fn create_task(&self, task: NewTask) -> Result<Task, ClientError> {
        Self::send(self.http_client.post(self.url("/api/tasks")).json(&task)).await
    }

    async fn update_task(&self, id: &str, patch: TaskPatch) -> Result<Task, ClientError> {
        let url = self.url(&format!("/api/tasks/{}", id));
        Self::send(self.http_client.patch(url).json(&patch)).await
    }

    async fn delete_task(&self, id: &str) -> Result<(), ClientError> {
        let url = self.url(&format!("/api/tasks/{}", id));
        // The success payload is null, so only the envelope is checked
        Self::envelope::<Value>(self.http_client.delete(url)).await?;
        Ok(())
    }

    async fn projects(&self) -> Result<Vec<ProjectSummary>, ClientError> {
        Self::send(self.http_client.get(self.url("/api/projects"))).await
    }
}
