//! API Server module
//!
//! This module provides the HTTP API server for mission control: goal document
//! reads and writes with rollup values, task CRUD, the project feed and a small HTML
//! view of the goal tree.

use std::collections::HashSet;
use std::net::SocketAddr;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
    routing::{delete, get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::forest::{GoalForest, ProgressById};
use crate::models::{Core, CoreError, GoalNode, NewTask, TaskPatch};

/// Query parameters for listing tasks
#[derive(Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct TaskQuery {
    pub project_id: Option<String>,
}

/// Server configuration
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub address: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: ([127, 0, 0, 1], 3000).into(),
        }
    }
}

/// Health check payload
#[derive(Serialize, Deserialize, Debug)]
pub struct Health {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub version: String,
}

/// API responses
#[derive(Serialize, Deserialize)]
pub struct ApiResponse<T: Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
        }
    }
}

fn error_status(error: &CoreError) -> StatusCode {
    match error {
        CoreError::GoalNotFound(_) | CoreError::TaskNotFound(_) => StatusCode::NOT_FOUND,
        CoreError::InvalidRequest(_) | CoreError::InvalidParent { .. } => StatusCode::BAD_REQUEST,
        CoreError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Helper function to map Core results to Axum responses
fn map_core_result<T: Serialize>(result: Result<T, CoreError>, ok_status: StatusCode) -> Response {
    match result {
        Ok(data) => (ok_status, Json(ApiResponse::success(data))).into_response(),
        Err(e) => {
            let status = error_status(&e);
            if status.is_server_error() {
                tracing::error!("Request failed: {}", e);
            }
            (status, Json(ApiResponse::<T>::error(e.to_string()))).into_response()
        }
    }
}

fn bad_request(message: &str) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(ApiResponse::<()>::error(message.to_string())),
    )
        .into_response()
}

/// Builds the application router over `core`
pub fn router(core: Core) -> Router {
    Router::new()
        .route("/", get(|| async { Redirect::temporary("/ui") }))
        .route("/api/health", get(health_handler))
        // --- Goals --- //
        .route("/api/goals", get(get_goals).post(replace_goals))
        .route("/api/goals/progress", get(get_progress))
        .route("/api/goals/node", post(save_goal))
        .route("/api/goals/:id", delete(delete_goal))
        // --- Tasks --- //
        .route("/api/tasks", get(list_tasks).post(create_task))
        .route(
            "/api/tasks/:id",
            get(get_task).patch(update_task).delete(delete_task),
        )
        // --- Projects --- //
        .route("/api/projects", get(list_projects))
        // --- UI --- //
        .route("/ui", get(ui_handler))
        .with_state(core)
}

/// Starts the API server
pub async fn serve(core: Core, config: ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    let _ = tracing_subscriber::fmt().try_init();

    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = router(core)
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    tracing::info!("Starting server on {}", config.address);
    let listener = TcpListener::bind(config.address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn health_handler() -> impl IntoResponse {
    Json(ApiResponse::success(Health {
        status: "ok".to_string(),
        timestamp: Utc::now(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    }))
}

// --- Goal Handlers --- //

async fn get_goals(State(core): State<Core>) -> impl IntoResponse {
    map_core_result(core.goal_tree(), StatusCode::OK)
}

async fn get_progress(State(core): State<Core>) -> impl IntoResponse {
    map_core_result(core.progress(), StatusCode::OK)
}

async fn replace_goals(State(core): State<Core>, Json(payload): Json<Value>) -> impl IntoResponse {
    let Some(goals) = payload.get("goals").and_then(Value::as_array) else {
        return bad_request("Expected a goals array in request body.");
    };
    map_core_result(core.replace_goals(goals), StatusCode::OK)
}

async fn save_goal(State(core): State<Core>, Json(payload): Json<Value>) -> impl IntoResponse {
    if !payload.is_object() {
        return bad_request("Expected a goal object in request body.");
    }
    map_core_result(core.save_goal(&payload), StatusCode::OK)
}

async fn delete_goal(State(core): State<Core>, Path(id): Path<String>) -> impl IntoResponse {
    map_core_result(core.delete_goal(&id), StatusCode::OK)
}

// --- Task Handlers --- //

async fn list_tasks(State(core): State<Core>, Query(query): Query<TaskQuery>) -> impl IntoResponse {
    let project = query.project_id.as_deref().filter(|p| !p.is_empty());
    map_core_result(core.list_tasks(project), StatusCode::OK)
}

async fn create_task(State(core): State<Core>, Json(payload): Json<NewTask>) -> impl IntoResponse {
    map_core_result(core.create_task(payload), StatusCode::CREATED)
}

async fn get_task(State(core): State<Core>, Path(id): Path<String>) -> impl IntoResponse {
    map_core_result(core.get_task(&id), StatusCode::OK)
}

async fn update_task(
    State(core): State<Core>,
    Path(id): Path<String>,
    Json(payload): Json<TaskPatch>,
) -> impl IntoResponse {
    map_core_result(core.update_task(&id, payload), StatusCode::OK)
}

async fn delete_task(State(core): State<Core>, Path(id): Path<String>) -> impl IntoResponse {
    map_core_result(core.delete_task(&id), StatusCode::OK)
}

// --- Project Handlers --- //

async fn list_projects(State(core): State<Core>) -> impl IntoResponse {
    Json(ApiResponse::success(core.projects().await))
}

// --- UI --- //

async fn ui_handler(State(core): State<Core>) -> impl IntoResponse {
    match core.goal_tree() {
        Ok(tree) => Html(render_goal_page(&tree.goals, &tree.progress, tree.warning.as_deref())),
        Err(e) => {
            tracing::error!("Failed to load goals for UI: {}", e);
            Html(format!(
                "<!DOCTYPE html><html><head><title>Error</title></head><body><h1>Error</h1><p>Could not load goals: {}</p></body></html>",
                html_escape::encode_text(&e.to_string())
            ))
        }
    }
}

/// Renders the goal forest as a nested list with rollup values
fn render_goal_page(goals: &[GoalNode], progress: &ProgressById, warning: Option<&str>) -> String {
    let forest = GoalForest::build(goals);
    let mut html = String::new();
    html.push_str("<!DOCTYPE html><html><head><title>Mission Control Goals</title>");
    html.push_str(UI_STYLE);
    html.push_str("</head><body><h1>Goals</h1>");

    if let Some(warning) = warning {
        html.push_str(&format!(
            "<p class='warning'>{}</p>",
            html_escape::encode_text(warning)
        ));
    }

    let walked = forest.walk();
    if forest.is_empty() {
        html.push_str("<p>No goals yet.</p>");
    } else {
        html.push_str("<ul class='goal-tree'>");
        render_walk(&walked, progress, &mut html);
        html.push_str("</ul>");
    }
    let rendered: HashSet<&str> = walked.iter().map(|(_, g)| g.id.as_str()).collect();

    // Goals that only sit on a parent cycle are not reachable from any root
    let detached: Vec<&GoalNode> = goals
        .iter()
        .filter(|g| !rendered.contains(g.id.as_str()))
        .collect();
    if !detached.is_empty() {
        html.push_str("<h2>Detached goals (parent cycle)</h2><ul class='goal-tree'>");
        for goal in detached {
            html.push_str(&goal_line(goal, progress));
            html.push_str("</li>");
        }
        html.push_str("</ul>");
    }

    html.push_str("</body></html>");
    html
}

fn goal_line(goal: &GoalNode, progress: &ProgressById) -> String {
    let value = progress.get(&goal.id).copied().unwrap_or(0.0).round();
    let override_marker = if goal.is_overridden() {
        " <span class='override'>override</span>"
    } else {
        ""
    };
    format!(
        "<li><span class='title'>{}</span> <span class='meta'>{}% · {} · {}</span>{}",
        html_escape::encode_text(&goal.title),
        value,
        goal.horizon.label(),
        goal.category.label(),
        override_marker
    )
}

/// Emits the pre-order walk as nested lists. A walk only ever steps one level down at a
/// time, but may climb several levels at once.
fn render_walk(walked: &[(usize, &GoalNode)], progress: &ProgressById, html: &mut String) {
    let mut previous: Option<usize> = None;

    for &(depth, goal) in walked {
        match previous {
            Some(prev) if depth > prev => html.push_str("<ul>"),
            Some(prev) => {
                html.push_str("</li>");
                for _ in depth..prev {
                    html.push_str("</ul></li>");
                }
            }
            None => {}
        }
        html.push_str(&goal_line(goal, progress));
        previous = Some(depth);
    }

    if let Some(prev) = previous {
        html.push_str("</li>");
        for _ in 0..prev {
            html.push_str("</ul></li>");
        }
    }
}

const UI_STYLE: &str = r#"<style>
body { font-family: -apple-system, BlinkMacSystemFont, sans-serif; margin: 2rem; color: #1f2937; }
ul.goal-tree, ul.goal-tree ul { list-style: none; padding-left: 1.25rem; }
li { margin: 0.35rem 0; }
.title { font-weight: 600; }
.meta { color: #6b7280; font-size: 0.9em; }
.override { background: #fef3c7; border-radius: 4px; padding: 0 4px; font-size: 0.8em; }
.warning { background: #fee2e2; padding: 0.5rem; border-radius: 4px; }
</style>"#;

#[cfg(test)]
mod tests {
    use super::*; // Import items from parent module (server)
    use crate::forest::ProgressById;
    use crate::models::{GoalTree, SavedGoals, Task, TaskStatus};
    use crate::store::{MemoryGoalStore, MemoryTaskStore};
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use http_body_util::BodyExt; // for `collect`
    use serde::de::DeserializeOwned;
    use serde_json::json;
    use std::sync::Arc;
    use tower::ServiceExt; // for `oneshot`

    // Helper to create a test Core and Router
    fn setup_test_app(goals: Vec<GoalNode>) -> Router {
        let core = Core::new(
            Arc::new(MemoryGoalStore::new(goals)),
            Arc::new(MemoryTaskStore::default()),
        );
        router(core)
    }

    fn rollup_goals() -> Vec<GoalNode> {
        vec![
            GoalNode::new("r", "Root"),
            GoalNode::new("c1", "First").with_progress(40).with_parent("r"),
            GoalNode::new("c2", "Second").with_progress(80).with_parent("r"),
        ]
    }

    // Helper to make requests and deserialize JSON response data
    async fn request_json<T: DeserializeOwned + Serialize>(
        app: &Router,
        method: &str,
        uri: &str,
        body: Body,
    ) -> (StatusCode, ApiResponse<T>) {
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method(method)
                    .uri(uri)
                    .header("Content-Type", "application/json")
                    .body(body)
                    .unwrap(),
            )
            .await
            .unwrap();

        let status = response.status();
        let body_bytes = response.into_body().collect().await.unwrap().to_bytes();
        let parsed = serde_json::from_slice::<ApiResponse<T>>(&body_bytes).unwrap_or_else(|e| {
            panic!(
                "Failed to parse response: {}. Body: {}",
                e,
                String::from_utf8_lossy(&body_bytes)
            )
        });
        (status, parsed)
    }

    #[tokio::test]
    async fn test_health() {
        let app = setup_test_app(Vec::new());
        let (status, resp): (_, ApiResponse<Health>) =
            request_json(&app, "GET", "/api/health", Body::empty()).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(resp.data.unwrap().status, "ok");
    }

    #[tokio::test]
    async fn test_get_goals_includes_rollup() {
        let app = setup_test_app(rollup_goals());
        let (status, resp): (_, ApiResponse<GoalTree>) =
            request_json(&app, "GET", "/api/goals", Body::empty()).await;

        assert_eq!(status, StatusCode::OK);
        let tree = resp.data.expect("goal tree");
        assert_eq!(tree.goals.len(), 3);
        assert_eq!(tree.roots, vec!["r".to_string()]);
        assert_eq!(tree.progress["r"], 60.0);

        let (_, resp): (_, ApiResponse<ProgressById>) =
            request_json(&app, "GET", "/api/goals/progress", Body::empty()).await;
        assert_eq!(resp.data.unwrap()["c2"], 80.0);
    }

    #[tokio::test]
    async fn test_replace_goals_sanitizes_and_rejects_bad_bodies() {
        let app = setup_test_app(Vec::new());

        let (status, resp): (_, ApiResponse<()>) = request_json(
            &app,
            "POST",
            "/api/goals",
            Body::from(json!({ "goals": "nope" }).to_string()),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(resp.error.unwrap().contains("goals array"));

        let body = json!({
            "goals": [
                { "id": "r", "title": "Root", "progressOverride": 10 },
                { "id": "c", "title": "Child", "progress": -50, "parentId": "r" },
                { "id": "d", "title": "Other", "progress": 150, "parentId": "r", "horizon": "2w" }
            ]
        });
        let (status, resp): (_, ApiResponse<SavedGoals>) =
            request_json(&app, "POST", "/api/goals", Body::from(body.to_string())).await;
        assert_eq!(status, StatusCode::OK);

        let saved = resp.data.unwrap();
        assert_eq!(saved.goals[1].progress, 0);
        assert_eq!(saved.goals[2].progress, 100);
        assert_eq!(saved.progress["r"], 10.0);
    }

    #[tokio::test]
    async fn test_save_and_delete_goal() {
        let app = setup_test_app(rollup_goals());

        let (status, resp): (_, ApiResponse<GoalNode>) = request_json(
            &app,
            "POST",
            "/api/goals/node",
            Body::from(json!({ "title": "Grandchild", "parentId": "c1", "progress": 20 }).to_string()),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let created = resp.data.unwrap();
        assert_eq!(created.parent_id.as_deref(), Some("c1"));

        // Moving the root under its own descendant is refused
        let (status, _): (_, ApiResponse<GoalNode>) = request_json(
            &app,
            "POST",
            "/api/goals/node",
            Body::from(json!({ "id": "r", "title": "Root", "parentId": created.id }).to_string()),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, resp): (_, ApiResponse<SavedGoals>) =
            request_json(&app, "DELETE", "/api/goals/c1", Body::empty()).await;
        assert_eq!(status, StatusCode::OK);
        let saved = resp.data.unwrap();
        let moved = saved.goals.iter().find(|g| g.id == created.id).unwrap();
        assert_eq!(moved.parent_id.as_deref(), Some("r"));

        let (status, _): (_, ApiResponse<SavedGoals>) =
            request_json(&app, "DELETE", "/api/goals/c1", Body::empty()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_task_api_crud() {
        let app = setup_test_app(Vec::new());

        let (status, _): (_, ApiResponse<Task>) = request_json(
            &app,
            "POST",
            "/api/tasks",
            Body::from(json!({ "title": "No project" }).to_string()),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, resp): (_, ApiResponse<Task>) = request_json(
            &app,
            "POST",
            "/api/tasks",
            Body::from(
                json!({ "projectId": "mission-control", "title": "Ship rollup", "priority": "high" })
                    .to_string(),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let task = resp.data.unwrap();
        assert_eq!(task.status, TaskStatus::Todo);

        let (_, resp): (_, ApiResponse<Vec<Task>>) = request_json(
            &app,
            "GET",
            "/api/tasks?projectId=mission-control",
            Body::empty(),
        )
        .await;
        assert_eq!(resp.data.unwrap().len(), 1);

        let (_, resp): (_, ApiResponse<Vec<Task>>) =
            request_json(&app, "GET", "/api/tasks?projectId=other", Body::empty()).await;
        assert!(resp.data.unwrap().is_empty());

        let uri = format!("/api/tasks/{}", task.id);
        let (status, resp): (_, ApiResponse<Task>) = request_json(
            &app,
            "PATCH",
            &uri,
            Body::from(json!({ "status": "inprogress" }).to_string()),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(resp.data.unwrap().status, TaskStatus::InProgress);

        let (status, _): (_, ApiResponse<()>) =
            request_json(&app, "DELETE", &uri, Body::empty()).await;
        assert_eq!(status, StatusCode::OK);

        let (status, resp): (_, ApiResponse<Task>) =
            request_json(&app, "GET", &uri, Body::empty()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(resp.error.unwrap().contains("not found"));
    }

    #[tokio::test]
    async fn test_projects_without_github() {
        let app = setup_test_app(Vec::new());
        let (status, resp): (_, ApiResponse<Vec<crate::github::ProjectSummary>>) =
            request_json(&app, "GET", "/api/projects", Body::empty()).await;

        assert_eq!(status, StatusCode::OK);
        assert!(resp.data.unwrap().is_empty());
    }

    #[test]
    fn test_render_goal_page_escapes_and_lists_detached() {
        let goals = vec![
            GoalNode::new("r", "<Root>"),
            GoalNode::new("c", "Child").with_parent("r").with_progress(50),
            GoalNode::new("a", "Loop A").with_parent("b"),
            GoalNode::new("b", "Loop B").with_parent("a"),
        ];
        let progress = crate::forest::progress_for(&goals);
        let html = render_goal_page(&goals, &progress, None);

        assert!(html.contains("&lt;Root&gt;"));
        assert!(html.contains("50% · Now · Personal"));
        assert!(html.contains("Detached goals"));
        assert!(html.contains("Loop A"));
    }

    #[test]
    fn test_render_walk_nests_lists() {
        let goals = vec![
            GoalNode::new("r", "R"),
            GoalNode::new("a", "A").with_parent("r"),
            GoalNode::new("a1", "A1").with_parent("a"),
            GoalNode::new("s", "S"),
        ];
        let progress = crate::forest::progress_for(&goals);
        let forest = GoalForest::build(&goals);
        let mut html = String::new();
        render_walk(&forest.walk(), &progress, &mut html);

        let shape: String = html
            .split('<')
            .filter_map(|tag| tag.split('>').next())
            .filter(|tag| matches!(*tag, "ul" | "/ul" | "/li") || tag.starts_with("li"))
            .map(|tag| format!("<{}>", tag))
            .collect();
        assert_eq!(
            shape,
            "<li><ul><li><ul><li></li></ul></li></ul></li><li></li>"
        );
    }

    #[tokio::test]
    async fn test_deep_goal_chain_is_served() {
        let app = setup_test_app(Vec::new());
        let goals: Vec<Value> = (0..20_000)
            .map(|i| {
                let parent = if i == 0 {
                    Value::Null
                } else {
                    json!(format!("g{}", i - 1))
                };
                json!({ "id": format!("g{}", i), "title": "link", "progress": 40, "parentId": parent })
            })
            .collect();

        let (status, resp): (_, ApiResponse<SavedGoals>) = request_json(
            &app,
            "POST",
            "/api/goals",
            Body::from(json!({ "goals": goals }).to_string()),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(resp.data.unwrap().progress["g0"], 40.0);

        let response = app
            .clone()
            .oneshot(Request::builder().uri("/ui").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let html = String::from_utf8_lossy(&body);
        assert_eq!(html.matches("<ul>").count(), 19_999);
        assert!(!html.contains("Detached goals"));
    }
}
