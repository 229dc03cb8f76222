//! Core models for the mission-control library
//!
//! This module contains the goal and task records, the boundary validation that turns
//! hand-edited JSON into well-formed records, and the `Core` handle that ties the stores,
//! the goal forest and the project feed together.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::forest::{self, GoalForest, ProgressById};
use crate::github::{GithubClient, ProjectSummary};
use crate::store::{GoalStore, StoreError, TaskStore, WriteReceipt};

/// Which half of life a goal belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum GoalCategory {
    #[default]
    Personal,
    Work,
}

impl GoalCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            GoalCategory::Personal => "personal",
            GoalCategory::Work => "work",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            GoalCategory::Personal => "Personal",
            GoalCategory::Work => "Work",
        }
    }
}

impl FromStr for GoalCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "personal" => Ok(GoalCategory::Personal),
            "work" => Ok(GoalCategory::Work),
            other => Err(format!("unknown goal category '{}'", other)),
        }
    }
}

/// How far out a goal is meant to land
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum GoalHorizon {
    #[default]
    #[serde(rename = "now")]
    Now,
    #[serde(rename = "2w")]
    TwoWeeks,
    #[serde(rename = "6m")]
    SixMonths,
    #[serde(rename = "1y")]
    OneYear,
    #[serde(rename = "long")]
    Long,
}

impl GoalHorizon {
    pub fn as_str(&self) -> &'static str {
        match self {
            GoalHorizon::Now => "now",
            GoalHorizon::TwoWeeks => "2w",
            GoalHorizon::SixMonths => "6m",
            GoalHorizon::OneYear => "1y",
            GoalHorizon::Long => "long",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            GoalHorizon::Now => "Now",
            GoalHorizon::TwoWeeks => "2 Weeks",
            GoalHorizon::SixMonths => "6 Months",
            GoalHorizon::OneYear => "1 Year",
            GoalHorizon::Long => "Long Term",
        }
    }
}

impl FromStr for GoalHorizon {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "now" => Ok(GoalHorizon::Now),
            "2w" => Ok(GoalHorizon::TwoWeeks),
            "6m" => Ok(GoalHorizon::SixMonths),
            "1y" => Ok(GoalHorizon::OneYear),
            "long" => Ok(GoalHorizon::Long),
            other => Err(format!("unknown goal horizon '{}'", other)),
        }
    }
}

/// A node in the goal forest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoalNode {
    pub id: String,
    pub title: String,
    pub category: GoalCategory,
    pub horizon: GoalHorizon,
    pub why: String,
    pub metric: String,
    pub deadline: String,
    /// Own progress, used directly for leaves
    pub progress: u8,
    pub parent_id: Option<String>,
    /// Replaces the rollup on a goal that has children
    #[serde(default)]
    pub progress_override: Option<u8>,
}

impl GoalNode {
    /// Creates a goal with empty descriptive fields
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            category: GoalCategory::default(),
            horizon: GoalHorizon::default(),
            why: String::new(),
            metric: String::new(),
            deadline: String::new(),
            progress: 0,
            parent_id: None,
            progress_override: None,
        }
    }

    pub fn with_progress(mut self, progress: u8) -> Self {
        self.progress = progress.min(100);
        self
    }

    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    pub fn with_override(mut self, progress_override: u8) -> Self {
        self.progress_override = Some(progress_override.min(100));
        self
    }

    pub fn is_overridden(&self) -> bool {
        self.progress_override.is_some()
    }
}

/// The persisted goal document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GoalData {
    pub goals: Vec<GoalNode>,
}

lazy_static! {
    /// Seed document written when no goal file exists yet
    pub static ref DEFAULT_GOALS: Vec<GoalNode> = vec![
        GoalNode {
            id: "goal-root".to_string(),
            title: "Build a Life I Own".to_string(),
            category: GoalCategory::Personal,
            horizon: GoalHorizon::Long,
            why: "Sustain freedom, energy, and focus across work and life.".to_string(),
            metric: "Weekly energy score >= 8/10".to_string(),
            deadline: String::new(),
            progress: 35,
            parent_id: None,
            progress_override: None,
        },
        GoalNode {
            id: "goal-work-growth".to_string(),
            title: "Grow Mission Control".to_string(),
            category: GoalCategory::Work,
            horizon: GoalHorizon::OneYear,
            why: "Make the dashboard the default control plane for my projects.".to_string(),
            metric: "Daily active use, 5+ projects tracked".to_string(),
            deadline: String::new(),
            progress: 50,
            parent_id: Some("goal-root".to_string()),
            progress_override: None,
        },
        GoalNode {
            id: "goal-health".to_string(),
            title: "Health & Energy".to_string(),
            category: GoalCategory::Personal,
            horizon: GoalHorizon::SixMonths,
            why: "High energy unlocks everything else.".to_string(),
            metric: "5 workouts/week + 7.5h sleep avg".to_string(),
            deadline: String::new(),
            progress: 40,
            parent_id: Some("goal-root".to_string()),
            progress_override: None,
        },
        GoalNode {
            id: "goal-focus".to_string(),
            title: "Deep Work Rhythm".to_string(),
            category: GoalCategory::Work,
            horizon: GoalHorizon::TwoWeeks,
            why: "Ship core features consistently.".to_string(),
            metric: "3 deep work blocks/day".to_string(),
            deadline: String::new(),
            progress: 60,
            parent_id: Some("goal-work-growth".to_string()),
            progress_override: None,
        },
    ];
}

/// Clamps a raw progress value into [0, 100], rounding to the nearest integer.
/// NaN becomes 0.
pub fn clamp_progress(value: f64) -> u8 {
    if value.is_nan() {
        return 0;
    }
    value.round().clamp(0.0, 100.0) as u8
}

/// Numeric coercion for loosely typed JSON fields
fn coerce_number(value: &Value) -> f64 {
    match value {
        Value::Number(n) => n.as_f64().unwrap_or(f64::NAN),
        Value::String(s) if s.trim().is_empty() => 0.0,
        Value::String(s) => s.trim().parse::<f64>().unwrap_or(f64::NAN),
        Value::Bool(b) => {
            if *b {
                1.0
            } else {
                0.0
            }
        }
        Value::Null => 0.0,
        _ => f64::NAN,
    }
}

fn coerce_string(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        other => Some(other.to_string()),
    }
}

/// Turns an arbitrary JSON value into a well-formed goal.
///
/// Missing fields get defaults, unknown enum values fall back to `personal` / `now`,
/// progress values are coerced to numbers and clamped. `index` is the position in the
/// incoming list and names goals that arrive without an id.
pub fn sanitize_goal(raw: &Value, index: usize) -> GoalNode {
    let field = |name: &str| raw.get(name);

    let category = field("category")
        .and_then(Value::as_str)
        .and_then(|s| s.parse().ok())
        .unwrap_or_default();
    let horizon = field("horizon")
        .and_then(Value::as_str)
        .and_then(|s| s.parse().ok())
        .unwrap_or_default();

    let progress = clamp_progress(field("progress").map(coerce_number).unwrap_or(0.0));
    let progress_override = match field("progressOverride") {
        None | Some(Value::Null) => None,
        Some(value) => Some(clamp_progress(coerce_number(value))),
    };

    let parent_id = field("parentId")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string);

    GoalNode {
        id: coerce_string(field("id")).unwrap_or_else(|| format!("goal-{}", index)),
        title: coerce_string(field("title"))
            .unwrap_or_default()
            .trim()
            .to_string(),
        category,
        horizon,
        why: coerce_string(field("why")).unwrap_or_default(),
        metric: coerce_string(field("metric")).unwrap_or_default(),
        deadline: field("deadline")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        progress,
        parent_id,
        progress_override,
    }
}

/// Sanitizes a whole incoming goal list
pub fn sanitize_goals(raw: &[Value]) -> Vec<GoalNode> {
    raw.iter()
        .enumerate()
        .map(|(index, goal)| sanitize_goal(goal, index))
        .collect()
}

fn to_base36(mut value: u64) -> String {
    const DIGITS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if value == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while value > 0 {
        out.push(DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    out.reverse();
    String::from_utf8_lossy(&out).into_owned()
}

fn random_suffix(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(|c| (c as char).to_ascii_lowercase())
        .collect()
}

/// Generates an id of the form `goal-<time36>-<rand4>`
pub fn new_goal_id() -> String {
    let millis = Utc::now().timestamp_millis().max(0) as u64;
    format!("goal-{}-{}", to_base36(millis), random_suffix(4))
}

/// Generates an id of the form `task-<millis>-<rand7>`
pub fn new_task_id() -> String {
    format!(
        "task-{}-{}",
        Utc::now().timestamp_millis(),
        random_suffix(7)
    )
}

/// Kanban column of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    #[default]
    Todo,
    #[serde(rename = "inprogress")]
    InProgress,
    Done,
}

impl FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "todo" => Ok(TaskStatus::Todo),
            "inprogress" | "in-progress" => Ok(TaskStatus::InProgress),
            "done" => Ok(TaskStatus::Done),
            other => Err(format!("unknown task status '{}'", other)),
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskStatus::Todo => "todo",
            TaskStatus::InProgress => "inprogress",
            TaskStatus::Done => "done",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskPriority {
    Low,
    Medium,
    High,
}

impl FromStr for TaskPriority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(TaskPriority::Low),
            "medium" => Ok(TaskPriority::Medium),
            "high" => Ok(TaskPriority::High),
            other => Err(format!("unknown task priority '{}'", other)),
        }
    }
}

/// A project task persisted in the task store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub project_id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<TaskPriority>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Request to create a task
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTask {
    #[serde(default)]
    pub project_id: String,
    #[serde(default)]
    pub title: String,
    pub description: Option<String>,
    pub status: Option<TaskStatus>,
    pub priority: Option<TaskPriority>,
    pub due_date: Option<String>,
}

/// Partial update of a task; absent fields are left untouched
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskPatch {
    pub project_id: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<TaskStatus>,
    pub priority: Option<TaskPriority>,
    pub due_date: Option<String>,
}

impl TaskPatch {
    fn apply(self, task: &mut Task) {
        if let Some(project_id) = self.project_id {
            task.project_id = project_id;
        }
        if let Some(title) = self.title {
            task.title = title;
        }
        if self.description.is_some() {
            task.description = self.description;
        }
        if let Some(status) = self.status {
            task.status = status;
        }
        if self.priority.is_some() {
            task.priority = self.priority;
        }
        if self.due_date.is_some() {
            task.due_date = self.due_date;
        }
    }
}

/// The goal document as served to the UI: goals, their rollup values, and where they live
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoalTree {
    pub goals: Vec<GoalNode>,
    pub roots: Vec<String>,
    pub progress: ProgressById,
    pub data_file: String,
    pub used_fallback: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

/// Result of a goal write
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedGoals {
    pub goals: Vec<GoalNode>,
    pub progress: ProgressById,
    pub data_file: String,
    pub used_fallback: bool,
}

impl SavedGoals {
    fn new(goals: Vec<GoalNode>, receipt: WriteReceipt) -> Self {
        let progress = forest::compute_progress(&GoalForest::build(&goals));
        Self {
            goals,
            progress,
            data_file: receipt.data_file.display().to_string(),
            used_fallback: receipt.used_fallback,
        }
    }
}

/// Errors surfaced by `Core`
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Goal '{0}' not found")]
    GoalNotFound(String),

    #[error("Task '{0}' not found")]
    TaskNotFound(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Goal '{goal}' cannot be placed under '{parent}': it would become its own ancestor")]
    InvalidParent { goal: String, parent: String },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Shared handle over the stores and the project feed
#[derive(Clone)]
pub struct Core {
    goals: Arc<dyn GoalStore>,
    tasks: Arc<dyn TaskStore>,
    github: Option<GithubClient>,
}

impl Core {
    pub fn new(goals: Arc<dyn GoalStore>, tasks: Arc<dyn TaskStore>) -> Self {
        Self {
            goals,
            tasks,
            github: None,
        }
    }

    /// Attaches a GitHub client used by `projects`
    pub fn with_github(mut self, github: GithubClient) -> Self {
        self.github = Some(github);
        self
    }

    // Goals

    /// Reads the goal document and computes every goal's rollup
    pub fn goal_tree(&self) -> Result<GoalTree, CoreError> {
        let snapshot = self.goals.read()?;
        if let Some(warning) = &snapshot.warning {
            tracing::warn!("{}", warning);
        }

        let forest = GoalForest::build(&snapshot.goals);
        let progress = forest::compute_progress(&forest);
        let roots = forest.roots().iter().map(|g| g.id.clone()).collect();

        Ok(GoalTree {
            goals: snapshot.goals,
            roots,
            progress,
            data_file: snapshot.data_file.display().to_string(),
            used_fallback: snapshot.used_fallback,
            warning: snapshot.warning,
        })
    }

    /// Rollup values only
    pub fn progress(&self) -> Result<ProgressById, CoreError> {
        let snapshot = self.goals.read()?;
        Ok(forest::compute_progress(&GoalForest::build(&snapshot.goals)))
    }

    /// Replaces the whole goal document with the sanitized form of `raw`
    pub fn replace_goals(&self, raw: &[Value]) -> Result<SavedGoals, CoreError> {
        let goals = sanitize_goals(raw);
        let receipt = self.goals.write(&goals)?;
        tracing::info!(
            "Saved {} goals to {}",
            goals.len(),
            receipt.data_file.display()
        );
        Ok(SavedGoals::new(goals, receipt))
    }

    /// Creates or updates a single goal. A goal without an id gets a fresh one.
    pub fn save_goal(&self, raw: &Value) -> Result<GoalNode, CoreError> {
        let snapshot = self.goals.read()?;

        let mut goal = sanitize_goal(raw, snapshot.goals.len());
        let has_id = raw
            .get("id")
            .map(|id| !id.is_null() && id.as_str() != Some(""))
            .unwrap_or(false);
        if !has_id {
            goal.id = new_goal_id();
        }

        if let Some(parent) = &goal.parent_id {
            forest::validate_parent(&snapshot.goals, &goal.id, parent)?;
        }

        let goals = forest::upsert_goal(snapshot.goals, goal.clone());
        self.goals.write(&goals)?;
        tracing::info!("Saved goal '{}' ({})", goal.title, goal.id);
        Ok(goal)
    }

    /// Deletes a goal; its children move up to its parent
    pub fn delete_goal(&self, id: &str) -> Result<SavedGoals, CoreError> {
        let snapshot = self.goals.read()?;
        let goals = forest::remove_goal(&snapshot.goals, id)
            .ok_or_else(|| CoreError::GoalNotFound(id.to_string()))?;
        let receipt = self.goals.write(&goals)?;
        tracing::info!("Deleted goal {}", id);
        Ok(SavedGoals::new(goals, receipt))
    }

    // Tasks

    pub fn list_tasks(&self, project_id: Option<&str>) -> Result<Vec<Task>, CoreError> {
        let tasks = self.tasks.load()?;
        Ok(match project_id {
            Some(project) => tasks
                .into_iter()
                .filter(|t| t.project_id == project)
                .collect(),
            None => tasks,
        })
    }

    pub fn get_task(&self, id: &str) -> Result<Task, CoreError> {
        self.tasks
            .load()?
            .into_iter()
            .find(|t| t.id == id)
            .ok_or_else(|| CoreError::TaskNotFound(id.to_string()))
    }

    pub fn create_task(&self, new_task: NewTask) -> Result<Task, CoreError> {
        if new_task.project_id.trim().is_empty() || new_task.title.trim().is_empty() {
            return Err(CoreError::InvalidRequest(
                "Missing required fields: projectId, title".to_string(),
            ));
        }

        let now = Utc::now();
        let task = Task {
            id: new_task_id(),
            project_id: new_task.project_id,
            title: new_task.title,
            description: new_task.description,
            status: new_task.status.unwrap_or_default(),
            priority: new_task.priority,
            due_date: new_task.due_date,
            created_at: now,
            updated_at: now,
        };

        let mut tasks = self.tasks.load()?;
        tasks.push(task.clone());
        self.tasks.save(&tasks)?;
        tracing::debug!("Created task {}", task.id);
        Ok(task)
    }

    pub fn update_task(&self, id: &str, patch: TaskPatch) -> Result<Task, CoreError> {
        let mut tasks = self.tasks.load()?;
        let task = tasks
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| CoreError::TaskNotFound(id.to_string()))?;

        patch.apply(task);
        task.updated_at = Utc::now();
        let updated = task.clone();

        self.tasks.save(&tasks)?;
        Ok(updated)
    }

    pub fn delete_task(&self, id: &str) -> Result<(), CoreError> {
        let tasks = self.tasks.load()?;
        let before = tasks.len();
        let remaining: Vec<Task> = tasks.into_iter().filter(|t| t.id != id).collect();
        if remaining.len() == before {
            return Err(CoreError::TaskNotFound(id.to_string()));
        }
        self.tasks.save(&remaining)?;
        Ok(())
    }

    /// `(done, total)` task counts keyed by project
    pub fn task_counts(&self) -> Result<HashMap<String, (usize, usize)>, CoreError> {
        let mut counts: HashMap<String, (usize, usize)> = HashMap::new();
        for task in self.tasks.load()? {
            let entry = counts.entry(task.project_id).or_default();
            entry.1 += 1;
            if task.status == TaskStatus::Done {
                entry.0 += 1;
            }
        }
        Ok(counts)
    }

    // Projects

    /// GitHub repositories as dashboard projects, with their local task counts; empty
    /// when GitHub is not configured or unreachable
    pub async fn projects(&self) -> Vec<ProjectSummary> {
        let mut projects = match &self.github {
            Some(github) => github.projects().await,
            None => {
                tracing::debug!("No GitHub client configured, returning no projects");
                return Vec::new();
            }
        };

        match self.task_counts() {
            Ok(counts) => {
                for project in &mut projects {
                    if let Some(&(completed, total)) = counts.get(&project.id) {
                        project.tasks_completed = completed;
                        project.tasks_total = total;
                    }
                }
            }
            Err(e) => tracing::warn!("Task counts unavailable for projects: {}", e),
        }

        projects
    }
}
