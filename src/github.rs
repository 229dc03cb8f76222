//! GitHub project feed
//!
//! Lists a user's repositories and recent commits and turns them into dashboard projects.
//! GitHub is optional: network failures, missing credentials and error statuses all
//! degrade to empty lists.

use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use reqwest::header::{ACCEPT, AUTHORIZATION, USER_AGENT};
use reqwest::{Client as ReqwestClient, RequestBuilder};
use serde::{Deserialize, Serialize};

const DEFAULT_API_BASE: &str = "https://api.github.com";
const REPO_LIMIT: usize = 20;
const COMMIT_LIMIT: usize = 20;

/// GitHub connection settings
#[derive(Debug, Clone)]
pub struct GithubConfig {
    pub api_base: String,
    pub user: String,
    pub token: Option<String>,
    pub timeout: Duration,
}

impl GithubConfig {
    pub fn new(user: impl Into<String>, token: Option<String>) -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            user: user.into(),
            token: token.filter(|t| !t.is_empty()),
            timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GithubRepo {
    pub id: u64,
    pub name: String,
    pub full_name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub html_url: String,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub stargazers_count: u64,
    #[serde(default)]
    pub open_issues_count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GithubCommit {
    pub sha: String,
    pub commit: CommitDetail,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitDetail {
    pub message: String,
    pub author: CommitAuthor,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitAuthor {
    pub name: String,
    pub date: DateTime<Utc>,
}

/// A repository as shown on the dashboard
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectSummary {
    pub id: String,
    pub name: String,
    pub description: String,
    pub progress: u8,
    pub github_url: String,
    pub open_issues: u64,
    pub commits: usize,
    pub last_activity: String,
    /// Filled from the local task store, keyed by project id
    #[serde(default)]
    pub tasks_completed: usize,
    #[serde(default)]
    pub tasks_total: usize,
}

#[derive(Debug, thiserror::Error)]
enum GithubError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("GitHub returned {0}")]
    Status(reqwest::StatusCode),
}

/// Activity heuristic: two points per recent commit, capped at 100, minus five per open
/// issue, clamped to [0, 100].
pub fn project_progress(commits: usize, open_issues: u64) -> u8 {
    let base = (commits as i64 * 2).min(100);
    let penalty = (open_issues as i64).saturating_mul(5);
    (base - penalty).clamp(0, 100) as u8
}

/// "N hours ago" under a day, "N days ago" otherwise
pub fn relative_activity(last_update: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let hours = (now - last_update).num_hours().max(0);
    if hours < 24 {
        format!("{} hours ago", hours)
    } else {
        format!("{} days ago", hours / 24)
    }
}

#[derive(Debug, Clone)]
pub struct GithubClient {
    http: ReqwestClient,
    config: GithubConfig,
}

impl GithubClient {
    pub fn new(config: GithubConfig) -> Self {
        let http = ReqwestClient::builder()
            .timeout(config.timeout)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!("Falling back to default HTTP client: {}", e);
                ReqwestClient::new()
            });
        Self { http, config }
    }

    fn get(&self, url: &str) -> RequestBuilder {
        let request = self
            .http
            .get(url)
            .header(ACCEPT, "application/vnd.github.v3+json")
            .header(USER_AGENT, "mission-control");
        match &self.config.token {
            Some(token) => request.header(AUTHORIZATION, format!("Bearer {}", token)),
            None => request,
        }
    }

    async fn fetch<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T, GithubError> {
        let response = self.get(url).send().await?;
        if !response.status().is_success() {
            return Err(GithubError::Status(response.status()));
        }
        Ok(response.json().await?)
    }

    /// Most recently updated repositories of the configured user
    pub async fn repos(&self) -> Vec<GithubRepo> {
        let url = format!(
            "{}/users/{}/repos?sort=updated&per_page={}",
            self.config.api_base, self.config.user, REPO_LIMIT
        );
        match self.fetch(&url).await {
            Ok(repos) => repos,
            Err(e) => {
                tracing::warn!("GitHub API unavailable: {}", e);
                Vec::new()
            }
        }
    }

    /// Latest commits of one repository
    pub async fn commits(&self, repo: &str, limit: usize) -> Vec<GithubCommit> {
        let url = format!(
            "{}/repos/{}/{}/commits?per_page={}",
            self.config.api_base, self.config.user, repo, limit
        );
        match self.fetch(&url).await {
            Ok(commits) => commits,
            Err(e) => {
                tracing::warn!("Error fetching commits for {}: {}", repo, e);
                Vec::new()
            }
        }
    }

    /// Repositories with their commit activity folded into a progress value
    pub async fn projects(&self) -> Vec<ProjectSummary> {
        let repos = self.repos().await;
        let now = Utc::now();

        let summaries = repos.into_iter().map(|repo| async move {
            let commits = self.commits(&repo.name, COMMIT_LIMIT).await;
            let last_update = commits
                .first()
                .map(|c| c.commit.author.date)
                .unwrap_or(repo.updated_at);

            ProjectSummary {
                id: repo.name.clone(),
                name: repo.name,
                description: repo.description.unwrap_or_default(),
                progress: project_progress(commits.len(), repo.open_issues_count),
                github_url: repo.html_url,
                open_issues: repo.open_issues_count,
                commits: commits.len(),
                last_activity: relative_activity(last_update, now),
                tasks_completed: 0,
                tasks_total: 0,
            }
        });

        join_all(summaries).await
    }
}
