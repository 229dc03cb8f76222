//! CLI module
//!
//! This module provides the command-line interface for mission control: the server, goal
//! and task commands against a running server, and an offline rollup of a goal file.

use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use colored::Colorize;
use serde_json::{json, Value};

use crate::{
    api::{serve, Client, ClientConfig, ClientError, HttpClientImpl, ServerConfig},
    forest::{self, GoalForest, ProgressById},
    github::{GithubClient, GithubConfig, ProjectSummary},
    models::{Core, GoalCategory, GoalHorizon, GoalNode, NewTask, Task, TaskPatch, TaskPriority, TaskStatus},
    store::{self, JsonGoalStore, JsonTaskStore, MemoryGoalStore, MemoryTaskStore},
};

const GOAL_FILE_NAME: &str = "goal-tree.json";
const TASK_FILE_NAME: &str = "tasks.json";

#[derive(Parser)]
#[command(name = "mission-control", author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// API server URL
    #[arg(short, long, default_value = "http://localhost:3000", env = "MISSION_CONTROL_SERVER")]
    server: String,
}

/// Where the goal and task files live
#[derive(Args, Debug, Clone, Default)]
pub struct StoreArgs {
    /// Goal document to use before falling back to the local data directory
    #[arg(long, env = "MISSION_CONTROL_GOALS_FILE")]
    goals_file: Option<PathBuf>,

    /// Directory holding the preferred goal document
    #[arg(long, env = "MISSION_CONTROL_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Local data directory for the fallback goal document and the task list
    #[arg(long, default_value = "data")]
    fallback_dir: PathBuf,
}

/// Resolved store locations
#[derive(Debug, Clone, PartialEq)]
pub struct StorePaths {
    pub preferred_goals: Option<PathBuf>,
    pub fallback_goals: PathBuf,
    pub tasks: PathBuf,
}

impl StoreArgs {
    /// An explicit goals file wins over a data directory
    pub fn resolve(&self) -> StorePaths {
        let preferred_goals = self
            .goals_file
            .clone()
            .or_else(|| self.data_dir.as_ref().map(|dir| dir.join(GOAL_FILE_NAME)));

        StorePaths {
            preferred_goals,
            fallback_goals: self.fallback_dir.join(GOAL_FILE_NAME),
            tasks: self.fallback_dir.join(TASK_FILE_NAME),
        }
    }
}

/// GitHub feed settings
#[derive(Args, Debug, Clone, Default)]
pub struct GithubArgs {
    /// GitHub user whose repositories become projects
    #[arg(long, env = "GITHUB_USER")]
    github_user: Option<String>,

    /// Token for authenticated GitHub requests
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    github_token: Option<String>,
}

impl GithubArgs {
    pub fn config(&self) -> Option<GithubConfig> {
        let user = self.github_user.as_deref().filter(|u| !u.is_empty())?;
        Some(GithubConfig::new(user, self.github_token.clone()))
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Start the mission control API server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value_t = 3000)]
        port: u16,

        /// Keep goals and tasks in memory only, seeded with the default goals
        #[arg(long)]
        ephemeral: bool,

        #[command(flatten)]
        store: StoreArgs,

        #[command(flatten)]
        github: GithubArgs,
    },

    /// Show the goal tree with rolled-up progress
    Goals,

    /// Goal management commands
    Goal {
        #[command(subcommand)]
        command: GoalCommands,
    },

    /// Compute rolled-up progress for a goal file without a server
    Progress {
        /// Path to a goal document ({"goals": [...]})
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Task management commands
    Task {
        #[command(subcommand)]
        command: TaskCommands,
    },

    /// List GitHub projects
    Projects,

    /// Generate shell completions
    Completions {
        /// The shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Subcommand)]
enum GoalCommands {
    /// Add a new goal
    Add {
        /// Goal title
        title: String,

        /// Parent goal id
        #[arg(short, long)]
        parent: Option<String>,

        /// personal or work
        #[arg(short, long)]
        category: Option<GoalCategory>,

        /// now, 2w, 6m, 1y or long
        #[arg(long)]
        horizon: Option<GoalHorizon>,

        /// Own progress (0-100)
        #[arg(long)]
        progress: Option<f64>,

        #[arg(long)]
        why: Option<String>,

        #[arg(long)]
        metric: Option<String>,

        #[arg(long)]
        deadline: Option<String>,
    },

    /// Edit an existing goal
    Edit {
        /// Goal id
        id: String,

        #[arg(long)]
        title: Option<String>,

        /// New parent id; an empty string makes the goal a root
        #[arg(short, long)]
        parent: Option<String>,

        #[arg(short, long)]
        category: Option<GoalCategory>,

        #[arg(long)]
        horizon: Option<GoalHorizon>,

        /// Own progress (0-100)
        #[arg(long)]
        progress: Option<f64>,

        /// Fixed progress that replaces the rollup of the goal's children
        #[arg(long = "override", conflicts_with = "clear_override")]
        progress_override: Option<f64>,

        /// Go back to computing progress from children
        #[arg(long)]
        clear_override: bool,

        #[arg(long)]
        why: Option<String>,

        #[arg(long)]
        metric: Option<String>,

        #[arg(long)]
        deadline: Option<String>,
    },

    /// Remove a goal; its children move up to its parent
    Remove {
        /// Goal id
        id: String,
    },
}

#[derive(Subcommand)]
enum TaskCommands {
    /// List tasks
    List {
        /// Only tasks of this project
        #[arg(short, long)]
        project: Option<String>,
    },

    /// Add a new task
    Add {
        /// Project id
        project: String,

        /// Task title
        title: String,

        #[arg(short, long)]
        description: Option<String>,

        /// low, medium or high
        #[arg(long)]
        priority: Option<TaskPriority>,

        #[arg(long)]
        due: Option<String>,
    },

    /// Move a task to another column
    Status {
        /// Task id
        id: String,

        /// todo, inprogress or done
        status: TaskStatus,
    },

    /// Remove a task
    Remove {
        /// Task id
        id: String,
    },
}

/// Run the CLI application
pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match &cli.command {
        Commands::Serve {
            port,
            ephemeral,
            store,
            github,
        } => {
            println!("Starting mission control API server on port {}...", port);

            let core = if *ephemeral {
                println!("Running with in-memory stores; nothing will be saved.");
                Core::new(
                    Arc::new(MemoryGoalStore::seeded()),
                    Arc::new(MemoryTaskStore::default()),
                )
            } else {
                let paths = store.resolve();
                Core::new(
                    Arc::new(JsonGoalStore::new(
                        paths.preferred_goals,
                        paths.fallback_goals,
                    )),
                    Arc::new(JsonTaskStore::new(paths.tasks)),
                )
            };

            let core = match github.config() {
                Some(config) => core.with_github(GithubClient::new(config)),
                None => core,
            };

            let config = ServerConfig {
                address: ([127, 0, 0, 1], *port).into(),
            };

            serve(core, config).await?;
            Ok(())
        }

        Commands::Goals => {
            let client = create_client(&cli.server);
            let tree = client.goal_tree().await?;

            println!("{} {}", "Goals".bold(), format!("({})", tree.data_file).dimmed());
            if tree.used_fallback {
                println!("{}", "Using the fallback goal file".yellow());
            }
            if let Some(warning) = &tree.warning {
                println!("{}", warning.yellow());
            }
            print_goal_tree(&tree.goals, &tree.progress);
            Ok(())
        }

        Commands::Goal { command } => {
            let client = create_client(&cli.server);
            match command {
                GoalCommands::Add {
                    title,
                    parent,
                    category,
                    horizon,
                    progress,
                    why,
                    metric,
                    deadline,
                } => {
                    let goal = json!({
                        "title": title,
                        "parentId": parent,
                        "category": category.unwrap_or_default().as_str(),
                        "horizon": horizon.unwrap_or_default().as_str(),
                        "progress": progress.unwrap_or(0.0),
                        "why": why.clone().unwrap_or_default(),
                        "metric": metric.clone().unwrap_or_default(),
                        "deadline": deadline.clone().unwrap_or_default(),
                    });
                    let saved = client.save_goal(goal).await?;
                    println!("Added goal \"{}\" with id {}", saved.title, saved.id.cyan());
                    Ok(())
                }

                GoalCommands::Edit {
                    id,
                    title,
                    parent,
                    category,
                    horizon,
                    progress,
                    progress_override,
                    clear_override,
                    why,
                    metric,
                    deadline,
                } => {
                    let tree = client.goal_tree().await?;
                    let existing = tree
                        .goals
                        .iter()
                        .find(|g| &g.id == id)
                        .ok_or_else(|| format!("Goal '{}' not found", id))?;

                    let mut goal = serde_json::to_value(existing)?;
                    let fields = [
                        ("title", title.clone().map(Value::from)),
                        ("parentId", parent.clone().map(Value::from)),
                        ("category", category.map(|c| Value::from(c.as_str()))),
                        ("horizon", horizon.map(|h| Value::from(h.as_str()))),
                        ("progress", progress.map(Value::from)),
                        ("progressOverride", progress_override.map(Value::from)),
                        ("why", why.clone().map(Value::from)),
                        ("metric", metric.clone().map(Value::from)),
                        ("deadline", deadline.clone().map(Value::from)),
                    ];
                    for (name, value) in fields {
                        if let Some(value) = value {
                            goal[name] = value;
                        }
                    }
                    if *clear_override {
                        goal["progressOverride"] = Value::Null;
                    }

                    let saved = client.save_goal(goal).await?;
                    println!("Updated goal \"{}\" ({})", saved.title, saved.id.cyan());
                    Ok(())
                }

                GoalCommands::Remove { id } => {
                    let saved = client.delete_goal(id).await?;
                    println!(
                        "Removed goal {}; {} goals remain in {}",
                        id.cyan(),
                        saved.goals.len(),
                        saved.data_file
                    );
                    Ok(())
                }
            }
        }

        Commands::Progress { file } => {
            let (goals, warning) = load_goal_file(file)?;
            if let Some(warning) = warning {
                eprintln!("{}", warning.yellow());
            }
            let progress = forest::progress_for(&goals);
            print_goal_tree(&goals, &progress);
            Ok(())
        }

        Commands::Task { command } => {
            let client = create_client(&cli.server);
            match command {
                TaskCommands::List { project } => {
                    let tasks = client.list_tasks(project.as_deref()).await?;
                    print_tasks(&tasks);
                    Ok(())
                }

                TaskCommands::Add {
                    project,
                    title,
                    description,
                    priority,
                    due,
                } => {
                    let task = client
                        .create_task(NewTask {
                            project_id: project.clone(),
                            title: title.clone(),
                            description: description.clone(),
                            status: None,
                            priority: *priority,
                            due_date: due.clone(),
                        })
                        .await?;
                    println!("Added task \"{}\" with id {}", task.title, task.id.cyan());
                    Ok(())
                }

                TaskCommands::Status { id, status } => {
                    let patch = TaskPatch {
                        status: Some(*status),
                        ..Default::default()
                    };
                    match client.update_task(id, patch).await {
                        Ok(task) => {
                            println!("Task \"{}\" is now {}", task.title, task.status);
                            Ok(())
                        }
                        Err(ClientError::NotFound(msg)) => {
                            println!("{}", msg.red());
                            Ok(())
                        }
                        Err(e) => Err(e.into()),
                    }
                }

                TaskCommands::Remove { id } => {
                    client.delete_task(id).await?;
                    println!("Removed task {}", id.cyan());
                    Ok(())
                }
            }
        }

        Commands::Projects => {
            let client = create_client(&cli.server);
            let projects = client.projects().await?;
            print_projects(&projects);
            Ok(())
        }

        Commands::Completions { shell } => {
            // Generate completions for the specified shell
            let mut cmd = Cli::command();
            let bin_name = cmd.get_name().to_string();
            generate(*shell, &mut cmd, bin_name, &mut io::stdout());
            Ok(())
        }
    }
}

fn create_client(server_url: &str) -> HttpClientImpl {
    let config = ClientConfig {
        base_url: server_url.to_string(),
    };

    HttpClientImpl::with_config(config)
}

/// Reads a goal document from disk, sanitizing it the same way the server does
pub fn load_goal_file(path: &Path) -> io::Result<(Vec<GoalNode>, Option<String>)> {
    let raw = std::fs::read_to_string(path)?;
    Ok(store::parse_goal_document(&raw))
}

/// `[#####-----]` style bar for a progress value
fn progress_bar(value: f64) -> String {
    let filled = (value.clamp(0.0, 100.0) / 10.0).round() as usize;
    format!("[{}{}]", "#".repeat(filled), "-".repeat(10 - filled))
}

fn colored_percent(value: f64) -> String {
    let text = format!("{:>3}%", value.round());
    if value >= 70.0 {
        text.green().to_string()
    } else if value >= 40.0 {
        text.yellow().to_string()
    } else {
        text.red().to_string()
    }
}

fn goal_line(goal: &GoalNode, progress: &ProgressById) -> String {
    let value = progress.get(&goal.id).copied().unwrap_or(0.0);
    let marker = if goal.is_overridden() { " (override)" } else { "" };
    format!(
        "{} {} {} {}{}",
        progress_bar(value),
        colored_percent(value),
        goal.title.bold(),
        format!("[{} · {} · {}]", goal.id, goal.horizon.label(), goal.category.label()).dimmed(),
        marker.magenta()
    )
}

/// Prints the forest from its roots, then any goals only reachable through a parent cycle
fn print_goal_tree(goals: &[GoalNode], progress: &ProgressById) {
    let forest = GoalForest::build(goals);
    if forest.is_empty() {
        println!("  No goals yet. Add some with 'mission-control goal add'");
        return;
    }

    let walked = forest.walk();
    for (depth, goal) in &walked {
        println!("{}{}", "  ".repeat(*depth), goal_line(goal, progress));
    }
    let printed: HashSet<&str> = walked.iter().map(|(_, g)| g.id.as_str()).collect();

    let detached: Vec<&GoalNode> = goals
        .iter()
        .filter(|g| !printed.contains(g.id.as_str()))
        .collect();
    if !detached.is_empty() {
        println!("\n{}", "Detached goals (parent cycle):".yellow());
        for goal in detached {
            println!("  {}", goal_line(goal, progress));
        }
    }
}

fn print_tasks(tasks: &[Task]) {
    if tasks.is_empty() {
        println!("No tasks. Add one with 'mission-control task add <project> <title>'");
        return;
    }

    for task in tasks {
        let status = match task.status {
            TaskStatus::Todo => "[ ]".normal(),
            TaskStatus::InProgress => "[~]".yellow(),
            TaskStatus::Done => "[✓]".green(),
        };
        let priority = task
            .priority
            .map(|p| format!(" ({:?})", p).to_lowercase())
            .unwrap_or_default();
        println!(
            "{} {}{} {}",
            status,
            task.title,
            priority,
            format!("[{} · {}]", task.project_id, task.id).dimmed()
        );
    }
}

fn print_projects(projects: &[ProjectSummary]) {
    if projects.is_empty() {
        println!("No projects. Start the server with --github-user to load GitHub repositories.");
        return;
    }

    for project in projects {
        println!(
            "{} {} {}",
            progress_bar(project.progress as f64),
            project.name.bold(),
            format!(
                "({}/{} tasks, {} commits, {} open issues, {})",
                project.tasks_completed,
                project.tasks_total,
                project.commits,
                project.open_issues,
                project.last_activity
            )
            .dimmed()
        );
        if !project.description.is_empty() {
            println!("    {}", project.description);
        }
    }
}
