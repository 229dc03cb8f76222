//! Mission control library crate
//!
//! Goal forests with rolled-up progress, flat-file goal and task stores, an HTTP API over
//! them, and a GitHub-backed project feed.

pub mod api;
pub mod cli;
pub mod forest;
pub mod github;
pub mod models;
pub mod store;

pub use forest::{compute_progress, GoalForest, ProgressById};
pub use models::{Core, CoreError, GoalNode};
