//! Client module
//!
//! This module provides client functionality to interact with the mission control API,
//! either over HTTP or directly against an in-process `Core`.

mod core;
mod http;
mod trait_def;

// Re-export the trait and types
pub use core::CoreClient;
pub use http::{ClientConfig, ClientError, HttpClientImpl};
pub use trait_def::Client;
