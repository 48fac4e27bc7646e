//! Supervisor for local dev projects: which processes listen on which ports,
//! a registry of script-driven projects, and the subprocesses started for them.

pub mod commands;
pub mod config;
pub mod error;
pub mod models;
pub mod services;
pub mod state;
pub mod utils;

pub use config::SupervisorConfig;
pub use error::{Result, SupervisorError};
pub use state::AppState;
