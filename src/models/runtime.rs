use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
}

impl LogEntry {
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            level,
            message: message.into(),
        }
    }
}

/// Lifecycle of a project's managed subprocess.
///
/// `Stopped -> Starting -> Running -> Stopping -> Stopped`; a restart is a
/// `Stopping` immediately followed by `Starting`. `Starting` and `Stopping`
/// only exist while the entry lock is held, so snapshots report `Stopped` or
/// `Running`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RunPhase {
    Stopped,
    Starting,
    Running,
    Stopping,
}

/// Point-in-time view of one project's runtime entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeSnapshot {
    pub project_id: String,
    pub phase: RunPhase,
    pub running: bool,
    pub pid: Option<u32>,
    pub active_script: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub log_count: usize,
}

impl RuntimeSnapshot {
    pub fn stopped(project_id: &str) -> Self {
        Self {
            project_id: project_id.to_string(),
            phase: RunPhase::Stopped,
            running: false,
            pid: None,
            active_script: None,
            started_at: None,
            log_count: 0,
        }
    }
}
