use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One row of the host process table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OsProcess {
    pub pid: u32,
    pub name: String,
    pub command: String,
    pub cpu: f32,
    pub memory_bytes: u64,
    /// Lowercase scheduler state as reported by the OS ("running", "sleeping", ...).
    pub state: String,
    pub user: Option<String>,
}

/// A socket in the listening state and the pid that owns it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ListenerRecord {
    pub pid: u32,
    pub port: u16,
    pub address: String,
    pub state: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ProcessStatusTag {
    Running,
    Suspended,
    Zombie,
}

/// A process as shown to clients: OS data joined with supervisor ownership.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnifiedProcessEntry {
    pub pid: u32,
    pub name: String,
    /// 0 when no listener was found.
    pub port: u16,
    #[serde(rename = "type")]
    pub kind: String,
    pub address: String,
    pub user: String,
    pub status: ProcessStatusTag,
    pub memory_mb: f64,
    pub cpu: f32,
    pub command: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
}

impl UnifiedProcessEntry {
    pub fn is_managed(&self) -> bool {
        self.project_id.is_some()
    }
}
