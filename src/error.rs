use serde::{Serialize, Serializer};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("project {0} not found")]
    NotFound(String),

    #[error("script `{script}` is not defined for project {project_id}")]
    ScriptNotFound { project_id: String, script: String },

    #[error("project {0} is not running")]
    NotRunning(String),

    #[error("failed to spawn `{command}`: {source}")]
    SpawnFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("process introspection failed: {0}")]
    IntrospectionFailed(String),

    /// One listener source failed; callers continue with the other sources.
    #[error("listener source {source_name} degraded: {reason}")]
    ListenerEnumerationDegraded { source_name: String, reason: String },

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("project store error: {0}")]
    Store(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, SupervisorError>;

// IPC/HTTP layers hand the message straight to the client.
impl Serialize for SupervisorError {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}
