use crate::error::{Result, SupervisorError};
use crate::models::{PathValidation, ProjectRecord};
use crate::services::project_store;
use crate::state::AppState;
use std::path::PathBuf;

pub async fn list_projects(state: &AppState) -> Result<Vec<ProjectRecord>> {
    state.store.list().await
}

pub async fn get_project(state: &AppState, project_id: &str) -> Result<ProjectRecord> {
    state.store.get(project_id).await
}

pub async fn add_project(
    state: &AppState,
    name: String,
    path: String,
    url: Option<String>,
    repo: Option<String>,
) -> Result<ProjectRecord> {
    if name.trim().is_empty() {
        return Err(SupervisorError::InvalidPath("project name is empty".to_string()));
    }
    if path.trim().is_empty() {
        return Err(SupervisorError::InvalidPath("project path is empty".to_string()));
    }

    state
        .store
        .add(name.trim().to_string(), PathBuf::from(path.trim()), url, repo)
        .await
}

/// Removes the record; a subprocess still running for it is stopped first.
pub async fn remove_project(state: &AppState, project_id: &str) -> Result<()> {
    match state.process_manager.stop(project_id).await {
        Ok(()) => log::info!("[Commands] stopped {} before removal", project_id),
        Err(SupervisorError::NotRunning(_)) => {}
        Err(e) => return Err(e),
    }
    state.store.remove(project_id).await
}

pub async fn validate_path(path: String) -> Result<PathValidation> {
    tokio::task::spawn_blocking(move || project_store::validate_path(&PathBuf::from(path)))
        .await
        .map_err(|e| SupervisorError::InvalidPath(e.to_string()))
}
