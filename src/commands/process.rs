use crate::error::Result;
use crate::models::{LogEntry, RuntimeSnapshot};
use crate::state::AppState;

pub async fn run_project(state: &AppState, project_id: &str, script: &str) -> Result<u32> {
    let project = state.store.get(project_id).await?;
    state.process_manager.run(&project, script).await
}

pub async fn stop_project(state: &AppState, project_id: &str) -> Result<()> {
    state.process_manager.stop(project_id).await
}

pub async fn restart_project(state: &AppState, project_id: &str) -> Result<u32> {
    let project = state.store.get(project_id).await?;
    state.process_manager.restart(&project).await
}

pub async fn clear_project_logs(state: &AppState, project_id: &str) -> Result<()> {
    state.process_manager.clear_logs(project_id).await;
    Ok(())
}

pub async fn project_logs(state: &AppState, project_id: &str) -> Result<Vec<LogEntry>> {
    Ok(state.process_manager.logs(project_id).await)
}

pub async fn project_status(state: &AppState, project_id: &str) -> Result<RuntimeSnapshot> {
    Ok(state.process_manager.snapshot(project_id).await)
}

pub async fn stop_all_projects(state: &AppState) -> Result<()> {
    state.process_manager.stop_all().await;
    Ok(())
}
