use crate::error::Result;
use crate::models::UnifiedProcessEntry;
use crate::services::unified_process_table;
use crate::state::AppState;

pub async fn list_processes(state: &AppState) -> Result<Vec<UnifiedProcessEntry>> {
    unified_process_table(
        &state.inspector,
        &state.process_manager,
        &state.store,
        state.config.heavy_process_threshold_bytes(),
    )
    .await
}

/// Terminates any pid, managed or not. Best-effort: always succeeds.
pub async fn kill_process(state: &AppState, pid: u32) -> Result<()> {
    log::info!("[Commands] kill requested for pid {}", pid);
    state.process_manager.kill_pid(pid).await;
    Ok(())
}
