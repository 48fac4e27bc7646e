use crate::config::SupervisorConfig;
use crate::services::{ProcessManager, ProjectStore, SystemInspector};
use crate::utils::{platform_terminator, Terminator};
use std::sync::Arc;

/// Everything the exposed commands operate on.
pub struct AppState {
    pub config: SupervisorConfig,
    pub store: ProjectStore,
    pub inspector: SystemInspector,
    pub process_manager: ProcessManager,
}

impl AppState {
    pub fn new(config: SupervisorConfig) -> Self {
        let inspector = SystemInspector::new(config.listener_fallback);
        Self::with_parts(config, inspector, platform_terminator())
    }

    pub fn with_parts(
        config: SupervisorConfig,
        inspector: SystemInspector,
        terminator: Arc<dyn Terminator>,
    ) -> Self {
        Self {
            store: ProjectStore::new(config.projects_path()),
            process_manager: ProcessManager::new(terminator, config.log_capacity),
            inspector,
            config,
        }
    }
}
