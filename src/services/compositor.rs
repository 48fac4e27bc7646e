use crate::error::Result;
use crate::models::{ListenerRecord, OsProcess, UnifiedProcessEntry};
use crate::services::introspection::{detect_type, map_status, SystemInspector};
use crate::services::process_manager::ProcessManager;
use crate::services::project_store::ProjectStore;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

/// Ports at or below this are system services; a dev server's port is preferred.
const PRIVILEGED_PORT_MAX: u16 = 1024;

/// What the compositor knows about a pid this supervisor spawned.
#[derive(Debug, Clone)]
pub struct ManagedProject {
    pub project_id: String,
    /// `None` when the project was removed while its subprocess kept running.
    pub name: Option<String>,
    pub path: Option<PathBuf>,
}

/// Joins the OS view with registry ownership into one row per pid.
pub fn composite(
    processes: Vec<OsProcess>,
    listeners: Vec<ListenerRecord>,
    managed: &HashMap<u32, ManagedProject>,
    heavy_threshold_bytes: u64,
) -> Vec<UnifiedProcessEntry> {
    let mut by_pid: HashMap<u32, Vec<ListenerRecord>> = HashMap::new();
    let mut seen_pairs = HashSet::new();
    for listener in listeners {
        if seen_pairs.insert((listener.pid, listener.port)) {
            by_pid.entry(listener.pid).or_default().push(listener);
        }
    }

    let mut seen_pids = HashSet::new();
    let mut entries: Vec<UnifiedProcessEntry> = processes
        .into_iter()
        .filter(|p| seen_pids.insert(p.pid))
        .filter(|p| {
            by_pid.contains_key(&p.pid)
                || p.memory_bytes > heavy_threshold_bytes
                || managed.contains_key(&p.pid)
        })
        .map(|process| {
            let listener = by_pid.get(&process.pid).and_then(|ls| {
                ls.iter()
                    .find(|l| l.port > PRIVILEGED_PORT_MAX)
                    .or_else(|| ls.first())
            });
            let owner = managed.get(&process.pid);

            let (name, kind) = match owner {
                Some(owner) => (
                    owner.name.clone().unwrap_or_else(|| process.name.clone()),
                    "Development".to_string(),
                ),
                None => (
                    process.name.clone(),
                    detect_type(&process.name, &process.command).to_string(),
                ),
            };

            UnifiedProcessEntry {
                pid: process.pid,
                name,
                port: listener.map(|l| l.port).unwrap_or(0),
                kind,
                address: listener.map(|l| l.address.clone()).unwrap_or_default(),
                user: process.user.clone().unwrap_or_else(|| "unknown".to_string()),
                status: map_status(&process.state),
                memory_mb: (process.memory_bytes as f64 / (1024.0 * 1024.0) * 10.0).round() / 10.0,
                cpu: process.cpu,
                command: process.command,
                project_path: owner.and_then(|o| o.path.clone()),
                project_id: owner.map(|o| o.project_id.clone()),
            }
        })
        .collect();

    entries.sort_by(|a, b| {
        b.is_managed()
            .cmp(&a.is_managed())
            .then((b.port != 0).cmp(&(a.port != 0)))
            .then(b.memory_mb.total_cmp(&a.memory_mb))
    });
    entries
}

/// Gathers every source and builds the unified table.
///
/// A failed process listing is fatal; listener and project-store trouble
/// only degrades the result.
pub async fn unified_process_table(
    inspector: &SystemInspector,
    process_manager: &ProcessManager,
    store: &ProjectStore,
    heavy_threshold_bytes: u64,
) -> Result<Vec<UnifiedProcessEntry>> {
    let (processes, listeners, managed_pids) = tokio::join!(
        inspector.list_processes(),
        inspector.list_listeners(),
        process_manager.managed_pids()
    );
    let processes = processes?;

    let projects = if managed_pids.is_empty() {
        Vec::new()
    } else {
        store.list().await.unwrap_or_else(|e| {
            log::warn!("[Compositor] project names unavailable: {}", e);
            Vec::new()
        })
    };

    let managed: HashMap<u32, ManagedProject> = managed_pids
        .into_iter()
        .map(|(pid, project_id)| {
            let project = projects.iter().find(|p| p.id == project_id);
            let owner = ManagedProject {
                name: project.map(|p| p.name.clone()),
                path: project.map(|p| p.path.clone()),
                project_id,
            };
            (pid, owner)
        })
        .collect();

    Ok(composite(processes, listeners, &managed, heavy_threshold_bytes))
}
