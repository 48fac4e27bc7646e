use crate::error::{Result, SupervisorError};
use crate::models::{ListenerRecord, OsProcess, ProcessStatusTag};
use crate::services::listeners::{merge_listeners, platform_sources, ListenerSource};
use std::sync::{Arc, Mutex};
use sysinfo::{ProcessRefreshKind, ProcessStatus, ProcessesToUpdate, System, Users};

/// Substring rules checked in order against `name + command`, lowercased.
const TYPE_RULES: &[(&[&str], &str)] = &[
    (
        &[
            "vite", "webpack", "nodemon", "next dev", "next-server", "react-scripts", "ts-node",
            "npm run", "yarn", "pnpm",
        ],
        "Development",
    ),
    (&["node", "deno"], "Node.js"),
    (&["python"], "Python"),
    (&["java"], "Java"),
    (&["ruby", "rails", "puma"], "Ruby"),
    (&["php"], "PHP"),
    (&["dotnet"], ".NET"),
    (
        &["postgres", "mysqld", "mariadb", "mongod", "redis-server", "memcached", "elasticsearch"],
        "Database",
    ),
    (&["docker", "containerd", "podman"], "Container"),
];

/// Classifies a process that this supervisor does not own.
pub fn detect_type(name: &str, command: &str) -> &'static str {
    let haystack = format!("{} {}", name, command).to_lowercase();
    TYPE_RULES
        .iter()
        .find(|(needles, _)| needles.iter().any(|needle| haystack.contains(needle)))
        .map(|(_, tag)| *tag)
        .unwrap_or("System")
}

/// Anything unrecognised is reported as running.
pub fn map_status(raw_state: &str) -> ProcessStatusTag {
    match raw_state.to_ascii_lowercase().as_str() {
        "blocked" | "suspended" | "stopped" | "tracing" => ProcessStatusTag::Suspended,
        "zombie" => ProcessStatusTag::Zombie,
        _ => ProcessStatusTag::Running,
    }
}

fn raw_state(status: ProcessStatus) -> &'static str {
    match status {
        ProcessStatus::Run => "running",
        ProcessStatus::Sleep | ProcessStatus::Idle => "sleeping",
        ProcessStatus::Stop => "stopped",
        ProcessStatus::Tracing => "tracing",
        ProcessStatus::Zombie => "zombie",
        ProcessStatus::Dead => "dead",
        _ => "unknown",
    }
}

/// Host process table and listening sockets.
pub struct SystemInspector {
    // Kept across calls so CPU usage is measured between two refreshes.
    system: Arc<Mutex<System>>,
    primary: Arc<dyn ListenerSource>,
    fallback: Option<Arc<dyn ListenerSource>>,
}

impl SystemInspector {
    pub fn new(fallback_enabled: bool) -> Self {
        let (primary, fallback) = platform_sources(fallback_enabled);
        Self::with_sources(Arc::from(primary), fallback.map(Arc::from))
    }

    pub fn with_sources(
        primary: Arc<dyn ListenerSource>,
        fallback: Option<Arc<dyn ListenerSource>>,
    ) -> Self {
        Self {
            system: Arc::new(Mutex::new(System::new())),
            primary,
            fallback,
        }
    }

    pub async fn list_processes(&self) -> Result<Vec<OsProcess>> {
        let system = self.system.clone();

        tokio::task::spawn_blocking(move || {
            let mut system = system.lock().map_err(|_| {
                SupervisorError::IntrospectionFailed("process table lock poisoned".to_string())
            })?;
            system.refresh_processes_specifics(
                ProcessesToUpdate::All,
                true,
                ProcessRefreshKind::everything(),
            );
            let users = Users::new_with_refreshed_list();

            let processes: Vec<OsProcess> = system
                .processes()
                .iter()
                .filter(|(_, process)| process.thread_kind().is_none())
                .map(|(pid, process)| {
                    let name = process.name().to_string_lossy().to_string();
                    let command = process
                        .cmd()
                        .iter()
                        .map(|arg| arg.to_string_lossy())
                        .collect::<Vec<_>>()
                        .join(" ");
                    let user = process
                        .user_id()
                        .and_then(|uid| users.get_user_by_id(uid))
                        .map(|u| u.name().to_string());

                    OsProcess {
                        pid: pid.as_u32(),
                        command: if command.is_empty() { name.clone() } else { command },
                        name,
                        cpu: process.cpu_usage(),
                        memory_bytes: process.memory(),
                        state: raw_state(process.status()).to_string(),
                        user,
                    }
                })
                .collect();

            if processes.is_empty() {
                return Err(SupervisorError::IntrospectionFailed(
                    "process table is empty".to_string(),
                ));
            }
            Ok(processes)
        })
        .await
        .map_err(|e| SupervisorError::IntrospectionFailed(e.to_string()))?
    }

    /// Primary and fallback listeners merged by (pid, port). A failing source
    /// is logged and contributes nothing.
    pub async fn list_listeners(&self) -> Vec<ListenerRecord> {
        let primary = Self::collect(self.primary.clone()).await;
        let fallback = match &self.fallback {
            Some(source) => Self::collect(source.clone()).await,
            None => Vec::new(),
        };
        merge_listeners(primary, fallback)
    }

    async fn collect(source: Arc<dyn ListenerSource>) -> Vec<ListenerRecord> {
        let name = source.name();
        let result = tokio::task::spawn_blocking(move || source.listeners())
            .await
            .unwrap_or_else(|e| {
                Err(SupervisorError::ListenerEnumerationDegraded {
                    source_name: name.to_string(),
                    reason: e.to_string(),
                })
            });

        match result {
            Ok(listeners) => {
                log::debug!("[Inspector] {} reported {} listeners", name, listeners.len());
                listeners
            }
            Err(e) => {
                log::warn!("[Inspector] {}", e);
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedSource(Vec<ListenerRecord>);

    impl ListenerSource for FixedSource {
        fn name(&self) -> &'static str {
            "fixed"
        }

        fn listeners(&self) -> Result<Vec<ListenerRecord>> {
            Ok(self.0.clone())
        }
    }

    struct BrokenSource;

    impl ListenerSource for BrokenSource {
        fn name(&self) -> &'static str {
            "broken"
        }

        fn listeners(&self) -> Result<Vec<ListenerRecord>> {
            Err(crate::services::listeners::degraded("broken", "no such tool"))
        }
    }

    fn listener(pid: u32, port: u16) -> ListenerRecord {
        ListenerRecord {
            pid,
            port,
            address: "0.0.0.0".to_string(),
            state: "LISTEN".to_string(),
        }
    }

    #[test]
    fn detect_type_follows_rule_order() {
        assert_eq!(detect_type("node", "node node_modules/.bin/vite"), "Development");
        assert_eq!(detect_type("node", "node server.js"), "Node.js");
        assert_eq!(detect_type("python3", "python3 -m http.server"), "Python");
        assert_eq!(detect_type("postgres", "postgres -D /var/lib/pg"), "Database");
        assert_eq!(detect_type("dockerd", "/usr/bin/dockerd"), "Container");
        assert_eq!(detect_type("sshd", "/usr/sbin/sshd -D"), "System");
    }

    #[test]
    fn map_status_fails_open() {
        assert_eq!(map_status("running"), ProcessStatusTag::Running);
        assert_eq!(map_status("sleeping"), ProcessStatusTag::Running);
        assert_eq!(map_status("unknown"), ProcessStatusTag::Running);
        assert_eq!(map_status(""), ProcessStatusTag::Running);
        assert_eq!(map_status("blocked"), ProcessStatusTag::Suspended);
        assert_eq!(map_status("Suspended"), ProcessStatusTag::Suspended);
        assert_eq!(map_status("zombie"), ProcessStatusTag::Zombie);
    }

    #[tokio::test]
    async fn failing_fallback_keeps_primary_results() {
        let inspector = SystemInspector::with_sources(
            Arc::new(FixedSource(vec![listener(1, 3000)])),
            Some(Arc::new(BrokenSource)),
        );

        let listeners = inspector.list_listeners().await;
        assert_eq!(listeners, vec![listener(1, 3000)]);
    }

    #[tokio::test]
    async fn duplicate_pairs_across_sources_collapse() {
        let inspector = SystemInspector::with_sources(
            Arc::new(FixedSource(vec![listener(1, 3000), listener(1, 80)])),
            Some(Arc::new(FixedSource(vec![listener(1, 3000), listener(2, 5432)]))),
        );

        let listeners = inspector.list_listeners().await;
        assert_eq!(listeners.len(), 3);
    }

    #[tokio::test]
    async fn lists_current_process() {
        let inspector = SystemInspector::with_sources(Arc::new(FixedSource(Vec::new())), None);

        let processes = inspector.list_processes().await.unwrap();
        assert!(processes.iter().any(|p| p.pid == std::process::id()));
    }
}
