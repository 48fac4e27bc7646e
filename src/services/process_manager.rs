use crate::error::{Result, SupervisorError};
use crate::models::{LogEntry, LogLevel, ProjectRecord, RunPhase, RuntimeSnapshot};
use crate::utils::shell::shell_command;
use crate::utils::Terminator;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Child;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// How long an exit waits for its output readers to drain.
const OUTPUT_DRAIN_TIMEOUT: Duration = Duration::from_millis(500);

/// The subprocess a runtime entry currently owns. `generation` is unique per
/// spawn, so a late event from a replaced subprocess never matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ManagedHandle {
    pid: u32,
    generation: u64,
}

struct RuntimeEntry {
    handle: Option<ManagedHandle>,
    active_script: Option<String>,
    running: bool,
    phase: RunPhase,
    logs: VecDeque<LogEntry>,
    started_at: Option<DateTime<Utc>>,
    capacity: usize,
}

impl RuntimeEntry {
    fn new(capacity: usize) -> Self {
        Self {
            handle: None,
            active_script: None,
            running: false,
            phase: RunPhase::Stopped,
            logs: VecDeque::with_capacity(capacity.min(64)),
            started_at: None,
            capacity,
        }
    }

    fn push_log(&mut self, level: LogLevel, message: impl Into<String>) {
        while self.logs.len() >= self.capacity {
            self.logs.pop_front();
        }
        self.logs.push_back(LogEntry::new(level, message));
    }

    fn is_current(&self, generation: u64) -> bool {
        self.handle.map(|h| h.generation) == Some(generation)
    }

    fn snapshot(&self, project_id: &str) -> RuntimeSnapshot {
        RuntimeSnapshot {
            project_id: project_id.to_string(),
            phase: self.phase,
            running: self.running,
            pid: self.handle.map(|h| h.pid),
            active_script: self.active_script.clone(),
            started_at: self.started_at,
            log_count: self.logs.len(),
        }
    }
}

type SharedEntry = Arc<Mutex<RuntimeEntry>>;

/// Runtime registry and lifecycle manager for project subprocesses.
///
/// Holds at most one live subprocess per project id. Each id has its own
/// lock, held across terminate-then-spawn, so two handles for one id never
/// coexist in the registry. Entries are never removed; their logs outlive
/// individual runs.
pub struct ProcessManager {
    entries: Mutex<HashMap<String, SharedEntry>>,
    terminator: Arc<dyn Terminator>,
    log_capacity: usize,
    next_generation: AtomicU64,
}

impl ProcessManager {
    pub fn new(terminator: Arc<dyn Terminator>, log_capacity: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            terminator,
            log_capacity: log_capacity.max(1),
            next_generation: AtomicU64::new(1),
        }
    }

    async fn entry(&self, project_id: &str) -> SharedEntry {
        let mut entries = self.entries.lock().await;
        entries
            .entry(project_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(RuntimeEntry::new(self.log_capacity))))
            .clone()
    }

    async fn existing_entry(&self, project_id: &str) -> Option<SharedEntry> {
        self.entries.lock().await.get(project_id).cloned()
    }

    /// Starts `script_name` for `project`, replacing any subprocess it already
    /// owns. Returns the new pid.
    pub async fn run(&self, project: &ProjectRecord, script_name: &str) -> Result<u32> {
        let command = project
            .script(script_name)
            .ok_or_else(|| SupervisorError::ScriptNotFound {
                project_id: project.id.clone(),
                script: script_name.to_string(),
            })?
            .to_string();

        let entry = self.entry(&project.id).await;
        let mut state = entry.lock().await;

        if let Some(old) = state.handle.take() {
            log::info!(
                "[ProcessManager] {} already running as pid {}, terminating first",
                project.name,
                old.pid
            );
            state.phase = RunPhase::Stopping;
            state.running = false;
            self.terminator.terminate(old.pid).await;
        }

        state.phase = RunPhase::Starting;
        let mut child = match shell_command(&command, &project.path).spawn() {
            Ok(child) => child,
            Err(source) => {
                state.phase = RunPhase::Stopped;
                state.push_log(LogLevel::Error, format!("Failed to start `{}`: {}", command, source));
                log::error!("[ProcessManager] failed to start {}: {}", project.name, source);
                return Err(SupervisorError::SpawnFailed { command, source });
            }
        };

        let Some(pid) = child.id() else {
            state.phase = RunPhase::Stopped;
            return Err(SupervisorError::SpawnFailed {
                command,
                source: std::io::Error::other("process exited before it could be tracked"),
            });
        };

        let generation = self.next_generation.fetch_add(1, Ordering::SeqCst);
        state.handle = Some(ManagedHandle { pid, generation });
        state.running = true;
        state.phase = RunPhase::Running;
        state.active_script = Some(script_name.to_string());
        state.started_at = Some(Utc::now());
        state.push_log(
            LogLevel::Info,
            format!("Starting `{}` ({}) as pid {}", script_name, command, pid),
        );
        drop(state);

        log::info!(
            "[ProcessManager] started {} `{}` as pid {}",
            project.name,
            script_name,
            pid
        );

        let mut readers = Vec::new();
        if let Some(stdout) = child.stdout.take() {
            readers.push(stream_output(stdout, entry.clone(), generation, LogLevel::Info));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(stream_output(stderr, entry.clone(), generation, LogLevel::Error));
        }
        watch_exit(child, readers, entry, generation, project.name.clone());

        Ok(pid)
    }

    pub async fn stop(&self, project_id: &str) -> Result<()> {
        let entry = self
            .existing_entry(project_id)
            .await
            .ok_or_else(|| SupervisorError::NotRunning(project_id.to_string()))?;
        let mut state = entry.lock().await;

        let handle = state
            .handle
            .take()
            .ok_or_else(|| SupervisorError::NotRunning(project_id.to_string()))?;

        state.phase = RunPhase::Stopping;
        self.terminator.terminate(handle.pid).await;
        state.running = false;
        state.phase = RunPhase::Stopped;
        state.push_log(LogLevel::Warn, "Process stopped by user");

        log::info!("[ProcessManager] stopped {} (pid {})", project_id, handle.pid);
        Ok(())
    }

    /// Re-runs the active script of a live subprocess. Fails with
    /// `NotRunning` when the project has no live handle.
    pub async fn restart(&self, project: &ProjectRecord) -> Result<u32> {
        let entry = self
            .existing_entry(&project.id)
            .await
            .ok_or_else(|| SupervisorError::NotRunning(project.id.clone()))?;

        let script = {
            let state = entry.lock().await;
            if state.handle.is_none() {
                return Err(SupervisorError::NotRunning(project.id.clone()));
            }
            state
                .active_script
                .clone()
                .ok_or_else(|| SupervisorError::ScriptNotFound {
                    project_id: project.id.clone(),
                    script: String::new(),
                })?
        };

        log::info!("[ProcessManager] restarting {} `{}`", project.name, script);
        self.run(project, &script).await
    }

    pub async fn clear_logs(&self, project_id: &str) {
        if let Some(entry) = self.existing_entry(project_id).await {
            entry.lock().await.logs.clear();
        }
    }

    pub async fn logs(&self, project_id: &str) -> Vec<LogEntry> {
        match self.existing_entry(project_id).await {
            Some(entry) => entry.lock().await.logs.iter().cloned().collect(),
            None => Vec::new(),
        }
    }

    pub async fn snapshot(&self, project_id: &str) -> RuntimeSnapshot {
        match self.existing_entry(project_id).await {
            Some(entry) => entry.lock().await.snapshot(project_id),
            None => RuntimeSnapshot::stopped(project_id),
        }
    }

    /// pid -> project id for every entry that currently owns a live subprocess.
    pub async fn managed_pids(&self) -> HashMap<u32, String> {
        let entries: Vec<(String, SharedEntry)> = self
            .entries
            .lock()
            .await
            .iter()
            .map(|(id, entry)| (id.clone(), entry.clone()))
            .collect();

        let mut pids = HashMap::new();
        for (project_id, entry) in entries {
            let state = entry.lock().await;
            if let (true, Some(handle)) = (state.running, state.handle) {
                pids.insert(handle.pid, project_id);
            }
        }
        pids
    }

    /// Terminates an arbitrary pid; never fails. Init and the supervisor
    /// itself are left alone.
    pub async fn kill_pid(&self, pid: u32) {
        if pid <= 1 || pid == std::process::id() {
            log::warn!("[ProcessManager] refusing to terminate protected pid {}", pid);
            return;
        }
        self.terminator.terminate(pid).await;
    }

    /// Terminates every managed subprocess, e.g. on shutdown.
    pub async fn stop_all(&self) {
        let entries: Vec<SharedEntry> = self.entries.lock().await.values().cloned().collect();

        for entry in entries {
            let mut state = entry.lock().await;
            if let Some(handle) = state.handle.take() {
                self.terminator.terminate(handle.pid).await;
                state.running = false;
                state.phase = RunPhase::Stopped;
                state.push_log(LogLevel::Warn, "Process stopped on shutdown");
            }
        }
    }
}

/// Appends one log entry per non-empty line while the generation is current.
fn stream_output<R>(
    reader: R,
    entry: SharedEntry,
    generation: u64,
    level: LogLevel,
) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();

        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(_) => {}
            }

            let line = String::from_utf8_lossy(&buf);
            let line = line.trim_end_matches(['\n', '\r']);
            if line.trim().is_empty() {
                continue;
            }

            // Keep draining after a supersede so the child never blocks on a full pipe.
            let mut state = entry.lock().await;
            if state.is_current(generation) {
                state.push_log(level, line);
            }
        }
    })
}

fn watch_exit(
    mut child: Child,
    readers: Vec<JoinHandle<()>>,
    entry: SharedEntry,
    generation: u64,
    project_name: String,
) {
    tokio::spawn(async move {
        let status = child.wait().await;

        // A grandchild may hold the pipes open; don't wait on it forever.
        let _ = tokio::time::timeout(OUTPUT_DRAIN_TIMEOUT, async {
            for reader in readers {
                let _ = reader.await;
            }
        })
        .await;

        let mut state = entry.lock().await;
        if !state.is_current(generation) {
            log::debug!(
                "[ProcessManager] ignoring exit of superseded {} subprocess",
                project_name
            );
            return;
        }

        state.handle = None;
        state.running = false;
        state.phase = RunPhase::Stopped;

        let (level, message) = match status {
            Ok(status) => match status.code() {
                Some(0) => (LogLevel::Info, "Process exited with code 0".to_string()),
                Some(code) => (LogLevel::Error, format!("Process exited with code {}", code)),
                None => (LogLevel::Warn, "Process terminated by signal".to_string()),
            },
            Err(e) => (LogLevel::Error, format!("Failed to wait for process: {}", e)),
        };
        log::info!("[ProcessManager] {}: {}", project_name, message);
        state.push_log(level, message);
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_buffer_evicts_oldest_first() {
        let mut entry = RuntimeEntry::new(1000);
        for i in 1..=1001 {
            entry.push_log(LogLevel::Info, format!("line {}", i));
        }

        assert_eq!(entry.logs.len(), 1000);
        assert_eq!(entry.logs.front().unwrap().message, "line 2");
        assert_eq!(entry.logs.back().unwrap().message, "line 1001");
    }

    #[test]
    fn stale_generation_is_not_current() {
        let mut entry = RuntimeEntry::new(10);
        entry.handle = Some(ManagedHandle {
            pid: 42,
            generation: 2,
        });

        assert!(entry.is_current(2));
        assert!(!entry.is_current(1));
        entry.handle = None;
        assert!(!entry.is_current(2));
    }

    #[tokio::test]
    async fn unknown_project_reads_are_empty() {
        let manager = ProcessManager::new(crate::utils::platform_terminator(), 10);

        manager.clear_logs("ghost").await;
        assert!(manager.logs("ghost").await.is_empty());
        assert_eq!(manager.snapshot("ghost").await.phase, RunPhase::Stopped);
        assert!(matches!(
            manager.stop("ghost").await,
            Err(SupervisorError::NotRunning(_))
        ));
    }

    #[tokio::test]
    async fn missing_script_is_rejected() {
        let manager = ProcessManager::new(crate::utils::platform_terminator(), 10);
        let project = ProjectRecord::new("p".to_string(), std::env::temp_dir());

        let result = manager.run(&project, "dev").await;
        assert!(matches!(result, Err(SupervisorError::ScriptNotFound { .. })));
    }

    /// Records pids without signalling anything.
    #[derive(Default)]
    struct CountingTerminator {
        calls: std::sync::Mutex<Vec<u32>>,
    }

    #[async_trait::async_trait]
    impl Terminator for CountingTerminator {
        async fn terminate(&self, pid: u32) {
            self.calls.lock().unwrap().push(pid);
        }
    }

    #[tokio::test]
    async fn kill_pid_skips_init_and_self() {
        let terminator = Arc::new(CountingTerminator::default());
        let manager = ProcessManager::new(terminator.clone(), 10);

        manager.kill_pid(0).await;
        manager.kill_pid(1).await;
        manager.kill_pid(std::process::id()).await;
        assert!(terminator.calls.lock().unwrap().is_empty());

        manager.kill_pid(999_999).await;
        assert_eq!(*terminator.calls.lock().unwrap(), vec![999_999]);
    }

    #[tokio::test]
    async fn restart_without_previous_run_is_not_running() {
        let manager = ProcessManager::new(crate::utils::platform_terminator(), 10);
        let project = ProjectRecord::new("p".to_string(), std::env::temp_dir());

        assert!(matches!(
            manager.restart(&project).await,
            Err(SupervisorError::NotRunning(_))
        ));
    }

    #[cfg(unix)]
    mod unix {
        use super::*;
        use crate::utils::ProcessGroupTerminator;
        use async_trait::async_trait;
        use std::path::Path;

        /// Real termination plus a record of every pid it was asked to kill.
        #[derive(Default)]
        struct RecordingTerminator {
            calls: std::sync::Mutex<Vec<u32>>,
        }

        #[async_trait]
        impl Terminator for RecordingTerminator {
            async fn terminate(&self, pid: u32) {
                self.calls.lock().unwrap().push(pid);
                ProcessGroupTerminator.terminate(pid).await;
            }
        }

        fn project(dir: &Path, scripts: &[(&str, &str)]) -> ProjectRecord {
            let mut project = ProjectRecord::new("demo".to_string(), dir.to_path_buf());
            for (name, cmd) in scripts {
                project.scripts.insert(name.to_string(), cmd.to_string());
            }
            project
        }

        async fn wait_for<F>(manager: &ProcessManager, id: &str, done: F) -> RuntimeSnapshot
        where
            F: Fn(&RuntimeSnapshot) -> bool,
        {
            for _ in 0..250 {
                let snapshot = manager.snapshot(id).await;
                if done(&snapshot) {
                    return snapshot;
                }
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
            panic!("condition not reached for {}", id);
        }

        #[tokio::test]
        async fn run_then_stop_logs_user_stop() {
            let dir = tempfile::tempdir().unwrap();
            let terminator = Arc::new(RecordingTerminator::default());
            let manager = ProcessManager::new(terminator.clone(), 1000);
            let project = project(dir.path(), &[("dev", "sleep 30")]);

            let pid = manager.run(&project, "dev").await.unwrap();
            manager.stop(&project.id).await.unwrap();

            let snapshot = manager.snapshot(&project.id).await;
            assert!(!snapshot.running);
            assert_eq!(snapshot.phase, RunPhase::Stopped);
            assert_eq!(snapshot.active_script.as_deref(), Some("dev"));

            // Let the exit event land; it must not append after the stop notice.
            tokio::time::sleep(Duration::from_millis(200)).await;
            let logs = manager.logs(&project.id).await;
            let last = logs.last().unwrap();
            assert_eq!(last.level, LogLevel::Warn);
            assert!(last.message.contains("stopped by user"));

            assert_eq!(*terminator.calls.lock().unwrap(), vec![pid]);
            assert!(matches!(
                manager.stop(&project.id).await,
                Err(SupervisorError::NotRunning(_))
            ));
            assert!(manager.managed_pids().await.is_empty());
        }

        #[tokio::test]
        async fn second_run_replaces_first_handle() {
            let dir = tempfile::tempdir().unwrap();
            let terminator = Arc::new(RecordingTerminator::default());
            let manager = ProcessManager::new(terminator.clone(), 1000);
            let project = project(dir.path(), &[("dev", "sleep 30")]);

            let first = manager.run(&project, "dev").await.unwrap();
            let second = manager.run(&project, "dev").await.unwrap();
            assert_ne!(first, second);
            assert_eq!(*terminator.calls.lock().unwrap(), vec![first]);

            // The first child's exit arrives late and must not clear the second.
            tokio::time::sleep(Duration::from_millis(300)).await;
            let managed = manager.managed_pids().await;
            assert_eq!(managed.len(), 1);
            assert_eq!(managed.get(&second), Some(&project.id));
            assert_eq!(manager.snapshot(&project.id).await.pid, Some(second));

            manager.stop_all().await;
            assert!(manager.managed_pids().await.is_empty());
        }

        #[tokio::test]
        async fn output_lines_become_log_entries() {
            let dir = tempfile::tempdir().unwrap();
            let manager = ProcessManager::new(Arc::new(RecordingTerminator::default()), 1000);
            let project = project(
                dir.path(),
                &[("build", "echo compiled; echo; echo 'bad flag' >&2; exit 3")],
            );

            manager.run(&project, "build").await.unwrap();
            wait_for(&manager, &project.id, |s| !s.running).await;

            let logs = manager.logs(&project.id).await;
            let messages: Vec<&str> = logs.iter().map(|l| l.message.as_str()).collect();
            assert!(messages.contains(&"compiled"));
            assert!(!messages.contains(&""));

            let stderr = logs.iter().find(|l| l.message == "bad flag").unwrap();
            assert_eq!(stderr.level, LogLevel::Error);

            let last = logs.last().unwrap();
            assert_eq!(last.level, LogLevel::Error);
            assert_eq!(last.message, "Process exited with code 3");
        }

        #[tokio::test]
        async fn log_buffer_is_bounded_across_output() {
            let dir = tempfile::tempdir().unwrap();
            let manager = ProcessManager::new(Arc::new(RecordingTerminator::default()), 5);
            let project = project(dir.path(), &[("spam", "for i in 1 2 3 4 5 6 7 8; do echo line$i; done")]);

            manager.run(&project, "spam").await.unwrap();
            wait_for(&manager, &project.id, |s| !s.running).await;

            let logs = manager.logs(&project.id).await;
            let messages: Vec<&str> = logs.iter().map(|l| l.message.as_str()).collect();
            assert_eq!(
                messages,
                vec!["line5", "line6", "line7", "line8", "Process exited with code 0"]
            );

            manager.clear_logs(&project.id).await;
            assert!(manager.logs(&project.id).await.is_empty());
        }

        #[tokio::test]
        async fn restart_reuses_active_script() {
            let dir = tempfile::tempdir().unwrap();
            let terminator = Arc::new(RecordingTerminator::default());
            let manager = ProcessManager::new(terminator.clone(), 1000);
            let project = project(dir.path(), &[("serve", "sleep 30")]);

            let first = manager.run(&project, "serve").await.unwrap();
            let second = manager.restart(&project).await.unwrap();

            assert_ne!(first, second);
            let snapshot = manager.snapshot(&project.id).await;
            assert_eq!(snapshot.active_script.as_deref(), Some("serve"));
            assert_eq!(snapshot.pid, Some(second));

            manager.stop(&project.id).await.unwrap();
            assert!(matches!(
                manager.restart(&project).await,
                Err(SupervisorError::NotRunning(_))
            ));
            assert_eq!(manager.snapshot(&project.id).await.pid, None);
        }

        #[tokio::test]
        async fn snapshots_only_see_settled_phases() {
            let dir = tempfile::tempdir().unwrap();
            let manager = ProcessManager::new(Arc::new(RecordingTerminator::default()), 1000);
            let project = project(dir.path(), &[("serve", "sleep 30")]);

            manager.run(&project, "serve").await.unwrap();
            assert_eq!(manager.snapshot(&project.id).await.phase, RunPhase::Running);
            manager.restart(&project).await.unwrap();
            assert_eq!(manager.snapshot(&project.id).await.phase, RunPhase::Running);
            manager.stop(&project.id).await.unwrap();
            assert_eq!(manager.snapshot(&project.id).await.phase, RunPhase::Stopped);
        }

        #[tokio::test]
        async fn spawn_in_missing_directory_fails() {
            let dir = tempfile::tempdir().unwrap();
            let manager = ProcessManager::new(Arc::new(RecordingTerminator::default()), 1000);
            let project = project(&dir.path().join("gone"), &[("dev", "true")]);

            let result = manager.run(&project, "dev").await;

            assert!(matches!(result, Err(SupervisorError::SpawnFailed { .. })));
            let snapshot = manager.snapshot(&project.id).await;
            assert!(!snapshot.running);
            assert_eq!(manager.logs(&project.id).await.last().unwrap().level, LogLevel::Error);
        }
    }
}
