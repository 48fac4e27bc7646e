use async_trait::async_trait;
use std::sync::Arc;

/// Best-effort termination of a process and everything it spawned.
///
/// Implementations never fail: a target that already exited counts as
/// terminated.
#[async_trait]
pub trait Terminator: Send + Sync {
    async fn terminate(&self, pid: u32);
}

/// Picks the backend for the host platform once, at startup.
pub fn platform_terminator() -> Arc<dyn Terminator> {
    #[cfg(target_os = "windows")]
    {
        Arc::new(TaskkillTerminator)
    }

    #[cfg(not(target_os = "windows"))]
    {
        Arc::new(ProcessGroupTerminator)
    }
}

/// POSIX backend: signals the process group led by `pid`, then `pid` alone
/// if the group cannot be signalled.
#[cfg(unix)]
pub struct ProcessGroupTerminator;

#[cfg(unix)]
#[async_trait]
impl Terminator for ProcessGroupTerminator {
    async fn terminate(&self, pid: u32) {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        let Some(raw) = group_leader(pid) else {
            log::warn!("[ProcessKiller] refusing to signal pid {}", pid);
            return;
        };

        match kill(Pid::from_raw(-raw), Signal::SIGTERM) {
            Ok(()) => log::debug!("[ProcessKiller] sent SIGTERM to group {}", raw),
            Err(group_err) => {
                log::debug!(
                    "[ProcessKiller] group {} not signalled ({}), falling back to pid",
                    raw,
                    group_err
                );
                if let Err(e) = kill(Pid::from_raw(raw), Signal::SIGTERM) {
                    log::debug!("[ProcessKiller] pid {} not signalled: {}", raw, e);
                }
            }
        }
    }
}

/// The pid as a signal target. 0 and 1 are refused: their negation addresses
/// the caller's own group or every process on the host.
#[cfg(unix)]
fn group_leader(pid: u32) -> Option<i32> {
    i32::try_from(pid).ok().filter(|raw| *raw > 1)
}

/// Windows backend: `taskkill /T /F` over the whole tree.
pub struct TaskkillTerminator;

#[async_trait]
impl Terminator for TaskkillTerminator {
    async fn terminate(&self, pid: u32) {
        let result = crate::utils::shell::native_command_async("taskkill")
            .args(["/PID", &pid.to_string(), "/T", "/F"])
            .output()
            .await;

        match result {
            Ok(output) if output.status.success() => {
                log::debug!("[ProcessKiller] taskkill removed tree {}", pid)
            }
            // Non-zero usually means the target already exited.
            Ok(output) => log::debug!(
                "[ProcessKiller] taskkill {} exited with {:?}: {}",
                pid,
                output.status.code(),
                String::from_utf8_lossy(&output.stderr).trim()
            ),
            Err(e) => log::warn!("[ProcessKiller] failed to run taskkill for {}: {}", pid, e),
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::utils::shell::shell_command;
    use std::time::Duration;

    #[tokio::test]
    async fn terminates_whole_group() {
        let dir = tempfile::tempdir().unwrap();
        let mut child = shell_command("sleep 30 & sleep 30; wait", dir.path())
            .spawn()
            .unwrap();
        let pid = child.id().unwrap();

        ProcessGroupTerminator.terminate(pid).await;

        let status = tokio::time::timeout(Duration::from_secs(5), child.wait())
            .await
            .expect("shell should exit after SIGTERM")
            .unwrap();
        assert!(!status.success());
    }

    #[test]
    fn broadcast_pids_are_never_targets() {
        assert_eq!(group_leader(0), None);
        assert_eq!(group_leader(1), None);
        assert_eq!(group_leader(u32::MAX), None);
        assert_eq!(group_leader(4242), Some(4242));
    }

    #[tokio::test]
    async fn already_exited_pid_is_fine() {
        let dir = tempfile::tempdir().unwrap();
        let mut child = shell_command("true", dir.path()).spawn().unwrap();
        let pid = child.id().unwrap();
        child.wait().await.unwrap();

        ProcessGroupTerminator.terminate(pid).await;
        platform_terminator().terminate(pid).await;
    }
}
