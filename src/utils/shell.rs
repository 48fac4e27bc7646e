use std::path::Path;
use std::process::Stdio;

#[cfg(target_os = "windows")]
use std::os::windows::process::CommandExt;

#[cfg(target_os = "windows")]
const CREATE_NO_WINDOW: u32 = 0x08000000;
#[cfg(target_os = "windows")]
const CREATE_NEW_PROCESS_GROUP: u32 = 0x00000200;

/// PATH as seen by the user's login shell, so version-manager shims resolve
/// the same way they do in a terminal.
#[cfg(not(target_os = "windows"))]
pub static USER_PATH: once_cell::sync::Lazy<String> = once_cell::sync::Lazy::new(|| {
    login_shell_path().unwrap_or_else(|| {
        log::debug!("[shell] login shell PATH unavailable, extending system PATH");
        extended_system_path()
    })
});

#[cfg(not(target_os = "windows"))]
fn login_shell_path() -> Option<String> {
    let shell = std::env::var("SHELL").unwrap_or_else(|_| "/bin/sh".to_string());

    // -l without -i: reads profile files only, never prompts.
    let output = std::process::Command::new(&shell)
        .args(["-l", "-c", "echo $PATH"])
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .output()
        .ok()?;

    if !output.status.success() {
        return None;
    }

    let path = String::from_utf8_lossy(&output.stdout).trim().to_string();
    (!path.is_empty() && path.contains('/')).then_some(path)
}

#[cfg(not(target_os = "windows"))]
fn extended_system_path() -> String {
    let home = std::env::var("HOME").unwrap_or_default();
    let system_path = std::env::var("PATH").unwrap_or_default();

    let mut paths: Vec<String> = [
        format!("{}/.local/bin", home),
        format!("{}/.volta/bin", home),
        format!("{}/.fnm/current/bin", home),
        "/opt/homebrew/bin".to_string(),
        "/usr/local/bin".to_string(),
    ]
    .into_iter()
    .filter(|p| Path::new(p).is_dir())
    .collect();

    for p in system_path.split(':') {
        if !p.is_empty() && !paths.iter().any(|existing| existing == p) {
            paths.push(p.to_string());
        }
    }

    paths.join(":")
}

/// Builds a shell-style invocation of `command` rooted at `cwd`.
///
/// The child leads its own process group (POSIX) or process group (Windows)
/// so the whole tree can be terminated later.
pub fn shell_command(command: &str, cwd: &Path) -> tokio::process::Command {
    #[cfg(target_os = "windows")]
    let mut cmd = {
        let mut c = tokio::process::Command::new("cmd");
        c.args(["/C", command]);
        c.creation_flags(CREATE_NO_WINDOW | CREATE_NEW_PROCESS_GROUP);
        c
    };

    #[cfg(not(target_os = "windows"))]
    let mut cmd = {
        let mut c = tokio::process::Command::new("sh");
        c.args(["-c", command]);
        c.env("PATH", &*USER_PATH);
        c.process_group(0);
        c
    };

    cmd.current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(false);
    cmd
}

/// A native tool invocation that never flashes a console window.
pub fn native_command(program: &str) -> std::process::Command {
    #[allow(unused_mut)]
    let mut cmd = std::process::Command::new(program);
    #[cfg(target_os = "windows")]
    cmd.creation_flags(CREATE_NO_WINDOW);
    cmd.stdin(Stdio::null());
    cmd
}

/// Async counterpart of [`native_command`].
pub fn native_command_async(program: &str) -> tokio::process::Command {
    #[allow(unused_mut)]
    let mut cmd = tokio::process::Command::new(program);
    #[cfg(target_os = "windows")]
    cmd.creation_flags(CREATE_NO_WINDOW);
    cmd.stdin(Stdio::null());
    cmd
}
