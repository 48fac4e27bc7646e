use super::{degraded, ListenerSource};
use crate::error::Result;
use crate::models::ListenerRecord;
use procfs::net::TcpState;
use procfs::process::FDTarget;
use std::collections::HashMap;

/// Reads `/proc/net/tcp{,6}` and maps socket inodes back to owning pids
/// through `/proc/<pid>/fd`.
pub struct ProcfsListeners;

impl ListenerSource for ProcfsListeners {
    fn name(&self) -> &'static str {
        "procfs"
    }

    fn listeners(&self) -> Result<Vec<ListenerRecord>> {
        let mut entries = procfs::net::tcp().map_err(|e| degraded(self.name(), e))?;
        // Hosts without IPv6 have no tcp6 table.
        entries.extend(procfs::net::tcp6().unwrap_or_default());

        let sockets: HashMap<u64, (String, u16)> = entries
            .into_iter()
            .filter(|entry| matches!(entry.state, TcpState::Listen))
            .map(|entry| {
                (
                    entry.inode,
                    (entry.local_address.ip().to_string(), entry.local_address.port()),
                )
            })
            .collect();

        if sockets.is_empty() {
            return Ok(Vec::new());
        }

        let processes = procfs::process::all_processes().map_err(|e| degraded(self.name(), e))?;

        let mut listeners = Vec::new();
        // Processes owned by other users deny fd access; they are skipped.
        for process in processes.flatten() {
            let Ok(fds) = process.fd() else {
                continue;
            };
            for fd in fds.flatten() {
                let FDTarget::Socket(inode) = fd.target else {
                    continue;
                };
                if let Some((address, port)) = sockets.get(&inode) {
                    listeners.push(ListenerRecord {
                        pid: process.pid() as u32,
                        port: *port,
                        address: address.clone(),
                        state: "LISTEN".to_string(),
                    });
                }
            }
        }

        Ok(listeners)
    }
}
