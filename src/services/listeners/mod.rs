//! Listening-socket enumeration.
//!
//! Each platform gets a primary source and, where the primary is known to
//! miss sockets, an optional fallback. Both sit behind [`ListenerSource`] so
//! the compositor never knows which one produced a record.

#[cfg(target_os = "linux")]
mod proc_net;
mod lsof;
mod netstat;
mod powershell;

#[cfg(target_os = "linux")]
pub use proc_net::ProcfsListeners;
pub use lsof::{parse_lsof_output, LsofListeners};
pub use netstat::{parse_netstat_output, NetstatListeners};
pub use powershell::{parse_powershell_output, PowerShellListeners};

use crate::error::{Result, SupervisorError};
use crate::models::ListenerRecord;
use std::collections::HashSet;

pub trait ListenerSource: Send + Sync {
    fn name(&self) -> &'static str;

    fn listeners(&self) -> Result<Vec<ListenerRecord>>;
}

/// Primary source for the host plus the fallback, when one applies and is enabled.
pub fn platform_sources(
    fallback_enabled: bool,
) -> (Box<dyn ListenerSource>, Option<Box<dyn ListenerSource>>) {
    #[cfg(target_os = "linux")]
    {
        let _ = fallback_enabled;
        (Box::new(ProcfsListeners), None)
    }

    #[cfg(target_os = "windows")]
    {
        let fallback: Option<Box<dyn ListenerSource>> = if fallback_enabled {
            Some(Box::new(NetstatListeners))
        } else {
            None
        };
        (Box::new(PowerShellListeners), fallback)
    }

    #[cfg(not(any(target_os = "linux", target_os = "windows")))]
    {
        let _ = fallback_enabled;
        (Box::new(LsofListeners), None)
    }
}

/// Concatenates both sources, keeping the first record seen for each (pid, port).
pub fn merge_listeners(
    primary: Vec<ListenerRecord>,
    fallback: Vec<ListenerRecord>,
) -> Vec<ListenerRecord> {
    let mut seen = HashSet::new();
    primary
        .into_iter()
        .chain(fallback)
        .filter(|l| seen.insert((l.pid, l.port)))
        .collect()
}

/// Splits `host:port` on the last colon; IPv6 brackets are dropped.
pub(crate) fn split_host_port(text: &str) -> Option<(String, u16)> {
    let (host, port) = text.rsplit_once(':')?;
    let port = port.parse::<u16>().ok()?;
    let host = host.trim_start_matches('[').trim_end_matches(']');
    let host = if host.is_empty() { "*" } else { host };
    Some((host.to_string(), port))
}

pub(crate) fn degraded(source: &str, reason: impl std::fmt::Display) -> SupervisorError {
    SupervisorError::ListenerEnumerationDegraded {
        source_name: source.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listener(pid: u32, port: u16, address: &str) -> ListenerRecord {
        ListenerRecord {
            pid,
            port,
            address: address.to_string(),
            state: "LISTEN".to_string(),
        }
    }

    #[test]
    fn merge_drops_duplicate_pid_port_pairs() {
        let primary = vec![listener(10, 3000, "0.0.0.0"), listener(10, 80, "0.0.0.0")];
        let fallback = vec![listener(10, 3000, "::"), listener(11, 3000, "::")];

        let merged = merge_listeners(primary, fallback);

        assert_eq!(merged.len(), 3);
        let for_pair: Vec<_> = merged.iter().filter(|l| l.pid == 10 && l.port == 3000).collect();
        assert_eq!(for_pair.len(), 1);
        assert_eq!(for_pair[0].address, "0.0.0.0");
    }

    #[test]
    fn split_host_port_handles_ipv6() {
        assert_eq!(split_host_port("127.0.0.1:8080"), Some(("127.0.0.1".to_string(), 8080)));
        assert_eq!(split_host_port("[::1]:5432"), Some(("::1".to_string(), 5432)));
        assert_eq!(split_host_port("*:3000"), Some(("*".to_string(), 3000)));
        assert_eq!(split_host_port("[::]:0"), Some(("::".to_string(), 0)));
        assert_eq!(split_host_port("no-port"), None);
        assert_eq!(split_host_port("host:http"), None);
    }
}
