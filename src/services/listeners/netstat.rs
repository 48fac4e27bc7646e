use super::{degraded, split_host_port, ListenerSource};
use crate::error::Result;
use crate::models::ListenerRecord;
use crate::utils::shell::native_command;

/// `netstat -ano`, used where the primary API misses listening sockets.
pub struct NetstatListeners;

impl ListenerSource for NetstatListeners {
    fn name(&self) -> &'static str {
        "netstat"
    }

    fn listeners(&self) -> Result<Vec<ListenerRecord>> {
        let output = native_command("netstat")
            .args(["-ano"])
            .output()
            .map_err(|e| degraded(self.name(), e))?;

        if !output.status.success() {
            return Err(degraded(
                self.name(),
                format!("exited with {:?}", output.status.code()),
            ));
        }

        Ok(parse_netstat_output(&String::from_utf8_lossy(&output.stdout)))
    }
}

/// Parses the fixed-column `Proto  Local  Foreign  State  PID` table.
///
/// Only TCP rows in the LISTENING state are kept; anything that does not
/// parse is skipped. The state column is matched in English, so localized
/// netstat output yields nothing and the primary source carries the table.
pub fn parse_netstat_output(output: &str) -> Vec<ListenerRecord> {
    output
        .lines()
        .filter_map(|line| {
            let cols: Vec<&str> = line.split_whitespace().collect();
            if cols.len() < 5 || !cols[0].eq_ignore_ascii_case("tcp") {
                return None;
            }
            if !cols[3].eq_ignore_ascii_case("listening") {
                return None;
            }

            let (address, port) = split_host_port(cols[1])?;
            let pid = cols[4].parse::<u32>().ok()?;
            Some(ListenerRecord {
                pid,
                port,
                address,
                state: cols[3].to_uppercase(),
            })
        })
        .collect()
}
