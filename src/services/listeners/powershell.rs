use super::{degraded, ListenerSource};
use crate::error::Result;
use crate::models::ListenerRecord;
use crate::utils::shell::native_command;
use serde::Deserialize;

const SCRIPT: &str = "Get-NetTCPConnection -State Listen | \
Select-Object LocalAddress,LocalPort,OwningProcess | ConvertTo-Json -Compress";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct NetTcpConnection {
    local_address: String,
    local_port: u16,
    owning_process: u32,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    Many(Vec<NetTcpConnection>),
    One(NetTcpConnection),
}

/// `Get-NetTCPConnection`, the primary Windows source.
pub struct PowerShellListeners;

impl ListenerSource for PowerShellListeners {
    fn name(&self) -> &'static str {
        "Get-NetTCPConnection"
    }

    fn listeners(&self) -> Result<Vec<ListenerRecord>> {
        let output = native_command("powershell")
            .args(["-NoProfile", "-NonInteractive", "-Command", SCRIPT])
            .output()
            .map_err(|e| degraded(self.name(), e))?;

        if !output.status.success() {
            return Err(degraded(
                self.name(),
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }

        parse_powershell_output(&String::from_utf8_lossy(&output.stdout))
            .map_err(|e| degraded(self.name(), e))
    }
}

/// `ConvertTo-Json` emits a bare object for a single row and nothing at all
/// for zero rows.
pub fn parse_powershell_output(output: &str) -> std::result::Result<Vec<ListenerRecord>, serde_json::Error> {
    let trimmed = output.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }

    let rows = match serde_json::from_str::<OneOrMany>(trimmed)? {
        OneOrMany::Many(rows) => rows,
        OneOrMany::One(row) => vec![row],
    };

    Ok(rows
        .into_iter()
        .map(|row| ListenerRecord {
            pid: row.owning_process,
            port: row.local_port,
            address: row.local_address,
            state: "LISTEN".to_string(),
        })
        .collect())
}
