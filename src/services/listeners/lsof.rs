use super::{degraded, split_host_port, ListenerSource};
use crate::error::Result;
use crate::models::ListenerRecord;
use crate::utils::shell::native_command;

/// `lsof -nP -iTCP -sTCP:LISTEN -F pn` in machine-readable field mode.
pub struct LsofListeners;

impl ListenerSource for LsofListeners {
    fn name(&self) -> &'static str {
        "lsof"
    }

    fn listeners(&self) -> Result<Vec<ListenerRecord>> {
        let output = native_command("lsof")
            .args(["-nP", "-iTCP", "-sTCP:LISTEN", "-F", "pn"])
            .output()
            .map_err(|e| degraded(self.name(), e))?;

        // lsof exits 1 when nothing matched; the output is still authoritative.
        Ok(parse_lsof_output(&String::from_utf8_lossy(&output.stdout)))
    }
}

/// Field output is one field per line: `p<pid>` opens a process section,
/// `n<addr>:<port>` names a socket within it.
pub fn parse_lsof_output(output: &str) -> Vec<ListenerRecord> {
    let mut listeners = Vec::new();
    let mut current_pid: Option<u32> = None;

    for line in output.lines() {
        let Some(tag) = line.chars().next() else {
            continue;
        };
        let value = &line[tag.len_utf8()..];

        match tag {
            'p' => current_pid = value.parse::<u32>().ok(),
            'n' => {
                let (Some(pid), Some((address, port))) = (current_pid, split_host_port(value))
                else {
                    continue;
                };
                listeners.push(ListenerRecord {
                    pid,
                    port,
                    address,
                    state: "LISTEN".to_string(),
                });
            }
            _ => {}
        }
    }

    listeners
}
