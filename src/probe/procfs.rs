//! Linux connection table from `/proc/net/tcp` and `/proc/net/tcp6`.

use std::path::PathBuf;

use super::{ConnectionLister, SocketEntry, TcpState};

/// Reads the kernel's TCP tables directly; no external tools needed.
#[derive(Debug, Clone)]
pub struct ProcNetLister {
    tables: Vec<PathBuf>,
}

impl Default for ProcNetLister {
    fn default() -> Self {
        Self {
            tables: vec![
                PathBuf::from("/proc/net/tcp"),
                PathBuf::from("/proc/net/tcp6"),
            ],
        }
    }
}

impl ConnectionLister for ProcNetLister {
    fn connections(&self) -> std::io::Result<Vec<SocketEntry>> {
        let mut entries = Vec::new();
        let mut last_err = None;
        let mut any_read = false;

        for table in &self.tables {
            match std::fs::read_to_string(table) {
                Ok(content) => {
                    any_read = true;
                    entries.extend(parse_table(&content));
                }
                // tcp6 is missing on kernels without IPv6
                Err(e) => last_err = Some(e),
            }
        }

        match (any_read, last_err) {
            (false, Some(e)) => Err(e),
            _ => Ok(entries),
        }
    }
}

/// Parse one `/proc/net/tcp*` table, skipping the header and junk lines.
pub(crate) fn parse_table(content: &str) -> Vec<SocketEntry> {
    content.lines().skip(1).filter_map(parse_line).collect()
}

// "  0: 0100007F:1F40 00000000:0000 0A ..."
fn parse_line(line: &str) -> Option<SocketEntry> {
    let mut cols = line.split_whitespace();
    let _slot = cols.next()?;
    let local = cols.next()?;
    let _remote = cols.next()?;
    let state = cols.next()?;

    let (_, port_hex) = local.rsplit_once(':')?;
    let local_port = u16::from_str_radix(port_hex, 16).ok()?;
    let state = match u8::from_str_radix(state, 16).ok()? {
        0x01 => TcpState::Established,
        0x03 => TcpState::SynReceived,
        0x0A => TcpState::Listen,
        _ => TcpState::Other,
    };

    Some(SocketEntry { local_port, state })
}
