//! `<server>.pid` next to the executable: pid on the first line, RFC 3339
//! launch time on the second, the OS process identity on the third.

use std::path::Path;

use chrono::{DateTime, Local};

pub(super) struct PidRecord {
    pub pid: u32,
    pub launched_at: DateTime<Local>,
    /// Start-time token from the OS; files without one are never adopted.
    pub identity: Option<String>,
}

/// Read a pid file. Missing or malformed files yield `None`; malformed ones
/// are removed.
pub(super) fn read(path: &Path) -> Option<PidRecord> {
    let content = std::fs::read_to_string(path).ok()?;
    let record = parse(&content);
    if record.is_none() {
        log::warn!("Ignoring malformed pid file {}", path.display());
        remove(path);
    }
    record
}

fn parse(content: &str) -> Option<PidRecord> {
    let mut lines = content.lines();
    let pid = lines.next()?.trim().parse::<u32>().ok().filter(|p| *p != 0)?;
    let launched_at = lines
        .next()
        .and_then(|l| DateTime::parse_from_rfc3339(l.trim()).ok())
        .map(|t| t.with_timezone(&Local))
        .unwrap_or_else(Local::now);
    let identity = lines
        .next()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string);
    Some(PidRecord {
        pid,
        launched_at,
        identity,
    })
}

pub(super) fn write(
    path: &Path,
    pid: u32,
    launched_at: DateTime<Local>,
    identity: &str,
) -> std::io::Result<()> {
    std::fs::write(
        path,
        format!("{pid}\n{}\n{identity}\n", launched_at.to_rfc3339()),
    )
}

pub(super) fn remove(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => log::warn!("Could not remove pid file {}: {e}", path.display()),
    }
}
