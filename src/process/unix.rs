//! Unix process control: the server runs as leader of its own process group,
//! so signals go to the whole group.

use std::os::unix::process::CommandExt;
use std::process::Command;

use nix::errno::Errno;
use nix::sys::signal::{Signal, kill, killpg};
use nix::unistd::{Pid, getpgid};

use crate::error::{LauncherError, Result};

/// New process group: the terminal's SIGINT does not reach the server and
/// its lifetime is independent of ours.
pub(super) fn detach(cmd: &mut Command) {
    cmd.process_group(0);
}

pub(super) fn request_terminate(pid: u32) -> Result<()> {
    signal_group(pid, Signal::SIGTERM)
}

pub(super) fn force_kill(pid: u32) -> Result<()> {
    signal_group(pid, Signal::SIGKILL)
}

fn signal_group(pid: u32, sig: Signal) -> Result<()> {
    let target = to_pid(pid)?;
    killpg(target, sig)
        .or_else(|_| kill(target, sig))
        .map_err(|e| LauncherError::Signal {
            pid,
            reason: format!("{sig}: {e}"),
        })
}

/// Process exists and is not a zombie.
pub(super) fn pid_alive(pid: u32) -> bool {
    let Ok(target) = to_pid(pid) else {
        return false;
    };
    match kill(target, None) {
        Ok(()) | Err(Errno::EPERM) => !is_zombie(pid),
        Err(_) => false,
    }
}

/// Servers we launch lead their own group; anything else behind a recycled
/// pid is not ours.
pub(super) fn leads_own_group(pid: u32) -> bool {
    let Ok(target) = to_pid(pid) else {
        return false;
    };
    getpgid(Some(target)).is_ok_and(|pgid| pgid == target)
}

fn to_pid(pid: u32) -> Result<Pid> {
    i32::try_from(pid)
        .ok()
        .filter(|p| *p > 0)
        .map(Pid::from_raw)
        .ok_or_else(|| LauncherError::Signal {
            pid,
            reason: "pid out of range".to_string(),
        })
}

/// Token identifying this particular process, stable for its lifetime and
/// different for any later process reusing the pid.
#[cfg(target_os = "linux")]
pub(super) fn process_identity(pid: u32) -> Option<String> {
    // starttime, field 22 of stat, in clock ticks since boot
    stat_after_comm(pid)?
        .split_whitespace()
        .nth(19)
        .map(str::to_string)
}

/// Token identifying this particular process, stable for its lifetime and
/// different for any later process reusing the pid.
#[cfg(not(target_os = "linux"))]
pub(super) fn process_identity(pid: u32) -> Option<String> {
    let output = Command::new("ps")
        .args(["-o", "lstart=", "-p", &pid.to_string()])
        .stdin(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let started = String::from_utf8_lossy(&output.stdout).trim().to_string();
    (!started.is_empty()).then_some(started)
}

/// `/proc/<pid>/stat` from the state field on. comm may contain spaces and
/// parens, so split at the last `)`.
#[cfg(target_os = "linux")]
fn stat_after_comm(pid: u32) -> Option<String> {
    let stat = std::fs::read_to_string(format!("/proc/{pid}/stat")).ok()?;
    Some(stat.rsplit_once(')')?.1.to_string())
}

#[cfg(target_os = "linux")]
fn is_zombie(pid: u32) -> bool {
    stat_after_comm(pid).is_some_and(|rest| rest.split_whitespace().next() == Some("Z"))
}

#[cfg(not(target_os = "linux"))]
fn is_zombie(_pid: u32) -> bool {
    false
}
