//! Windows process control via `taskkill` and the process table.

use std::os::windows::process::CommandExt;
use std::process::Command;

use ::windows::Win32::Foundation::{CloseHandle, FILETIME, STILL_ACTIVE};
use ::windows::Win32::System::Threading::{
    CREATE_NEW_PROCESS_GROUP, CREATE_NO_WINDOW, GetExitCodeProcess, GetProcessTimes, OpenProcess,
    PROCESS_QUERY_LIMITED_INFORMATION,
};

use crate::error::{LauncherError, Result};

/// Own process group and no console window, so closing the launcher's
/// console does not take the server down.
pub(super) fn detach(cmd: &mut Command) {
    cmd.creation_flags(CREATE_NEW_PROCESS_GROUP.0 | CREATE_NO_WINDOW.0);
}

/// `taskkill` without `/F` asks the process tree to close.
pub(super) fn request_terminate(pid: u32) -> Result<()> {
    taskkill(pid, false)
}

pub(super) fn force_kill(pid: u32) -> Result<()> {
    taskkill(pid, true)
}

fn taskkill(pid: u32, force: bool) -> Result<()> {
    let pid_arg = pid.to_string();
    let mut args = vec!["/T", "/PID", pid_arg.as_str()];
    if force {
        args.insert(0, "/F");
    }

    let output = Command::new("taskkill")
        .args(&args)
        .creation_flags(CREATE_NO_WINDOW.0)
        .output()
        .map_err(|e| LauncherError::Signal {
            pid,
            reason: format!("failed to execute taskkill: {e}"),
        })?;

    if !output.status.success() {
        return Err(LauncherError::Signal {
            pid,
            reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(())
}

pub(super) fn pid_alive(pid: u32) -> bool {
    unsafe {
        let Ok(process) = OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, false, pid) else {
            return false;
        };

        let mut code: u32 = 0;
        let queried = GetExitCodeProcess(process, &mut code);
        let _ = CloseHandle(process);

        queried.is_ok() && code == STILL_ACTIVE.0 as u32
    }
}

/// Creation time as a FILETIME tick count; a recycled pid gets a new one.
pub(super) fn process_identity(pid: u32) -> Option<String> {
    unsafe {
        let process = OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, false, pid).ok()?;

        let mut created = FILETIME::default();
        let mut exited = FILETIME::default();
        let mut kernel = FILETIME::default();
        let mut user = FILETIME::default();
        let queried = GetProcessTimes(process, &mut created, &mut exited, &mut kernel, &mut user);
        let _ = CloseHandle(process);
        queried.ok()?;

        let ticks = (u64::from(created.dwHighDateTime) << 32) | u64::from(created.dwLowDateTime);
        Some(ticks.to_string())
    }
}

/// No process-group ownership check on Windows.
pub(super) fn leads_own_group(_pid: u32) -> bool {
    true
}
