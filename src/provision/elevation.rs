//! Administrator rights for provisioning.
//!
//! A process cannot raise its own privileges, so elevation relaunches this
//! executable with the same arguments plus [`ELEVATED_FLAG`]. The relaunched
//! instance sees the flag and never tries again.

use std::convert::Infallible;

use crate::error::{LauncherError, Result};

/// Marker appended to the relaunched command line.
pub const ELEVATED_FLAG: &str = "--elevated";

#[cfg(unix)]
pub fn is_elevated() -> bool {
    nix::unistd::geteuid().is_root()
}

#[cfg(windows)]
pub fn is_elevated() -> bool {
    use std::mem;

    use ::windows::Win32::Foundation::{CloseHandle, HANDLE};
    use ::windows::Win32::Security::{
        GetTokenInformation, TOKEN_ELEVATION, TOKEN_QUERY, TokenElevation,
    };
    use ::windows::Win32::System::Threading::{GetCurrentProcess, OpenProcessToken};

    let mut token = HANDLE::default();
    unsafe {
        if OpenProcessToken(GetCurrentProcess(), TOKEN_QUERY, &mut token).is_err() {
            return false;
        }

        let mut elevation = TOKEN_ELEVATION::default();
        let mut returned: u32 = 0;
        let queried = GetTokenInformation(
            token,
            TokenElevation,
            Some(&mut elevation as *mut _ as *mut std::ffi::c_void),
            mem::size_of::<TOKEN_ELEVATION>() as u32,
            &mut returned,
        );
        let _ = CloseHandle(token);

        queried.is_ok() && elevation.TokenIsElevated != 0
    }
}

/// Relaunch through `sudo`, replacing this process. Only returns on failure.
///
/// Refuses up front when `sudo` is missing, or when there is no terminal to
/// prompt on and cached credentials do not cover us.
#[cfg(unix)]
pub fn elevate_and_relaunch(args: &[String]) -> Result<Infallible> {
    use std::io::IsTerminal;
    use std::process::{Command, Stdio};

    let sudo = which::which("sudo")
        .map_err(|e| LauncherError::ElevationFailed(format!("sudo not available: {e}")))?;

    if !std::io::stdin().is_terminal() {
        let cached = Command::new(&sudo)
            .args(["-n", "true"])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .is_ok_and(|s| s.success());
        if !cached {
            return Err(LauncherError::ElevationFailed(
                "no terminal to ask for the sudo password".to_string(),
            ));
        }
    }

    let exe = std::env::current_exe()?;
    log::info!("Relaunching {} through sudo", exe.display());

    let err = exec::Command::new(&sudo)
        .arg(&exe)
        .args(args)
        .arg(ELEVATED_FLAG)
        .exec();
    Err(LauncherError::ElevationFailed(format!("exec sudo: {err}")))
}

/// Relaunch through the UAC "runas" verb and exit. Only returns on failure,
/// including the user declining the prompt.
#[cfg(windows)]
pub fn elevate_and_relaunch(args: &[String]) -> Result<Infallible> {
    use std::os::windows::ffi::OsStrExt;

    use ::windows::Win32::UI::Shell::ShellExecuteW;
    use ::windows::Win32::UI::WindowsAndMessaging::SW_SHOWNORMAL;
    use ::windows::core::{PCWSTR, w};

    let exe = std::env::current_exe()?;
    let exe_w: Vec<u16> = exe
        .as_os_str()
        .encode_wide()
        .chain(std::iter::once(0))
        .collect();

    let mut params: Vec<String> = args.iter().map(|a| quote_arg(a)).collect();
    params.push(ELEVATED_FLAG.to_string());
    let params_w: Vec<u16> = params
        .join(" ")
        .encode_utf16()
        .chain(std::iter::once(0))
        .collect();

    log::info!("Requesting elevation for {}", exe.display());
    let result = unsafe {
        ShellExecuteW(
            None,
            w!("runas"),
            PCWSTR(exe_w.as_ptr()),
            PCWSTR(params_w.as_ptr()),
            PCWSTR::null(),
            SW_SHOWNORMAL,
        )
    };

    // values <= 32 are error codes, including a declined prompt
    let code = result.0 as usize;
    if code <= 32 {
        return Err(LauncherError::ElevationFailed(format!(
            "ShellExecuteW runas returned {code}"
        )));
    }
    std::process::exit(0)
}

#[cfg(windows)]
fn quote_arg(arg: &str) -> String {
    if arg.is_empty() || arg.contains([' ', '\t', '"']) {
        format!("\"{}\"", arg.replace('"', "\\\""))
    } else {
        arg.to_string()
    }
}
