//! Antivirus scan exclusion for the launcher executable.

use std::path::Path;

/// Ask Windows Defender to skip scanning `path`. Fire and forget: the
/// PowerShell child is not waited on and its outcome is not reported.
/// Returns whether a request was issued.
#[cfg(windows)]
pub fn request_scan_exclusion(path: &Path) -> bool {
    use std::os::windows::process::CommandExt;
    use std::process::{Command, Stdio};

    const CREATE_NO_WINDOW: u32 = 0x0800_0000;

    let script = format!(
        "Add-MpPreference -ExclusionPath '{}'",
        path.display().to_string().replace('\'', "''")
    );
    match Command::new("powershell")
        .args(["-NoProfile", "-NonInteractive", "-Command", script.as_str()])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .creation_flags(CREATE_NO_WINDOW)
        .spawn()
    {
        Ok(_) => {
            log::info!("Requested Defender exclusion for {}", path.display());
            true
        }
        Err(e) => {
            log::debug!("Could not request Defender exclusion: {e}");
            false
        }
    }
}

#[cfg(not(windows))]
pub fn request_scan_exclusion(path: &Path) -> bool {
    log::debug!("No scan exclusion mechanism for {}", path.display());
    false
}
