//! Error taxonomy for the launcher.
//!
//! Probe failures never show up here: the activity probe fails open and only
//! logs. Everything else a caller can act on has its own variant so that
//! "nothing happened" and "it failed" stay distinguishable.

use std::path::PathBuf;

/// Launcher operation errors
#[derive(Debug, thiserror::Error)]
pub enum LauncherError {
    /// Managed server executable is missing from the install directory
    #[error("server executable not found: {}", path.display())]
    NotFound { path: PathBuf },

    /// Server process died inside the settle window
    #[error("server process {pid} exited during startup ({status})")]
    LaunchFailed { pid: u32, status: String },

    /// Spawning the server process failed at the OS level
    #[error("failed to spawn server process: {0}")]
    Spawn(#[source] std::io::Error),

    /// Delivering a termination request or kill failed
    #[error("failed to signal process {pid}: {reason}")]
    Signal { pid: u32, reason: String },

    /// Privilege escalation could not be requested
    #[error("elevation failed: {0}")]
    ElevationFailed(String),

    /// Fewer firewall rules applied than required for a working setup
    #[error("firewall provisioning incomplete: {applied}/{attempted} rules applied")]
    FirewallPartial { applied: usize, attempted: usize },

    /// Autostart store could not be read or written
    #[error("autostart store {store} not accessible: {reason}")]
    PersistenceAccess { store: String, reason: String },

    /// Override configuration file is unreadable or malformed
    #[error("invalid configuration {}: {reason}", path.display())]
    Config { path: PathBuf, reason: String },

    /// Unclassified I/O failure
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl LauncherError {
    pub(crate) fn persistence(store: impl Into<String>, reason: impl ToString) -> Self {
        Self::PersistenceAccess {
            store: store.into(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, LauncherError>;
