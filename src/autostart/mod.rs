//! "Launch me at login" registration.
//!
//! The entry's existence *is* the enabled state; there is no separate flag.
//! Each platform keeps the entry somewhere different:
//! - Windows: `HKCU\Software\Microsoft\Windows\CurrentVersion\Run`
//! - macOS: a LaunchAgent plist in `~/Library/LaunchAgents`
//! - Linux and other Unix: an XDG autostart desktop file

use std::path::PathBuf;

use crate::error::Result;

cfg_if::cfg_if! {
    if #[cfg(target_os = "windows")] {
        mod registry;
        pub use registry::RunKeyStore as PlatformStore;
    } else if #[cfg(target_os = "macos")] {
        mod launchd;
        pub use launchd::LaunchAgentStore as PlatformStore;
    } else {
        mod xdg;
        pub use xdg::XdgAutostartStore as PlatformStore;
    }
}

/// Argument the autostart entry passes so the launcher comes up in loop mode.
pub const BACKGROUND_ARG: &str = "background";

/// A persisted startup entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AutostartEntry {
    pub key_name: String,
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl AutostartEntry {
    /// Entry launching the current executable in background mode.
    pub fn for_current_exe(key_name: impl Into<String>) -> Result<Self> {
        Ok(Self {
            key_name: key_name.into(),
            program: std::env::current_exe()?,
            args: vec![BACKGROUND_ARG.to_string()],
        })
    }

    /// Quoted program path followed by the arguments.
    pub fn command_line(&self) -> String {
        let mut line = format!("\"{}\"", self.program.display());
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }
}

/// Platform persistence for autostart entries.
pub trait AutostartStore {
    /// Human-readable location, used in reports and errors.
    fn location(&self) -> String;
    /// Command line of the entry named `key`, if present.
    fn read(&self, key: &str) -> Result<Option<String>>;
    /// Create or overwrite the entry.
    fn write(&self, entry: &AutostartEntry) -> Result<()>;
    /// Delete the entry; `Ok(false)` when it did not exist.
    fn remove(&self, key: &str) -> Result<bool>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallOutcome {
    /// No entry existed before
    Installed,
    /// An entry existed and was overwritten
    Refreshed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UninstallOutcome {
    Removed,
    NotPresent,
}

/// Installs and removes the launcher's own autostart entry.
pub struct AutostartRegistrar<S> {
    store: S,
    entry: AutostartEntry,
}

impl<S: AutostartStore> AutostartRegistrar<S> {
    pub fn new(store: S, entry: AutostartEntry) -> Self {
        Self { store, entry }
    }

    pub fn location(&self) -> String {
        self.store.location()
    }

    /// Idempotent: always (over)writes the entry.
    pub fn install(&self) -> Result<InstallOutcome> {
        let existed = self.store.read(&self.entry.key_name)?.is_some();
        self.store.write(&self.entry)?;
        log::info!(
            "Autostart entry '{}' written to {}",
            self.entry.key_name,
            self.store.location()
        );
        Ok(if existed {
            InstallOutcome::Refreshed
        } else {
            InstallOutcome::Installed
        })
    }

    pub fn uninstall(&self) -> Result<UninstallOutcome> {
        if self.store.remove(&self.entry.key_name)? {
            log::info!("Autostart entry '{}' removed", self.entry.key_name);
            Ok(UninstallOutcome::Removed)
        } else {
            log::info!("Autostart entry '{}' was not present", self.entry.key_name);
            Ok(UninstallOutcome::NotPresent)
        }
    }

    pub fn is_installed(&self) -> Result<bool> {
        Ok(self.store.read(&self.entry.key_name)?.is_some())
    }
}

/// Registrar for the current executable in this platform's store.
pub fn platform_registrar(key_name: &str) -> Result<AutostartRegistrar<PlatformStore>> {
    let store = PlatformStore::for_current_user()?;
    let entry = AutostartEntry::for_current_exe(key_name)?;
    Ok(AutostartRegistrar::new(store, entry))
}
