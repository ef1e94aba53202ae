use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{LauncherError, Result};

/// Port the managed server listens on.
pub const DEFAULT_PORT: u16 = 8000;
/// No activity for this long stops the server.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(30 * 60);
/// Interval between activity probes.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);
/// Time a server gets to exit after a termination request before it is killed.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(10);
/// Time a freshly launched server must survive to count as started.
pub const DEFAULT_SETTLE_TIME: Duration = Duration::from_secs(3);
/// Upper bound for each individual probe.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(2);

pub const DEFAULT_SERVICE_NAME: &str = "SyncAnywhere";
pub const DEFAULT_SERVER_BINARY: &str = "SyncAnywhere";

/// Optional override file looked up next to the executable.
pub const CONFIG_FILE_NAME: &str = "smartlaunch.toml";
pub const LOG_FILE_NAME: &str = "launcher.log";

/// Launcher settings. Compiled-in defaults; an override file is optional.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LauncherConfig {
    pub port: u16,
    pub idle_timeout_secs: u64,
    pub poll_interval_secs: u64,
    pub grace_period_secs: u64,
    pub settle_time_secs: u64,
    pub probe_timeout_secs: u64,
    /// Used for firewall rule names and the autostart entry
    pub service_name: String,
    /// Server executable name inside the install directory, without extension
    pub server_binary: String,
}

impl Default for LauncherConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            idle_timeout_secs: DEFAULT_IDLE_TIMEOUT.as_secs(),
            poll_interval_secs: DEFAULT_POLL_INTERVAL.as_secs(),
            grace_period_secs: DEFAULT_GRACE_PERIOD.as_secs(),
            settle_time_secs: DEFAULT_SETTLE_TIME.as_secs(),
            probe_timeout_secs: DEFAULT_PROBE_TIMEOUT.as_secs(),
            service_name: DEFAULT_SERVICE_NAME.to_string(),
            server_binary: DEFAULT_SERVER_BINARY.to_string(),
        }
    }
}

impl LauncherConfig {
    /// Load configuration, falling back to defaults when no override exists.
    ///
    /// An explicit path must exist; the implicit `smartlaunch.toml` next to
    /// the executable is optional.
    pub fn load(explicit: Option<&Path>, install_dir: &Path) -> Result<Self> {
        let (path, required) = match explicit {
            Some(p) => (p.to_path_buf(), true),
            None => (install_dir.join(CONFIG_FILE_NAME), false),
        };

        if !required && !path.exists() {
            log::debug!("No override at {}, using built-in defaults", path.display());
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(&path).map_err(|e| LauncherError::Config {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        let cfg: Self = toml::from_str(&raw).map_err(|e| LauncherError::Config {
            path: path.clone(),
            reason: e.to_string(),
        })?;

        // a zero connect timeout is rejected by the OS, so the probe would
        // never see a listener
        for (key, value) in [
            ("poll_interval_secs", cfg.poll_interval_secs),
            ("probe_timeout_secs", cfg.probe_timeout_secs),
        ] {
            if value == 0 {
                return Err(LauncherError::Config {
                    path,
                    reason: format!("{key} must be positive"),
                });
            }
        }

        log::info!("Using config overrides from: {}", path.display());
        Ok(cfg)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(self.grace_period_secs)
    }

    pub fn settle_time(&self) -> Duration {
        Duration::from_secs(self.settle_time_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    /// Full path of the managed server executable.
    pub fn server_path(&self, install_dir: &Path) -> PathBuf {
        install_dir.join(format!("{}{}", self.server_binary, std::env::consts::EXE_SUFFIX))
    }

    /// Registry value / desktop file / launchd label used for autostart.
    pub fn autostart_key(&self) -> String {
        format!("{}Service", self.service_name)
    }
}

/// Directory holding the running executable; logs, pid file and the server
/// binary live here.
pub fn install_dir() -> Result<PathBuf> {
    let exe = std::env::current_exe()?;
    exe.parent().map(Path::to_path_buf).ok_or_else(|| {
        LauncherError::Io(std::io::Error::other(format!(
            "executable {} has no parent directory",
            exe.display()
        )))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_implicit_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = LauncherConfig::load(None, dir.path()).unwrap();
        assert_eq!(cfg, LauncherConfig::default());
        assert_eq!(cfg.port, 8000);
        assert_eq!(cfg.idle_timeout(), Duration::from_secs(1800));
        assert_eq!(cfg.poll_interval(), Duration::from_secs(60));
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        let err = LauncherConfig::load(Some(&missing), dir.path()).unwrap_err();
        assert!(matches!(err, LauncherError::Config { .. }));
    }

    #[test]
    fn partial_override_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE_NAME),
            "port = 9100\ngrace_period_secs = 25\n",
        )
        .unwrap();

        let cfg = LauncherConfig::load(None, dir.path()).unwrap();
        assert_eq!(cfg.port, 9100);
        assert_eq!(cfg.grace_period(), Duration::from_secs(25));
        assert_eq!(cfg.service_name, DEFAULT_SERVICE_NAME);
    }

    #[test]
    fn zero_poll_interval_rejected() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE_NAME), "poll_interval_secs = 0\n").unwrap();
        assert!(LauncherConfig::load(None, dir.path()).is_err());
    }

    #[test]
    fn zero_probe_timeout_rejected() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE_NAME), "probe_timeout_secs = 0\n").unwrap();
        match LauncherConfig::load(None, dir.path()) {
            Err(LauncherError::Config { reason, .. }) => {
                assert!(reason.contains("probe_timeout_secs"))
            }
            other => panic!("expected a config error, got {other:?}"),
        }
    }

    #[test]
    fn server_path_and_key() {
        let cfg = LauncherConfig::default();
        let path = cfg.server_path(Path::new("/opt/sync"));
        assert!(path.starts_with("/opt/sync"));
        assert!(path.to_string_lossy().contains("SyncAnywhere"));
        assert_eq!(cfg.autostart_key(), "SyncAnywhereService");
    }
}
