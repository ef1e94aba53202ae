//! Managed server lifecycle: launch, verify, graceful stop, forced stop.
//!
//! ```text
//! STOPPED --start--> STARTING --settle ok--> RUNNING
//!                    STARTING --died-------> STOPPED (LaunchFailed)
//! RUNNING --stop---> STOPPING --exited-----> STOPPED
//!                    STOPPING --grace over-> force kill -> STOPPED
//! ```
//!
//! The controller is the only owner of the process handle. Every liveness
//! question goes to the OS; a handle whose process is gone is dropped on the
//! spot.

use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

use chrono::{DateTime, Local};
use log::{info, warn};

use crate::config::LauncherConfig;
use crate::error::{LauncherError, Result};

mod pidfile;

cfg_if::cfg_if! {
    if #[cfg(unix)] {
        mod unix;
        use unix as platform;
    } else if #[cfg(windows)] {
        mod windows;
        use self::windows as platform;
    }
}

/// Liveness poll interval while waiting for a voluntary exit.
const EXIT_POLL: Duration = Duration::from_millis(100);
/// Upper bound on waiting for a killed process to disappear.
const KILL_REAP_TIMEOUT: Duration = Duration::from_secs(5);

/// Result of [`ServerControl::start`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started { pid: u32 },
    AlreadyRunning { pid: u32 },
}

/// Result of [`ServerControl::stop`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// Nothing was running
    NotRunning,
    /// Process exited within the grace period
    Graceful,
    /// Grace period elapsed and the process was killed
    Forced,
}

/// Lifecycle operations the monitor loop drives.
pub trait ServerControl {
    fn start(&mut self) -> Result<StartOutcome>;
    fn stop(&mut self) -> Result<StopOutcome>;
    fn is_running(&mut self) -> bool;
}

enum Liveness {
    Alive,
    Exited(String),
}

/// One OS process launched for the managed server.
#[derive(Debug)]
pub struct ProcessHandle {
    pid: u32,
    launched_at: DateTime<Local>,
    /// `None` when adopted from a pid file written by another invocation
    child: Option<Child>,
}

impl ProcessHandle {
    fn owned(child: Child) -> Self {
        Self {
            pid: child.id(),
            launched_at: Local::now(),
            child: Some(child),
        }
    }

    fn adopted(pid: u32, launched_at: DateTime<Local>) -> Self {
        Self {
            pid,
            launched_at,
            child: None,
        }
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn launched_at(&self) -> DateTime<Local> {
        self.launched_at
    }

    fn poll(&mut self) -> Liveness {
        match &mut self.child {
            Some(child) => match child.try_wait() {
                Ok(None) => Liveness::Alive,
                Ok(Some(status)) => Liveness::Exited(status.to_string()),
                // Child handle unusable; fall back to asking the OS by pid.
                Err(_) if platform::pid_alive(self.pid) => Liveness::Alive,
                Err(e) => Liveness::Exited(format!("unknown ({e})")),
            },
            None if platform::pid_alive(self.pid) => Liveness::Alive,
            None => Liveness::Exited("exit status unavailable".to_string()),
        }
    }

    fn is_alive(&mut self) -> bool {
        matches!(self.poll(), Liveness::Alive)
    }

    /// Wait up to `timeout` for the process to leave the process table.
    fn reap(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while self.is_alive() {
            if Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(EXIT_POLL);
        }
        true
    }
}

/// Starts and stops the managed server executable.
pub struct ProcessController {
    server_path: PathBuf,
    working_dir: PathBuf,
    pid_file: PathBuf,
    grace_period: Duration,
    settle_time: Duration,
    handle: Option<ProcessHandle>,
}

impl ProcessController {
    /// Controller for `<install_dir>/<server_binary>`, adopting a server
    /// started by an earlier invocation if its pid file is still valid.
    pub fn new(cfg: &LauncherConfig, install_dir: &Path) -> Self {
        let mut controller = Self {
            server_path: cfg.server_path(install_dir),
            working_dir: install_dir.to_path_buf(),
            pid_file: install_dir.join(format!("{}.pid", cfg.server_binary)),
            grace_period: cfg.grace_period(),
            settle_time: cfg.settle_time(),
            handle: None,
        };
        controller.adopt_existing();
        controller
    }

    /// Pid of the live server, if any.
    pub fn pid(&mut self) -> Option<u32> {
        if self.is_running() {
            self.handle.as_ref().map(ProcessHandle::pid)
        } else {
            None
        }
    }

    /// Take over a server recorded in the pid file. The recorded identity
    /// must match the live process, so a recycled pid is never adopted.
    fn adopt_existing(&mut self) {
        let Some(record) = pidfile::read(&self.pid_file) else {
            return;
        };

        let same_process = record.identity.is_some()
            && record.identity == platform::process_identity(record.pid);
        let adoptable = same_process
            && platform::pid_alive(record.pid)
            && platform::leads_own_group(record.pid);
        if adoptable {
            info!(
                "Adopted running server (pid {}, launched {})",
                record.pid,
                record.launched_at.format("%Y-%m-%d %H:%M:%S")
            );
            self.handle = Some(ProcessHandle::adopted(record.pid, record.launched_at));
        } else {
            log::debug!(
                "Removing stale pid file {} (pid {})",
                self.pid_file.display(),
                record.pid
            );
            pidfile::remove(&self.pid_file);
        }
    }

    fn record_pid(&self, handle: &ProcessHandle) {
        let pid = handle.pid();
        let Some(identity) = platform::process_identity(pid) else {
            warn!("Cannot identify pid {pid}; other invocations will not see this server");
            return;
        };
        if let Err(e) = pidfile::write(&self.pid_file, pid, handle.launched_at(), &identity) {
            warn!("Could not write pid file {}: {e}", self.pid_file.display());
        }
    }

    fn clear_handle(&mut self) {
        self.handle = None;
        pidfile::remove(&self.pid_file);
    }

    fn launch(&self) -> Result<ProcessHandle> {
        let mut cmd = Command::new(&self.server_path);
        cmd.current_dir(&self.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        platform::detach(&mut cmd);

        let child = cmd.spawn().map_err(LauncherError::Spawn)?;
        Ok(ProcessHandle::owned(child))
    }

    /// Graceful request, bounded wait, then forced kill.
    fn terminate(&self, handle: &mut ProcessHandle) -> Result<StopOutcome> {
        let pid = handle.pid();
        if let Err(e) = platform::request_terminate(pid) {
            // The process may already be on its way out; the wait below decides.
            warn!("Termination request for pid {pid} failed: {e}");
        }

        let deadline = Instant::now() + self.grace_period;
        loop {
            if !handle.is_alive() {
                return Ok(StopOutcome::Graceful);
            }
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            std::thread::sleep(EXIT_POLL.min(deadline - now));
        }

        warn!(
            "Server (pid {pid}) still alive after {}s grace period, force killing",
            self.grace_period.as_secs_f32()
        );
        platform::force_kill(pid)?;
        if !handle.reap(KILL_REAP_TIMEOUT) {
            warn!("Server (pid {pid}) still listed after kill");
        }
        Ok(StopOutcome::Forced)
    }
}

impl ServerControl for ProcessController {
    fn start(&mut self) -> Result<StartOutcome> {
        if let Some(pid) = self.pid() {
            info!("Server already running (pid {pid})");
            return Ok(StartOutcome::AlreadyRunning { pid });
        }

        if !self.server_path.exists() {
            return Err(LauncherError::NotFound {
                path: self.server_path.clone(),
            });
        }

        let mut handle = self.launch()?;
        let pid = handle.pid();
        info!("Launched {} (pid {pid})", self.server_path.display());

        std::thread::sleep(self.settle_time);
        match handle.poll() {
            Liveness::Alive => {
                self.record_pid(&handle);
                self.handle = Some(handle);
                info!("Server started successfully (pid {pid})");
                Ok(StartOutcome::Started { pid })
            }
            Liveness::Exited(status) => Err(LauncherError::LaunchFailed { pid, status }),
        }
    }

    fn stop(&mut self) -> Result<StopOutcome> {
        if !self.is_running() {
            return Ok(StopOutcome::NotRunning);
        }
        let Some(mut handle) = self.handle.take() else {
            return Ok(StopOutcome::NotRunning);
        };

        info!("Stopping server (pid {})", handle.pid());
        let outcome = self.terminate(&mut handle);
        self.clear_handle();

        if let Ok(how) = &outcome {
            info!("Server stopped ({how:?})");
        }
        outcome
    }

    fn is_running(&mut self) -> bool {
        if self.handle.is_none() {
            // another invocation may have started one since we last looked
            self.adopt_existing();
        }
        let Some(handle) = self.handle.as_mut() else {
            return false;
        };

        match handle.poll() {
            Liveness::Alive => true,
            Liveness::Exited(status) => {
                warn!("Server (pid {}) is gone: {status}", handle.pid());
                self.clear_handle();
                false
            }
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::os::unix::fs::PermissionsExt;

    use super::*;

    fn controller_for(script: &str, grace: Duration) -> (tempfile::TempDir, ProcessController) {
        let dir = tempfile::tempdir().unwrap();
        let cfg = LauncherConfig {
            server_binary: "fake-server".to_string(),
            grace_period_secs: grace.as_secs(),
            settle_time_secs: 0,
            ..LauncherConfig::default()
        };
        let path = cfg.server_path(dir.path());
        std::fs::write(&path, script).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();

        let mut ctl = ProcessController::new(&cfg, dir.path());
        // a short settle still catches scripts that exit immediately
        ctl.settle_time = Duration::from_millis(300);
        (dir, ctl)
    }

    #[test]
    fn missing_executable_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctl = ProcessController::new(&LauncherConfig::default(), dir.path());
        assert!(matches!(ctl.start(), Err(LauncherError::NotFound { .. })));
        assert!(!ctl.is_running());
    }

    #[test]
    fn start_is_idempotent_and_stop_is_graceful() {
        let (dir, mut ctl) = controller_for("#!/bin/sh\nexec sleep 30\n", Duration::from_secs(5));

        let first = ctl.start().unwrap();
        let StartOutcome::Started { pid } = first else {
            panic!("expected a fresh start, got {first:?}");
        };
        assert_eq!(ctl.start().unwrap(), StartOutcome::AlreadyRunning { pid });
        assert_eq!(ctl.start().unwrap(), StartOutcome::AlreadyRunning { pid });
        assert!(dir.path().join("fake-server.pid").exists());

        let began = Instant::now();
        assert_eq!(ctl.stop().unwrap(), StopOutcome::Graceful);
        assert!(began.elapsed() < Duration::from_secs(5));
        assert!(!ctl.is_running());
        assert!(!dir.path().join("fake-server.pid").exists());

        assert_eq!(ctl.stop().unwrap(), StopOutcome::NotRunning);
    }

    #[test]
    fn ignoring_sigterm_escalates_after_grace() {
        let script = "#!/bin/sh\ntrap '' TERM\nsleep 30\n";
        let (_dir, mut ctl) = controller_for(script, Duration::from_secs(1));

        ctl.start().unwrap();
        let began = Instant::now();
        assert_eq!(ctl.stop().unwrap(), StopOutcome::Forced);
        assert!(began.elapsed() >= Duration::from_secs(1));
        assert!(!ctl.is_running());
    }

    #[test]
    fn early_exit_is_launch_failed() {
        let (dir, mut ctl) = controller_for("#!/bin/sh\nexit 3\n", Duration::from_secs(1));
        match ctl.start() {
            Err(LauncherError::LaunchFailed { status, .. }) => assert!(status.contains('3')),
            other => panic!("expected LaunchFailed, got {other:?}"),
        }
        assert!(!ctl.is_running());
        assert!(!dir.path().join("fake-server.pid").exists());
    }

    #[test]
    fn crash_clears_handle() {
        let (_dir, mut ctl) = controller_for("#!/bin/sh\nsleep 1\n", Duration::from_secs(1));
        ctl.start().unwrap();
        std::thread::sleep(Duration::from_millis(1500));
        assert!(!ctl.is_running());
        assert_eq!(ctl.stop().unwrap(), StopOutcome::NotRunning);
    }

    // zombie detection relies on /proc
    #[cfg(target_os = "linux")]
    #[test]
    fn second_controller_adopts_and_stops() {
        let (dir, mut first) = controller_for("#!/bin/sh\nexec sleep 30\n", Duration::from_secs(5));
        let StartOutcome::Started { pid } = first.start().unwrap() else {
            panic!("expected a fresh start");
        };

        let cfg = LauncherConfig {
            server_binary: "fake-server".to_string(),
            ..LauncherConfig::default()
        };
        let mut second = ProcessController::new(&cfg, dir.path());
        assert_eq!(second.pid(), Some(pid));
        assert_eq!(second.stop().unwrap(), StopOutcome::Graceful);

        // the launching controller notices on its next liveness check
        assert!(!first.is_running());
    }

    // zombie detection relies on /proc
    #[cfg(target_os = "linux")]
    #[test]
    fn controllers_sharing_a_dir_see_each_others_server() {
        let (dir, mut first) = controller_for("#!/bin/sh\nexec sleep 30\n", Duration::from_secs(5));
        let cfg = LauncherConfig {
            server_binary: "fake-server".to_string(),
            settle_time_secs: 0,
            ..LauncherConfig::default()
        };
        // created while nothing is running yet
        let mut second = ProcessController::new(&cfg, dir.path());
        assert!(second.handle.is_none());

        let StartOutcome::Started { pid } = first.start().unwrap() else {
            panic!("expected a fresh start");
        };
        assert_eq!(second.start().unwrap(), StartOutcome::AlreadyRunning { pid });
        assert_eq!(second.stop().unwrap(), StopOutcome::Graceful);
        assert!(!first.is_running());
    }

    #[test]
    fn foreign_group_leader_is_never_adopted() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = LauncherConfig {
            server_binary: "fake-server".to_string(),
            ..LauncherConfig::default()
        };
        let pid_path = dir.path().join("fake-server.pid");

        // alive and leading its own group, but not launched by any controller
        let mut cmd = Command::new("sleep");
        cmd.arg("30");
        platform::detach(&mut cmd);
        let mut bystander = cmd.spawn().unwrap();
        let pid = bystander.id();

        for content in [
            format!("{pid}\n2020-01-01T00:00:00+00:00\n"),
            format!("{pid}\n2020-01-01T00:00:00+00:00\nnot-its-start-time\n"),
        ] {
            std::fs::write(&pid_path, content).unwrap();

            let mut ctl = ProcessController::new(&cfg, dir.path());
            assert_eq!(ctl.pid(), None);
            assert_eq!(ctl.stop().unwrap(), StopOutcome::NotRunning);
            assert!(!pid_path.exists());
            assert!(bystander.try_wait().unwrap().is_none());
        }

        bystander.kill().unwrap();
        bystander.wait().unwrap();
    }

    #[test]
    fn pid_file_carries_identity() {
        let (dir, mut ctl) = controller_for("#!/bin/sh\nexec sleep 30\n", Duration::from_secs(5));
        let StartOutcome::Started { pid } = ctl.start().unwrap() else {
            panic!("expected a fresh start");
        };
        let record = pidfile::read(&dir.path().join("fake-server.pid")).unwrap();
        assert_eq!(record.pid, pid);
        assert_eq!(record.identity, platform::process_identity(pid));
        ctl.stop().unwrap();
    }

    #[test]
    fn stale_pid_file_is_discarded() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = LauncherConfig {
            server_binary: "fake-server".to_string(),
            ..LauncherConfig::default()
        };
        let pid_path = dir.path().join("fake-server.pid");
        std::fs::write(&pid_path, "999999999\n2024-01-01T00:00:00+00:00\n").unwrap();

        let mut ctl = ProcessController::new(&cfg, dir.path());
        assert!(!ctl.is_running());
        assert!(!pid_path.exists());
    }
}
