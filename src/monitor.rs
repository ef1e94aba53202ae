//! The on-demand loop: start the server when the port sees activity, stop it
//! once it has been idle for longer than the timeout.

use std::thread;
use std::time::{Duration, Instant};

use log::{error, info, warn};

use crate::config::LauncherConfig;
use crate::probe::ActivitySource;
use crate::process::{ServerControl, StartOutcome, StopOutcome};

/// Longest uninterrupted sleep; bounds how late an interrupt is noticed.
const SLEEP_SLICE: Duration = Duration::from_millis(200);

/// What one iteration did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// No activity, nothing to do.
    Quiet,
    /// Activity seen; the server was already up.
    Active,
    Started { pid: u32 },
    StartFailed,
    IdleStop(StopOutcome),
    StopFailed,
}

pub struct Monitor<P, C> {
    probe: P,
    controller: C,
    port: u16,
    idle_timeout: Duration,
    poll_interval: Duration,
    last_activity: Instant,
}

impl<P: ActivitySource, C: ServerControl> Monitor<P, C> {
    /// The idle clock starts at `now`.
    pub fn new(probe: P, controller: C, cfg: &LauncherConfig, now: Instant) -> Self {
        Self {
            probe,
            controller,
            port: cfg.port,
            idle_timeout: cfg.idle_timeout(),
            poll_interval: cfg.poll_interval(),
            last_activity: now,
        }
    }

    pub fn last_activity(&self) -> Instant {
        self.last_activity
    }

    /// One poll iteration as of `now`.
    pub fn tick(&mut self, now: Instant) -> TickOutcome {
        if self.probe.detect_activity(self.port) {
            self.last_activity = now;
            if self.controller.is_running() {
                return TickOutcome::Active;
            }
            info!("Activity on port {} while stopped, starting server", self.port);
            return match self.controller.start() {
                Ok(StartOutcome::Started { pid }) => TickOutcome::Started { pid },
                Ok(StartOutcome::AlreadyRunning { .. }) => TickOutcome::Active,
                Err(e) => {
                    error!("Start failed: {e}");
                    TickOutcome::StartFailed
                }
            };
        }

        let idle_for = now.saturating_duration_since(self.last_activity);
        if idle_for > self.idle_timeout && self.controller.is_running() {
            info!(
                "Idle for {}s (limit {}s), stopping server",
                idle_for.as_secs(),
                self.idle_timeout.as_secs()
            );
            return match self.controller.stop() {
                Ok(outcome) => TickOutcome::IdleStop(outcome),
                Err(e) => {
                    error!("Stop failed: {e}");
                    TickOutcome::StopFailed
                }
            };
        }
        TickOutcome::Quiet
    }

    /// Poll until `interrupted` reports true, then stop the server once more.
    pub fn run(&mut self, interrupted: impl Fn() -> bool) {
        info!(
            "Monitoring port {} (idle timeout {}s, poll every {}s)",
            self.port,
            self.idle_timeout.as_secs(),
            self.poll_interval.as_secs()
        );
        while !interrupted() {
            self.tick(Instant::now());
            sleep_unless(self.poll_interval, &interrupted);
        }
        self.shutdown();
    }

    /// Best-effort final stop.
    pub fn shutdown(&mut self) {
        match self.controller.stop() {
            Ok(StopOutcome::NotRunning) => {}
            Ok(outcome) => info!("Server stopped on exit ({outcome:?})"),
            Err(e) => warn!("Stopping server on exit failed: {e}"),
        }
    }
}

/// Sleep for `total` in short slices, returning early once `interrupted`.
fn sleep_unless(total: Duration, interrupted: &impl Fn() -> bool) {
    let deadline = Instant::now() + total;
    loop {
        if interrupted() {
            return;
        }
        let left = deadline.saturating_duration_since(Instant::now());
        if left.is_zero() {
            return;
        }
        thread::sleep(left.min(SLEEP_SLICE));
    }
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    use super::*;
    use crate::error::{LauncherError, Result};

    #[derive(Clone, Default)]
    struct ScriptedProbe(Rc<Cell<bool>>);

    impl ActivitySource for ScriptedProbe {
        fn detect_activity(&self, _port: u16) -> bool {
            self.0.get()
        }
    }

    #[derive(Default)]
    struct Counts {
        running: bool,
        starts: usize,
        stops: usize,
        fail_start: bool,
    }

    #[derive(Clone, Default)]
    struct FakeServer(Rc<RefCell<Counts>>);

    impl ServerControl for FakeServer {
        fn start(&mut self) -> Result<StartOutcome> {
            let mut c = self.0.borrow_mut();
            if c.running {
                return Ok(StartOutcome::AlreadyRunning { pid: 7 });
            }
            if c.fail_start {
                return Err(LauncherError::NotFound {
                    path: "/missing/server".into(),
                });
            }
            c.running = true;
            c.starts += 1;
            Ok(StartOutcome::Started { pid: 7 })
        }

        fn stop(&mut self) -> Result<StopOutcome> {
            let mut c = self.0.borrow_mut();
            if !c.running {
                return Ok(StopOutcome::NotRunning);
            }
            c.running = false;
            c.stops += 1;
            Ok(StopOutcome::Graceful)
        }

        fn is_running(&mut self) -> bool {
            self.0.borrow().running
        }
    }

    type Fixture = (ScriptedProbe, FakeServer, Monitor<ScriptedProbe, FakeServer>, Instant);

    fn setup(idle_secs: u64) -> Fixture {
        let cfg = LauncherConfig {
            idle_timeout_secs: idle_secs,
            poll_interval_secs: 1,
            ..LauncherConfig::default()
        };
        let probe = ScriptedProbe::default();
        let server = FakeServer::default();
        let t0 = Instant::now();
        let monitor = Monitor::new(probe.clone(), server.clone(), &cfg, t0);
        (probe, server, monitor, t0)
    }

    fn at(t0: Instant, secs: u64) -> Instant {
        t0 + Duration::from_secs(secs)
    }

    #[test]
    fn idle_server_is_stopped_exactly_once() {
        let (probe, server, mut monitor, t0) = setup(5);

        probe.0.set(true);
        assert_eq!(monitor.tick(t0), TickOutcome::Started { pid: 7 });
        probe.0.set(false);

        let mut stopped_at = Vec::new();
        for s in 1..=12 {
            if let TickOutcome::IdleStop(_) = monitor.tick(at(t0, s)) {
                stopped_at.push(s);
            }
        }
        assert_eq!(stopped_at, vec![6]);
        assert_eq!(server.0.borrow().stops, 1);
    }

    #[test]
    fn activity_while_stopped_starts_on_next_tick() {
        let (probe, server, mut monitor, t0) = setup(5);

        for s in 0..10 {
            assert_eq!(monitor.tick(at(t0, s)), TickOutcome::Quiet);
        }
        probe.0.set(true);
        assert_eq!(monitor.tick(at(t0, 10)), TickOutcome::Started { pid: 7 });
        assert_eq!(monitor.last_activity(), at(t0, 10));
        assert_eq!(monitor.tick(at(t0, 11)), TickOutcome::Active);
        assert_eq!(server.0.borrow().starts, 1);
    }

    #[test]
    fn activity_resets_idle_clock() {
        let (probe, server, mut monitor, t0) = setup(5);

        probe.0.set(true);
        monitor.tick(t0);
        probe.0.set(false);
        monitor.tick(at(t0, 4));
        probe.0.set(true);
        monitor.tick(at(t0, 5));
        probe.0.set(false);
        // 9 - 5 = 4s idle, still under the limit
        assert_eq!(monitor.tick(at(t0, 9)), TickOutcome::Quiet);
        assert_eq!(server.0.borrow().stops, 0);
        assert!(matches!(monitor.tick(at(t0, 11)), TickOutcome::IdleStop(_)));
    }

    #[test]
    fn start_failure_keeps_polling() {
        let (probe, server, mut monitor, t0) = setup(5);
        server.0.borrow_mut().fail_start = true;

        probe.0.set(true);
        assert_eq!(monitor.tick(t0), TickOutcome::StartFailed);
        server.0.borrow_mut().fail_start = false;
        assert_eq!(monitor.tick(at(t0, 1)), TickOutcome::Started { pid: 7 });
    }

    #[test]
    fn run_exits_on_interrupt_and_stops_server() {
        let (probe, server, mut monitor, _) = setup(5);
        probe.0.set(true);

        let calls = Cell::new(0);
        // first check enters the loop, the second cuts the sleep short
        monitor.run(|| {
            calls.set(calls.get() + 1);
            calls.get() > 1
        });
        let c = server.0.borrow();
        assert_eq!((c.starts, c.stops, c.running), (1, 1, false));
    }

    #[test]
    fn sleep_returns_early_when_interrupted() {
        let start = Instant::now();
        sleep_unless(Duration::from_secs(30), &|| true);
        assert!(start.elapsed() < Duration::from_secs(1));
    }
}
