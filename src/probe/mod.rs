//! Activity detection: is the managed service currently wanted?
//!
//! Two independent checks, OR-ed together:
//! - something accepts a local TCP connect on the port
//! - the OS connection table has an established or half-open inbound
//!   connection on the port
//!
//! Both checks fail open. A probe error only means "no signal from this check".

use std::net::{Ipv4Addr, SocketAddr, TcpStream};
use std::time::Duration;

mod netstat;
#[cfg(target_os = "linux")]
mod procfs;

pub use netstat::NetstatLister;
#[cfg(target_os = "linux")]
pub use procfs::ProcNetLister;

/// TCP connection states the probe distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TcpState {
    Established,
    SynReceived,
    Listen,
    Other,
}

impl TcpState {
    /// States that mean a client is talking (or about to talk) to the port.
    pub fn is_active(self) -> bool {
        matches!(self, TcpState::Established | TcpState::SynReceived)
    }
}

/// One row of the OS connection table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SocketEntry {
    pub local_port: u16,
    pub state: TcpState,
}

/// Source of the OS TCP connection table.
pub trait ConnectionLister {
    fn connections(&self) -> std::io::Result<Vec<SocketEntry>>;
}

/// Anything the monitor loop can ask for an activity signal.
pub trait ActivitySource {
    fn detect_activity(&self, port: u16) -> bool;
}

/// Derived activity snapshot; never stored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ActivitySignal {
    pub listening: bool,
    pub active_connections: usize,
}

impl ActivitySignal {
    pub fn is_active(&self) -> bool {
        self.listening || self.active_connections > 0
    }
}

/// Probe backed by a real local connect plus a [`ConnectionLister`].
pub struct NetworkProbe<L> {
    lister: L,
    timeout: Duration,
}

impl<L: ConnectionLister> NetworkProbe<L> {
    pub fn new(lister: L, timeout: Duration) -> Self {
        Self { lister, timeout }
    }

    /// Run both checks and keep their individual results.
    pub fn sample(&self, port: u16) -> ActivitySignal {
        ActivitySignal {
            listening: port_in_use(port, self.timeout),
            active_connections: self.count_active(port),
        }
    }

    /// Number of established / SYN-received connections on `port`.
    /// Enumeration errors count as zero.
    pub fn count_active(&self, port: u16) -> usize {
        match self.lister.connections() {
            Ok(entries) => entries
                .iter()
                .filter(|e| e.local_port == port && e.state.is_active())
                .count(),
            Err(e) => {
                log::debug!("Connection enumeration failed, treating as idle: {e}");
                0
            }
        }
    }
}

impl<L: ConnectionLister> ActivitySource for NetworkProbe<L> {
    fn detect_activity(&self, port: u16) -> bool {
        let signal = self.sample(port);
        log::debug!(
            "probe port {port}: listening={} active_connections={}",
            signal.listening,
            signal.active_connections
        );
        signal.is_active()
    }
}

/// `true` when a local connect to `port` succeeds within `timeout`.
pub fn port_in_use(port: u16, timeout: Duration) -> bool {
    let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, port));
    match TcpStream::connect_timeout(&addr, timeout) {
        Ok(_) => true,
        Err(e) => {
            log::trace!("connect to {addr} failed: {e}");
            false
        }
    }
}

/// Connection lister for the current platform. `timeout` bounds each
/// external tool run; reading procfs needs no bound.
#[cfg(target_os = "linux")]
pub fn platform_lister(_timeout: Duration) -> ProcNetLister {
    ProcNetLister::default()
}

/// Connection lister for the current platform. `timeout` bounds each
/// external tool run; reading procfs needs no bound.
#[cfg(not(target_os = "linux"))]
pub fn platform_lister(timeout: Duration) -> NetstatLister {
    NetstatLister::new(timeout)
}
