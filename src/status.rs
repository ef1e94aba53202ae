//! Read-only snapshot of server, connection and autostart state.

use std::fmt;
use std::net::{Ipv4Addr, UdpSocket};

use crate::autostart::{AutostartRegistrar, AutostartStore};
use crate::probe::{ConnectionLister, NetworkProbe};

const RULE: &str = "==================================================";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceState {
    /// Port is listening. The pid is known only when this launcher owns or
    /// adopted the process.
    Running { pid: Option<u32> },
    Stopped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AutostartState {
    Enabled,
    Disabled,
    Unknown(String),
}

#[derive(Debug, Clone)]
pub struct StatusReport {
    pub service_name: String,
    pub port: u16,
    pub service: ServiceState,
    /// Base URLs clients can try; empty while stopped.
    pub addresses: Vec<String>,
    pub active_connections: usize,
    pub autostart: AutostartState,
}

impl StatusReport {
    /// Probe the port and read the autostart store. `pid` is the controller's
    /// view of the server process, if any.
    pub fn collect<L, S>(
        service_name: &str,
        port: u16,
        probe: &NetworkProbe<L>,
        registrar: &AutostartRegistrar<S>,
        pid: Option<u32>,
    ) -> Self
    where
        L: ConnectionLister,
        S: AutostartStore,
    {
        let signal = probe.sample(port);
        let (service, addresses) = if signal.listening {
            (ServiceState::Running { pid }, candidate_addresses(primary_ipv4(), port))
        } else {
            (ServiceState::Stopped, Vec::new())
        };

        let autostart = match registrar.is_installed() {
            Ok(true) => AutostartState::Enabled,
            Ok(false) => AutostartState::Disabled,
            Err(e) => AutostartState::Unknown(e.to_string()),
        };

        Self {
            service_name: service_name.to_string(),
            port,
            service,
            addresses,
            active_connections: signal.active_connections,
            autostart,
        }
    }
}

/// `http://<lan ip>:port` when known, then `http://localhost:port`.
pub fn candidate_addresses(lan: Option<Ipv4Addr>, port: u16) -> Vec<String> {
    let mut out = Vec::with_capacity(2);
    if let Some(ip) = lan {
        out.push(format!("http://{ip}:{port}"));
    }
    out.push(format!("http://localhost:{port}"));
    out
}

/// Address of the interface that routes outward. Connecting a UDP socket
/// only selects a route; no packet is sent.
pub fn primary_ipv4() -> Option<Ipv4Addr> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).ok()?;
    socket.connect((Ipv4Addr::new(8, 8, 8, 8), 80)).ok()?;
    match socket.local_addr().ok()?.ip() {
        std::net::IpAddr::V4(ip) if !ip.is_unspecified() && !ip.is_loopback() => Some(ip),
        _ => None,
    }
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{RULE}")?;
        writeln!(f, " {} launcher status", self.service_name)?;
        writeln!(f, "{RULE}")?;
        match &self.service {
            ServiceState::Running { pid: Some(pid) } => {
                writeln!(f, " Server:      RUNNING (pid {pid})")?
            }
            ServiceState::Running { pid: None } => writeln!(f, " Server:      RUNNING")?,
            ServiceState::Stopped => writeln!(f, " Server:      STOPPED (starts on demand)")?,
        }
        writeln!(f, " Port:        {}", self.port)?;
        writeln!(f, " Connections: {} active", self.active_connections)?;
        match &self.autostart {
            AutostartState::Enabled => writeln!(f, " Autostart:   enabled")?,
            AutostartState::Disabled => writeln!(f, " Autostart:   disabled")?,
            AutostartState::Unknown(reason) => writeln!(f, " Autostart:   unknown ({reason})")?,
        }
        if matches!(self.service, ServiceState::Running { .. }) && !self.addresses.is_empty() {
            writeln!(f, " Addresses:")?;
            for addr in &self.addresses {
                writeln!(f, "   {addr}")?;
            }
        }
        write!(f, "{RULE}")
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::net::TcpListener;
    use std::time::Duration;

    use super::*;
    use crate::autostart::AutostartEntry;
    use crate::error::Result;
    use crate::probe::{SocketEntry, TcpState};

    struct Rows(Vec<SocketEntry>);

    impl ConnectionLister for Rows {
        fn connections(&self) -> std::io::Result<Vec<SocketEntry>> {
            Ok(self.0.clone())
        }
    }

    #[derive(Default)]
    struct OneSlot(RefCell<Option<String>>);

    impl AutostartStore for OneSlot {
        fn location(&self) -> String {
            "memory".to_string()
        }
        fn read(&self, _key: &str) -> Result<Option<String>> {
            Ok(self.0.borrow().clone())
        }
        fn write(&self, entry: &AutostartEntry) -> Result<()> {
            *self.0.borrow_mut() = Some(entry.command_line());
            Ok(())
        }
        fn remove(&self, _key: &str) -> Result<bool> {
            Ok(self.0.borrow_mut().take().is_some())
        }
    }

    fn registrar() -> AutostartRegistrar<OneSlot> {
        AutostartRegistrar::new(
            OneSlot::default(),
            AutostartEntry {
                key_name: "SyncAnywhereService".to_string(),
                program: "/opt/sync/smartlaunch".into(),
                args: vec!["background".to_string()],
            },
        )
    }

    #[test]
    fn addresses_prefer_lan_ip() {
        assert_eq!(
            candidate_addresses(Some(Ipv4Addr::new(192, 168, 1, 20)), 8000),
            vec!["http://192.168.1.20:8000", "http://localhost:8000"]
        );
        assert_eq!(
            candidate_addresses(None, 8000),
            vec!["http://localhost:8000"]
        );
    }

    #[test]
    fn listening_port_reports_running() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let reg = registrar();
        reg.install().unwrap();

        let probe = NetworkProbe::new(
            Rows(vec![SocketEntry {
                local_port: port,
                state: TcpState::Established,
            }]),
            Duration::from_secs(1),
        );
        let report = StatusReport::collect("SyncAnywhere", port, &probe, &reg, Some(42));

        assert_eq!(report.service, ServiceState::Running { pid: Some(42) });
        assert_eq!(report.active_connections, 1);
        assert_eq!(report.autostart, AutostartState::Enabled);
        let text = report.to_string();
        assert!(text.contains("RUNNING (pid 42)"));
        assert!(text.contains("Addresses:"));
        assert!(text.contains(&format!("http://localhost:{port}")));
    }

    #[test]
    fn closed_port_reports_stopped() {
        let port = {
            let l = TcpListener::bind("127.0.0.1:0").unwrap();
            l.local_addr().unwrap().port()
        };
        let probe = NetworkProbe::new(Rows(Vec::new()), Duration::from_millis(200));
        let report = StatusReport::collect("SyncAnywhere", port, &probe, &registrar(), None);

        assert_eq!(report.service, ServiceState::Stopped);
        assert_eq!(report.autostart, AutostartState::Disabled);
        assert!(report.addresses.is_empty());
        let text = report.to_string();
        assert!(text.contains("STOPPED"));
        assert!(!text.contains("Addresses"));
        assert!(!text.contains("http://"));
    }
}
