//! Declarative firewall rules for the service port.
//!
//! Rule names are a pure function of service, direction, protocol and port,
//! so re-provisioning is delete-by-name then add with no drift.

use std::fmt;
use std::process::{Command, Stdio};

use log::{info, warn};

use crate::error::{LauncherError, Result};

mod iptables;
mod netsh;

pub use iptables::IptablesFirewall;
pub use netsh::NetshFirewall;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    In,
    Out,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Direction::In => "In",
            Direction::Out => "Out",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Tcp,
    Udp,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Protocol::Tcp => "TCP",
            Protocol::Udp => "UDP",
        })
    }
}

/// Network profiles a rule applies to. Rules are opened for every profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileScope {
    Any,
}

impl ProfileScope {
    pub fn as_str(self) -> &'static str {
        match self {
            ProfileScope::Any => "any",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirewallRuleSpec {
    pub name: String,
    pub direction: Direction,
    pub protocol: Protocol,
    pub port: u16,
    pub profile: ProfileScope,
}

impl FirewallRuleSpec {
    pub fn new(service: &str, direction: Direction, protocol: Protocol, port: u16) -> Self {
        Self {
            name: rule_name(service, direction, protocol, port),
            direction,
            protocol,
            port,
            profile: ProfileScope::Any,
        }
    }
}

/// `{service}-{In|Out}-{TCP|UDP}-{port}`
pub fn rule_name(service: &str, direction: Direction, protocol: Protocol, port: u16) -> String {
    format!("{service}-{direction}-{protocol}-{port}")
}

/// Rules the service needs: inbound TCP (the critical one), inbound UDP,
/// outbound TCP.
pub fn required_rules(service: &str, port: u16) -> Vec<FirewallRuleSpec> {
    vec![
        FirewallRuleSpec::new(service, Direction::In, Protocol::Tcp, port),
        FirewallRuleSpec::new(service, Direction::In, Protocol::Udp, port),
        FirewallRuleSpec::new(service, Direction::Out, Protocol::Tcp, port),
    ]
}

/// Every name this service could have used for `port`; all are cleaned
/// before adding.
pub fn known_rules(service: &str, port: u16) -> Vec<FirewallRuleSpec> {
    let mut rules = Vec::with_capacity(4);
    for direction in [Direction::In, Direction::Out] {
        for protocol in [Protocol::Tcp, Protocol::Udp] {
            rules.push(FirewallRuleSpec::new(service, direction, protocol, port));
        }
    }
    rules
}

/// OS firewall backend.
pub trait FirewallProvisioner {
    fn backend(&self) -> &'static str;
    /// Delete the rule if present. Absence is not an error.
    fn remove_rule(&self, rule: &FirewallRuleSpec) -> Result<()>;
    fn add_rule(&self, rule: &FirewallRuleSpec) -> Result<()>;
    fn requires_elevation(&self) -> bool {
        true
    }
}

/// Outcome of one provisioning pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FirewallReport {
    pub applied: usize,
    pub attempted: usize,
    /// (rule name, reason) for each failed add
    pub failures: Vec<(String, String)>,
}

impl FirewallReport {
    /// Minimum rule count for a usable setup.
    pub const REQUIRED: usize = 2;

    pub fn is_success(&self) -> bool {
        self.applied >= Self::REQUIRED
    }

    /// `Err(FirewallPartial)` when below [`Self::REQUIRED`].
    pub fn into_result(self) -> Result<Self> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(LauncherError::FirewallPartial {
                applied: self.applied,
                attempted: self.attempted,
            })
        }
    }
}

impl fmt::Display for FirewallReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} firewall rules applied", self.applied, self.attempted)
    }
}

/// Clean old rules, then add each required rule independently.
pub fn provision_firewall<F>(fw: &F, port: u16, service: &str) -> FirewallReport
where
    F: FirewallProvisioner + ?Sized,
{
    for rule in known_rules(service, port) {
        if let Err(e) = fw.remove_rule(&rule) {
            log::debug!("Removing {} skipped: {e}", rule.name);
        }
    }

    let mut report = FirewallReport::default();
    for rule in required_rules(service, port) {
        report.attempted += 1;
        match fw.add_rule(&rule) {
            Ok(()) => {
                report.applied += 1;
                info!("Firewall rule added: {}", rule.name);
            }
            Err(e) => {
                warn!("Firewall rule {} failed: {e}", rule.name);
                report.failures.push((rule.name.clone(), e.to_string()));
            }
        }
    }

    if report.applied == report.attempted {
        info!("{report} ({})", fw.backend());
    } else if report.is_success() {
        warn!("{report} ({}); inbound access should still work", fw.backend());
    } else {
        warn!("{report} ({}); {}", fw.backend(), manual_guidance(port));
    }
    report
}

/// What to tell a user when rules could not be applied.
pub fn manual_guidance(port: u16) -> String {
    format!(
        "allow inbound TCP and UDP on port {port} in the system firewall manually, \
         or rerun `smartlaunch provision` with administrator rights"
    )
}

/// Backend that cannot touch the firewall on this platform.
#[derive(Debug, Default)]
pub struct UnsupportedFirewall;

impl FirewallProvisioner for UnsupportedFirewall {
    fn backend(&self) -> &'static str {
        "none"
    }

    fn remove_rule(&self, _rule: &FirewallRuleSpec) -> Result<()> {
        Ok(())
    }

    fn add_rule(&self, rule: &FirewallRuleSpec) -> Result<()> {
        Err(LauncherError::Io(std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            format!("no firewall backend for rule {}", rule.name),
        )))
    }

    fn requires_elevation(&self) -> bool {
        false
    }
}

cfg_if::cfg_if! {
    if #[cfg(target_os = "windows")] {
        pub type PlatformFirewall = NetshFirewall;
    } else if #[cfg(target_os = "linux")] {
        pub type PlatformFirewall = IptablesFirewall;
    } else {
        pub type PlatformFirewall = UnsupportedFirewall;
    }
}

pub fn platform_firewall() -> PlatformFirewall {
    PlatformFirewall::default()
}

/// Run a firewall tool, turning a non-zero exit into an error carrying its
/// output.
fn run_tool(program: &str, args: &[String]) -> Result<()> {
    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .output()
        .map_err(|e| LauncherError::Io(std::io::Error::new(e.kind(), format!("{program}: {e}"))))?;

    if output.status.success() {
        return Ok(());
    }

    // netsh reports errors on stdout
    let mut msg = String::from_utf8_lossy(&output.stderr).trim().to_string();
    if msg.is_empty() {
        msg = String::from_utf8_lossy(&output.stdout).trim().to_string();
    }
    Err(LauncherError::Io(std::io::Error::other(format!(
        "{program} exited with {}: {msg}",
        output.status
    ))))
}
