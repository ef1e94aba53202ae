//! One-shot network exposure setup for the managed server: administrator
//! rights, firewall rules for the service port, antivirus exclusion.

use std::fmt;
use std::path::Path;

use log::{info, warn};

use crate::config::LauncherConfig;

pub mod elevation;
pub mod exclusion;
pub mod firewall;

pub use elevation::{ELEVATED_FLAG, elevate_and_relaunch, is_elevated};
pub use firewall::{
    FirewallProvisioner, FirewallReport, FirewallRuleSpec, platform_firewall, provision_firewall,
};

/// Privilege state the provisioning pass ran with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElevationStatus {
    Elevated,
    /// The backend works without administrator rights.
    NotRequired,
    /// Still unprivileged; rule changes are likely to fail.
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct ProvisionReport {
    pub port: u16,
    pub elevation: ElevationStatus,
    pub firewall: FirewallReport,
    pub exclusion_requested: bool,
}

impl fmt::Display for ProvisionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.elevation {
            ElevationStatus::Elevated => writeln!(f, "Privileges: administrator")?,
            ElevationStatus::NotRequired => writeln!(f, "Privileges: not required")?,
            ElevationStatus::Failed(reason) => writeln!(f, "Privileges: unprivileged ({reason})")?,
        }
        writeln!(f, "Firewall:   {}", self.firewall)?;
        for (rule, reason) in &self.firewall.failures {
            writeln!(f, "  {rule}: {reason}")?;
        }
        if !self.firewall.is_success() {
            writeln!(f, "Action:     {}", firewall::manual_guidance(self.port))?;
        }
        write!(
            f,
            "Scan exclusion: {}",
            if self.exclusion_requested { "requested" } else { "skipped" }
        )
    }
}

/// Make sure we run elevated (relaunching if needed), apply firewall rules
/// and request the scan exclusion for `exe`.
///
/// `relaunch_args` is the command line to hand to the elevated instance;
/// `relaunched` is set when this process already carries [`ELEVATED_FLAG`].
/// A successful relaunch does not return.
pub fn prepare_network_exposure<F>(
    fw: &F,
    cfg: &LauncherConfig,
    exe: &Path,
    relaunch_args: &[String],
    relaunched: bool,
) -> ProvisionReport
where
    F: FirewallProvisioner + ?Sized,
{
    let elevation = if is_elevated() {
        ElevationStatus::Elevated
    } else if !fw.requires_elevation() {
        ElevationStatus::NotRequired
    } else if relaunched {
        let reason = "relaunched instance is still unprivileged".to_string();
        warn!("Elevation failed: {reason}");
        ElevationStatus::Failed(reason)
    } else {
        info!("Administrator rights needed for firewall setup");
        match elevate_and_relaunch(relaunch_args) {
            Ok(never) => match never {},
            Err(e) => {
                warn!("{e}; continuing without administrator rights");
                ElevationStatus::Failed(e.to_string())
            }
        }
    };

    let firewall = provision_firewall(fw, cfg.port, &cfg.service_name);

    let exclusion_requested = match elevation {
        ElevationStatus::Elevated => exclusion::request_scan_exclusion(exe),
        _ => false,
    };

    ProvisionReport {
        port: cfg.port,
        elevation,
        firewall,
        exclusion_requested,
    }
}
