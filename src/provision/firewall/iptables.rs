//! Linux netfilter through `iptables`; the rule name travels as a comment.

use super::{Direction, FirewallProvisioner, FirewallRuleSpec, Protocol, run_tool};
use crate::error::{LauncherError, Result};

/// Upper bound on duplicate copies removed per rule.
const MAX_DUPLICATES: usize = 16;

#[derive(Debug, Default)]
pub struct IptablesFirewall;

impl IptablesFirewall {
    fn binary(&self) -> Result<String> {
        which::which("iptables")
            .map(|p| p.display().to_string())
            .map_err(|e| {
                LauncherError::Io(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("iptables not available: {e}"),
                ))
            })
    }
}

/// Rule body shared by insert and delete, after the chain.
fn rule_args(op: &str, rule: &FirewallRuleSpec) -> Vec<String> {
    let (chain, port_flag) = match rule.direction {
        Direction::In => ("INPUT", "--dport"),
        Direction::Out => ("OUTPUT", "--sport"),
    };
    let proto = match rule.protocol {
        Protocol::Tcp => "tcp",
        Protocol::Udp => "udp",
    };
    vec![
        op.into(),
        chain.into(),
        "-p".into(),
        proto.into(),
        port_flag.into(),
        rule.port.to_string(),
        "-m".into(),
        "comment".into(),
        "--comment".into(),
        rule.name.clone(),
        "-j".into(),
        "ACCEPT".into(),
    ]
}

impl FirewallProvisioner for IptablesFirewall {
    fn backend(&self) -> &'static str {
        "iptables"
    }

    fn remove_rule(&self, rule: &FirewallRuleSpec) -> Result<()> {
        let bin = self.binary()?;
        // -D removes one copy per call; stop once nothing matches
        for _ in 0..MAX_DUPLICATES {
            if run_tool(&bin, &rule_args("-D", rule)).is_err() {
                break;
            }
        }
        Ok(())
    }

    fn add_rule(&self, rule: &FirewallRuleSpec) -> Result<()> {
        let bin = self.binary()?;
        run_tool(&bin, &rule_args("-A", rule))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inbound_uses_dport() {
        let rule = FirewallRuleSpec::new("SyncAnywhere", Direction::In, Protocol::Tcp, 8000);
        assert_eq!(
            rule_args("-A", &rule).join(" "),
            "-A INPUT -p tcp --dport 8000 -m comment --comment SyncAnywhere-In-TCP-8000 -j ACCEPT"
        );
    }

    #[test]
    fn outbound_uses_sport() {
        let rule = FirewallRuleSpec::new("SyncAnywhere", Direction::Out, Protocol::Tcp, 8000);
        let args = rule_args("-D", &rule);
        assert_eq!(args[1], "OUTPUT");
        assert_eq!(args[4], "--sport");
    }
}
