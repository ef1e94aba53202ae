//! Windows Defender Firewall through `netsh advfirewall`.

use super::{Direction, FirewallProvisioner, FirewallRuleSpec, Protocol, run_tool};
use crate::error::Result;

#[derive(Debug, Default)]
pub struct NetshFirewall;

fn delete_args(rule: &FirewallRuleSpec) -> Vec<String> {
    vec![
        "advfirewall".into(),
        "firewall".into(),
        "delete".into(),
        "rule".into(),
        format!("name={}", rule.name),
    ]
}

fn add_args(rule: &FirewallRuleSpec) -> Vec<String> {
    let dir = match rule.direction {
        Direction::In => "in",
        Direction::Out => "out",
    };
    let protocol = match rule.protocol {
        Protocol::Tcp => "TCP",
        Protocol::Udp => "UDP",
    };
    vec![
        "advfirewall".into(),
        "firewall".into(),
        "add".into(),
        "rule".into(),
        format!("name={}", rule.name),
        format!("dir={dir}"),
        "action=allow".into(),
        format!("protocol={protocol}"),
        format!("localport={}", rule.port),
        format!("profile={}", rule.profile.as_str()),
    ]
}

impl FirewallProvisioner for NetshFirewall {
    fn backend(&self) -> &'static str {
        "netsh advfirewall"
    }

    fn remove_rule(&self, rule: &FirewallRuleSpec) -> Result<()> {
        run_tool("netsh", &delete_args(rule))
    }

    fn add_rule(&self, rule: &FirewallRuleSpec) -> Result<()> {
        run_tool("netsh", &add_args(rule))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_command_line() {
        let rule = FirewallRuleSpec::new("SyncAnywhere", Direction::In, Protocol::Udp, 8000);
        assert_eq!(
            add_args(&rule).join(" "),
            "advfirewall firewall add rule name=SyncAnywhere-In-UDP-8000 dir=in \
             action=allow protocol=UDP localport=8000 profile=any"
        );
        assert_eq!(
            delete_args(&rule).join(" "),
            "advfirewall firewall delete rule name=SyncAnywhere-In-UDP-8000"
        );
    }
}
