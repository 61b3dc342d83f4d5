//! Packet redirection rules and the iptables directives that realise them.

use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use serde::Serialize;

use crate::supervisor::Directive;

const IPTABLES: &str = "iptables";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Tcp,
    Udp,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Tcp => "tcp",
            Protocol::Udp => "udp",
        }
    }
}

impl FromStr for Protocol {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tcp" => Ok(Protocol::Tcp),
            "udp" => Ok(Protocol::Udp),
            other => Err(format!("unknown protocol '{}'", other)),
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RedirectionRule {
    /// Rule section the rule was compiled from.
    pub section: String,
    pub protocol: Protocol,
    pub destination_port: u16,
    /// Reserved address of the user the rule is scoped to, if any.
    pub source: Option<Ipv4Addr>,
    pub redirect_port: u16,
}

impl RedirectionRule {
    pub fn is_user_scoped(&self) -> bool {
        self.source.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Table {
    Filter,
    Nat,
}

impl Table {
    fn as_str(&self) -> &'static str {
        match self {
            Table::Filter => "filter",
            Table::Nat => "nat",
        }
    }
}

/// A single iptables rule, independent of whether it is being added or
/// removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterRule {
    table: Table,
    chain: &'static str,
    spec: Vec<String>,
}

impl FilterRule {
    fn new(table: Table, chain: &'static str, spec: Vec<String>) -> Self {
        Self { table, chain, spec }
    }

    pub fn append(&self) -> Directive {
        self.directive("-A")
    }

    pub fn delete(&self) -> Directive {
        self.directive("-D")
    }

    fn directive(&self, action: &str) -> Directive {
        Directive::new(IPTABLES)
            .args(["-t", self.table.as_str(), action, self.chain])
            .args(self.spec.iter().cloned())
    }
}

/// Everything installed for one run, in installation order: upstream NAT and
/// forwarding first, then redirections with user-scoped rules ahead of
/// unscoped ones so a general rule never shadows a more specific one.
pub fn install_plan(upstream: &str, wireless: &str, rules: &[RedirectionRule]) -> Vec<FilterRule> {
    let mut plan = vec![
        FilterRule::new(
            Table::Nat,
            "POSTROUTING",
            strings(&["-o", upstream, "-j", "MASQUERADE"]),
        ),
        FilterRule::new(
            Table::Filter,
            "FORWARD",
            strings(&[
                "-i", upstream, "-o", wireless, "-m", "state", "--state",
                "RELATED,ESTABLISHED", "-j", "ACCEPT",
            ]),
        ),
        FilterRule::new(
            Table::Filter,
            "FORWARD",
            strings(&["-i", wireless, "-o", upstream, "-j", "ACCEPT"]),
        ),
    ];

    let (scoped, general): (Vec<&RedirectionRule>, Vec<&RedirectionRule>) =
        rules.iter().partition(|r| r.is_user_scoped());

    plan.extend(
        scoped
            .into_iter()
            .chain(general)
            .map(|rule| redirection(wireless, rule)),
    );
    plan
}

fn redirection(wireless: &str, rule: &RedirectionRule) -> FilterRule {
    let mut spec = strings(&["-i", wireless, "-p", rule.protocol.as_str()]);
    if let Some(source) = rule.source {
        spec.push("-s".to_string());
        spec.push(source.to_string());
    }
    spec.extend(strings(&["--dport", rule.destination_port.to_string().as_str()]));
    spec.extend(strings(&["-j", "REDIRECT", "--to-ports", rule.redirect_port.to_string().as_str()]));
    FilterRule::new(Table::Nat, "PREROUTING", spec)
}

fn strings(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|s| s.to_string()).collect()
}
