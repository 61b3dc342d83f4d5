use std::fmt;

/// Bring-up stages in the order they are entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    Init,
    CredentialsValidated,
    RadioUnblocked,
    InterfaceDown,
    DaemonConfigWritten,
    DaemonRunning,
    InterfaceAddressed,
    HelperRunning,
    RulesInstalled,
    ForwardingEnabled,
    Teardown,
    Stopped,
}

impl Stage {
    pub fn name(&self) -> &'static str {
        match self {
            Stage::Init => "init",
            Stage::CredentialsValidated => "credentials-validated",
            Stage::RadioUnblocked => "radio-unblocked",
            Stage::InterfaceDown => "interface-down",
            Stage::DaemonConfigWritten => "daemon-config-written",
            Stage::DaemonRunning => "daemon-running",
            Stage::InterfaceAddressed => "interface-addressed",
            Stage::HelperRunning => "helper-running",
            Stage::RulesInstalled => "rules-installed",
            Stage::ForwardingEnabled => "forwarding-enabled",
            Stage::Teardown => "teardown",
            Stage::Stopped => "stopped",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Host resources currently live. Only the controller mutates this.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LifecycleState {
    pub forwarding_enabled: bool,
    pub packet_rules_installed: bool,
    pub interface_up: bool,
    pub ap_daemon_running: bool,
    pub helper_running: bool,
}

impl LifecycleState {
    pub fn is_clear(&self) -> bool {
        *self == LifecycleState::default()
    }
}

/// Resource named in teardown output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    Forwarding,
    PacketRules,
    Helper,
    ApDaemon,
    Interface,
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Resource::Forwarding => "forwarding",
            Resource::PacketRules => "packet rules",
            Resource::Helper => "dhcp/dns helper",
            Resource::ApDaemon => "ap daemon",
            Resource::Interface => "wireless interface",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeardownWarning {
    pub resource: Resource,
    pub reason: String,
}

impl fmt::Display for TeardownWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.resource, self.reason)
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TeardownReport {
    /// External actions attempted.
    pub actions: usize,
    pub warnings: Vec<TeardownWarning>,
}

impl TeardownReport {
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }
}
