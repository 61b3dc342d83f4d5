use std::path::PathBuf;

use anyhow::Result;
use serde_json::{Value, json};

use crate::config::{CompiledConfig, GlobalSettings, HostRecord};
use crate::helper::{self, HELPER_PID_FILE};
use crate::hostapd::{self, DAEMON_PID_FILE, DEFAULT_TEMPLATE};
use crate::radio::RadioUnblockMethod;
use crate::rules::{self, FilterRule, RedirectionRule};
use crate::supervisor::Directive;
use crate::users::UserRegistry;

/// Everything the controller needs for one run. Immutable once built.
#[derive(Debug, Clone)]
pub struct BringUpPlan {
    pub settings: GlobalSettings,
    pub users: UserRegistry,
    pub host_records: Vec<HostRecord>,
    pub overrides: Vec<String>,
    pub rules: Vec<RedirectionRule>,
    pub radio: RadioUnblockMethod,
    pub template: String,
    pub daemon_pid_file: PathBuf,
    pub helper_pid_file: PathBuf,
}

impl BringUpPlan {
    pub fn new(config: CompiledConfig, radio: RadioUnblockMethod) -> Self {
        Self {
            settings: config.settings,
            users: config.users,
            host_records: config.host_records,
            overrides: config.overrides,
            rules: config.rules,
            radio,
            template: DEFAULT_TEMPLATE.to_string(),
            daemon_pid_file: PathBuf::from(DAEMON_PID_FILE),
            helper_pid_file: PathBuf::from(HELPER_PID_FILE),
        }
    }

    pub fn interface_down(&self) -> Directive {
        Directive::new("ip").args(["link", "set", self.settings.wireless.as_str(), "down"])
    }

    pub fn interface_address(&self) -> Result<Vec<Directive>> {
        let network = helper::ap_network()?;
        let wireless = self.settings.wireless.as_str();
        Ok(vec![
            Directive::new("ip").args(["addr", "flush", "dev", wireless]),
            Directive::new("ip").args(["addr", "add", network.to_string().as_str(), "dev", wireless]),
            Directive::new("ip").args(["link", "set", wireless, "up"]),
        ])
    }

    pub fn interface_release(&self) -> Vec<Directive> {
        let wireless = self.settings.wireless.as_str();
        vec![
            Directive::new("ip").args(["addr", "flush", "dev", wireless]),
            Directive::new("ip").args(["link", "set", wireless, "down"]),
        ]
    }

    pub fn helper(&self) -> Result<Directive> {
        helper::helper_directive(
            &self.settings,
            &self.users,
            &self.host_records,
            &self.helper_pid_file,
        )
    }

    pub fn filter_rules(&self) -> Vec<FilterRule> {
        rules::install_plan(&self.settings.upstream, &self.settings.wireless, &self.rules)
    }

    pub fn forwarding(&self, enabled: bool) -> Directive {
        let value = if enabled { "1" } else { "0" };
        Directive::new("sysctl").args(["-w", format!("net.ipv4.ip_forward={}", value).as_str()])
    }

    /// JSON summary for `--dry-run`. The passphrase is masked.
    pub fn describe(&self) -> Result<Value> {
        let mut masked = self.settings.clone();
        masked.passphrase = "*".repeat(masked.passphrase.chars().count());
        let daemon_config = hostapd::render(&self.template, &masked, &self.overrides)?;

        let filter: Vec<String> = self
            .filter_rules()
            .iter()
            .map(|r| r.append().to_string())
            .collect();

        Ok(json!({
            "settings": self.settings,
            "users": self.users.occupied_slots(),
            "host_records": self.host_records,
            "rules": self.rules,
            "radio": self.radio.steps().iter().map(|s| s.directive.to_string()).collect::<Vec<_>>(),
            "daemon_config": daemon_config,
            "helper": self.helper()?.to_string(),
            "packet_filter": filter,
        }))
    }
}
