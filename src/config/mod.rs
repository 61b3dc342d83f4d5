//! Compiles the INI configuration into global settings, user bindings,
//! hostapd overrides and an ordered list of redirection rules.
//!
//! Problems with a single user binding, user reference or rule section are
//! logged and that entry is dropped. Problems with the settings every stage
//! depends on (credentials, identity, host map, file syntax) fail the whole
//! compile before anything on the host is touched.

mod hosts;
mod ini;


use std::fmt;
use std::net::IpAddr;
use std::path::Path;

use log::{debug, error, warn};
use serde::Serialize;

pub use hosts::{HostRecord, parse_host_map};
use ini::{Ini, Section};

use crate::rules::{Protocol, RedirectionRule};
use crate::users::{MAX_USERS, UserRegistry};

pub const DEFAULT_CONFIG_PATH: &str = "/etc/mitm-ap.conf";

pub const GLOBAL_SECTION: &str = "Global";
pub const OVERRIDE_SECTION: &str = "Override";

pub const DEFAULT_UPSTREAM: &str = "eth0";
pub const DEFAULT_WIRELESS: &str = "wlan0";
pub const DEFAULT_DNS: &str = "8.8.8.8";
pub const DEFAULT_SSID: &str = "mitm-ap";

pub const MIN_PASSPHRASE_LEN: usize = 8;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GlobalSettings {
    pub upstream: String,
    pub wireless: String,
    pub dns: IpAddr,
    pub ssid: String,
    #[serde(skip)]
    pub passphrase: String,
    pub hosts: String,
}

impl GlobalSettings {
    pub fn validate(&self) -> Result<()> {
        if self.passphrase.chars().count() < MIN_PASSPHRASE_LEN {
            return Err(ConfigError::InvalidCredentials);
        }
        if self.ssid.trim().is_empty() {
            return Err(ConfigError::InvalidIdentity);
        }
        Ok(())
    }
}

/// Command line values that take precedence over the file.
#[derive(Debug, Default, Clone)]
pub struct SettingsOverlay {
    pub upstream: Option<String>,
    pub wireless: Option<String>,
    pub dns: Option<String>,
    pub hosts: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CompiledConfig {
    pub settings: GlobalSettings,
    pub users: UserRegistry,
    pub host_records: Vec<HostRecord>,
    /// Raw `key=value` lines for the hostapd config, in file order.
    pub overrides: Vec<String>,
    pub rules: Vec<RedirectionRule>,
}

pub fn load<P: AsRef<Path>>(path: P, overlay: &SettingsOverlay) -> Result<CompiledConfig> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Io(format!("{}: {}", path.display(), e)))?;
    compile(&text, overlay)
}

pub fn compile(text: &str, overlay: &SettingsOverlay) -> Result<CompiledConfig> {
    let ini = Ini::parse(text)?;
    let global = ini.section(GLOBAL_SECTION);

    let settings = read_settings(global, overlay)?;
    settings.validate()?;

    let host_records = parse_host_map(&settings.hosts)?;
    let users = read_users(global);
    let overrides = read_overrides(ini.section(OVERRIDE_SECTION));

    let mut rules = Vec::new();
    for section in ini.sections().filter(|s| !is_reserved(s.name())) {
        match compile_section(section, &users) {
            Ok(mut section_rules) => {
                debug!(
                    "section [{}] produced {} rule(s)",
                    section.name(),
                    section_rules.len()
                );
                rules.append(&mut section_rules);
            }
            Err(e) => error!("skipping rule section [{}]: {}", section.name(), e),
        }
    }

    Ok(CompiledConfig {
        settings,
        users,
        host_records,
        overrides,
        rules,
    })
}

fn is_reserved(name: &str) -> bool {
    name.eq_ignore_ascii_case(GLOBAL_SECTION) || name.eq_ignore_ascii_case(OVERRIDE_SECTION)
}

fn read_settings(global: Option<&Section>, overlay: &SettingsOverlay) -> Result<GlobalSettings> {
    let get = |key: &str| global.and_then(|s| s.get(key)).map(str::to_string);

    let upstream = overlay
        .upstream
        .clone()
        .or_else(|| get("lan"))
        .unwrap_or_else(|| DEFAULT_UPSTREAM.to_string());
    let wireless = overlay
        .wireless
        .clone()
        .or_else(|| get("wlan"))
        .unwrap_or_else(|| DEFAULT_WIRELESS.to_string());
    let dns = overlay
        .dns
        .clone()
        .or_else(|| get("dns"))
        .unwrap_or_else(|| DEFAULT_DNS.to_string());
    let dns = dns.parse::<IpAddr>().map_err(|_| ConfigError::InvalidValue {
        key: "dns".to_string(),
        reason: format!("'{}' is not an IP address", dns),
    })?;

    let ssid = get("ssid").unwrap_or_else(|| DEFAULT_SSID.to_string());
    let passphrase = get("key").ok_or(ConfigError::InvalidCredentials)?;
    let hosts = overlay
        .hosts
        .clone()
        .or_else(|| get("hosts"))
        .ok_or_else(|| ConfigError::MissingKey("hosts".to_string()))?;

    Ok(GlobalSettings {
        upstream,
        wireless,
        dns,
        ssid,
        passphrase,
        hosts,
    })
}

fn read_users(global: Option<&Section>) -> UserRegistry {
    let mut users = UserRegistry::new();
    let Some(global) = global else {
        return users;
    };

    // Like every other key, a repeated `userN` keeps its last value.
    for index in 0..MAX_USERS {
        let key = format!("user{}", index);
        if let Some(value) = global.get(&key) {
            if let Err(e) = users.bind(index, value) {
                warn!("ignoring {} = {}: {}", key, value, e);
            }
        }
    }
    for (key, _) in global.entries() {
        if parse_user_ref(key).is_some_and(|index| index >= MAX_USERS) {
            warn!("ignoring {}: only {} user slots", key, MAX_USERS);
        }
    }
    users
}

fn read_overrides(section: Option<&Section>) -> Vec<String> {
    section
        .map(|s| s.entries().map(|(k, v)| format!("{}={}", k, v)).collect())
        .unwrap_or_default()
}

/// `userN` with any integer N. Range and binding are checked by the caller.
fn parse_user_ref(reference: &str) -> Option<usize> {
    let digits = reference
        .get(..4)
        .filter(|prefix| prefix.eq_ignore_ascii_case("user"))
        .map(|_| &reference[4..])?;
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

fn compile_section(section: &Section, users: &UserRegistry) -> std::result::Result<Vec<RedirectionRule>, String> {
    let redirect_port = section
        .get("redirect_port")
        .ok_or("missing redirect_port")?;
    let redirect_port = parse_port(redirect_port)?;

    let forward_ports = section
        .get("forward_ports")
        .ok_or("missing forward_ports")?;
    let forward_ports = split_list(forward_ports)
        .map(parse_port)
        .collect::<std::result::Result<Vec<u16>, String>>()?;
    if forward_ports.is_empty() {
        return Err("forward_ports is empty".to_string());
    }

    let protocol = match section.get("protocol") {
        Some(p) => p.parse::<Protocol>()?,
        None => Protocol::Tcp,
    };

    let sources = match section.get("users").filter(|u| !u.trim().is_empty()) {
        None => vec![None],
        Some(list) => resolve_users(section.name(), list, users)
            .into_iter()
            .map(Some)
            .collect(),
    };

    let mut rules = Vec::with_capacity(forward_ports.len() * sources.len());
    for port in &forward_ports {
        for source in &sources {
            rules.push(RedirectionRule {
                section: section.name().to_string(),
                protocol,
                destination_port: *port,
                source: *source,
                redirect_port,
            });
        }
    }
    Ok(rules)
}

fn resolve_users(section: &str, list: &str, users: &UserRegistry) -> Vec<std::net::Ipv4Addr> {
    let mut seen = Vec::new();
    let mut addresses = Vec::new();

    for reference in split_list(list) {
        let index = match parse_user_ref(reference) {
            Some(index) if index < MAX_USERS => index,
            _ => {
                error!("[{}]: invalid user reference '{}'", section, reference);
                continue;
            }
        };
        if !users.is_bound(index) {
            error!("[{}]: {} has no MAC address bound", section, reference);
            continue;
        }
        if seen.contains(&index) {
            warn!("[{}]: {} listed more than once", section, reference);
            continue;
        }
        seen.push(index);
        if let Some(address) = UserRegistry::reserved_address_for(index) {
            addresses.push(address);
        }
    }
    addresses
}

fn split_list(list: &str) -> impl Iterator<Item = &str> {
    list.split(',').map(str::trim).filter(|s| !s.is_empty())
}

fn parse_port(value: &str) -> std::result::Result<u16, String> {
    match value.trim().parse::<u16>() {
        Ok(port) if port != 0 => Ok(port),
        _ => Err(format!("invalid port '{}'", value.trim())),
    }
}

pub type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    Io(String),
    Parse { line: usize, reason: String },
    MissingKey(String),
    InvalidValue { key: String, reason: String },
    InvalidCredentials,
    InvalidIdentity,
    MalformedHostMap(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io(msg) => write!(f, "cannot read config: {}", msg),
            ConfigError::Parse { line, reason } => write!(f, "line {}: {}", line, reason),
            ConfigError::MissingKey(key) => write!(f, "[{}] is missing '{}'", GLOBAL_SECTION, key),
            ConfigError::InvalidValue { key, reason } => write!(f, "invalid '{}': {}", key, reason),
            ConfigError::InvalidCredentials => write!(
                f,
                "passphrase must be set and at least {} characters",
                MIN_PASSPHRASE_LEN
            ),
            ConfigError::InvalidIdentity => write!(f, "SSID must not be blank"),
            ConfigError::MalformedHostMap(entry) => {
                write!(f, "malformed host mapping '{}', expected host:ip", entry)
            }
        }
    }
}

impl std::error::Error for ConfigError {}
