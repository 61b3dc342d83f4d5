use std::net::IpAddr;

use serde::Serialize;

use crate::config::{ConfigError, Result};

/// Static name record served by the DHCP/DNS helper.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HostRecord {
    pub host: String,
    pub address: IpAddr,
}

impl HostRecord {
    pub fn fragment(&self) -> String {
        format!("--host-record={},{}", self.host, self.address)
    }
}

/// Parses `host:ip[,host:ip...]`. Any malformed entry rejects the whole map.
pub fn parse_host_map(map: &str) -> Result<Vec<HostRecord>> {
    let mut records = Vec::new();

    for entry in map.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let (host, address) = entry
            .split_once(':')
            .ok_or_else(|| ConfigError::MalformedHostMap(entry.to_string()))?;

        let host = host.trim();
        if host.is_empty() {
            return Err(ConfigError::MalformedHostMap(entry.to_string()));
        }
        let address = address
            .trim()
            .parse::<IpAddr>()
            .map_err(|_| ConfigError::MalformedHostMap(entry.to_string()))?;

        records.push(HostRecord {
            host: host.to_string(),
            address,
        });
    }

    Ok(records)
}
