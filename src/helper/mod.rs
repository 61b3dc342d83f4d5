//! DHCP/DNS helper (dnsmasq) invocation for the access point network.

use std::net::Ipv4Addr;
use std::path::Path;

use anyhow::Result;
use ipnet::Ipv4Net;

use crate::config::{GlobalSettings, HostRecord};
use crate::supervisor::Directive;
use crate::users::UserRegistry;

pub const HELPER_PID_FILE: &str = "/var/run/mitm-ap-dnsmasq.pid";

pub const AP_GATEWAY: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 1);
pub const AP_PREFIX_LEN: u8 = 24;
pub const DHCP_POOL_START: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 100);
pub const DHCP_POOL_END: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 200);
pub const LEASE_TIME: &str = "12h";

/// Gateway address with prefix, as assigned to the wireless interface.
pub fn ap_network() -> Result<Ipv4Net> {
    Ok(Ipv4Net::new(AP_GATEWAY, AP_PREFIX_LEN)?)
}

pub fn helper_directive(
    settings: &GlobalSettings,
    users: &UserRegistry,
    host_records: &[HostRecord],
    pid_file: &Path,
) -> Result<Directive> {
    let network = ap_network()?;

    let mut directive = Directive::new("dnsmasq")
        .arg("--conf-file=/dev/null")
        .arg("--bind-interfaces")
        .arg("--no-resolv")
        .arg(format!("--interface={}", settings.wireless))
        .arg(format!("--listen-address={}", network.addr()))
        .arg(format!(
            "--dhcp-range={},{},{},{}",
            DHCP_POOL_START,
            DHCP_POOL_END,
            network.netmask(),
            LEASE_TIME
        ))
        .arg(format!("--dhcp-option=option:router,{}", network.addr()))
        .arg(format!("--server={}", settings.dns))
        .arg(format!("--pid-file={}", pid_file.display()));

    for slot in users.occupied_slots() {
        directive = directive.arg(format!("--dhcp-host={},{}", slot.mac, slot.address));
    }
    for record in host_records {
        directive = directive.arg(record.fragment());
    }

    Ok(directive)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_host_map;
    use std::net::IpAddr;

    fn settings() -> GlobalSettings {
        GlobalSettings {
            upstream: "eth0".to_string(),
            wireless: "wlan1".to_string(),
            dns: IpAddr::V4(Ipv4Addr::new(1, 1, 1, 1)),
            ssid: "lab".to_string(),
            passphrase: "12345678".to_string(),
            hosts: String::new(),
        }
    }

    #[test]
    fn test_ap_network() {
        let network = ap_network().unwrap();
        assert_eq!(network.to_string(), "10.0.0.1/24");
        assert!(network.contains(&DHCP_POOL_START));
        assert!(network.contains(&DHCP_POOL_END));
    }

    #[test]
    fn test_helper_directive() {
        let mut users = UserRegistry::new();
        users.bind(2, "AA:BB:CC:DD:EE:FF").unwrap();
        let hosts = parse_host_map("api:10.0.0.1").unwrap();

        let directive = helper_directive(&settings(), &users, &hosts, Path::new("/tmp/h.pid")).unwrap();
        assert_eq!(directive.program(), "dnsmasq");

        let args = directive.arguments();
        assert!(args.contains(&"--interface=wlan1".to_string()));
        assert!(args.contains(&"--dhcp-range=10.0.0.100,10.0.0.200,255.255.255.0,12h".to_string()));
        assert!(args.contains(&"--server=1.1.1.1".to_string()));
        assert!(args.contains(&"--pid-file=/tmp/h.pid".to_string()));
        assert!(args.contains(&"--dhcp-host=aa:bb:cc:dd:ee:ff,10.0.0.12".to_string()));
        assert_eq!(args.last().unwrap(), "--host-record=api,10.0.0.1");
    }

    #[test]
    fn test_static_leases_in_slot_order() {
        let mut users = UserRegistry::new();
        users.bind(4, "00:00:00:00:00:04").unwrap();
        users.bind(0, "00:00:00:00:00:00").unwrap();

        let directive = helper_directive(&settings(), &users, &[], Path::new(HELPER_PID_FILE)).unwrap();
        let leases: Vec<&String> = directive
            .arguments()
            .iter()
            .filter(|a| a.starts_with("--dhcp-host="))
            .collect();
        assert_eq!(
            leases,
            vec![
                "--dhcp-host=00:00:00:00:00:00,10.0.0.10",
                "--dhcp-host=00:00:00:00:00:04,10.0.0.14",
            ]
        );
    }
}
