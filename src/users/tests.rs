use std::net::Ipv4Addr;

use tokio_test::{assert_err, assert_ok};

use crate::helper::{DHCP_POOL_END, DHCP_POOL_START, ap_network};
use crate::users::{MAX_USERS, MacAddress, RESERVED_IPS, RegistryError, UserRegistry};

#[test]
fn test_valid_macs() {
    assert!(MacAddress::is_valid("00:11:22:33:44:55"));
    assert!(MacAddress::is_valid("aa:bb:cc:dd:ee:ff"));
    assert!(MacAddress::is_valid("AA:BB:CC:DD:EE:FF"));
    assert!(MacAddress::is_valid("aA:0b:C1:d2:E3:f4"));
}

#[test]
fn test_invalid_macs() {
    assert!(!MacAddress::is_valid(""));
    assert!(!MacAddress::is_valid("00:11:22:33:44"));
    assert!(!MacAddress::is_valid("00:11:22:33:44:55:66"));
    assert!(!MacAddress::is_valid("00-11-22-33-44-55"));
    assert!(!MacAddress::is_valid("0:11:22:33:44:55"));
    assert!(!MacAddress::is_valid("000:11:22:33:44:55"));
    assert!(!MacAddress::is_valid("0g:11:22:33:44:55"));
    assert!(!MacAddress::is_valid("+a:11:22:33:44:55"));
    assert!(!MacAddress::is_valid("00:11:22:33:44:55 "));
}

#[test]
fn test_mac_display_is_lowercase() {
    let mac: MacAddress = "AA:BB:CC:DD:EE:FF".parse().unwrap();
    assert_eq!(mac.to_string(), "aa:bb:cc:dd:ee:ff");
    assert_eq!(mac, "aa:bb:cc:dd:ee:ff".parse::<MacAddress>().unwrap());
}

#[test]
fn test_bind_same_index_twice() {
    let mut registry = UserRegistry::new();
    assert_ok!(registry.bind(0, "00:11:22:33:44:55"));
    assert_eq!(
        registry.bind(0, "00:11:22:33:44:66"),
        Err(RegistryError::SlotTaken(0))
    );
}

#[test]
fn test_bind_all_slots_then_out_of_range() {
    let mut registry = UserRegistry::new();
    for i in 0..MAX_USERS {
        assert_ok!(registry.bind(i, &format!("00:11:22:33:44:{:02x}", i)));
    }
    assert_eq!(registry.occupied_slots().len(), MAX_USERS);

    assert_eq!(
        registry.bind(MAX_USERS, "00:11:22:33:44:99"),
        Err(RegistryError::IndexOutOfRange(MAX_USERS))
    );
}

#[test]
fn test_bind_rejects_malformed_mac() {
    let mut registry = UserRegistry::new();
    assert_err!(registry.bind(1, "not-a-mac"));
    assert!(!registry.is_bound(1));
}

#[test]
fn test_bind_rejects_duplicate_mac() {
    let mut registry = UserRegistry::new();
    assert_ok!(registry.bind(0, "00:11:22:33:44:55"));
    let err = registry.bind(3, "00:11:22:33:44:55").unwrap_err();
    assert!(matches!(err, RegistryError::DuplicateMac { existing: 0, .. }));
    assert!(!registry.is_bound(3));
}

#[test]
fn test_occupied_slots_in_index_order() {
    let mut registry = UserRegistry::new();
    registry.bind(3, "00:00:00:00:00:03").unwrap();
    registry.bind(1, "00:00:00:00:00:01").unwrap();

    let slots = registry.occupied_slots();
    assert_eq!(slots.len(), 2);
    assert_eq!(slots[0].index, 1);
    assert_eq!(slots[0].address, Ipv4Addr::new(10, 0, 0, 11));
    assert_eq!(slots[1].index, 3);
    assert_eq!(slots[1].mac.to_string(), "00:00:00:00:00:03");
}

#[test]
fn test_reserved_addresses_outside_pool() {
    let network = ap_network().unwrap();
    let pool = u32::from(DHCP_POOL_START)..=u32::from(DHCP_POOL_END);

    for (i, ip) in RESERVED_IPS.iter().enumerate() {
        assert_eq!(UserRegistry::reserved_address_for(i), Some(*ip));
        assert!(network.contains(ip));
        assert!(!pool.contains(&u32::from(*ip)));
    }
    assert_eq!(UserRegistry::reserved_address_for(MAX_USERS), None);
}
