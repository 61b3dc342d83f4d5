//! Per-device user slots.
//!
//! Each slot binds one client MAC address to a fixed address outside the
//! dynamic DHCP pool, so traffic from that device can be singled out by
//! source address in redirection rules.

use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use serde::Serialize;

#[cfg(test)]
mod tests;

pub const MAX_USERS: usize = 5;

/// Address handed to the device bound in slot `i`.
pub const RESERVED_IPS: [Ipv4Addr; MAX_USERS] = [
    Ipv4Addr::new(10, 0, 0, 10),
    Ipv4Addr::new(10, 0, 0, 11),
    Ipv4Addr::new(10, 0, 0, 12),
    Ipv4Addr::new(10, 0, 0, 13),
    Ipv4Addr::new(10, 0, 0, 14),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MacAddress([u8; 6]);

impl MacAddress {
    /// Six colon separated pairs of hex digits, either case.
    pub fn is_valid(s: &str) -> bool {
        let parts: Vec<&str> = s.split(':').collect();
        parts.len() == 6
            && parts
                .iter()
                .all(|p| p.len() == 2 && p.chars().all(|c| c.is_ascii_hexdigit()))
    }
}

impl FromStr for MacAddress {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self> {
        if !MacAddress::is_valid(s) {
            return Err(RegistryError::MalformedMac(s.to_string()));
        }

        let mut bytes = [0u8; 6];
        for (i, part) in s.split(':').enumerate() {
            bytes[i] = u8::from_str_radix(part, 16)
                .map_err(|_| RegistryError::MalformedMac(s.to_string()))?;
        }

        Ok(MacAddress(bytes))
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            self.0[0], self.0[1], self.0[2], self.0[3], self.0[4], self.0[5]
        )
    }
}

impl Serialize for MacAddress {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserSlot {
    pub index: usize,
    pub mac: MacAddress,
    pub address: Ipv4Addr,
}

#[derive(Debug, Default, Clone)]
pub struct UserRegistry {
    slots: [Option<MacAddress>; MAX_USERS],
}

impl UserRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(&mut self, index: usize, mac: &str) -> Result<()> {
        if index >= MAX_USERS {
            return Err(RegistryError::IndexOutOfRange(index));
        }

        let mac: MacAddress = mac.parse()?;

        if self.slots[index].is_some() {
            return Err(RegistryError::SlotTaken(index));
        }

        if let Some(existing) = self.index_of(&mac) {
            return Err(RegistryError::DuplicateMac { mac, existing });
        }

        self.slots[index] = Some(mac);
        Ok(())
    }

    pub fn reserved_address_for(index: usize) -> Option<Ipv4Addr> {
        RESERVED_IPS.get(index).copied()
    }

    pub fn is_bound(&self, index: usize) -> bool {
        self.slots.get(index).is_some_and(Option::is_some)
    }

    /// Bound slots in index order.
    pub fn occupied_slots(&self) -> Vec<UserSlot> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| {
                slot.as_ref().map(|mac| UserSlot {
                    index,
                    mac: mac.clone(),
                    address: RESERVED_IPS[index],
                })
            })
            .collect()
    }

    fn index_of(&self, mac: &MacAddress) -> Option<usize> {
        self.slots.iter().position(|slot| slot.as_ref() == Some(mac))
    }
}

pub type Result<T> = std::result::Result<T, RegistryError>;

#[derive(Debug, PartialEq)]
pub enum RegistryError {
    IndexOutOfRange(usize),
    MalformedMac(String),
    SlotTaken(usize),
    DuplicateMac { mac: MacAddress, existing: usize },
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryError::IndexOutOfRange(index) => {
                write!(f, "user index {} out of range (max {})", index, MAX_USERS - 1)
            }
            RegistryError::MalformedMac(mac) => write!(f, "malformed MAC address '{}'", mac),
            RegistryError::SlotTaken(index) => write!(f, "user{} is already bound", index),
            RegistryError::DuplicateMac { mac, existing } => {
                write!(f, "MAC address {} is already bound to user{}", mac, existing)
            }
        }
    }
}

impl std::error::Error for RegistryError {}
