//! Releasing the WiFi radio from NetworkManager and rfkill before the access
//! point daemon takes the adapter.

use std::process::Stdio;

use log::debug;
use tokio::process::Command;

use crate::supervisor::Directive;

/// First NetworkManager release with the `nmcli radio` subcommand.
const MODERN_NMCLI: (u32, u32, u32) = (0, 9, 10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RadioUnblockMethod {
    /// `nmcli radio wifi off` followed by rfkill.
    Modern,
    /// `nmcli nm wifi off` followed by rfkill.
    Legacy,
    /// No NetworkManager on the host.
    RfkillOnly,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnblockStep {
    pub directive: Directive,
    /// A failed optional step is logged and bring-up continues.
    pub required: bool,
}

impl RadioUnblockMethod {
    pub fn steps(&self) -> Vec<UnblockStep> {
        let release = match self {
            RadioUnblockMethod::Modern => Some(Directive::new("nmcli").args(["radio", "wifi", "off"])),
            RadioUnblockMethod::Legacy => Some(Directive::new("nmcli").args(["nm", "wifi", "off"])),
            RadioUnblockMethod::RfkillOnly => None,
        };

        release
            .map(|directive| UnblockStep {
                directive,
                required: false,
            })
            .into_iter()
            .chain(std::iter::once(UnblockStep {
                directive: Directive::new("rfkill").args(["unblock", "wlan"]),
                required: true,
            }))
            .collect()
    }
}

pub trait RadioDetector {
    async fn detect(&self) -> RadioUnblockMethod;
}

/// Picks the method from `nmcli --version`.
#[derive(Debug, Default, Clone, Copy)]
pub struct NmcliDetector;

impl RadioDetector for NmcliDetector {
    async fn detect(&self) -> RadioUnblockMethod {
        let output = Command::new("nmcli")
            .arg("--version")
            .stdin(Stdio::null())
            .stderr(Stdio::null())
            .output()
            .await;

        match output {
            Ok(output) if output.status.success() => {
                let text = String::from_utf8_lossy(&output.stdout);
                let method = method_for_version(&text);
                debug!("nmcli reports '{}', using {:?}", text.trim(), method);
                method
            }
            _ => {
                debug!("nmcli not available, using rfkill only");
                RadioUnblockMethod::RfkillOnly
            }
        }
    }
}

/// Unparseable versions are treated as modern.
fn method_for_version(output: &str) -> RadioUnblockMethod {
    match output.split_whitespace().last().and_then(parse_version) {
        Some(version) if version < MODERN_NMCLI => RadioUnblockMethod::Legacy,
        _ => RadioUnblockMethod::Modern,
    }
}

fn parse_version(token: &str) -> Option<(u32, u32, u32)> {
    let mut parts = token.split(['.', '-']).map(|p| p.parse::<u32>());
    let major = parts.next()?.ok()?;
    let minor = parts.next().and_then(Result::ok).unwrap_or(0);
    let patch = parts.next().and_then(Result::ok).unwrap_or(0);
    Some((major, minor, patch))
}
