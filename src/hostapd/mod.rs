//! hostapd configuration rendering.

use std::fmt;
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use tempfile::NamedTempFile;

use crate::config::GlobalSettings;
use crate::supervisor::Directive;

pub const DAEMON_PID_FILE: &str = "/var/run/mitm-ap-hostapd.pid";

/// 802.11g on channel 1, WPA2-PSK with CCMP.
pub const DEFAULT_TEMPLATE: &str = "\
interface={interface}
driver=nl80211
ssid={ssid}
hw_mode=g
channel=1
macaddr_acl=0
auth_algs=1
ignore_broadcast_ssid=0
wpa=2
wpa_passphrase={passphrase}
wpa_key_mgmt=WPA-PSK
wpa_pairwise=CCMP
rsn_pairwise=CCMP
country_code=US
ieee80211d=1
wmm_enabled=1
";

#[derive(Debug, PartialEq)]
pub enum RenderError {
    /// A substituted value would break out of its line.
    LineBreak(&'static str),
    MalformedOverride(String),
}

impl fmt::Display for RenderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderError::LineBreak(field) => write!(f, "{} must not contain line breaks", field),
            RenderError::MalformedOverride(line) => write!(f, "override '{}' is not key=value", line),
        }
    }
}

impl std::error::Error for RenderError {}

/// Substitutes the interface, SSID and passphrase into `template`, then
/// appends each override line as given. Later lines may repeat earlier keys.
pub fn render(
    template: &str,
    settings: &GlobalSettings,
    overrides: &[String],
) -> std::result::Result<String, RenderError> {
    single_line("interface", &settings.wireless)?;
    single_line("ssid", &settings.ssid)?;
    single_line("passphrase", &settings.passphrase)?;

    let mut text = substitute(
        template,
        &[
            ("{interface}", settings.wireless.as_str()),
            ("{ssid}", settings.ssid.as_str()),
            ("{passphrase}", settings.passphrase.as_str()),
        ],
    );

    if !text.is_empty() && !text.ends_with('\n') {
        text.push('\n');
    }
    for line in overrides {
        if line.contains(['\n', '\r']) || !line.contains('=') {
            return Err(RenderError::MalformedOverride(line.clone()));
        }
        text.push_str(line);
        text.push('\n');
    }
    Ok(text)
}

/// One left-to-right pass; inserted values are never scanned again.
fn substitute(template: &str, values: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        rest = &rest[start..];
        match values.iter().find(|(placeholder, _)| rest.starts_with(placeholder)) {
            Some((placeholder, value)) => {
                out.push_str(value);
                rest = &rest[placeholder.len()..];
            }
            None => {
                out.push('{');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn single_line(field: &'static str, value: &str) -> std::result::Result<(), RenderError> {
    if value.contains(['\n', '\r']) {
        return Err(RenderError::LineBreak(field));
    }
    Ok(())
}

/// Rendered config on disk for the lifetime of a run. The file is removed
/// when this is dropped.
pub struct DaemonConfigFile {
    file: NamedTempFile,
}

impl DaemonConfigFile {
    pub fn write(text: &str) -> Result<Self> {
        let mut file = tempfile::Builder::new()
            .prefix("mitm-ap-hostapd-")
            .suffix(".conf")
            .tempfile()
            .context("failed to create hostapd config file")?;
        file.write_all(text.as_bytes())
            .context("failed to write hostapd config")?;
        file.flush()?;
        Ok(Self { file })
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }
}

/// `hostapd -B` daemonizes after setup and writes `pid_file` itself.
pub fn daemon_directive(config: &Path, pid_file: &Path) -> Directive {
    Directive::new("hostapd")
        .arg("-B")
        .arg("-P")
        .arg(pid_file.display().to_string())
        .arg(config.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    fn settings() -> GlobalSettings {
        GlobalSettings {
            upstream: "eth0".to_string(),
            wireless: "wlan0".to_string(),
            dns: IpAddr::V4(Ipv4Addr::new(8, 8, 8, 8)),
            ssid: "lab-ap".to_string(),
            passphrase: "correcthorse".to_string(),
            hosts: String::new(),
        }
    }

    #[test]
    fn test_render_substitutes_fields() {
        let text = render(DEFAULT_TEMPLATE, &settings(), &[]).unwrap();
        assert!(text.starts_with("interface=wlan0\n"));
        assert!(text.contains("\nssid=lab-ap\n"));
        assert!(text.contains("\nwpa_passphrase=correcthorse\n"));
        assert!(text.contains("\nhw_mode=g\n"));
        assert!(text.contains("\nchannel=1\n"));
        assert!(text.contains("\nrsn_pairwise=CCMP\n"));
        assert!(!text.contains('{'));
    }

    #[test]
    fn test_overrides_appended_in_order() {
        let overrides = vec!["channel=6".to_string(), "hw_mode=n".to_string()];
        let text = render(DEFAULT_TEMPLATE, &settings(), &overrides).unwrap();
        assert!(text.ends_with("wmm_enabled=1\nchannel=6\nhw_mode=n\n"));
    }

    #[test]
    fn test_template_without_trailing_newline() {
        let text = render("ssid={ssid}", &settings(), &["a=b".to_string()]).unwrap();
        assert_eq!(text, "ssid=lab-ap\na=b\n");
    }

    #[test]
    fn test_substituted_values_are_not_rescanned() {
        let mut s = settings();
        s.wireless = "{ssid}".to_string();
        s.ssid = "{passphrase}".to_string();
        s.passphrase = "topsecret99".to_string();

        let text = render(DEFAULT_TEMPLATE, &s, &[]).unwrap();
        assert!(text.starts_with("interface={ssid}\n"));
        assert!(text.contains("\nssid={passphrase}\n"));
        assert!(text.contains("\nwpa_passphrase=topsecret99\n"));
        assert_eq!(text.matches("topsecret99").count(), 1);
    }

    #[test]
    fn test_unknown_braces_kept() {
        let text = render("a={other} b={ssid}", &settings(), &[]).unwrap();
        assert_eq!(text, "a={other} b=lab-ap\n");
    }

    #[test]
    fn test_reject_line_breaks() {
        let mut s = settings();
        s.ssid = "lab\nwpa=0".to_string();
        assert_eq!(
            render(DEFAULT_TEMPLATE, &s, &[]),
            Err(RenderError::LineBreak("ssid"))
        );
        assert!(render(DEFAULT_TEMPLATE, &settings(), &["no-equals".to_string()]).is_err());
    }

    #[test]
    fn test_config_file_removed_on_drop() {
        let file = DaemonConfigFile::write("ssid=x\n").unwrap();
        let path = file.path().to_path_buf();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "ssid=x\n");
        drop(file);
        assert!(!path.exists());
    }

    #[test]
    fn test_daemon_directive() {
        let directive = daemon_directive(Path::new("/tmp/ap.conf"), Path::new(DAEMON_PID_FILE));
        assert_eq!(
            directive.to_string(),
            "hostapd -B -P /var/run/mitm-ap-hostapd.pid /tmp/ap.conf"
        );
    }
}
