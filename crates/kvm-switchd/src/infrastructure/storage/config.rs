//! TOML configuration for the switch daemon.
//!
//! ```toml
//! log_level = "info"
//!
//! [http]
//! enabled = true
//! address = "0.0.0.0:5000"
//! [http.security]
//! enabled = true
//! secret = "hunter2"
//!
//! [evdev]
//! enabled = true
//! device = "/dev/input/by-id/usb-Logitech-event-kbd"
//!
//! [libvirt]
//! uri = "qemu:///system"
//! domain = "win10"
//!
//! [[devices]]
//! vendor = 0x046d
//! product = 0xc52b
//! optional = false
//!
//! [[displays]]
//! bus = 4
//! feature = 0x60
//! host = 0x0f
//! guest = 0x11
//!
//! [commands]
//! host = ["systemctl --user start barrier"]
//! guest = ["systemctl --user stop barrier"]
//! ```
//!
//! # Loading happens in two steps
//!
//! 1. `serde` + `toml` turn the text into the raw `*Config` structs below.
//!    Fields annotated with `#[serde(default = "some_fn")]` take the value of
//!    `some_fn()` when absent, so a minimal file only needs `[libvirt]`.
//! 2. [`RawConfig::validate`] checks the cross-field rules and produces
//!    [`Settings`].  A disabled surface becomes `None` and its fields are not
//!    checked.

use std::collections::BTreeSet;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use kvm_switch_core::{DeviceIdentity, DeviceRequirement, DeviceSelection, DisplayTarget};
use serde::Deserialize;
use thiserror::Error;

use crate::application::switch_engine::SwitchProfile;

/// Error type for configuration file operations.  Always fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("I/O error reading config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The content parsed but breaks a validation rule.
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ── Config schema types ───────────────────────────────────────────────────────

/// The file as written.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct RawConfig {
    /// `tracing` level used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub evdev: EvdevConfig,
    #[serde(default)]
    pub libvirt: LibvirtConfig,
    #[serde(default)]
    pub devices: Vec<DeviceEntry>,
    #[serde(default)]
    pub displays: Vec<DisplayEntry>,
    #[serde(default)]
    pub commands: CommandsConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct HttpConfig {
    #[serde(default)]
    pub enabled: bool,
    /// `host:port` to listen on.
    #[serde(default = "default_http_address")]
    pub address: String,
    #[serde(default)]
    pub security: SecurityConfig,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            address: default_http_address(),
            security: SecurityConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct SecurityConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub secret: String,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct EvdevConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Path of the keyboard's event node.
    pub device: Option<String>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct LibvirtConfig {
    #[serde(default = "default_libvirt_uri")]
    pub uri: String,
    /// Name of the running guest domain.
    #[serde(default)]
    pub domain: String,
}

impl Default for LibvirtConfig {
    fn default() -> Self {
        Self {
            uri: default_libvirt_uri(),
            domain: String::new(),
        }
    }
}

/// One USB device to pass through.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct DeviceEntry {
    pub vendor: u16,
    pub product: u16,
    /// Optional devices are left alone by a reduced switch.
    #[serde(default)]
    pub optional: bool,
}

/// One DDC/CI-controlled monitor.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct DisplayEntry {
    pub bus: u32,
    /// VCP feature code to write.
    #[serde(default = "default_vcp_feature")]
    pub feature: u8,
    /// Input value that shows the host.
    pub host: u16,
    /// Input value that shows the guest.
    pub guest: u16,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct CommandsConfig {
    #[serde(default)]
    pub host: Vec<String>,
    #[serde(default)]
    pub guest: Vec<String>,
}

// ── Validated settings ────────────────────────────────────────────────────────

/// Everything the supervisor needs, after validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub log_level: String,
    /// `None` when the HTTP endpoint is disabled.
    pub http: Option<HttpSettings>,
    /// `None` when the hotkey monitor is disabled.
    pub hotkey: Option<HotkeySettings>,
    pub hypervisor: HypervisorSettings,
    pub profile: SwitchProfile,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpSettings {
    pub bind: SocketAddr,
    /// `None` when authentication is disabled.
    pub secret: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HotkeySettings {
    pub device: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HypervisorSettings {
    pub uri: String,
    pub domain: String,
}

impl RawConfig {
    /// Applies the cross-field rules.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first rule broken.
    pub fn validate(self) -> Result<Settings, ConfigError> {
        let http = if self.http.enabled {
            let bind = self.http.address.parse::<SocketAddr>().map_err(|e| {
                ConfigError::Invalid(format!(
                    "http.address {:?} is not a socket address: {e}",
                    self.http.address
                ))
            })?;
            let secret = if self.http.security.enabled {
                if self.http.security.secret.is_empty() {
                    return Err(ConfigError::Invalid(
                        "http.security is enabled but http.security.secret is empty".to_string(),
                    ));
                }
                Some(self.http.security.secret)
            } else {
                None
            };
            Some(HttpSettings { bind, secret })
        } else {
            None
        };

        let hotkey = if self.evdev.enabled {
            match self.evdev.device {
                Some(device) if !device.trim().is_empty() => Some(HotkeySettings {
                    device: PathBuf::from(device),
                }),
                _ => {
                    return Err(ConfigError::Invalid(
                        "evdev is enabled but evdev.device is not set".to_string(),
                    ))
                }
            }
        } else {
            None
        };

        if self.libvirt.domain.trim().is_empty() {
            return Err(ConfigError::Invalid("libvirt.domain must be set".to_string()));
        }

        let mut seen = BTreeSet::new();
        for entry in &self.devices {
            let id = DeviceIdentity::new(entry.vendor, entry.product);
            if !seen.insert(id) {
                return Err(ConfigError::Invalid(format!(
                    "device {id} is listed more than once"
                )));
            }
        }

        let profile = SwitchProfile {
            devices: DeviceSelection::new(self.devices.iter().map(|d| DeviceRequirement {
                identity: DeviceIdentity::new(d.vendor, d.product),
                essential: !d.optional,
            })),
            displays: self
                .displays
                .iter()
                .map(|d| DisplayTarget {
                    bus: d.bus,
                    feature: d.feature,
                    host_input: d.host,
                    guest_input: d.guest,
                })
                .collect(),
            host_commands: self.commands.host,
            guest_commands: self.commands.guest,
        };

        Ok(Settings {
            log_level: self.log_level,
            http,
            hotkey,
            hypervisor: HypervisorSettings {
                uri: self.libvirt.uri,
                domain: self.libvirt.domain,
            },
            profile,
        })
    }
}

// ── Default value functions (used by serde) ───────────────────────────────────

fn default_log_level() -> String {
    "info".to_string()
}
fn default_http_address() -> String {
    "0.0.0.0:5000".to_string()
}
fn default_libvirt_uri() -> String {
    "qemu:///system".to_string()
}
fn default_vcp_feature() -> u8 {
    0x60
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Parses and validates configuration text.
///
/// # Errors
///
/// Returns [`ConfigError::Parse`] for bad TOML or wrongly typed values and
/// [`ConfigError::Invalid`] for rule violations.
pub fn parse_config(text: &str) -> Result<Settings, ConfigError> {
    let raw: RawConfig = toml::from_str(text)?;
    raw.validate()
}

/// Reads, parses and validates the file at `path`.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] if the file cannot be read, otherwise as
/// [`parse_config`].
pub fn load_config(path: &Path) -> Result<Settings, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    parse_config(&text)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use kvm_switch_core::SwitchTarget;
    use std::io::Write;

    const FULL: &str = r#"
log_level = "debug"

[http]
enabled = true
address = "127.0.0.1:5000"
[http.security]
enabled = true
secret = "hunter2"

[evdev]
enabled = true
device = "/dev/input/by-id/usb-kbd-event-kbd"

[libvirt]
uri = "qemu+ssh://vmhost/system"
domain = "win10"

[[devices]]
vendor = 0x046d
product = 0xc52b

[[devices]]
vendor = 0x046d
product = 0x085e
optional = true

[[displays]]
bus = 4
host = 0x0f
guest = 0x11

[commands]
host = ["echo host"]
guest = ["echo guest"]
"#;

    #[test]
    fn test_full_config_round_trips_into_settings() {
        // Act
        let s = parse_config(FULL).expect("valid config");

        // Assert
        assert_eq!(s.log_level, "debug");
        assert_eq!(
            s.http,
            Some(HttpSettings {
                bind: "127.0.0.1:5000".parse().unwrap(),
                secret: Some("hunter2".to_string()),
            })
        );
        assert_eq!(
            s.hotkey.unwrap().device,
            PathBuf::from("/dev/input/by-id/usb-kbd-event-kbd")
        );
        assert_eq!(s.hypervisor.uri, "qemu+ssh://vmhost/system");
        assert_eq!(s.hypervisor.domain, "win10");
        assert_eq!(s.profile.devices.len(), 2);
        assert_eq!(s.profile.devices.desired(true).len(), 1);
        assert_eq!(s.profile.displays[0].feature, 0x60);
        assert_eq!(s.profile.displays[0].input_for(SwitchTarget::Guest), 0x11);
        assert_eq!(s.profile.host_commands, vec!["echo host".to_string()]);
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let s = parse_config("[libvirt]\ndomain = \"win10\"\n").unwrap();

        assert_eq!(s.log_level, "info");
        assert!(s.http.is_none(), "http is off unless enabled");
        assert!(s.hotkey.is_none(), "evdev is off unless enabled");
        assert_eq!(s.hypervisor.uri, "qemu:///system");
        assert!(s.profile.devices.is_empty());
        assert!(s.profile.guest_commands.is_empty());
    }

    #[test]
    fn test_devices_default_to_essential() {
        let s = parse_config(
            "[libvirt]\ndomain = \"w\"\n[[devices]]\nvendor = 1\nproduct = 2\n",
        )
        .unwrap();

        assert!(s
            .profile
            .devices
            .desired(true)
            .contains(&DeviceIdentity::new(1, 2)));
    }

    #[test]
    fn test_http_without_security_has_no_secret() {
        let s = parse_config("[http]\nenabled = true\n[libvirt]\ndomain = \"w\"\n").unwrap();

        let http = s.http.unwrap();
        assert_eq!(http.bind, "0.0.0.0:5000".parse().unwrap());
        assert!(http.secret.is_none());
    }

    #[test]
    fn test_bad_bind_address_is_invalid() {
        let result = parse_config(
            "[http]\nenabled = true\naddress = \"localhost\"\n[libvirt]\ndomain = \"w\"\n",
        );
        assert!(matches!(result, Err(ConfigError::Invalid(msg)) if msg.contains("http.address")));
    }

    #[test]
    fn test_security_with_empty_secret_is_invalid() {
        let result = parse_config(
            "[http]\nenabled = true\n[http.security]\nenabled = true\n[libvirt]\ndomain = \"w\"\n",
        );
        assert!(matches!(result, Err(ConfigError::Invalid(msg)) if msg.contains("secret")));
    }

    #[test]
    fn test_evdev_without_device_is_invalid() {
        let result = parse_config("[evdev]\nenabled = true\n[libvirt]\ndomain = \"w\"\n");
        assert!(matches!(result, Err(ConfigError::Invalid(msg)) if msg.contains("evdev.device")));
    }

    #[test]
    fn test_disabled_surfaces_are_not_validated() {
        let result = parse_config(
            "[http]\naddress = \"nonsense\"\n[evdev]\nenabled = false\n[libvirt]\ndomain = \"w\"\n",
        );
        assert!(result.is_ok());
    }

    #[test]
    fn test_missing_domain_is_invalid() {
        let result = parse_config("[libvirt]\nuri = \"qemu:///system\"\n");
        assert!(matches!(result, Err(ConfigError::Invalid(msg)) if msg.contains("libvirt.domain")));
    }

    #[test]
    fn test_duplicate_device_is_invalid() {
        let result = parse_config(
            "[libvirt]\ndomain = \"w\"\n\
             [[devices]]\nvendor = 0x046d\nproduct = 0xc52b\n\
             [[devices]]\nvendor = 0x046d\nproduct = 0xc52b\noptional = true\n",
        );
        assert!(matches!(result, Err(ConfigError::Invalid(msg)) if msg.contains("046d:c52b")));
    }

    #[test]
    fn test_out_of_range_id_is_a_parse_error() {
        let result = parse_config(
            "[libvirt]\ndomain = \"w\"\n[[devices]]\nvendor = 0x10000\nproduct = 1\n",
        );
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_load_config_reads_file() {
        // Arrange
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(FULL.as_bytes()).unwrap();

        // Act
        let s = load_config(file.path()).unwrap();

        // Assert
        assert_eq!(s.hypervisor.domain, "win10");
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = load_config(&dir.path().join("absent.toml"));
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }
}
