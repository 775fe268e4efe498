//! Portal identity and time-sync configuration.
//!
//! [`PortalConfig`] names the captive provisioning portal and doubles as the
//! update transport's identity (hostname plus optional password). It is
//! resolved once during setup and immutable afterwards.

use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Maximum portal name length. The name is also used as the SoftAP SSID and
/// the device hostname, so the SSID limit applies.
pub const MAX_PORTAL_NAME_LEN: usize = 32;

/// Minimum portal password length (WPA2 requirement for the SoftAP).
pub const MIN_PORTAL_PASSWORD_LEN: usize = 8;

/// Maximum portal password length.
pub const MAX_PORTAL_PASSWORD_LEN: usize = 64;

/// Captive-portal identity and servicing mode.
#[derive(Debug, Clone)]
pub struct PortalConfig {
    name: String,
    password: Option<PortalPassword>,
    /// Whether the portal is serviced by a per-tick pump instead of a
    /// blocking call. Fixed strictly before setup.
    pub modeless: bool,
}

impl PortalConfig {
    /// Create a validated portal configuration.
    ///
    /// An empty password is treated the same as no password (open portal).
    ///
    /// # Example
    ///
    /// ```
    /// use wifi_connector_rs_esp32::PortalConfig;
    ///
    /// let config = PortalConfig::new("esp32-5A7F", None).unwrap();
    /// assert_eq!(config.name(), "esp32-5A7F");
    /// assert!(config.password().is_none());
    /// ```
    pub fn new(name: impl Into<String>, password: Option<&str>) -> Result<Self, ConfigError> {
        let name = name.into();
        if name.is_empty() {
            return Err(ConfigError::NameEmpty);
        }
        if name.len() > MAX_PORTAL_NAME_LEN {
            return Err(ConfigError::NameTooLong {
                len: name.len(),
                max: MAX_PORTAL_NAME_LEN,
            });
        }

        let password = match password {
            Some(p) if p.is_empty() => None,
            Some(p) => {
                if p.len() < MIN_PORTAL_PASSWORD_LEN {
                    return Err(ConfigError::PasswordTooShort {
                        len: p.len(),
                        min: MIN_PORTAL_PASSWORD_LEN,
                    });
                }
                if p.len() > MAX_PORTAL_PASSWORD_LEN {
                    return Err(ConfigError::PasswordTooLong {
                        len: p.len(),
                        max: MAX_PORTAL_PASSWORD_LEN,
                    });
                }
                Some(PortalPassword(p.to_string()))
            }
            None => None,
        };

        Ok(Self {
            name,
            password,
            modeless: false,
        })
    }

    /// Portal name; also the device hostname and update transport identity.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Portal password, `None` for an open portal.
    pub fn password(&self) -> Option<&str> {
        self.password.as_ref().map(|p| p.as_str())
    }
}

/// Portal password, zeroed on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct PortalPassword(String);

impl PortalPassword {
    fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for PortalPassword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PortalPassword(<redacted>)")
    }
}

/// Network time synchronization parameters.
///
/// Applied best-effort once the link comes up; failure to reach the server
/// is logged and never blocks the rest of the connection sequence.
#[derive(Debug, Clone)]
pub struct TimeConfig {
    /// NTP server name.
    pub server: String,
    /// Offset from UTC in seconds.
    pub utc_offset_secs: i32,
    /// Additional daylight-saving offset in seconds.
    pub dst_offset_secs: i32,
}

impl Default for TimeConfig {
    fn default() -> Self {
        Self {
            server: "pool.ntp.org".to_string(),
            utc_offset_secs: -8 * 3600,
            dst_offset_secs: 3600,
        }
    }
}

/// Errors that can occur while building a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Portal name is empty.
    NameEmpty,
    /// Portal name exceeds the SSID limit.
    NameTooLong { len: usize, max: usize },
    /// Portal password is too short for WPA2.
    PasswordTooShort { len: usize, min: usize },
    /// Portal password exceeds the WPA2 limit.
    PasswordTooLong { len: usize, max: usize },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NameEmpty => write!(f, "portal name cannot be empty"),
            Self::NameTooLong { len, max } => {
                write!(f, "portal name too long: {} bytes (max {})", len, max)
            }
            Self::PasswordTooShort { len, min } => {
                write!(f, "portal password too short: {} bytes (min {})", len, min)
            }
            Self::PasswordTooLong { len, max } => {
                write!(f, "portal password too long: {} bytes (max {})", len, max)
            }
        }
    }
}

impl std::error::Error for ConfigError {}
