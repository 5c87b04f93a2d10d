//! LAN control configuration and server runtime info.

use serde::{Deserialize, Serialize};

/// Default control port.
pub const DEFAULT_PORT: u16 = 5299;

/// User-facing LAN control settings, supplied by the host configuration
/// layer and replaced wholesale on change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LanControlConfig {
    pub enabled: bool,
    pub port: u16,
    /// Shared LAN password. Always stored upper-cased; comparison is
    /// case-insensitive on the wire.
    pub password: String,
    pub allow_navidrome_auth: bool,
}

impl LanControlConfig {
    pub fn new(port: u16, password: impl Into<String>) -> Self {
        Self {
            enabled: true,
            port,
            password: password.into().to_uppercase(),
            allow_navidrome_auth: false,
        }
    }

    /// Store a new password, normalized to uppercase.
    pub fn set_password(&mut self, password: impl Into<String>) {
        self.password = password.into().to_uppercase();
    }

    /// Return a copy with the password normalized to uppercase.
    pub fn normalized(mut self) -> Self {
        self.password = self.password.to_uppercase();
        self
    }
}

impl Default for LanControlConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: DEFAULT_PORT,
            password: String::new(),
            allow_navidrome_auth: false,
        }
    }
}

/// Read-only projection of server runtime state, recomputed on every
/// lifecycle transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LanControlServerInfo {
    pub running: bool,
    pub port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub addresses: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl LanControlServerInfo {
    /// Info for a stopped server.
    pub fn stopped(port: u16) -> Self {
        Self {
            running: false,
            port,
            address: None,
            addresses: None,
            error: None,
        }
    }

    /// Info for a running server bound to `port`.
    pub fn running(port: u16) -> Self {
        Self {
            running: true,
            port,
            address: Some(format!("http://localhost:{port}")),
            addresses: None,
            error: None,
        }
    }

    /// Info for a failed start.
    pub fn failed(port: u16, error: impl Into<String>) -> Self {
        Self {
            running: false,
            port,
            address: None,
            addresses: None,
            error: Some(error.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_normalized_on_write() {
        let mut config = LanControlConfig::new(5299, "abc123");
        assert_eq!(config.password, "ABC123");
        config.set_password("xy99zz");
        assert_eq!(config.password, "XY99ZZ");
    }

    #[test]
    fn config_wire_shape() {
        let config = LanControlConfig::new(5299, "ABC123");
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["allowNavidromeAuth"], false);
        assert_eq!(json["port"], 5299);
    }

    #[test]
    fn info_projections() {
        let info = LanControlServerInfo::running(5299);
        assert_eq!(info.address.as_deref(), Some("http://localhost:5299"));
        assert!(LanControlServerInfo::stopped(5299).address.is_none());
        assert!(LanControlServerInfo::failed(5299, "port in use").error.is_some());
    }
}
