//! Standalone server configuration: TOML file + CLI overrides.

use soniclink_core::{ControlError, ControlResult, LanControlConfig, DEFAULT_PORT};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

/// Top-level config file structure.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub control: ControlSection,
}

/// `[control]` section of the config TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct ControlSection {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub allow_navidrome_auth: bool,
}

impl Default for ControlSection {
    fn default() -> Self {
        Self {
            port: default_port(),
            password: None,
            allow_navidrome_auth: false,
        }
    }
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

/// Resolved server configuration (CLI overrides applied). A `None` password
/// means the caller should generate one.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub password: Option<String>,
    pub allow_navidrome_auth: bool,
}

impl ServerConfig {
    /// Load config from TOML file, then apply CLI overrides.
    pub fn load(
        config_path: Option<&Path>,
        cli_port: Option<u16>,
        cli_password: Option<&str>,
    ) -> ControlResult<Self> {
        let file_config = if let Some(path) = config_path {
            let expanded = expand_tilde(path);
            if expanded.exists() {
                info!(path = %expanded.display(), "loading config file");
                let content = std::fs::read_to_string(&expanded)?;
                toml::from_str::<ConfigFile>(&content)
                    .map_err(|e| ControlError::Other(format!("config parse error: {e}")))?
            } else {
                info!(path = %expanded.display(), "config file not found, using defaults");
                ConfigFile::default()
            }
        } else {
            ConfigFile::default()
        };

        Ok(Self {
            port: cli_port.unwrap_or(file_config.control.port),
            password: cli_password
                .map(|s| s.to_string())
                .or(file_config.control.password),
            allow_navidrome_auth: file_config.control.allow_navidrome_auth,
        })
    }

    /// Convert to the runtime control config, filling the password.
    pub fn into_control_config(self, password: String) -> LanControlConfig {
        LanControlConfig {
            enabled: true,
            port: self.port,
            password: password.to_uppercase(),
            allow_navidrome_auth: self.allow_navidrome_auth,
        }
    }
}

/// Expand `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
    let s = path.to_string_lossy();
    if let Some(rest) = s.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(s.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_no_file() {
        let config = ServerConfig::load(None, None, None).unwrap();
        assert_eq!(config.port, DEFAULT_PORT);
        assert!(config.password.is_none());
    }

    #[test]
    fn cli_overrides_win() {
        let config = ServerConfig::load(None, Some(6000), Some("abc123")).unwrap();
        assert_eq!(config.port, 6000);
        assert_eq!(config.password.as_deref(), Some("abc123"));
    }

    #[test]
    fn toml_section_parses() {
        let file: ConfigFile = toml::from_str(
            r#"
            [control]
            port = 5300
            password = "XY99ZZ"
            allow_navidrome_auth = true
            "#,
        )
        .unwrap();
        assert_eq!(file.control.port, 5300);
        assert_eq!(file.control.password.as_deref(), Some("XY99ZZ"));
        assert!(file.control.allow_navidrome_auth);
    }
}
