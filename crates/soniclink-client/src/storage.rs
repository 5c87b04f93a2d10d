//! Saved-connection persistence.
//!
//! The last successful connection is written to a small TOML file so the
//! client can offer a delayed auto-connect on the next launch.

use crate::client::{ConnectOptions, ControlClient};
use serde::{Deserialize, Serialize};
use soniclink_core::messages::AuthType;
use soniclink_core::{ControlError, ControlResult};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Grace period before auto-connect fires, so a launching host application
/// finishes its own startup first.
const AUTO_CONNECT_DELAY: Duration = Duration::from_secs(1);

/// One remembered server connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedConnection {
    pub host: String,
    pub port: u16,
    pub auth_type: AuthType,
    pub password: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Whether to reconnect automatically on the next launch.
    #[serde(default = "default_auto_connect")]
    pub auto_connect: bool,
}

fn default_auto_connect() -> bool {
    true
}

impl SavedConnection {
    pub fn into_options(self) -> ConnectOptions {
        ConnectOptions {
            host: self.host,
            port: self.port,
            auth_type: self.auth_type,
            password: self.password,
            username: self.username,
        }
    }
}

impl From<ConnectOptions> for SavedConnection {
    fn from(options: ConnectOptions) -> Self {
        Self {
            host: options.host,
            port: options.port,
            auth_type: options.auth_type,
            password: options.password,
            username: options.username,
            auto_connect: true,
        }
    }
}

/// File-backed store for the remembered connection.
pub struct ConnectionStore {
    path: PathBuf,
}

impl ConnectionStore {
    /// Store at the platform config location
    /// (`<config_dir>/soniclink/connection.toml`).
    pub fn new() -> Self {
        let base = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
        Self {
            path: base.join("soniclink").join("connection.toml"),
        }
    }

    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    /// Load the remembered connection, if one exists.
    pub fn load(&self) -> ControlResult<Option<SavedConnection>> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let saved = toml::from_str(&content)
            .map_err(|e| ControlError::Storage(format!("corrupt connection file: {e}")))?;
        Ok(Some(saved))
    }

    pub fn save(&self, connection: &SavedConnection) -> ControlResult<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(connection)
            .map_err(|e| ControlError::Storage(e.to_string()))?;
        std::fs::write(&self.path, content)?;
        Ok(())
    }

    /// Forget the remembered connection. Missing file is not an error.
    pub fn clear(&self) -> ControlResult<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

impl Default for ConnectionStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Connect to the remembered server after a short delay. Returns `false`
/// when nothing is remembered.
pub async fn try_auto_connect(
    client: &Arc<ControlClient>,
    store: &ConnectionStore,
) -> ControlResult<bool> {
    let Some(saved) = store.load()? else {
        return Ok(false);
    };
    if !saved.auto_connect {
        return Ok(false);
    }
    info!(host = %saved.host, port = saved.port, "auto-connecting to remembered server");
    tokio::time::sleep(AUTO_CONNECT_DELAY).await;
    client.connect(saved.into_options()).await?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_in(dir: &tempfile::TempDir) -> ConnectionStore {
        ConnectionStore::with_path(dir.path().join("connection.toml"))
    }

    fn sample() -> SavedConnection {
        SavedConnection {
            host: "192.168.1.10".into(),
            port: 5299,
            auth_type: AuthType::Lan,
            password: "ABC123".into(),
            username: None,
            auto_connect: true,
        }
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        assert!(store.load().unwrap().is_none());

        store.save(&sample()).unwrap();
        assert_eq!(store.load().unwrap(), Some(sample()));
    }

    #[test]
    fn clear_removes_and_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        store.save(&sample()).unwrap();
        store.clear().unwrap();
        store.clear().unwrap();
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn corrupt_file_is_a_storage_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        std::fs::write(store.path(), "not = [valid").unwrap();
        assert!(matches!(
            store.load(),
            Err(ControlError::Storage(_))
        ));
    }

    #[test]
    fn navidrome_connection_keeps_the_username() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        let saved = SavedConnection {
            auth_type: AuthType::Navidrome,
            username: Some("alice".into()),
            ..sample()
        };
        store.save(&saved).unwrap();
        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded.username.as_deref(), Some("alice"));
        assert_eq!(loaded.auth_type, AuthType::Navidrome);
    }

    struct NullSink;

    impl soniclink_core::RemotePlayerSink for NullSink {
        fn set_remote_state(&self, _: Option<soniclink_core::messages::PlayerStateData>) {}
        fn set_remote_song(&self, _: Option<soniclink_core::messages::CurrentSongData>) {}
        fn set_remote_queue(&self, _: Option<soniclink_core::messages::QueueData>) {}
        fn register_remote_sender(
            &self,
            _: soniclink_core::RemoteSender,
            _: Option<soniclink_core::messages::RemoteDeviceInfo>,
        ) {
        }
        fn clear_remote_sender(&self) {}
    }

    #[tokio::test]
    async fn auto_connect_without_a_saved_connection_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        let client = ControlClient::new(Arc::new(NullSink));
        assert!(!try_auto_connect(&client, &store).await.unwrap());
    }

    #[tokio::test]
    async fn auto_connect_respects_a_disabled_flag() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        let saved = SavedConnection {
            auto_connect: false,
            ..sample()
        };
        store.save(&saved).unwrap();

        let client = ControlClient::new(Arc::new(NullSink));
        assert!(!try_auto_connect(&client, &store).await.unwrap());
    }

    #[test]
    fn missing_auto_connect_flag_defaults_on() {
        let saved: SavedConnection = toml::from_str(
            r#"
            host = "192.168.1.10"
            port = 5299
            auth_type = "lan"
            password = "ABC123"
            "#,
        )
        .unwrap();
        assert!(saved.auto_connect);
    }
}
