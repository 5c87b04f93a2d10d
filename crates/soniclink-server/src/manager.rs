//! Server lifecycle manager.
//!
//! Sits between the host application and [`ControlServer`]: owns the
//! current [`LanControlServerInfo`] projection and turns configuration
//! changes into the right start/stop/restart sequence.

use crate::server::ControlServer;
use soniclink_core::{
    ControlResult, CredentialVerifier, LanControlConfig, LanControlServerInfo, PlayerBridge,
};
use std::net::UdpSocket;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};

pub struct LanControlManager {
    server: Arc<ControlServer>,
    info: RwLock<LanControlServerInfo>,
    /// Serializes lifecycle transitions so overlapping updates cannot
    /// interleave a stop with another caller's start.
    lifecycle: Mutex<()>,
}

impl LanControlManager {
    pub fn new(
        config: LanControlConfig,
        player: Arc<dyn PlayerBridge>,
        verifier: Arc<dyn CredentialVerifier>,
    ) -> Arc<Self> {
        let port = config.port;
        Arc::new(Self {
            server: ControlServer::new(config, player, verifier),
            info: RwLock::new(LanControlServerInfo::stopped(port)),
            lifecycle: Mutex::new(()),
        })
    }

    pub fn server(&self) -> &Arc<ControlServer> {
        &self.server
    }

    pub async fn status(&self) -> LanControlServerInfo {
        self.info.read().await.clone()
    }

    pub async fn is_running(&self) -> bool {
        self.server.is_running().await
    }

    /// Start the server and refresh the status projection. A server that is
    /// already running is restarted on the current config. A failed bind is
    /// recorded in the projection and returned to the caller.
    pub async fn start(&self) -> ControlResult<LanControlServerInfo> {
        let _guard = self.lifecycle.lock().await;
        self.start_locked().await
    }

    async fn start_locked(&self) -> ControlResult<LanControlServerInfo> {
        if self.server.is_running().await {
            self.server.stop().await;
        }
        let configured_port = self.server.port().await;
        match self.server.start().await {
            Ok(bound_port) => {
                let mut info = LanControlServerInfo::running(bound_port);
                info.addresses = lan_addresses(bound_port);
                *self.info.write().await = info.clone();
                Ok(info)
            }
            Err(e) => {
                warn!(port = configured_port, error = %e, "control server failed to start");
                let info = LanControlServerInfo::failed(configured_port, e.to_string());
                *self.info.write().await = info;
                Err(e)
            }
        }
    }

    /// Stop the server and refresh the status projection. Safe to call when
    /// already stopped.
    pub async fn stop(&self) {
        let _guard = self.lifecycle.lock().await;
        self.stop_locked().await;
    }

    async fn stop_locked(&self) {
        self.server.stop().await;
        let port = self.server.port().await;
        *self.info.write().await = LanControlServerInfo::stopped(port);
    }

    /// Broadcast pass-throughs for the host player. No-ops while the server
    /// is not running, so callers can fire them unconditionally on every
    /// local state change.
    pub async fn broadcast_state(&self) {
        if self.server.is_running().await {
            self.server.broadcast_state().await;
        }
    }

    pub async fn broadcast_current_song(&self) {
        if self.server.is_running().await {
            self.server.broadcast_current_song().await;
        }
    }

    pub async fn broadcast_queue(&self) {
        if self.server.is_running().await {
            self.server.broadcast_queue().await;
        }
    }

    /// Apply a new configuration.
    ///
    /// The previous port must be captured before the server config is
    /// swapped, otherwise a port change can never be detected and a running
    /// server keeps listening on the old port.
    pub async fn update_config(&self, config: LanControlConfig) -> ControlResult<()> {
        let _guard = self.lifecycle.lock().await;

        let was_running = self.server.is_running().await;
        let previous_port = self.server.port().await;
        let enabled = config.enabled;
        let port_changed = config.port != previous_port;
        self.server.update_config(config).await;

        match (was_running, enabled) {
            (true, false) => {
                info!("lan control disabled, stopping server");
                self.stop_locked().await;
            }
            (true, true) if port_changed => {
                info!(previous_port, "port changed, restarting server");
                self.server.stop().await;
                self.start_locked().await?;
            }
            (true, true) => {
                // Password or auth-mode changes take effect for new
                // connections without a restart.
                let port = self.server.port().await;
                self.info.write().await.port = port;
            }
            (false, true) => {
                self.start_locked().await?;
            }
            (false, false) => {
                let port = self.server.port().await;
                *self.info.write().await = LanControlServerInfo::stopped(port);
            }
        }
        Ok(())
    }
}

/// Best-effort LAN-reachable addresses for display in the host UI. Uses the
/// routing table via a connected UDP socket; no packets are sent.
fn lan_addresses(port: u16) -> Option<Vec<String>> {
    let socket = UdpSocket::bind("0.0.0.0:0").ok()?;
    socket.connect("192.0.2.1:80").ok()?;
    let local = socket.local_addr().ok()?;
    if local.ip().is_unspecified() || local.ip().is_loopback() {
        return None;
    }
    Some(vec![format!("http://{}:{port}", local.ip())])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::player::InMemoryPlayer;
    use soniclink_core::RejectAll;

    fn manager(config: LanControlConfig) -> Arc<LanControlManager> {
        LanControlManager::new(
            config,
            Arc::new(InMemoryPlayer::demo()),
            Arc::new(RejectAll),
        )
    }

    fn enabled_config(port: u16) -> LanControlConfig {
        LanControlConfig {
            enabled: true,
            port,
            password: "SECRET".into(),
            allow_navidrome_auth: false,
        }
    }

    #[tokio::test]
    async fn start_and_stop_update_status() {
        let manager = manager(enabled_config(0));
        assert!(!manager.status().await.running);

        let info = manager.start().await.unwrap();
        assert!(info.running);
        let bound = info.port;
        assert_ne!(bound, 0);
        assert_eq!(
            info.address.as_deref(),
            Some(format!("http://localhost:{bound}").as_str())
        );

        manager.stop().await;
        let info = manager.status().await;
        assert!(!info.running);
        assert!(info.address.is_none());
    }

    #[tokio::test]
    async fn disabling_stops_the_server() {
        let manager = manager(enabled_config(0));
        manager.start().await.unwrap();

        let mut config = enabled_config(0);
        config.enabled = false;
        manager.update_config(config).await.unwrap();
        assert!(!manager.is_running().await);
        assert!(!manager.status().await.running);
    }

    #[tokio::test]
    async fn enabling_starts_the_server() {
        let mut config = enabled_config(0);
        config.enabled = false;
        let manager = manager(config);
        assert!(!manager.is_running().await);

        manager.update_config(enabled_config(0)).await.unwrap();
        assert!(manager.is_running().await);
        manager.stop().await;
    }

    #[tokio::test]
    async fn port_change_restarts_on_the_new_port() {
        // Reserve two distinct free ports, then release them.
        let (first, second) = {
            let a = std::net::TcpListener::bind("0.0.0.0:0").unwrap();
            let b = std::net::TcpListener::bind("0.0.0.0:0").unwrap();
            (a.local_addr().unwrap().port(), b.local_addr().unwrap().port())
        };

        let manager = manager(enabled_config(first));
        manager.start().await.unwrap();
        assert_eq!(manager.status().await.port, first);

        manager.update_config(enabled_config(second)).await.unwrap();
        let info = manager.status().await;
        assert!(info.running);
        assert_eq!(info.port, second);
        assert_eq!(manager.server().bound_port().await, Some(second));
        manager.stop().await;
    }

    #[tokio::test]
    async fn password_change_does_not_restart() {
        let manager = manager(enabled_config(0));
        let info = manager.start().await.unwrap();
        let bound = info.port;

        let mut config = enabled_config(0);
        config.set_password("newpass");
        manager.update_config(config).await.unwrap();

        assert!(manager.is_running().await);
        assert_eq!(manager.server().bound_port().await, Some(bound));
        manager.stop().await;
    }

    #[tokio::test]
    async fn start_while_running_restarts_cleanly() {
        let manager = manager(enabled_config(0));
        manager.start().await.unwrap();

        let info = manager.start().await.unwrap();
        assert!(info.running);
        assert!(manager.is_running().await);

        let status = manager.status().await;
        assert!(status.running);
        assert!(status.error.is_none());
        manager.stop().await;
    }

    #[tokio::test]
    async fn broadcasts_pass_through_only_while_running() {
        use futures_util::{SinkExt, StreamExt};
        use soniclink_core::messages::{AuthRequestData, AuthType};
        use soniclink_core::{ControlMessage, MessageBody};
        use tokio_tungstenite::tungstenite::Message;

        let manager = manager(enabled_config(0));
        // Safe to fire while stopped.
        manager.broadcast_state().await;
        manager.broadcast_current_song().await;
        manager.broadcast_queue().await;
        assert!(!manager.is_running().await);

        let info = manager.start().await.unwrap();
        let (mut ws, _) =
            tokio_tungstenite::connect_async(&format!("ws://127.0.0.1:{}", info.port))
                .await
                .unwrap();
        let auth = ControlMessage::new(MessageBody::AuthRequest(AuthRequestData {
            auth_type: AuthType::Lan,
            password: "SECRET".into(),
            username: None,
        }));
        ws.send(Message::Text(serde_json::to_string(&auth).unwrap()))
            .await
            .unwrap();
        // Auth response plus the three snapshot pushes.
        for _ in 0..4 {
            ws.next().await.unwrap().unwrap();
        }

        manager.broadcast_state().await;
        let frame = tokio::time::timeout(std::time::Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for broadcast")
            .unwrap()
            .unwrap();
        let Message::Text(text) = frame else {
            panic!("expected text frame");
        };
        let message: ControlMessage = serde_json::from_str(&text).unwrap();
        assert!(matches!(message.body, MessageBody::StateUpdate(_)));
        manager.stop().await;
    }

    #[tokio::test]
    async fn failed_start_is_reflected_in_status() {
        let holder = std::net::TcpListener::bind("0.0.0.0:0").unwrap();
        let taken = holder.local_addr().unwrap().port();

        let manager = manager(enabled_config(taken));
        assert!(manager.start().await.is_err());
        let info = manager.status().await;
        assert!(!info.running);
        assert!(info.error.is_some());
    }
}
