//! Core control server: accepts connections, runs the auth handshake, and
//! fans player updates out to every authenticated session.
//!
//! The listener answers plain HTTP (health check, control page) on the same
//! port as the WebSocket endpoint by peeking at the request head before
//! handing the stream to the WebSocket acceptor.

use crate::http::{self, Preflight};
use futures_util::{SinkExt, StreamExt};
use soniclink_core::messages::{
    AuthRequestData, AuthResponseData, AuthType, ErrorData, RemoteDeviceInfo,
};
use soniclink_core::{
    ControlError, ControlMessage, ControlResult, CredentialVerifier, LanControlConfig,
    MessageBody, PlayerBridge, PlayerCommand,
};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

/// Device name reported to remotes in the auth response.
const DEVICE_NAME: &str = "SonicLink Desktop";

/// How long an unauthenticated connection may sit before it is dropped.
const AUTH_TIMEOUT: Duration = Duration::from_secs(30);

/// Per-session outbound queue depth. A session that falls this far behind
/// starts losing updates rather than stalling the broadcaster.
const SESSION_QUEUE: usize = 64;

struct RunningState {
    bound_port: u16,
    shutdown: broadcast::Sender<()>,
    accept_task: JoinHandle<()>,
}

/// Whether the session loop should keep the connection open.
enum SessionFlow {
    Continue,
    Close,
}

/// The LAN control server instance.
pub struct ControlServer {
    config: RwLock<LanControlConfig>,
    player: Arc<dyn PlayerBridge>,
    verifier: Arc<dyn CredentialVerifier>,
    auth_timeout: Duration,
    /// Outbound text senders for authenticated sessions, keyed by session id.
    sessions: RwLock<HashMap<u64, mpsc::Sender<String>>>,
    next_session_id: AtomicU64,
    running: Mutex<Option<RunningState>>,
}

impl ControlServer {
    pub fn new(
        config: LanControlConfig,
        player: Arc<dyn PlayerBridge>,
        verifier: Arc<dyn CredentialVerifier>,
    ) -> Arc<Self> {
        Self::with_auth_timeout(config, player, verifier, AUTH_TIMEOUT)
    }

    /// Like [`new`](Self::new) but with a custom unauthenticated-connection
    /// deadline.
    pub fn with_auth_timeout(
        config: LanControlConfig,
        player: Arc<dyn PlayerBridge>,
        verifier: Arc<dyn CredentialVerifier>,
        auth_timeout: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            config: RwLock::new(config.normalized()),
            player,
            verifier,
            auth_timeout,
            sessions: RwLock::new(HashMap::new()),
            next_session_id: AtomicU64::new(1),
            running: Mutex::new(None),
        })
    }

    /// Configured port (not necessarily bound).
    pub async fn port(&self) -> u16 {
        self.config.read().await.port
    }

    /// Port the listener is actually bound to, if running. Differs from the
    /// configured port when the config asked for port 0.
    pub async fn bound_port(&self) -> Option<u16> {
        self.running.lock().await.as_ref().map(|r| r.bound_port)
    }

    pub async fn is_running(&self) -> bool {
        self.running.lock().await.is_some()
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Swap in a new configuration. Takes effect for new connections
    /// immediately; does not restart the listener (the lifecycle manager
    /// decides that).
    pub async fn update_config(&self, config: LanControlConfig) {
        *self.config.write().await = config.normalized();
    }

    /// Bind the listener and start accepting connections. Returns the bound
    /// port.
    pub async fn start(self: &Arc<Self>) -> ControlResult<u16> {
        let mut running = self.running.lock().await;
        if running.is_some() {
            return Err(ControlError::AlreadyRunning);
        }

        let port = self.config.read().await.port;
        let listener = TcpListener::bind(("0.0.0.0", port)).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::AddrInUse {
                ControlError::PortInUse(port)
            } else {
                ControlError::Bind(e.to_string())
            }
        })?;
        let bound_port = listener
            .local_addr()
            .map_err(|e| ControlError::Bind(e.to_string()))?
            .port();

        let (shutdown, _) = broadcast::channel(1);
        let accept_shutdown = shutdown.clone();
        let server = self.clone();
        let accept_task = tokio::spawn(async move {
            let mut shutdown_rx = accept_shutdown.subscribe();
            loop {
                tokio::select! {
                    accepted = listener.accept() => {
                        match accepted {
                            Ok((stream, addr)) => {
                                let srv = server.clone();
                                let conn_shutdown = accept_shutdown.subscribe();
                                tokio::spawn(async move {
                                    if let Err(e) = srv.handle_connection(stream, addr, conn_shutdown).await {
                                        debug!(remote = %addr, error = %e, "connection ended with error");
                                    }
                                });
                            }
                            Err(e) => {
                                warn!(error = %e, "accept failed");
                            }
                        }
                    }
                    _ = shutdown_rx.recv() => break,
                }
            }
        });

        info!(port = bound_port, "control server listening");
        *running = Some(RunningState {
            bound_port,
            shutdown,
            accept_task,
        });
        Ok(bound_port)
    }

    /// Stop the listener and disconnect every session. Idempotent.
    pub async fn stop(&self) {
        let state = self.running.lock().await.take();
        if let Some(state) = state {
            let _ = state.shutdown.send(());
            state.accept_task.abort();
            let _ = state.accept_task.await;
            self.sessions.write().await.clear();
            info!(port = state.bound_port, "control server stopped");
        }
    }

    /// Push the current player state to every authenticated session.
    pub async fn broadcast_state(&self) {
        let state = self.player.player_state();
        self.broadcast(MessageBody::StateUpdate(state)).await;
    }

    /// Push the current song to every authenticated session.
    pub async fn broadcast_current_song(&self) {
        if let Some(song) = self.player.current_song() {
            self.broadcast(MessageBody::CurrentSongUpdate(song)).await;
        }
    }

    /// Push the queue to every authenticated session.
    pub async fn broadcast_queue(&self) {
        let queue = self.player.queue();
        self.broadcast(MessageBody::QueueUpdate(queue)).await;
    }

    /// Serialize once, then fan out. Sessions whose queues are full or whose
    /// tasks have gone away are skipped; the session loop cleans them up.
    async fn broadcast(&self, body: MessageBody) {
        let text = match serde_json::to_string(&ControlMessage::stamped(body)) {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "failed to serialize broadcast");
                return;
            }
        };
        let sessions = self.sessions.read().await;
        for tx in sessions.values() {
            let _ = tx.try_send(text.clone());
        }
    }

    async fn handle_connection(
        self: Arc<Self>,
        stream: TcpStream,
        addr: SocketAddr,
        shutdown: broadcast::Receiver<()>,
    ) -> ControlResult<()> {
        match http::preflight(&stream).await? {
            Preflight::Plain(request) => {
                debug!(remote = %addr, path = %request.path, "http request");
                http::respond(stream, &request).await?;
                Ok(())
            }
            Preflight::WebSocket => self.handle_websocket(stream, addr, shutdown).await,
        }
    }

    async fn handle_websocket(
        self: Arc<Self>,
        stream: TcpStream,
        addr: SocketAddr,
        mut shutdown: broadcast::Receiver<()>,
    ) -> ControlResult<()> {
        let ws = tokio_tungstenite::accept_async(stream)
            .await
            .map_err(|e| ControlError::Transport(e.to_string()))?;
        let (mut sink, mut source) = ws.split();
        debug!(remote = %addr, "websocket connection opened");

        // Unauthenticated phase. The deadline is absolute: retries within one
        // connection do not reset it.
        let deadline = Instant::now() + self.auth_timeout;
        let authenticated = loop {
            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => {
                    debug!(remote = %addr, "auth deadline expired");
                    send_body(&mut sink, MessageBody::Error(ErrorData::auth_timeout())).await?;
                    let _ = sink.close().await;
                    break false;
                }
                _ = shutdown.recv() => {
                    let _ = sink.close().await;
                    break false;
                }
                frame = source.next() => {
                    match frame {
                        Some(Ok(Message::Text(text))) => {
                            match self.handle_unauthenticated_text(&text, addr, &mut sink).await? {
                                Some(success) => break success,
                                None => continue,
                            }
                        }
                        Some(Ok(Message::Close(_))) | None => break false,
                        Some(Ok(_)) => continue,
                        Some(Err(e)) => {
                            debug!(remote = %addr, error = %e, "websocket error before auth");
                            break false;
                        }
                    }
                }
            }
        };
        if !authenticated {
            return Ok(());
        }

        // Authenticated phase: register the session and push a snapshot so
        // the remote renders immediately.
        let session_id = self.next_session_id.fetch_add(1, Ordering::Relaxed);
        let (tx, mut rx) = mpsc::channel::<String>(SESSION_QUEUE);
        self.sessions.write().await.insert(session_id, tx);
        info!(remote = %addr, session_id, "remote authenticated");

        let snapshot = self.snapshot();
        for body in snapshot {
            send_body(&mut sink, body).await?;
        }

        let result = loop {
            tokio::select! {
                outbound = rx.recv() => {
                    match outbound {
                        Some(text) => {
                            if let Err(e) = sink.send(Message::Text(text)).await {
                                break Err(ControlError::Transport(e.to_string()));
                            }
                        }
                        None => break Ok(()),
                    }
                }
                _ = shutdown.recv() => {
                    let _ = sink.close().await;
                    break Ok(());
                }
                frame = source.next() => {
                    match frame {
                        Some(Ok(Message::Text(text))) => {
                            match self.handle_authenticated_text(&text, addr, &mut sink).await? {
                                SessionFlow::Continue => {}
                                SessionFlow::Close => {
                                    let _ = sink.close().await;
                                    break Ok(());
                                }
                            }
                        }
                        Some(Ok(Message::Close(_))) | None => break Ok(()),
                        Some(Ok(_)) => {}
                        Some(Err(e)) => break Err(ControlError::Transport(e.to_string())),
                    }
                }
            }
        };

        self.sessions.write().await.remove(&session_id);
        debug!(remote = %addr, session_id, "session closed");
        result
    }

    /// Handle one text frame from a connection that has not yet
    /// authenticated. Returns `Some(true)` on successful auth, `Some(false)`
    /// if the connection must close, `None` to keep waiting.
    async fn handle_unauthenticated_text(
        &self,
        text: &str,
        addr: SocketAddr,
        sink: &mut WsSink,
    ) -> ControlResult<Option<bool>> {
        let message: ControlMessage = match serde_json::from_str(text) {
            Ok(message) => message,
            Err(e) => {
                debug!(remote = %addr, error = %e, "malformed frame before auth");
                send_body(sink, MessageBody::Error(ErrorData::invalid_message())).await?;
                return Ok(None);
            }
        };
        match message.body {
            MessageBody::AuthRequest(request) => {
                let accepted = self.authenticate(&request).await;
                if accepted {
                    send_body(sink, MessageBody::AuthResponse(auth_accepted())).await?;
                    Ok(Some(true))
                } else {
                    info!(remote = %addr, auth_type = ?request.auth_type, "auth rejected");
                    send_body(
                        sink,
                        MessageBody::AuthResponse(auth_rejected("invalid credentials")),
                    )
                    .await?;
                    let _ = sink.close().await;
                    Ok(Some(false))
                }
            }
            _ => {
                send_body(sink, MessageBody::Error(ErrorData::not_authenticated())).await?;
                Ok(None)
            }
        }
    }

    async fn authenticate(&self, request: &AuthRequestData) -> bool {
        match request.auth_type {
            AuthType::Lan => {
                let config = self.config.read().await;
                !config.password.is_empty()
                    && request.password.to_uppercase() == config.password
            }
            AuthType::Navidrome => {
                let allowed = self.config.read().await.allow_navidrome_auth;
                if !allowed {
                    return false;
                }
                let Some(username) = request.username.as_deref() else {
                    return false;
                };
                self.verifier.verify(username, &request.password).await
            }
        }
    }

    async fn handle_authenticated_text(
        &self,
        text: &str,
        addr: SocketAddr,
        sink: &mut WsSink,
    ) -> ControlResult<SessionFlow> {
        let message: ControlMessage = match serde_json::from_str(text) {
            Ok(message) => message,
            Err(e) => {
                debug!(remote = %addr, error = %e, "malformed frame");
                send_body(sink, MessageBody::Error(ErrorData::invalid_message())).await?;
                return Ok(SessionFlow::Continue);
            }
        };
        match message.body {
            // Re-auth over a live session is re-evaluated from scratch; a
            // failure closes the connection like a first-time failure would.
            MessageBody::AuthRequest(request) => {
                if self.authenticate(&request).await {
                    send_body(sink, MessageBody::AuthResponse(auth_accepted())).await?;
                    Ok(SessionFlow::Continue)
                } else {
                    send_body(
                        sink,
                        MessageBody::AuthResponse(auth_rejected("invalid credentials")),
                    )
                    .await?;
                    Ok(SessionFlow::Close)
                }
            }
            // Queries are answered by broadcasting current state to every
            // session, which keeps all remotes equally fresh.
            MessageBody::GetState => {
                self.broadcast_state().await;
                Ok(SessionFlow::Continue)
            }
            MessageBody::GetCurrentSong => {
                self.broadcast_current_song().await;
                Ok(SessionFlow::Continue)
            }
            MessageBody::GetQueue => {
                self.broadcast_queue().await;
                Ok(SessionFlow::Continue)
            }
            body => {
                match PlayerCommand::from_message(&body) {
                    Some(command) => {
                        debug!(remote = %addr, ?command, "player command");
                        // Failed commands (unresolved IDs and the like) are
                        // dropped; they never cost the remote its session.
                        if let Err(e) = self.player.apply(command) {
                            warn!(remote = %addr, error = %e, "command failed, dropped");
                        } else {
                            self.broadcast_state().await;
                            self.broadcast_current_song().await;
                            self.broadcast_queue().await;
                        }
                    }
                    None => {
                        debug!(remote = %addr, ?body, "ignoring non-command message");
                    }
                }
                Ok(SessionFlow::Continue)
            }
        }
    }

    fn snapshot(&self) -> Vec<MessageBody> {
        let mut bodies = vec![MessageBody::StateUpdate(self.player.player_state())];
        if let Some(song) = self.player.current_song() {
            bodies.push(MessageBody::CurrentSongUpdate(song));
        }
        bodies.push(MessageBody::QueueUpdate(self.player.queue()));
        bodies
    }
}

type WsSink = futures_util::stream::SplitSink<
    tokio_tungstenite::WebSocketStream<TcpStream>,
    Message,
>;

async fn send_body(sink: &mut WsSink, body: MessageBody) -> ControlResult<()> {
    let text = serde_json::to_string(&ControlMessage::stamped(body))?;
    sink.send(Message::Text(text))
        .await
        .map_err(|e| ControlError::Transport(e.to_string()))
}

fn auth_accepted() -> AuthResponseData {
    AuthResponseData {
        success: true,
        message: None,
        device_info: Some(RemoteDeviceInfo {
            name: Some(DEVICE_NAME.into()),
            version: Some(env!("CARGO_PKG_VERSION").into()),
        }),
    }
}

fn auth_rejected(message: impl Into<String>) -> AuthResponseData {
    AuthResponseData {
        success: false,
        message: Some(message.into()),
        device_info: None,
    }
}
