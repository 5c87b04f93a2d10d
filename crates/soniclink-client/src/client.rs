//! The control client.
//!
//! `ControlClient` manages the connection lifecycle: WebSocket connect,
//! authentication, the receive loop that mirrors server pushes into the
//! host player sink, and outbound command forwarding.

use crate::storage::{ConnectionStore, SavedConnection};
use futures_util::{SinkExt, StreamExt};
use soniclink_core::messages::{
    AddAlbumToQueueData, AddPlaylistToQueueData, AddToQueueData, AuthRequestData, AuthType,
    PlayAlbumData, PlayPlaylistData, PlaySongData, RepeatMode, SeekData, SetRepeatData,
    SetShuffleData, VolumeData,
};
use soniclink_core::{
    ControlError, ControlMessage, ControlResult, MessageBody, RemotePlayerSink,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch, Mutex};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

/// Connection lifecycle states, in the order a successful connect moves
/// through them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientState {
    Disconnected,
    Connecting,
    Authenticating,
    Connected,
    /// Terminal failure; the message is user-presentable.
    Error(String),
}

/// Everything needed to reach and authenticate with a server.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectOptions {
    pub host: String,
    pub port: u16,
    pub auth_type: AuthType,
    pub password: String,
    pub username: Option<String>,
}

struct ConnectionHandle {
    /// Set on intentional disconnect so the receive loop reports
    /// `Disconnected` instead of `Error` when the socket closes.
    abort: Arc<AtomicBool>,
    out_tx: mpsc::UnboundedSender<MessageBody>,
    task: tokio::task::JoinHandle<()>,
}

/// The control client. One instance per host player; reconnecting replaces
/// the underlying connection.
pub struct ControlClient {
    sink: Arc<dyn RemotePlayerSink>,
    state_tx: watch::Sender<ClientState>,
    connection: Mutex<Option<ConnectionHandle>>,
    /// When present, the last successful connection is remembered here and
    /// forgotten on manual disconnect.
    store: Option<Arc<ConnectionStore>>,
}

impl ControlClient {
    pub fn new(sink: Arc<dyn RemotePlayerSink>) -> Arc<Self> {
        let (state_tx, _) = watch::channel(ClientState::Disconnected);
        Arc::new(Self {
            sink,
            state_tx,
            connection: Mutex::new(None),
            store: None,
        })
    }

    /// A client that persists its last successful connection through
    /// `store`.
    pub fn with_store(sink: Arc<dyn RemotePlayerSink>, store: ConnectionStore) -> Arc<Self> {
        let (state_tx, _) = watch::channel(ClientState::Disconnected);
        Arc::new(Self {
            sink,
            state_tx,
            connection: Mutex::new(None),
            store: Some(Arc::new(store)),
        })
    }

    pub fn state(&self) -> ClientState {
        self.state_tx.borrow().clone()
    }

    /// Watch for state changes. The receiver starts at the current state.
    pub fn subscribe(&self) -> watch::Receiver<ClientState> {
        self.state_tx.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ClientState::Connected
    }

    /// Reset a terminal error back to `Disconnected`.
    pub fn clear_error(&self) {
        if matches!(self.state(), ClientState::Error(_)) {
            self.state_tx.send_replace(ClientState::Disconnected);
        }
    }

    /// Connect and authenticate. A no-op while a connect is already in
    /// flight; otherwise replaces any existing connection. Returns once the
    /// socket is open; authentication completes in the background and is
    /// observable through [`subscribe`](Self::subscribe).
    pub async fn connect(self: &Arc<Self>, options: ConnectOptions) -> ControlResult<()> {
        if matches!(
            self.state(),
            ClientState::Connecting | ClientState::Authenticating
        ) {
            debug!("connect ignored, already connecting");
            return Ok(());
        }
        self.teardown().await;
        self.state_tx.send_replace(ClientState::Connecting);

        let url = websocket_url(&options.host, options.port)?;
        info!(url = %url, "connecting to control server");
        let (ws, _) = match tokio_tungstenite::connect_async(&url).await {
            Ok(connected) => connected,
            Err(e) => {
                let message = format!("connection failed: {e}");
                self.state_tx.send_replace(ClientState::Error(message.clone()));
                return Err(ControlError::Transport(message));
            }
        };

        self.state_tx.send_replace(ClientState::Authenticating);
        let abort = Arc::new(AtomicBool::new(false));
        let (out_tx, out_rx) = mpsc::unbounded_channel();

        let task = tokio::spawn(run_connection(
            ws,
            options,
            self.sink.clone(),
            self.state_tx.clone(),
            abort.clone(),
            out_tx.clone(),
            out_rx,
            self.store.clone(),
        ));

        *self.connection.lock().await = Some(ConnectionHandle {
            abort,
            out_tx,
            task,
        });
        Ok(())
    }

    /// Tear down the current connection and forget the remembered one, if
    /// any. Idempotent.
    pub async fn disconnect(&self) {
        self.teardown().await;
        if let Some(store) = &self.store {
            if let Err(e) = store.clear() {
                warn!(error = %e, "failed to clear remembered connection");
            }
        }
    }

    /// Close the current connection without touching the store. Used by
    /// [`connect`](Self::connect) when replacing a connection.
    async fn teardown(&self) {
        let handle = self.connection.lock().await.take();
        if let Some(handle) = handle {
            handle.abort.store(true, Ordering::SeqCst);
            // Dropping the sender wakes the receive loop, which closes the
            // socket and clears the sink on its way out.
            drop(handle.out_tx);
            let _ = handle.task.await;
        }
        self.state_tx.send_replace(ClientState::Disconnected);
    }

    /// Queue a message for the server.
    pub async fn send(&self, body: MessageBody) -> ControlResult<()> {
        let connection = self.connection.lock().await;
        let handle = connection
            .as_ref()
            .ok_or_else(|| ControlError::Transport("not connected".into()))?;
        handle
            .out_tx
            .send(body)
            .map_err(|_| ControlError::Transport("connection closed".into()))
    }

    // ── Transport commands ──────────────────────────────────────────

    pub async fn play_pause(&self) -> ControlResult<()> {
        self.send(MessageBody::PlayPause).await
    }

    pub async fn play(&self) -> ControlResult<()> {
        self.send(MessageBody::Play).await
    }

    pub async fn pause(&self) -> ControlResult<()> {
        self.send(MessageBody::Pause).await
    }

    pub async fn next(&self) -> ControlResult<()> {
        self.send(MessageBody::Next).await
    }

    pub async fn previous(&self) -> ControlResult<()> {
        self.send(MessageBody::Previous).await
    }

    pub async fn seek(&self, time: f64) -> ControlResult<()> {
        self.send(MessageBody::Seek(SeekData { time })).await
    }

    pub async fn set_volume(&self, volume: f64) -> ControlResult<()> {
        self.send(MessageBody::SetVolume(VolumeData { volume })).await
    }

    pub async fn toggle_shuffle(&self) -> ControlResult<()> {
        self.send(MessageBody::ToggleShuffle).await
    }

    pub async fn toggle_repeat(&self) -> ControlResult<()> {
        self.send(MessageBody::ToggleRepeat).await
    }

    pub async fn set_shuffle(&self, enabled: bool) -> ControlResult<()> {
        self.send(MessageBody::SetShuffle(SetShuffleData { enabled }))
            .await
    }

    pub async fn set_repeat(&self, mode: RepeatMode) -> ControlResult<()> {
        self.send(MessageBody::SetRepeat(SetRepeatData { mode })).await
    }

    // ── Playback selection ──────────────────────────────────────────

    pub async fn play_song(&self, song_id: impl Into<String>) -> ControlResult<()> {
        self.send(MessageBody::PlaySong(PlaySongData {
            song_id: song_id.into(),
        }))
        .await
    }

    pub async fn play_album(&self, album_id: impl Into<String>) -> ControlResult<()> {
        self.send(MessageBody::PlayAlbum(PlayAlbumData {
            album_id: album_id.into(),
            song_index: None,
        }))
        .await
    }

    pub async fn play_playlist(&self, playlist_id: impl Into<String>) -> ControlResult<()> {
        self.send(MessageBody::PlayPlaylist(PlayPlaylistData {
            playlist_id: playlist_id.into(),
            song_index: None,
        }))
        .await
    }

    pub async fn add_to_queue(&self, song_ids: Vec<String>) -> ControlResult<()> {
        self.send(MessageBody::AddToQueue(AddToQueueData { song_ids }))
            .await
    }

    pub async fn add_album_to_queue(&self, album_id: impl Into<String>) -> ControlResult<()> {
        self.send(MessageBody::AddAlbumToQueue(AddAlbumToQueueData {
            album_id: album_id.into(),
        }))
        .await
    }

    pub async fn add_playlist_to_queue(
        &self,
        playlist_id: impl Into<String>,
    ) -> ControlResult<()> {
        self.send(MessageBody::AddPlaylistToQueue(AddPlaylistToQueueData {
            playlist_id: playlist_id.into(),
        }))
        .await
    }

    pub async fn clear_queue(&self) -> ControlResult<()> {
        self.send(MessageBody::ClearQueue).await
    }

    // ── State queries ───────────────────────────────────────────────

    pub async fn request_state(&self) -> ControlResult<()> {
        self.send(MessageBody::GetState).await
    }

    pub async fn request_current_song(&self) -> ControlResult<()> {
        self.send(MessageBody::GetCurrentSong).await
    }

    pub async fn request_queue(&self) -> ControlResult<()> {
        self.send(MessageBody::GetQueue).await
    }
}

type Ws = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Connection task: authenticates, then pumps frames both ways until the
/// socket closes or the client disconnects.
#[allow(clippy::too_many_arguments)]
async fn run_connection(
    ws: Ws,
    options: ConnectOptions,
    sink: Arc<dyn RemotePlayerSink>,
    state_tx: watch::Sender<ClientState>,
    abort: Arc<AtomicBool>,
    out_tx: mpsc::UnboundedSender<MessageBody>,
    mut out_rx: mpsc::UnboundedReceiver<MessageBody>,
    store: Option<Arc<ConnectionStore>>,
) {
    let (mut writer, mut reader) = ws.split();

    // The LAN password is compared uppercased on the server; normalize the
    // user's entry here. Delegated credentials go through untouched.
    let password = match options.auth_type {
        AuthType::Lan => options.password.trim().to_uppercase(),
        AuthType::Navidrome => options.password.clone(),
    };
    let auth = MessageBody::AuthRequest(AuthRequestData {
        auth_type: options.auth_type,
        password,
        username: options.username.clone(),
    });
    if let Err(e) = send_body(&mut writer, auth).await {
        finish(&sink, &state_tx, &abort, Some(format!("auth send failed: {e}")));
        return;
    }

    let mut failure: Option<String> = None;
    let mut remembered = false;
    loop {
        // Remember the connection once authentication has gone through.
        if !remembered && *state_tx.borrow() == ClientState::Connected {
            remembered = true;
            if let Some(store) = &store {
                if let Err(e) = store.save(&SavedConnection::from(options.clone())) {
                    warn!(error = %e, "failed to remember connection");
                }
            }
        }
        tokio::select! {
            outbound = out_rx.recv() => {
                match outbound {
                    Some(body) => {
                        if let Err(e) = send_body(&mut writer, body).await {
                            failure = Some(format!("send failed: {e}"));
                            break;
                        }
                    }
                    // Client dropped the handle: intentional disconnect.
                    None => {
                        let _ = writer.close().await;
                        break;
                    }
                }
            }
            frame = reader.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        match handle_frame(&text, &sink, &state_tx, &out_tx) {
                            FrameOutcome::Continue => {}
                            FrameOutcome::Fatal(message) => {
                                failure = Some(message);
                                let _ = writer.close().await;
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        // A clean close of an established session is an
                        // ordinary disconnect; before auth completes it
                        // means the server refused us.
                        if *state_tx.borrow() != ClientState::Connected {
                            failure = Some("server closed the connection".into());
                        }
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        failure = Some(format!("connection lost: {e}"));
                        break;
                    }
                }
            }
        }
    }

    finish(&sink, &state_tx, &abort, failure);
}

enum FrameOutcome {
    Continue,
    /// The session is over: auth rejection or a server-sent error.
    Fatal(String),
}

fn handle_frame(
    text: &str,
    sink: &Arc<dyn RemotePlayerSink>,
    state_tx: &watch::Sender<ClientState>,
    out_tx: &mpsc::UnboundedSender<MessageBody>,
) -> FrameOutcome {
    let message: ControlMessage = match serde_json::from_str(text) {
        Ok(message) => message,
        Err(e) => {
            warn!(error = %e, "malformed frame from server");
            return FrameOutcome::Continue;
        }
    };
    match message.body {
        MessageBody::AuthResponse(response) => {
            if response.success {
                info!(device = ?response.device_info, "authenticated");
                state_tx.send_replace(ClientState::Connected);
                let tx = out_tx.clone();
                sink.register_remote_sender(
                    Arc::new(move |body| {
                        let _ = tx.send(body);
                    }),
                    response.device_info,
                );
                // Hydrate the caches; the server answers with pushes.
                let _ = out_tx.send(MessageBody::GetState);
                let _ = out_tx.send(MessageBody::GetCurrentSong);
                let _ = out_tx.send(MessageBody::GetQueue);
                FrameOutcome::Continue
            } else {
                let reason = response
                    .message
                    .unwrap_or_else(|| "rejected by server".into());
                FrameOutcome::Fatal(format!("authentication failed: {reason}"))
            }
        }
        MessageBody::StateUpdate(state) => {
            sink.set_remote_state(Some(state));
            FrameOutcome::Continue
        }
        MessageBody::CurrentSongUpdate(song) => {
            sink.set_remote_song(Some(song));
            FrameOutcome::Continue
        }
        MessageBody::QueueUpdate(queue) => {
            sink.set_remote_queue(Some(queue));
            FrameOutcome::Continue
        }
        MessageBody::Error(error) => {
            warn!(message = %error.message, code = ?error.code, "server error");
            FrameOutcome::Fatal(format!("server error: {}", error.message))
        }
        other => {
            debug!(?other, "ignoring unexpected message");
            FrameOutcome::Continue
        }
    }
}

/// Clear the sink and publish the terminal state. An intentional disconnect
/// always lands on `Disconnected`, whatever happened on the wire.
fn finish(
    sink: &Arc<dyn RemotePlayerSink>,
    state_tx: &watch::Sender<ClientState>,
    abort: &AtomicBool,
    failure: Option<String>,
) {
    sink.clear_remote_sender();
    sink.set_remote_state(None);
    sink.set_remote_song(None);
    sink.set_remote_queue(None);
    let state = if abort.load(Ordering::SeqCst) {
        ClientState::Disconnected
    } else {
        match failure {
            Some(message) => ClientState::Error(message),
            None => ClientState::Disconnected,
        }
    };
    state_tx.send_replace(state);
}

type WsWriter = futures_util::stream::SplitSink<Ws, Message>;

async fn send_body(writer: &mut WsWriter, body: MessageBody) -> ControlResult<()> {
    let text = serde_json::to_string(&ControlMessage::stamped(body))?;
    writer
        .send(Message::Text(text))
        .await
        .map_err(|e| ControlError::Transport(e.to_string()))
}

/// Derive the WebSocket URL from a user-entered host. Accepts a bare host,
/// an `http(s)://` origin, or an explicit `ws(s)://` URL; `port` applies
/// only when the host does not already carry one.
pub fn websocket_url(host: &str, port: u16) -> ControlResult<String> {
    let trimmed = host.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Err(ControlError::InvalidAddress("empty host".into()));
    }
    let (scheme, rest) = if let Some(rest) = trimmed.strip_prefix("wss://") {
        ("wss", rest)
    } else if let Some(rest) = trimmed.strip_prefix("ws://") {
        ("ws", rest)
    } else if let Some(rest) = trimmed.strip_prefix("https://") {
        ("wss", rest)
    } else if let Some(rest) = trimmed.strip_prefix("http://") {
        ("ws", rest)
    } else {
        ("ws", trimmed)
    };
    let authority = rest.split('/').next().unwrap_or("");
    if authority.is_empty() {
        return Err(ControlError::InvalidAddress(format!("invalid host: {host}")));
    }
    let has_port = if let Some(bracket_end) = authority.rfind(']') {
        // IPv6 literal like [::1] or [::1]:5299
        authority[bracket_end..].contains(':')
    } else {
        authority.contains(':')
    };
    if has_port {
        Ok(format!("{scheme}://{authority}"))
    } else {
        Ok(format!("{scheme}://{authority}:{port}"))
    }
}
