//! Bridge traits between the control plane and the host music player.
//!
//! The host player exposes three narrow seams: synchronous snapshot reads
//! plus command application for the server role, an injected credential
//! verifier for delegated authentication, and remote-state setters plus a
//! single outbound command sender hook for the client role. Exactly one of
//! the two roles mirrors the player at a time; they never share more than
//! these hooks.

use crate::command::PlayerCommand;
use crate::error::ControlResult;
use crate::messages::{
    CurrentSongData, MessageBody, PlayerStateData, QueueData, RemoteDeviceInfo,
};
use std::sync::Arc;

/// Server-side view of the local player: snapshot reads for broadcasting
/// and command application for inbound remote commands.
///
/// Command failures (e.g. an unresolved song ID) are surfaced as errors so
/// the caller can log and drop them; they must never tear down a session.
pub trait PlayerBridge: Send + Sync {
    fn player_state(&self) -> PlayerStateData;
    fn current_song(&self) -> Option<CurrentSongData>;
    fn queue(&self) -> QueueData;
    fn apply(&self, command: PlayerCommand) -> ControlResult<()>;
}

/// Asynchronous capability for verifying delegated (Navidrome) credentials.
///
/// Injected into the server at construction time; the per-connection
/// handshake awaits the verdict while other sessions continue to be served.
#[async_trait::async_trait]
pub trait CredentialVerifier: Send + Sync {
    async fn verify(&self, username: &str, password: &str) -> bool;
}

/// A verifier that rejects every credential. Used when the host application
/// does not wire up Navidrome authentication.
pub struct RejectAll;

#[async_trait::async_trait]
impl CredentialVerifier for RejectAll {
    async fn verify(&self, _username: &str, _password: &str) -> bool {
        false
    }
}

/// Outbound command hook handed to the local player while a client is
/// connected: local transport-control actions go through here instead of
/// acting locally.
pub type RemoteSender = Arc<dyn Fn(MessageBody) + Send + Sync>;

/// Client-side view of the local player: remote-sourced state setters the
/// UI reads while remote control is active, plus registration of the
/// outbound command sender.
pub trait RemotePlayerSink: Send + Sync {
    fn set_remote_state(&self, state: Option<PlayerStateData>);
    fn set_remote_song(&self, song: Option<CurrentSongData>);
    fn set_remote_queue(&self, queue: Option<QueueData>);

    /// Enter remote control mode: the player forwards local commands
    /// through `sender` until [`clear_remote_sender`] is called.
    ///
    /// [`clear_remote_sender`]: RemotePlayerSink::clear_remote_sender
    fn register_remote_sender(&self, sender: RemoteSender, device: Option<RemoteDeviceInfo>);

    /// Exit remote control mode and drop the sender hook.
    fn clear_remote_sender(&self);
}
