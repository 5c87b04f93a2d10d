//! soniclink-core: Shared protocol library for SonicLink LAN control.
//!
//! Provides the JSON control message vocabulary, the player command set,
//! server/client configuration types, and the bridge traits that connect
//! the control plane to a host music player.

pub mod bridge;
pub mod command;
pub mod config;
pub mod error;
pub mod messages;

// Re-export commonly used items at crate root.
pub use bridge::{CredentialVerifier, PlayerBridge, RejectAll, RemotePlayerSink, RemoteSender};
pub use command::PlayerCommand;
pub use config::{LanControlConfig, LanControlServerInfo, DEFAULT_PORT};
pub use error::{ControlError, ControlResult};
pub use messages::{AuthType, ControlMessage, MessageBody, RepeatMode};
