//! soniclink-server: LAN control server for a music player.
//!
//! Embeds an HTTP+WebSocket listener in the host application, gates
//! connections behind password authentication, and fans player-state
//! changes out to every authenticated remote.

pub mod config;
pub mod http;
pub mod manager;
pub mod player;
pub mod server;

pub use manager::LanControlManager;
pub use player::{InMemoryPlayer, Library};
pub use server::ControlServer;
