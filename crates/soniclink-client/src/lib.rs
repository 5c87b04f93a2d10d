//! Client library for the SonicLink LAN control protocol.
//!
//! Connects to a control server over WebSocket, authenticates, mirrors the
//! remote player's state into a [`RemotePlayerSink`], and forwards local
//! transport commands back to the server.
//!
//! [`RemotePlayerSink`]: soniclink_core::RemotePlayerSink

pub mod client;
pub mod storage;

pub use client::{ClientState, ConnectOptions, ControlClient};
pub use storage::{ConnectionStore, SavedConnection};
