//! JSON control message vocabulary exchanged between server and clients.
//!
//! Wire format: one self-contained JSON object per WebSocket text frame,
//! `{ "type": <tag>, "data": <payload>, "timestamp": <epoch-ms> }`. The tag
//! determines the payload shape; messages without a payload omit `data`.
//! There are no request IDs — ordering on a single connection is the only
//! correlation mechanism.

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// A single protocol message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlMessage {
    #[serde(flatten)]
    pub body: MessageBody,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<u64>,
}

impl ControlMessage {
    /// Wrap a body without a timestamp.
    pub fn new(body: MessageBody) -> Self {
        Self {
            body,
            timestamp: None,
        }
    }

    /// Wrap a body and stamp it with the current wall-clock time.
    pub fn stamped(body: MessageBody) -> Self {
        Self {
            body,
            timestamp: Some(epoch_millis()),
        }
    }
}

/// Current wall-clock time in milliseconds since the Unix epoch.
pub fn epoch_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// The closed set of message types and their payloads.
///
/// Tag strings and payload field names match the wire protocol exactly
/// (snake_case tags, camelCase payload fields).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum MessageBody {
    // ── Authentication ──────────────────────────────────────────────
    AuthRequest(AuthRequestData),
    AuthResponse(AuthResponseData),

    // ── Transport control ───────────────────────────────────────────
    PlayPause,
    Play,
    Pause,
    Next,
    Previous,
    Seek(SeekData),
    SetVolume(VolumeData),

    // ── Playlist control ────────────────────────────────────────────
    PlaySong(PlaySongData),
    PlayAlbum(PlayAlbumData),
    PlayPlaylist(PlayPlaylistData),
    PlayAlbumShuffle(PlayAlbumData),
    PlayPlaylistShuffle(PlayPlaylistData),
    PlayAlbumFromIndex(PlayAlbumData),
    PlayPlaylistFromIndex(PlayPlaylistData),
    AddToQueue(AddToQueueData),
    AddAlbumToQueue(AddAlbumToQueueData),
    AddPlaylistToQueue(AddPlaylistToQueueData),
    ClearQueue,

    // ── Shuffle & repeat ────────────────────────────────────────────
    ToggleShuffle,
    ToggleRepeat,
    SetShuffle(SetShuffleData),
    SetRepeat(SetRepeatData),

    // ── State queries (client → server) ─────────────────────────────
    GetState,
    GetQueue,
    GetCurrentSong,

    // ── State pushes (server → client) ──────────────────────────────
    StateUpdate(PlayerStateData),
    QueueUpdate(QueueData),
    CurrentSongUpdate(CurrentSongData),

    // ── Error (either direction) ────────────────────────────────────
    Error(ErrorData),
}

/// How a client authenticates: the shared LAN password or delegated
/// Navidrome credentials.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthType {
    Lan,
    Navidrome,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthRequestData {
    pub auth_type: AuthType,
    pub password: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponseData {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_info: Option<RemoteDeviceInfo>,
}

/// Identity advertised by the server on successful authentication.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteDeviceInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// Repeat mode, cycled off → all → one by `TOGGLE_REPEAT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepeatMode {
    Off,
    One,
    All,
}

/// Snapshot of the host player's transport state, re-sent wholesale on
/// every change (no diffing).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerStateData {
    pub is_playing: bool,
    pub current_time: f64,
    pub duration: f64,
    pub volume: u32,
    pub is_shuffle: bool,
    pub repeat_mode: RepeatMode,
    pub has_previous: bool,
    pub has_next: bool,
}

/// Identity and metadata of the active track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentSongData {
    pub id: String,
    pub title: String,
    pub artist: String,
    pub album: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover_art: Option<String>,
    pub duration: f64,
}

/// The ordered play queue with its current index (-1 when empty).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueData {
    pub songs: Vec<CurrentSongData>,
    pub current_index: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeekData {
    pub time: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeData {
    pub volume: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaySongData {
    pub song_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayAlbumData {
    pub album_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub song_index: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayPlaylistData {
    pub playlist_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub song_index: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddToQueueData {
    pub song_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddAlbumToQueueData {
    pub album_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddPlaylistToQueueData {
    pub playlist_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetShuffleData {
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetRepeatData {
    pub mode: RepeatMode,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorData {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl ErrorData {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
        }
    }

    fn coded(message: &str, code: &str) -> Self {
        Self {
            message: message.into(),
            code: Some(code.into()),
        }
    }

    /// A non-auth message arrived before authentication completed.
    pub fn not_authenticated() -> Self {
        Self::coded("Not authenticated", "not_authenticated")
    }

    /// The frame was not a well-formed protocol message.
    pub fn invalid_message() -> Self {
        Self::coded("Invalid message format", "invalid_message")
    }

    /// The authentication window expired without a valid AUTH_REQUEST.
    pub fn auth_timeout() -> Self {
        Self::coded("Authentication timeout", "auth_timeout")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(msg: &ControlMessage) -> ControlMessage {
        let json = serde_json::to_string(msg).unwrap();
        serde_json::from_str(&json).unwrap()
    }

    #[test]
    fn wire_tags_match_protocol() {
        let msg = ControlMessage::new(MessageBody::AuthRequest(AuthRequestData {
            auth_type: AuthType::Lan,
            password: "ABC123".into(),
            username: None,
        }));
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "auth_request");
        assert_eq!(json["data"]["authType"], "lan");
        assert_eq!(json["data"]["password"], "ABC123");
        assert!(json["data"].get("username").is_none());

        let json = serde_json::to_value(ControlMessage::new(MessageBody::PlayAlbumFromIndex(
            PlayAlbumData {
                album_id: "al-9".into(),
                song_index: Some(3),
            },
        )))
        .unwrap();
        assert_eq!(json["type"], "play_album_from_index");
        assert_eq!(json["data"]["albumId"], "al-9");
        assert_eq!(json["data"]["songIndex"], 3);
    }

    #[test]
    fn unit_variants_omit_data() {
        let json = serde_json::to_value(ControlMessage::new(MessageBody::Play)).unwrap();
        assert_eq!(json, serde_json::json!({ "type": "play" }));

        // And parse back from a bare tag, as real clients send them.
        let msg: ControlMessage = serde_json::from_str(r#"{"type":"get_state"}"#).unwrap();
        assert_eq!(msg.body, MessageBody::GetState);
    }

    #[test]
    fn timestamp_is_preserved() {
        let msg = ControlMessage {
            body: MessageBody::Next,
            timestamp: Some(1_700_000_000_000),
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["timestamp"], 1_700_000_000_000u64);
        assert_eq!(round_trip(&msg), msg);
    }

    #[test]
    fn state_update_wire_shape() {
        let msg = ControlMessage::stamped(MessageBody::StateUpdate(PlayerStateData {
            is_playing: true,
            current_time: 42.5,
            duration: 180.0,
            volume: 80,
            is_shuffle: false,
            repeat_mode: RepeatMode::All,
            has_previous: true,
            has_next: false,
        }));
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "state_update");
        assert_eq!(json["data"]["isPlaying"], true);
        assert_eq!(json["data"]["currentTime"], 42.5);
        assert_eq!(json["data"]["repeatMode"], "all");
        assert_eq!(json["data"]["hasNext"], false);
    }

    #[test]
    fn round_trip_every_message_type() {
        let song = CurrentSongData {
            id: "s1".into(),
            title: "Title".into(),
            artist: "Artist".into(),
            album: "Album".into(),
            cover_art: Some("cover-1".into()),
            duration: 213.0,
        };
        let bodies = vec![
            MessageBody::AuthRequest(AuthRequestData {
                auth_type: AuthType::Navidrome,
                password: "secret".into(),
                username: Some("admin".into()),
            }),
            MessageBody::AuthResponse(AuthResponseData {
                success: true,
                message: Some("Authentication successful".into()),
                device_info: Some(RemoteDeviceInfo {
                    name: Some("SonicLink Desktop".into()),
                    version: Some("0.1.0".into()),
                }),
            }),
            MessageBody::PlayPause,
            MessageBody::Play,
            MessageBody::Pause,
            MessageBody::Next,
            MessageBody::Previous,
            MessageBody::Seek(SeekData { time: 42.0 }),
            MessageBody::SetVolume(VolumeData { volume: 55.0 }),
            MessageBody::PlaySong(PlaySongData {
                song_id: "s1".into(),
            }),
            MessageBody::PlayAlbum(PlayAlbumData {
                album_id: "al1".into(),
                song_index: None,
            }),
            MessageBody::PlayPlaylist(PlayPlaylistData {
                playlist_id: "pl1".into(),
                song_index: Some(2),
            }),
            MessageBody::PlayAlbumShuffle(PlayAlbumData {
                album_id: "al1".into(),
                song_index: None,
            }),
            MessageBody::PlayPlaylistShuffle(PlayPlaylistData {
                playlist_id: "pl1".into(),
                song_index: None,
            }),
            MessageBody::PlayAlbumFromIndex(PlayAlbumData {
                album_id: "al1".into(),
                song_index: Some(4),
            }),
            MessageBody::PlayPlaylistFromIndex(PlayPlaylistData {
                playlist_id: "pl1".into(),
                song_index: Some(4),
            }),
            MessageBody::AddToQueue(AddToQueueData {
                song_ids: vec!["s1".into(), "s2".into()],
            }),
            MessageBody::AddAlbumToQueue(AddAlbumToQueueData {
                album_id: "al1".into(),
            }),
            MessageBody::AddPlaylistToQueue(AddPlaylistToQueueData {
                playlist_id: "pl1".into(),
            }),
            MessageBody::ClearQueue,
            MessageBody::ToggleShuffle,
            MessageBody::ToggleRepeat,
            MessageBody::SetShuffle(SetShuffleData { enabled: true }),
            MessageBody::SetRepeat(SetRepeatData {
                mode: RepeatMode::One,
            }),
            MessageBody::GetState,
            MessageBody::GetQueue,
            MessageBody::GetCurrentSong,
            MessageBody::StateUpdate(PlayerStateData {
                is_playing: false,
                current_time: 0.0,
                duration: 0.0,
                volume: 100,
                is_shuffle: true,
                repeat_mode: RepeatMode::Off,
                has_previous: false,
                has_next: true,
            }),
            MessageBody::QueueUpdate(QueueData {
                songs: vec![song.clone()],
                current_index: 0,
            }),
            MessageBody::CurrentSongUpdate(song),
            MessageBody::Error(ErrorData::not_authenticated()),
        ];

        for body in bodies {
            let msg = ControlMessage::stamped(body);
            assert_eq!(round_trip(&msg), msg);
        }
    }

    #[test]
    fn error_helpers_carry_codes() {
        assert_eq!(
            ErrorData::auth_timeout().code.as_deref(),
            Some("auth_timeout")
        );
        assert_eq!(
            ErrorData::invalid_message().code.as_deref(),
            Some("invalid_message")
        );
        assert!(ErrorData::new("boom").code.is_none());
    }
}
