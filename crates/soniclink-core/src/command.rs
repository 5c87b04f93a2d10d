//! Player commands: the subset of protocol messages a host player executes.

use crate::messages::{MessageBody, RepeatMode};

/// A command to execute against the host player.
///
/// The shuffled and from-index message variants normalize onto
/// [`PlayerCommand::PlayAlbum`] / [`PlayerCommand::PlayPlaylist`] with the
/// `shuffle` and `song_index` arguments.
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerCommand {
    PlayPause,
    Play,
    Pause,
    Next,
    Previous,
    Seek {
        time: f64,
    },
    SetVolume {
        volume: f64,
    },
    PlaySong {
        song_id: String,
    },
    PlayAlbum {
        album_id: String,
        song_index: Option<usize>,
        shuffle: bool,
    },
    PlayPlaylist {
        playlist_id: String,
        song_index: Option<usize>,
        shuffle: bool,
    },
    AddSongsToQueue {
        song_ids: Vec<String>,
    },
    AddAlbumToQueue {
        album_id: String,
    },
    AddPlaylistToQueue {
        playlist_id: String,
    },
    ClearQueue,
    ToggleShuffle,
    ToggleRepeat,
    SetShuffle {
        enabled: bool,
    },
    SetRepeat {
        mode: RepeatMode,
    },
}

impl PlayerCommand {
    /// Map a protocol message onto a player command.
    ///
    /// Returns `None` for messages that are not commands (auth, state
    /// queries, state pushes, errors).
    pub fn from_message(body: &MessageBody) -> Option<Self> {
        let cmd = match body {
            MessageBody::PlayPause => Self::PlayPause,
            MessageBody::Play => Self::Play,
            MessageBody::Pause => Self::Pause,
            MessageBody::Next => Self::Next,
            MessageBody::Previous => Self::Previous,
            MessageBody::Seek(d) => Self::Seek { time: d.time },
            MessageBody::SetVolume(d) => Self::SetVolume { volume: d.volume },
            MessageBody::PlaySong(d) => Self::PlaySong {
                song_id: d.song_id.clone(),
            },
            MessageBody::PlayAlbum(d) | MessageBody::PlayAlbumFromIndex(d) => Self::PlayAlbum {
                album_id: d.album_id.clone(),
                song_index: d.song_index,
                shuffle: false,
            },
            MessageBody::PlayAlbumShuffle(d) => Self::PlayAlbum {
                album_id: d.album_id.clone(),
                song_index: d.song_index,
                shuffle: true,
            },
            MessageBody::PlayPlaylist(d) | MessageBody::PlayPlaylistFromIndex(d) => {
                Self::PlayPlaylist {
                    playlist_id: d.playlist_id.clone(),
                    song_index: d.song_index,
                    shuffle: false,
                }
            }
            MessageBody::PlayPlaylistShuffle(d) => Self::PlayPlaylist {
                playlist_id: d.playlist_id.clone(),
                song_index: d.song_index,
                shuffle: true,
            },
            MessageBody::AddToQueue(d) => Self::AddSongsToQueue {
                song_ids: d.song_ids.clone(),
            },
            MessageBody::AddAlbumToQueue(d) => Self::AddAlbumToQueue {
                album_id: d.album_id.clone(),
            },
            MessageBody::AddPlaylistToQueue(d) => Self::AddPlaylistToQueue {
                playlist_id: d.playlist_id.clone(),
            },
            MessageBody::ClearQueue => Self::ClearQueue,
            MessageBody::ToggleShuffle => Self::ToggleShuffle,
            MessageBody::ToggleRepeat => Self::ToggleRepeat,
            MessageBody::SetShuffle(d) => Self::SetShuffle { enabled: d.enabled },
            MessageBody::SetRepeat(d) => Self::SetRepeat { mode: d.mode },
            _ => return None,
        };
        Some(cmd)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::{PlayAlbumData, SeekData};

    #[test]
    fn shuffled_variant_normalizes() {
        let body = MessageBody::PlayAlbumShuffle(PlayAlbumData {
            album_id: "al1".into(),
            song_index: None,
        });
        assert_eq!(
            PlayerCommand::from_message(&body),
            Some(PlayerCommand::PlayAlbum {
                album_id: "al1".into(),
                song_index: None,
                shuffle: true,
            })
        );
    }

    #[test]
    fn from_index_variant_normalizes() {
        let body = MessageBody::PlayAlbumFromIndex(PlayAlbumData {
            album_id: "al1".into(),
            song_index: Some(5),
        });
        assert_eq!(
            PlayerCommand::from_message(&body),
            Some(PlayerCommand::PlayAlbum {
                album_id: "al1".into(),
                song_index: Some(5),
                shuffle: false,
            })
        );
    }

    #[test]
    fn non_commands_map_to_none() {
        assert_eq!(PlayerCommand::from_message(&MessageBody::GetState), None);
        assert_eq!(
            PlayerCommand::from_message(&MessageBody::Error(
                crate::messages::ErrorData::new("x")
            )),
            None
        );
        assert!(PlayerCommand::from_message(&MessageBody::Seek(SeekData { time: 1.0 })).is_some());
    }
}
