//! In-memory reference player.
//!
//! A complete [`PlayerBridge`] over in-memory transport state and a small
//! song library. The standalone binary serves it so remotes have something
//! real to control, and the test suite uses it as the host-player double.

use soniclink_core::messages::{CurrentSongData, PlayerStateData, QueueData, RepeatMode};
use soniclink_core::{ControlError, ControlResult, PlayerBridge, PlayerCommand};
use std::collections::HashMap;
use std::sync::Mutex;

/// Song/album/playlist catalog the player resolves IDs against.
#[derive(Debug, Default, Clone)]
pub struct Library {
    songs: HashMap<String, CurrentSongData>,
    albums: HashMap<String, Vec<String>>,
    playlists: HashMap<String, Vec<String>>,
}

impl Library {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_song(&mut self, song: CurrentSongData) {
        self.songs.insert(song.id.clone(), song);
    }

    pub fn add_album(&mut self, album_id: impl Into<String>, song_ids: Vec<String>) {
        self.albums.insert(album_id.into(), song_ids);
    }

    pub fn add_playlist(&mut self, playlist_id: impl Into<String>, song_ids: Vec<String>) {
        self.playlists.insert(playlist_id.into(), song_ids);
    }

    fn song(&self, id: &str) -> ControlResult<CurrentSongData> {
        self.songs
            .get(id)
            .cloned()
            .ok_or_else(|| ControlError::NotFound(format!("song {id}")))
    }

    fn album_songs(&self, id: &str) -> ControlResult<Vec<CurrentSongData>> {
        let ids = self
            .albums
            .get(id)
            .ok_or_else(|| ControlError::NotFound(format!("album {id}")))?;
        Ok(self.resolve(ids))
    }

    fn playlist_songs(&self, id: &str) -> ControlResult<Vec<CurrentSongData>> {
        let ids = self
            .playlists
            .get(id)
            .ok_or_else(|| ControlError::NotFound(format!("playlist {id}")))?;
        Ok(self.resolve(ids))
    }

    /// Resolve known IDs; unknown entries are dropped.
    fn resolve(&self, ids: &[String]) -> Vec<CurrentSongData> {
        ids.iter()
            .filter_map(|id| self.songs.get(id).cloned())
            .collect()
    }
}

#[derive(Debug)]
struct PlayerInner {
    is_playing: bool,
    current_time: f64,
    volume: u32,
    is_shuffle: bool,
    repeat_mode: RepeatMode,
    queue: Vec<CurrentSongData>,
    index: Option<usize>,
}

impl Default for PlayerInner {
    fn default() -> Self {
        Self {
            is_playing: false,
            current_time: 0.0,
            volume: 100,
            is_shuffle: false,
            repeat_mode: RepeatMode::Off,
            queue: Vec::new(),
            index: None,
        }
    }
}

/// In-memory music player.
pub struct InMemoryPlayer {
    inner: Mutex<PlayerInner>,
    library: Library,
}

impl InMemoryPlayer {
    pub fn new(library: Library) -> Self {
        Self {
            inner: Mutex::new(PlayerInner::default()),
            library,
        }
    }

    /// A player with an empty library and nothing queued.
    pub fn empty() -> Self {
        Self::new(Library::new())
    }

    /// A player preloaded with a small demo catalog, with the first album
    /// queued and paused.
    pub fn demo() -> Self {
        let mut library = Library::new();
        let songs = [
            ("s1", "Night Drive", "The Vectors", "Neon City", 213.0),
            ("s2", "Glass Highway", "The Vectors", "Neon City", 187.0),
            ("s3", "Afterglow", "The Vectors", "Neon City", 244.0),
            ("s4", "Low Tide", "Merrow", "Saltwater", 198.0),
            ("s5", "Driftwood", "Merrow", "Saltwater", 231.0),
        ];
        for (id, title, artist, album, duration) in songs {
            library.add_song(CurrentSongData {
                id: id.into(),
                title: title.into(),
                artist: artist.into(),
                album: album.into(),
                cover_art: None,
                duration,
            });
        }
        library.add_album("al1", vec!["s1".into(), "s2".into(), "s3".into()]);
        library.add_album("al2", vec!["s4".into(), "s5".into()]);
        library.add_playlist("pl1", vec!["s1".into(), "s4".into()]);

        let player = Self::new(library.clone());
        {
            let mut inner = player.inner.lock().unwrap();
            inner.queue = library.resolve(&["s1".into(), "s2".into(), "s3".into()]);
            inner.index = Some(0);
        }
        player
    }

    /// Replace the queue and start playback at `index`.
    pub fn set_queue(&self, songs: Vec<CurrentSongData>, index: usize) {
        let mut inner = self.inner.lock().unwrap();
        inner.index = if songs.is_empty() {
            None
        } else {
            Some(index.min(songs.len() - 1))
        };
        inner.queue = songs;
        inner.current_time = 0.0;
    }

    fn start_queue(inner: &mut PlayerInner, songs: Vec<CurrentSongData>, index: Option<usize>) {
        if songs.is_empty() {
            return;
        }
        let index = index.unwrap_or(0).min(songs.len() - 1);
        inner.queue = songs;
        inner.index = Some(index);
        inner.current_time = 0.0;
        inner.is_playing = true;
    }
}

fn clamp_volume(volume: f64) -> u32 {
    if volume.is_nan() {
        return 0;
    }
    volume.clamp(0.0, 100.0).floor() as u32
}

fn maybe_shuffle(mut songs: Vec<CurrentSongData>, shuffle: bool) -> Vec<CurrentSongData> {
    if shuffle {
        use rand::seq::SliceRandom;
        songs.shuffle(&mut rand::thread_rng());
    }
    songs
}

impl PlayerBridge for InMemoryPlayer {
    fn player_state(&self) -> PlayerStateData {
        let inner = self.inner.lock().unwrap();
        let duration = inner
            .index
            .and_then(|i| inner.queue.get(i))
            .map(|s| s.duration)
            .unwrap_or(0.0);
        PlayerStateData {
            is_playing: inner.is_playing,
            current_time: inner.current_time,
            duration,
            volume: inner.volume,
            is_shuffle: inner.is_shuffle,
            repeat_mode: inner.repeat_mode,
            has_previous: inner.index.map(|i| i > 0).unwrap_or(false),
            has_next: inner.index.map(|i| i + 1 < inner.queue.len()).unwrap_or(false),
        }
    }

    fn current_song(&self) -> Option<CurrentSongData> {
        let inner = self.inner.lock().unwrap();
        inner.index.and_then(|i| inner.queue.get(i)).cloned()
    }

    fn queue(&self) -> QueueData {
        let inner = self.inner.lock().unwrap();
        QueueData {
            songs: inner.queue.clone(),
            current_index: inner.index.map(|i| i as i32).unwrap_or(-1),
        }
    }

    fn apply(&self, command: PlayerCommand) -> ControlResult<()> {
        let mut inner = self.inner.lock().unwrap();
        match command {
            PlayerCommand::PlayPause => inner.is_playing = !inner.is_playing,
            PlayerCommand::Play => inner.is_playing = true,
            PlayerCommand::Pause => inner.is_playing = false,
            PlayerCommand::Next => {
                if let Some(i) = inner.index {
                    if i + 1 < inner.queue.len() {
                        inner.index = Some(i + 1);
                        inner.current_time = 0.0;
                    }
                }
            }
            PlayerCommand::Previous => {
                if let Some(i) = inner.index {
                    if i > 0 {
                        inner.index = Some(i - 1);
                        inner.current_time = 0.0;
                    }
                }
            }
            PlayerCommand::Seek { time } => inner.current_time = time.max(0.0),
            PlayerCommand::SetVolume { volume } => inner.volume = clamp_volume(volume),
            PlayerCommand::PlaySong { song_id } => {
                let song = self.library.song(&song_id)?;
                Self::start_queue(&mut inner, vec![song], Some(0));
            }
            PlayerCommand::PlayAlbum {
                album_id,
                song_index,
                shuffle,
            } => {
                let songs = maybe_shuffle(self.library.album_songs(&album_id)?, shuffle);
                Self::start_queue(&mut inner, songs, song_index);
            }
            PlayerCommand::PlayPlaylist {
                playlist_id,
                song_index,
                shuffle,
            } => {
                let songs = maybe_shuffle(self.library.playlist_songs(&playlist_id)?, shuffle);
                Self::start_queue(&mut inner, songs, song_index);
            }
            PlayerCommand::AddSongsToQueue { song_ids } => {
                let songs = self.library.resolve(&song_ids);
                if songs.is_empty() && !song_ids.is_empty() {
                    return Err(ControlError::NotFound("no requested songs found".into()));
                }
                inner.queue.extend(songs);
            }
            PlayerCommand::AddAlbumToQueue { album_id } => {
                let songs = self.library.album_songs(&album_id)?;
                inner.queue.extend(songs);
            }
            PlayerCommand::AddPlaylistToQueue { playlist_id } => {
                let songs = self.library.playlist_songs(&playlist_id)?;
                inner.queue.extend(songs);
            }
            PlayerCommand::ClearQueue => {
                inner.queue.clear();
                inner.index = None;
                inner.is_playing = false;
                inner.current_time = 0.0;
            }
            PlayerCommand::ToggleShuffle => inner.is_shuffle = !inner.is_shuffle,
            PlayerCommand::SetShuffle { enabled } => inner.is_shuffle = enabled,
            PlayerCommand::ToggleRepeat => {
                inner.repeat_mode = match inner.repeat_mode {
                    RepeatMode::Off => RepeatMode::All,
                    RepeatMode::All => RepeatMode::One,
                    RepeatMode::One => RepeatMode::Off,
                };
            }
            PlayerCommand::SetRepeat { mode } => inner.repeat_mode = mode,
        }
        Ok(())
    }
}
