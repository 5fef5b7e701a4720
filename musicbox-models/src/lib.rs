mod api;
mod command;

pub use api::{Ack, CommandRequest, CreatePlaylist, FavoriteCount, FavoriteStatus, QueueRequest};
pub use command::{Command, ParseCommandError};

pub type SongId = i64;
pub type PlaylistId = i64;

#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Song {
    pub id: SongId,
    pub title: String,
    pub artist: String,
    pub src_url: String,
    pub cover_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSong {
    pub title: String,
    pub artist: String,
    pub src_url: String,
    pub cover_url: Option<String>,
    pub category: Option<String>,
}

/// Playback volume in percent. Always within `0..=100`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, serde::Deserialize, serde::Serialize)]
#[serde(from = "i64", into = "u8")]
pub struct Volume(u8);

impl Volume {
    pub const MAX: Volume = Volume(100);
    pub const MUTED: Volume = Volume(0);

    /// Clamps into range.
    pub fn new(value: i64) -> Self {
        Self(value.clamp(0, 100) as u8)
    }

    pub fn get(self) -> u8 {
        self.0
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Linear gain for a media element, `0.0..=1.0`.
    pub fn gain(self) -> f32 {
        self.0 as f32 / 100.0
    }
}

impl Default for Volume {
    fn default() -> Self {
        Self(50)
    }
}

impl From<i64> for Volume {
    fn from(value: i64) -> Self {
        Self::new(value)
    }
}

impl From<Volume> for u8 {
    fn from(value: Volume) -> Self {
        value.0
    }
}

impl std::fmt::Display for Volume {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Server-owned playback state, pushed to every client on change.
#[derive(Debug, Clone, Default, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PlaybackState {
    pub current_song_id: Option<SongId>,
    pub title: Option<String>,
    pub artist: Option<String>,
    pub src_url: Option<String>,
    pub cover_url: Option<String>,
    pub is_playing: bool,
    pub is_muted: bool,
    pub volume: Volume,
    pub shuffle: bool,
    pub repeat: bool,
    #[serde(deserialize_with = "command::lenient")]
    pub last_command: Option<Command>,
    /// Seconds into the current song, as tracked by the server.
    pub position: f64,
    pub duration: f64,
}

impl PlaybackState {
    pub fn set_song(&mut self, song: Option<&Song>) {
        self.current_song_id = song.map(|s| s.id);
        self.title = song.map(|s| s.title.clone());
        self.artist = song.map(|s| s.artist.clone());
        self.src_url = song.map(|s| s.src_url.clone());
        self.cover_url = song.and_then(|s| s.cover_url.clone());
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Playlist {
    pub id: PlaylistId,
    pub name: String,
    pub user_id: String,
    pub created_at: String,
    pub song_count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
#[serde(tag = "eventType", content = "data", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlaylistChange {
    PlaylistCreated {
        id: PlaylistId,
        name: String,
    },
    PlaylistDeleted {
        id: PlaylistId,
    },
    #[serde(rename_all = "camelCase")]
    SongAdded {
        playlist_id: PlaylistId,
        song_id: SongId,
    },
    #[serde(rename_all = "camelCase")]
    SongRemoved {
        playlist_id: PlaylistId,
        song_id: SongId,
    },
}

/// Invalidation message on the playlist stream. `timestamp` is epoch milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub struct PlaylistEvent {
    #[serde(flatten)]
    pub change: PlaylistChange,
    pub timestamp: i64,
}

impl PlaylistEvent {
    pub fn new(change: PlaylistChange, timestamp: i64) -> Self {
        Self { change, timestamp }
    }
}
