use musicbox_database::Database;
use musicbox_models::{Song, SongId};
use time::Duration;

use crate::{Result, simple_cache::SimpleCache};

/// The song list, read through a short-lived cache.
#[derive(Debug)]
pub struct Catalog {
    database: Database,
    songs: SimpleCache<Vec<Song>>,
}

impl Catalog {
    pub fn new(database: Database) -> Self {
        Self {
            database,
            songs: SimpleCache::new(Duration::minutes(1)),
        }
    }

    /// All songs, ordered by id.
    pub async fn songs(&self) -> Result<Vec<Song>> {
        if let Some(songs) = self.songs.get().await {
            return Ok(songs);
        }

        let songs = self.database.songs().await?;
        self.songs.set(songs.clone()).await;

        Ok(songs)
    }

    pub async fn song(&self, id: SongId) -> Result<Option<Song>> {
        Ok(self.songs().await?.into_iter().find(|song| song.id == id))
    }

    pub async fn invalidate(&self) {
        self.songs.clear().await;
    }
}
