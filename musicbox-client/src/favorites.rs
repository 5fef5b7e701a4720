use crate::{Client, Result};
use musicbox_models::{Song, SongId};
use std::future::Future;
use tracing::{debug, warn};

/// Remote side of the favorites list.
pub trait FavoritesApi {
    fn favorites(&self) -> impl Future<Output = Result<Vec<Song>>> + Send;
    fn add_favorite(&self, song_id: SongId) -> impl Future<Output = Result<()>> + Send;
    fn remove_favorite(&self, song_id: SongId) -> impl Future<Output = Result<()>> + Send;
}

impl FavoritesApi for Client {
    async fn favorites(&self) -> Result<Vec<Song>> {
        Client::favorites(self).await
    }

    async fn add_favorite(&self, song_id: SongId) -> Result<()> {
        Client::add_favorite(self, song_id).await.map(|_| ())
    }

    async fn remove_favorite(&self, song_id: SongId) -> Result<()> {
        Client::remove_favorite(self, song_id).await.map(|_| ())
    }
}

/// Local copy of the user's favorites, updated optimistically.
///
/// Changes show up immediately and are rolled back if the server rejects them.
pub struct FavoritesStore<A> {
    api: A,
    songs: Vec<Song>,
}

impl<A: FavoritesApi> FavoritesStore<A> {
    pub fn new(api: A) -> Self {
        Self { api, songs: vec![] }
    }

    pub fn songs(&self) -> &[Song] {
        &self.songs
    }

    pub fn is_favorite(&self, song_id: SongId) -> bool {
        self.songs.iter().any(|song| song.id == song_id)
    }

    pub async fn refresh(&mut self) -> Result<()> {
        self.songs = self.api.favorites().await?;
        debug!(count = self.songs.len(), "favorites refreshed");
        Ok(())
    }

    pub async fn add(&mut self, song: &Song) -> Result<()> {
        if self.is_favorite(song.id) {
            return Ok(());
        }

        let previous = self.songs.clone();
        self.songs.insert(0, song.clone());

        if let Err(err) = self.api.add_favorite(song.id).await {
            warn!(song = song.id, error = %err, "adding favorite failed, rolling back");
            self.songs = previous;
            return Err(err);
        }

        Ok(())
    }

    pub async fn remove(&mut self, song_id: SongId) -> Result<()> {
        if !self.is_favorite(song_id) {
            return Ok(());
        }

        let previous = self.songs.clone();
        self.songs.retain(|song| song.id != song_id);

        if let Err(err) = self.api.remove_favorite(song_id).await {
            warn!(song = song_id, error = %err, "removing favorite failed, rolling back");
            self.songs = previous;
            return Err(err);
        }

        Ok(())
    }

    /// Returns whether the song is a favorite afterwards.
    pub async fn toggle(&mut self, song: &Song) -> Result<bool> {
        if self.is_favorite(song.id) {
            self.remove(song.id).await?;
            Ok(false)
        } else {
            self.add(song).await?;
            Ok(true)
        }
    }
}
