use crate::{Client, Result};
use futures::{Stream, StreamExt};
use musicbox_models::{Playlist, PlaylistEvent, PlaylistId};
use std::future::Future;
use tracing::{debug, info, warn};

pub trait PlaylistApi {
    fn playlists(&self) -> impl Future<Output = Result<Vec<Playlist>>> + Send;
    fn create_playlist(&self, name: &str) -> impl Future<Output = Result<Playlist>> + Send;
    fn delete_playlist(&self, id: PlaylistId) -> impl Future<Output = Result<()>> + Send;
}

impl PlaylistApi for Client {
    async fn playlists(&self) -> Result<Vec<Playlist>> {
        Client::playlists(self).await
    }

    async fn create_playlist(&self, name: &str) -> Result<Playlist> {
        Client::create_playlist(self, name).await
    }

    async fn delete_playlist(&self, id: PlaylistId) -> Result<()> {
        Client::delete_playlist(self, id).await
    }
}

/// The user's playlists, re-fetched after every change.
pub struct PlaylistStore<A> {
    api: A,
    playlists: Vec<Playlist>,
}

impl<A: PlaylistApi> PlaylistStore<A> {
    pub fn new(api: A) -> Self {
        Self {
            api,
            playlists: vec![],
        }
    }

    pub fn playlists(&self) -> &[Playlist] {
        &self.playlists
    }

    pub async fn refresh(&mut self) -> Result<()> {
        self.playlists = self.api.playlists().await?;
        debug!(count = self.playlists.len(), "playlists refreshed");
        Ok(())
    }

    pub async fn create(&mut self, name: &str) -> Result<Playlist> {
        let playlist = self.api.create_playlist(name).await?;
        self.refresh().await?;
        Ok(playlist)
    }

    pub async fn delete(&mut self, id: PlaylistId) -> Result<()> {
        self.api.delete_playlist(id).await?;
        self.refresh().await
    }

    /// Refreshes on every playlist event until the stream ends or fails.
    pub async fn follow<S>(&mut self, mut events: S)
    where
        S: Stream<Item = Result<PlaylistEvent>> + Unpin,
    {
        while let Some(event) = events.next().await {
            match event {
                Ok(event) => {
                    debug!(?event.change, "playlist changed");
                    if let Err(err) = self.refresh().await {
                        warn!(error = %err, "unable to refresh playlists");
                    }
                }
                Err(err) => {
                    warn!(error = %err, "playlist stream failed");
                    return;
                }
            }
        }

        info!("playlist stream closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use futures::stream;
    use musicbox_models::PlaylistChange;
    use std::sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    };

    #[derive(Clone, Default)]
    struct FakeApi {
        stored: Arc<Mutex<Vec<Playlist>>>,
        fetches: Arc<AtomicUsize>,
    }

    impl PlaylistApi for FakeApi {
        async fn playlists(&self) -> Result<Vec<Playlist>> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            Ok(self.stored.lock().unwrap().clone())
        }

        async fn create_playlist(&self, name: &str) -> Result<Playlist> {
            let mut stored = self.stored.lock().unwrap();
            let playlist = playlist(stored.len() as i64 + 1, name);
            stored.insert(0, playlist.clone());
            Ok(playlist)
        }

        async fn delete_playlist(&self, id: PlaylistId) -> Result<()> {
            let mut stored = self.stored.lock().unwrap();
            let before = stored.len();
            stored.retain(|p| p.id != id);
            if stored.len() == before {
                return Err(Error::Api {
                    status: 404,
                    message: "Playlist not found".to_string(),
                });
            }
            Ok(())
        }
    }

    fn playlist(id: PlaylistId, name: &str) -> Playlist {
        Playlist {
            id,
            name: name.to_string(),
            user_id: "alice".to_string(),
            created_at: "2025-01-01 00:00:00".to_string(),
            song_count: 0,
        }
    }

    #[tokio::test]
    async fn create_and_delete_refresh_the_list() {
        let mut store = PlaylistStore::new(FakeApi::default());

        let road = store.create("Road trip").await.unwrap();
        store.create("Focus").await.unwrap();
        let names: Vec<_> = store.playlists().iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["Focus", "Road trip"]);

        store.delete(road.id).await.unwrap();
        assert_eq!(store.playlists().len(), 1);

        assert!(store.delete(road.id).await.is_err());
        assert_eq!(store.playlists().len(), 1);
    }

    #[tokio::test]
    async fn every_event_triggers_a_refresh() {
        let api = FakeApi::default();
        let mut store = PlaylistStore::new(api.clone());

        api.stored.lock().unwrap().push(playlist(3, "Elsewhere"));
        let events = stream::iter(vec![
            Ok(PlaylistEvent::new(
                PlaylistChange::PlaylistCreated {
                    id: 3,
                    name: "Elsewhere".to_string(),
                },
                1,
            )),
            Ok(PlaylistEvent::new(
                PlaylistChange::SongAdded {
                    playlist_id: 3,
                    song_id: 1,
                },
                2,
            )),
        ]);

        store.follow(events).await;

        assert_eq!(api.fetches.load(Ordering::SeqCst), 2);
        assert_eq!(store.playlists()[0].name, "Elsewhere");
    }

    #[tokio::test]
    async fn stream_error_stops_following() {
        let api = FakeApi::default();
        let mut store = PlaylistStore::new(api.clone());
        let events = stream::iter(vec![
            Err(Error::Unauthorized),
            Ok(PlaylistEvent::new(PlaylistChange::PlaylistDeleted { id: 1 }, 1)),
        ]);

        store.follow(events).await;

        assert_eq!(api.fetches.load(Ordering::SeqCst), 0);
    }
}
