use axum::{
    Router,
    http::{HeaderMap, HeaderValue},
    response::{
        Sse,
        sse::{Event, KeepAlive},
    },
};
use futures::stream::Stream;
use musicbox_controls::{
    StateReceiver, broadcast::Broadcast, catalog::Catalog, controls::Controls,
};
use musicbox_database::Database;
use musicbox_models::{PlaybackState, PlaylistChange, PlaylistEvent};
use routes::{auth, favorites, player, playlists};
use serde::Serialize;
use snafu::prelude::*;
use std::{convert::Infallible, sync::Arc};
use tokio::{net::TcpListener, sync::broadcast::Receiver};
use tokio_stream::{StreamExt as _, wrappers::BroadcastStream};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

mod error;
mod routes;
mod user;

pub use error::{Error, Result};
pub use user::{USER_HEADER, UserId};

pub struct AppState {
    pub controls: Controls,
    pub player_state: StateReceiver,
    pub player_broadcast: Arc<Broadcast<PlaybackState>>,
    pub playlist_events: Broadcast<PlaylistEvent>,
    pub catalog: Arc<Catalog>,
    pub database: Database,
    /// Hashed shared secret. `None` leaves the API open.
    pub web_secret: Option<String>,
}

impl AppState {
    pub fn new(
        controls: Controls,
        player_state: StateReceiver,
        player_broadcast: Arc<Broadcast<PlaybackState>>,
        catalog: Arc<Catalog>,
        database: Database,
        web_secret: Option<String>,
    ) -> Self {
        Self {
            controls,
            player_state,
            player_broadcast,
            playlist_events: Broadcast::new(),
            catalog,
            database,
            web_secret,
        }
    }

    pub(crate) fn publish_playlist_change(&self, change: PlaylistChange) {
        let timestamp = chrono::Utc::now().timestamp_millis();
        self.playlist_events.send(PlaylistEvent::new(change, timestamp));
    }
}

pub async fn init(state: Arc<AppState>, interface: &str) -> Result<()> {
    let listener = TcpListener::bind(interface)
        .await
        .context(error::BindSnafu { interface })?;

    info!("Listening on {interface}");

    serve(listener, state).await
}

pub async fn serve(listener: TcpListener, state: Arc<AppState>) -> Result<()> {
    axum::serve(listener, create_router(state))
        .await
        .context(error::ServeSnafu)
}

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(player::routes())
        .merge(playlists::routes())
        .merge(favorites::routes())
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            auth::auth_middleware,
        ))
        .merge(auth::routes())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Streams `first` (when given) and then every value from `receiver` as JSON events.
pub(crate) fn sse_json<T>(
    first: Option<T>,
    receiver: Receiver<T>,
) -> (HeaderMap, Sse<impl Stream<Item = Result<Event, Infallible>>>)
where
    T: Serialize + Clone + Send + 'static,
{
    let updates = BroadcastStream::new(receiver).filter_map(|result| result.ok());
    let stream = tokio_stream::iter(first)
        .chain(updates)
        .filter_map(|value| Event::default().json_data(value).ok().map(Ok::<_, Infallible>));

    let mut headers = HeaderMap::new();
    headers.insert("X-Accel-Buffering", HeaderValue::from_static("no"));

    (headers, Sse::new(stream).keep_alive(KeepAlive::default()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use musicbox_controls::player::Player;
    use musicbox_database::hash_secret;
    use musicbox_models::{
        Ack, FavoriteCount, FavoriteStatus, NewSong, Playlist, Song,
    };
    use reqwest::StatusCode;
    use serde_json::json;

    struct TestApp {
        base: String,
        songs: Vec<Song>,
        http: reqwest::Client,
    }

    impl TestApp {
        async fn spawn(web_secret: Option<&str>) -> Self {
            let database = Database::in_memory().await.unwrap();
            let mut songs = vec![];
            for (title, category) in [("First Light", "ambient"), ("Second Wind", "rock")] {
                songs.push(
                    database
                        .add_song(&NewSong {
                            title: title.to_string(),
                            artist: "Band".to_string(),
                            src_url: format!("/audio/{}.mp3", title.len()),
                            cover_url: None,
                            category: Some(category.to_string()),
                        })
                        .await
                        .unwrap(),
                );
            }

            let catalog = Arc::new(Catalog::new(database.clone()));
            let mut player = Player::new(database.clone(), catalog.clone())
                .await
                .unwrap();

            let state = Arc::new(AppState::new(
                player.controls(),
                player.state(),
                player.broadcast(),
                catalog,
                database,
                web_secret.map(hash_secret),
            ));

            tokio::spawn(async move { player.player_loop().await });

            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let address = listener.local_addr().unwrap();
            tokio::spawn(serve(listener, state));

            Self {
                base: format!("http://{address}"),
                songs,
                http: reqwest::Client::new(),
            }
        }

        fn url(&self, path: &str) -> String {
            format!("{}{path}", self.base)
        }

        fn get(&self, path: &str, user: Option<&str>) -> reqwest::RequestBuilder {
            with_user(self.http.get(self.url(path)), user)
        }

        fn post(&self, path: &str, user: Option<&str>) -> reqwest::RequestBuilder {
            with_user(self.http.post(self.url(path)), user)
        }

        fn delete(&self, path: &str, user: Option<&str>) -> reqwest::RequestBuilder {
            with_user(self.http.delete(self.url(path)), user)
        }

        async fn state(&self) -> PlaybackState {
            self.get("/api/player/state", None)
                .send()
                .await
                .unwrap()
                .json()
                .await
                .unwrap()
        }
    }

    fn with_user(request: reqwest::RequestBuilder, user: Option<&str>) -> reqwest::RequestBuilder {
        match user {
            Some(user) => request.header(USER_HEADER, user),
            None => request,
        }
    }

    async fn wait_for_state(
        app: &TestApp,
        predicate: impl Fn(&PlaybackState) -> bool,
    ) -> PlaybackState {
        for _ in 0..50 {
            let state = app.state().await;
            if predicate(&state) {
                return state;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
        panic!("state never matched");
    }

    #[tokio::test]
    async fn catalog_endpoints() {
        let app = TestApp::spawn(None).await;

        let songs: Vec<Song> = app
            .get("/api/player/songs", None)
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(songs, app.songs);

        let rock: Vec<Song> = app
            .get("/api/player/songs/category/rock", None)
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(rock, vec![app.songs[1].clone()]);

        let found: Vec<Song> = app
            .get("/api/player/songs/search?query=first", None)
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(found, vec![app.songs[0].clone()]);
    }

    #[tokio::test]
    async fn command_is_accepted_and_applied() {
        let app = TestApp::spawn(None).await;

        let response = app
            .post("/api/player/command", Some("ana"))
            .json(&json!({ "command": "NEXT" }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);

        let state = wait_for_state(&app, |state| state.last_command.is_some()).await;
        assert_eq!(state.current_song_id, Some(app.songs[1].id));

        let recent: Vec<Song> = app
            .get("/api/player/recently-played", Some("ana"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(recent, vec![app.songs[1].clone()]);
    }

    #[tokio::test]
    async fn unknown_command_is_rejected() {
        let app = TestApp::spawn(None).await;

        for command in ["STOP", "VOLUME:loud", ""] {
            let response = app
                .post("/api/player/command", None)
                .json(&json!({ "command": command }))
                .send()
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);

            let body: Ack = response.json().await.unwrap();
            assert!(!body.success);
        }
    }

    #[tokio::test]
    async fn per_user_endpoints_need_identity() {
        let app = TestApp::spawn(None).await;

        for path in ["/api/player/recently-played", "/api/playlists", "/api/favorites"] {
            let response = app.get(path, None).send().await.unwrap();
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{path}");
        }
    }

    #[tokio::test]
    async fn stream_starts_with_current_snapshot() {
        let app = TestApp::spawn(None).await;

        let mut response = app.get("/api/player/stream", None).send().await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let mut buffer = String::new();
        while !buffer.contains("\n\n") {
            let chunk = response.chunk().await.unwrap().unwrap();
            buffer.push_str(&String::from_utf8_lossy(&chunk));
        }

        let data = buffer
            .lines()
            .find_map(|line| line.strip_prefix("data:"))
            .unwrap();
        let state: PlaybackState = serde_json::from_str(data.trim()).unwrap();
        assert_eq!(state.current_song_id, Some(app.songs[0].id));
    }

    #[tokio::test]
    async fn playlist_queue_starts_playback() {
        let app = TestApp::spawn(None).await;

        let response = app
            .post("/api/player/playlist-queue", Some("ana"))
            .json(&json!({ "songIds": [app.songs[1].id] }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);

        let state = wait_for_state(&app, |state| state.is_playing).await;
        assert_eq!(state.current_song_id, Some(app.songs[1].id));
    }

    #[tokio::test]
    async fn playlists_are_owned() {
        let app = TestApp::spawn(None).await;

        let playlist: Playlist = app
            .post("/api/playlists", Some("ana"))
            .json(&json!({ "name": "Commute" }))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(playlist.user_id, "ana");

        let songs_path = format!("/api/playlists/{}/songs/{}", playlist.id, app.songs[0].id);

        let response = app.post(&songs_path, Some("ben")).send().await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = app.post(&songs_path, Some("ana")).send().await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let again: Ack = app
            .post(&songs_path, Some("ana"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert!(again.success);
        assert!(again.message.is_some());

        let missing_song = format!("/api/playlists/{}/songs/999", playlist.id);
        let response = app.post(&missing_song, Some("ana")).send().await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = app
            .delete("/api/playlists/999", Some("ana"))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let listed: Vec<Playlist> = app
            .get("/api/playlists", Some("ana"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(listed[0].song_count, 1);

        let response = app
            .delete(&format!("/api/playlists/{}", playlist.id), Some("ana"))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn playlist_stream_reports_changes() {
        let app = TestApp::spawn(None).await;

        let mut stream = app.get("/api/playlists/stream", None).send().await.unwrap();
        assert_eq!(stream.status(), StatusCode::OK);

        app.post("/api/playlists", Some("ana"))
            .json(&json!({ "name": "Focus" }))
            .send()
            .await
            .unwrap();

        let mut buffer = String::new();
        while !buffer.contains("PLAYLIST_CREATED") {
            let chunk = stream.chunk().await.unwrap().unwrap();
            buffer.push_str(&String::from_utf8_lossy(&chunk));
        }

        let data = buffer
            .lines()
            .filter_map(|line| line.strip_prefix("data:"))
            .find(|data| data.contains("PLAYLIST_CREATED"))
            .unwrap();
        let event: PlaylistEvent = serde_json::from_str(data.trim()).unwrap();
        assert!(matches!(
            event.change,
            PlaylistChange::PlaylistCreated { ref name, .. } if name == "Focus"
        ));
    }

    #[tokio::test]
    async fn favorites_round_trip() {
        let app = TestApp::spawn(None).await;
        let song = app.songs[0].id;

        let response = app
            .post(&format!("/api/favorites/{song}"), Some("ana"))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let status: FavoriteStatus = app
            .get(&format!("/api/favorites/check/{song}"), Some("ana"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert!(status.is_favorite);

        let count: FavoriteCount = app
            .get("/api/favorites/count", Some("ana"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(count.count, 1);

        let response = app
            .post("/api/favorites/999", Some("ana"))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        app.delete("/api/favorites", Some("ana"))
            .send()
            .await
            .unwrap();
        let favorites: Vec<Song> = app
            .get("/api/favorites", Some("ana"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert!(favorites.is_empty());
    }

    #[tokio::test]
    async fn secret_gates_the_api() {
        let app = TestApp::spawn(Some("hunter2")).await;

        let response = app.get("/api/player/state", None).send().await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = app
            .get("/api/player/state", None)
            .bearer_auth("wrong")
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = app
            .get("/api/player/state", None)
            .bearer_auth("hunter2")
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .get("/api/player/state", None)
            .header("Cookie", "secret=hunter2")
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .post("/auth/login", None)
            .form(&[("secret", "wrong")])
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = app
            .post("/auth/login", None)
            .form(&[("secret", "hunter2")])
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let cookie = response
            .headers()
            .get("set-cookie")
            .unwrap()
            .to_str()
            .unwrap();
        assert!(cookie.starts_with("secret=hunter2"));
    }
}
