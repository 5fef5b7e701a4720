use crate::{
    Error, Result,
    sse::{SseDecoder, SseEvent},
};
use futures::{
    StreamExt,
    stream::{self, BoxStream},
};
use musicbox_models::{
    Ack, Command, CommandRequest, CreatePlaylist, FavoriteCount, FavoriteStatus, PlaybackState,
    Playlist, PlaylistEvent, PlaylistId, QueueRequest, Song, SongId,
};
use reqwest::{
    Method, Response, StatusCode,
    header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue},
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::{collections::VecDeque, fmt::Display};
use tracing::{debug, warn};
use url::Url;

const USER_HEADER: &str = "x-user-id";

/// HTTP client for a musicbox server.
#[derive(Debug, Clone)]
pub struct Client {
    base_url: Url,
    client: reqwest::Client,
    user_id: Option<String>,
    secret: Option<String>,
}

enum Endpoint {
    Songs,
    SongsByCategory(String),
    Search,
    RecentlyPlayed,
    Command,
    State,
    Stream,
    PlaylistQueue,
    Playlists,
    Playlist(PlaylistId),
    PlaylistSongs(PlaylistId),
    PlaylistSong(PlaylistId, SongId),
    PlaylistStream,
    Favorites,
    Favorite(SongId),
    FavoriteCheck(SongId),
    FavoriteCount,
    Login,
}

impl Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Endpoint::Songs => f.write_str("api/player/songs"),
            // the name is pushed as an encoded segment
            Endpoint::SongsByCategory(_) => f.write_str("api/player/songs/category"),
            Endpoint::Search => f.write_str("api/player/songs/search"),
            Endpoint::RecentlyPlayed => f.write_str("api/player/recently-played"),
            Endpoint::Command => f.write_str("api/player/command"),
            Endpoint::State => f.write_str("api/player/state"),
            Endpoint::Stream => f.write_str("api/player/stream"),
            Endpoint::PlaylistQueue => f.write_str("api/player/playlist-queue"),
            Endpoint::Playlists => f.write_str("api/playlists"),
            Endpoint::Playlist(id) => write!(f, "api/playlists/{id}"),
            Endpoint::PlaylistSongs(id) => write!(f, "api/playlists/{id}/songs"),
            Endpoint::PlaylistSong(id, song_id) => write!(f, "api/playlists/{id}/songs/{song_id}"),
            Endpoint::PlaylistStream => f.write_str("api/playlists/stream"),
            Endpoint::Favorites => f.write_str("api/favorites"),
            Endpoint::Favorite(song_id) => write!(f, "api/favorites/{song_id}"),
            Endpoint::FavoriteCheck(song_id) => write!(f, "api/favorites/check/{song_id}"),
            Endpoint::FavoriteCount => f.write_str("api/favorites/count"),
            Endpoint::Login => f.write_str("auth/login"),
        }
    }
}

macro_rules! get {
    ($self:ident, $endpoint:expr) => {
        get!($self, $endpoint, None)
    };
    ($self:ident, $endpoint:expr, $params:expr) => {
        match $self.make_call(Method::GET, $endpoint, $params, None).await {
            Ok(response) => serde_json::from_str(response.as_str()).map_err(Error::from),
            Err(error) => Err(error),
        }
    };
}

macro_rules! post {
    ($self:ident, $endpoint:expr) => {
        post!($self, $endpoint, None)
    };
    ($self:ident, $endpoint:expr, $body:expr) => {
        match $self.make_call(Method::POST, $endpoint, None, $body).await {
            Ok(response) => serde_json::from_str(response.as_str()).map_err(Error::from),
            Err(error) => Err(error),
        }
    };
}

macro_rules! delete {
    ($self:ident, $endpoint:expr) => {
        match $self.make_call(Method::DELETE, $endpoint, None, None).await {
            Ok(response) => serde_json::from_str(response.as_str()).map_err(Error::from),
            Err(error) => Err(error),
        }
    };
}

impl Client {
    pub fn new(base_url: &str) -> Result<Self> {
        let mut base_url = Url::parse(base_url)?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let client = reqwest::Client::builder().build()?;

        Ok(Self {
            base_url,
            client,
            user_id: None,
            secret: None,
        })
    }

    /// Identity sent with every request, required by the per-user endpoints.
    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Shared secret, sent as a bearer token.
    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        self.secret = Some(secret.into());
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Makes a media or cover locator absolute. Absolute locators pass through.
    pub fn resolve(&self, locator: &str) -> Result<Url> {
        resolve_locator(&self.base_url, locator)
    }

    pub async fn login(&self, secret: &str) -> Result<()> {
        let response = self
            .request(Method::POST, &Endpoint::Login)?
            .form(&[("secret", secret)])
            .send()
            .await?;

        let ack: Ack = serde_json::from_str(&self.handle_response(response).await?)?;
        if ack.success {
            Ok(())
        } else {
            Err(Error::Unauthorized)
        }
    }

    pub async fn songs(&self) -> Result<Vec<Song>> {
        get!(self, &Endpoint::Songs)
    }

    pub async fn songs_by_category(&self, category: &str) -> Result<Vec<Song>> {
        get!(self, &Endpoint::SongsByCategory(category.to_string()))
    }

    pub async fn search(&self, query: &str) -> Result<Vec<Song>> {
        get!(self, &Endpoint::Search, Some(&[("query", query)][..]))
    }

    pub async fn recently_played(&self) -> Result<Vec<Song>> {
        get!(self, &Endpoint::RecentlyPlayed)
    }

    pub async fn state(&self) -> Result<PlaybackState> {
        get!(self, &Endpoint::State)
    }

    pub async fn send_command(&self, command: Command) -> Result<Ack> {
        let body = serde_json::to_value(CommandRequest {
            command: command.to_string(),
        })?;
        post!(self, &Endpoint::Command, Some(body))
    }

    /// Replaces the navigation queue. `None` or an empty list returns to catalog order.
    pub async fn set_queue(&self, song_ids: Option<Vec<SongId>>) -> Result<Ack> {
        let body = serde_json::to_value(QueueRequest { song_ids })?;
        post!(self, &Endpoint::PlaylistQueue, Some(body))
    }

    pub async fn playlists(&self) -> Result<Vec<Playlist>> {
        get!(self, &Endpoint::Playlists)
    }

    pub async fn create_playlist(&self, name: &str) -> Result<Playlist> {
        let body = serde_json::to_value(CreatePlaylist {
            name: name.to_string(),
        })?;
        post!(self, &Endpoint::Playlists, Some(body))
    }

    pub async fn delete_playlist(&self, id: PlaylistId) -> Result<()> {
        self.make_call(Method::DELETE, &Endpoint::Playlist(id), None, None)
            .await?;
        Ok(())
    }

    pub async fn playlist_songs(&self, id: PlaylistId) -> Result<Vec<Song>> {
        get!(self, &Endpoint::PlaylistSongs(id))
    }

    pub async fn add_song_to_playlist(&self, id: PlaylistId, song_id: SongId) -> Result<Ack> {
        post!(self, &Endpoint::PlaylistSong(id, song_id))
    }

    pub async fn remove_song_from_playlist(&self, id: PlaylistId, song_id: SongId) -> Result<Ack> {
        delete!(self, &Endpoint::PlaylistSong(id, song_id))
    }

    pub async fn favorites(&self) -> Result<Vec<Song>> {
        get!(self, &Endpoint::Favorites)
    }

    pub async fn add_favorite(&self, song_id: SongId) -> Result<Ack> {
        post!(self, &Endpoint::Favorite(song_id))
    }

    pub async fn remove_favorite(&self, song_id: SongId) -> Result<Ack> {
        delete!(self, &Endpoint::Favorite(song_id))
    }

    pub async fn is_favorite(&self, song_id: SongId) -> Result<bool> {
        let status: FavoriteStatus = get!(self, &Endpoint::FavoriteCheck(song_id))?;
        Ok(status.is_favorite)
    }

    pub async fn favorite_count(&self) -> Result<i64> {
        let count: FavoriteCount = get!(self, &Endpoint::FavoriteCount)?;
        Ok(count.count)
    }

    pub async fn clear_favorites(&self) -> Result<Ack> {
        delete!(self, &Endpoint::Favorites)
    }

    /// Opens the playback state stream. The first item is the current snapshot.
    pub async fn state_stream(&self) -> Result<BoxStream<'static, Result<PlaybackState>>> {
        self.open_stream(&Endpoint::Stream).await
    }

    pub async fn playlist_stream(&self) -> Result<BoxStream<'static, Result<PlaylistEvent>>> {
        self.open_stream(&Endpoint::PlaylistStream).await
    }

    async fn open_stream<T>(&self, endpoint: &Endpoint) -> Result<BoxStream<'static, Result<T>>>
    where
        T: DeserializeOwned + Send + 'static,
    {
        debug!("opening {endpoint} stream");
        let response = self
            .request(Method::GET, endpoint)?
            .header(ACCEPT, "text/event-stream")
            .send()
            .await?;
        let response = check_status(response).await?;

        Ok(json_events(response))
    }

    fn endpoint_url(&self, endpoint: &Endpoint) -> Result<Url> {
        let mut url = self.base_url.join(&endpoint.to_string())?;

        if let Endpoint::SongsByCategory(name) = endpoint
            && let Ok(mut segments) = url.path_segments_mut()
        {
            segments.push(name);
        }

        Ok(url)
    }

    fn client_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();

        if let Some(user_id) = &self.user_id {
            match HeaderValue::from_str(user_id) {
                Ok(value) => {
                    headers.insert(USER_HEADER, value);
                }
                Err(_) => warn!("user id {user_id:?} is not a valid header value"),
            }
        }

        if let Some(secret) = &self.secret
            && let Ok(value) = HeaderValue::from_str(&format!("Bearer {secret}"))
        {
            headers.insert(AUTHORIZATION, value);
        }

        headers
    }

    fn request(&self, method: Method, endpoint: &Endpoint) -> Result<reqwest::RequestBuilder> {
        let url = self.endpoint_url(endpoint)?;
        Ok(self.client.request(method, url).headers(self.client_headers()))
    }

    async fn make_call(
        &self,
        method: Method,
        endpoint: &Endpoint,
        params: Option<&[(&str, &str)]>,
        body: Option<Value>,
    ) -> Result<String> {
        debug!("calling {method} {endpoint}, with params {params:?}");
        let mut request = self.request(method, endpoint)?;

        if let Some(params) = params {
            request = request.query(params);
        }
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request.send().await?;
        self.handle_response(response).await
    }

    async fn handle_response(&self, response: Response) -> Result<String> {
        let response = check_status(response).await?;
        Ok(response.text().await?)
    }
}

pub(crate) fn resolve_locator(base_url: &Url, locator: &str) -> Result<Url> {
    Ok(base_url.join(locator)?)
}

async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();

    if status.is_success() {
        return Ok(response);
    }

    if status == StatusCode::UNAUTHORIZED {
        return Err(Error::Unauthorized);
    }

    // error bodies are acks, fall back to the status text when they are not
    let text = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<Ack>(&text)
        .ok()
        .and_then(|ack| ack.message)
        .unwrap_or_else(|| status.to_string());

    Err(Error::Api {
        status: status.as_u16(),
        message,
    })
}

/// Turns an event-stream response into a stream of JSON payloads.
///
/// A payload that fails to parse yields `Error::DeserializeJSON` and the stream
/// continues. A transport error is yielded once and ends the stream.
fn json_events<T>(response: Response) -> BoxStream<'static, Result<T>>
where
    T: DeserializeOwned + Send + 'static,
{
    let state = (
        response.bytes_stream().boxed(),
        SseDecoder::new(),
        VecDeque::<SseEvent>::new(),
        false,
    );

    stream::unfold(state, |(mut bytes, mut decoder, mut pending, failed)| async move {
        if failed {
            return None;
        }

        loop {
            if let Some(event) = pending.pop_front() {
                let item = serde_json::from_str(&event.data).map_err(Error::from);
                return Some((item, (bytes, decoder, pending, false)));
            }

            match bytes.next().await {
                Some(Ok(chunk)) => pending.extend(decoder.push(&chunk)),
                Some(Err(error)) => {
                    return Some((Err(Error::from(error)), (bytes, decoder, pending, true)));
                }
                None => return None,
            }
        }
    })
    .boxed()
}
