use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use musicbox_models::{Ack, CreatePlaylist, Playlist, PlaylistChange, PlaylistId, Song, SongId};
use snafu::prelude::*;
use std::sync::Arc;

use crate::{
    AppState, Result, UserId,
    error::{BadRequestSnafu, ForbiddenSnafu, NotFoundSnafu},
    sse_json,
};

pub(crate) fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/playlists", get(index).post(create))
        .route("/api/playlists/stream", get(stream))
        .route("/api/playlists/{id}", axum::routing::delete(delete))
        .route("/api/playlists/{id}/songs", get(songs))
        .route(
            "/api/playlists/{id}/songs/{song_id}",
            post(add_song).delete(remove_song),
        )
}

async fn owned_playlist(state: &AppState, user_id: &str, id: PlaylistId) -> Result<Playlist> {
    let playlist = state
        .database
        .playlist(id)
        .await?
        .context(NotFoundSnafu { what: "Playlist" })?;

    ensure!(
        playlist.user_id == user_id,
        ForbiddenSnafu { what: "Playlist" }
    );

    Ok(playlist)
}

async fn index(
    State(state): State<Arc<AppState>>,
    UserId(user_id): UserId,
) -> Result<Json<Vec<Playlist>>> {
    Ok(Json(state.database.playlists(&user_id).await?))
}

async fn create(
    State(state): State<Arc<AppState>>,
    UserId(user_id): UserId,
    Json(request): Json<CreatePlaylist>,
) -> Result<impl IntoResponse> {
    let name = request.name.trim();
    ensure!(
        !name.is_empty(),
        BadRequestSnafu {
            message: "Playlist name must not be empty"
        }
    );

    let playlist = state.database.create_playlist(&user_id, name).await?;

    state.publish_playlist_change(PlaylistChange::PlaylistCreated {
        id: playlist.id,
        name: playlist.name.clone(),
    });

    Ok((StatusCode::CREATED, Json(playlist)))
}

async fn delete(
    State(state): State<Arc<AppState>>,
    UserId(user_id): UserId,
    Path(id): Path<PlaylistId>,
) -> Result<StatusCode> {
    owned_playlist(&state, &user_id, id).await?;

    if state.database.delete_playlist(id).await? {
        state.publish_playlist_change(PlaylistChange::PlaylistDeleted { id });
    }

    Ok(StatusCode::NO_CONTENT)
}

async fn songs(
    State(state): State<Arc<AppState>>,
    UserId(user_id): UserId,
    Path(id): Path<PlaylistId>,
) -> Result<Json<Vec<Song>>> {
    owned_playlist(&state, &user_id, id).await?;

    Ok(Json(state.database.playlist_songs(id).await?))
}

async fn add_song(
    State(state): State<Arc<AppState>>,
    UserId(user_id): UserId,
    Path((id, song_id)): Path<(PlaylistId, SongId)>,
) -> Result<Json<Ack>> {
    owned_playlist(&state, &user_id, id).await?;

    state
        .database
        .song(song_id)
        .await?
        .context(NotFoundSnafu { what: "Song" })?;

    if !state.database.add_song_to_playlist(id, song_id).await? {
        return Ok(Json(Ack::ok_with("Song already in playlist")));
    }

    state.publish_playlist_change(PlaylistChange::SongAdded {
        playlist_id: id,
        song_id,
    });

    Ok(Json(Ack::ok()))
}

async fn remove_song(
    State(state): State<Arc<AppState>>,
    UserId(user_id): UserId,
    Path((id, song_id)): Path<(PlaylistId, SongId)>,
) -> Result<Json<Ack>> {
    owned_playlist(&state, &user_id, id).await?;

    ensure!(
        state.database.remove_song_from_playlist(id, song_id).await?,
        NotFoundSnafu {
            what: "Song in playlist"
        }
    );

    state.publish_playlist_change(PlaylistChange::SongRemoved {
        playlist_id: id,
        song_id,
    });

    Ok(Json(Ack::ok()))
}

async fn stream(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    sse_json(None, state.playlist_events.subscribe())
}
