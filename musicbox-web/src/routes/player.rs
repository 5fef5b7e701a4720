use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use musicbox_database::RECENTLY_PLAYED_LIMIT;
use musicbox_models::{Ack, Command, CommandRequest, PlaybackState, QueueRequest, Song};
use serde::Deserialize;
use std::sync::Arc;

use crate::{AppState, Result, UserId, sse_json};

pub(crate) fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/player/songs", get(songs))
        .route("/api/player/songs/category/{name}", get(songs_by_category))
        .route("/api/player/songs/search", get(search))
        .route("/api/player/recently-played", get(recently_played))
        .route("/api/player/command", post(command))
        .route("/api/player/state", get(state))
        .route("/api/player/stream", get(stream))
        .route("/api/player/playlist-queue", post(playlist_queue))
}

async fn songs(State(state): State<Arc<AppState>>) -> Result<Json<Vec<Song>>> {
    Ok(Json(state.catalog.songs().await?))
}

async fn songs_by_category(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<Vec<Song>>> {
    Ok(Json(state.database.songs_by_category(&name).await?))
}

#[derive(Deserialize)]
struct SearchParameters {
    query: String,
}

async fn search(
    State(state): State<Arc<AppState>>,
    Query(parameters): Query<SearchParameters>,
) -> Result<Json<Vec<Song>>> {
    Ok(Json(state.database.search_songs(&parameters.query).await?))
}

async fn recently_played(
    State(state): State<Arc<AppState>>,
    UserId(user_id): UserId,
) -> Result<Json<Vec<Song>>> {
    Ok(Json(
        state
            .database
            .recently_played(&user_id, RECENTLY_PLAYED_LIMIT)
            .await?,
    ))
}

async fn command(
    State(state): State<Arc<AppState>>,
    user: Option<UserId>,
    Json(request): Json<CommandRequest>,
) -> Result<impl IntoResponse> {
    let command: Command = request.command.parse()?;

    state.controls.send(command, user.map(|user| user.0))?;

    Ok((StatusCode::ACCEPTED, Json(Ack::ok())))
}

async fn state(State(state): State<Arc<AppState>>) -> Json<PlaybackState> {
    Json(state.player_state.borrow().clone())
}

async fn stream(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let receiver = state.player_broadcast.subscribe();
    let current = state.player_state.borrow().clone();

    sse_json(Some(current), receiver)
}

async fn playlist_queue(
    State(state): State<Arc<AppState>>,
    user: Option<UserId>,
    Json(request): Json<QueueRequest>,
) -> Result<impl IntoResponse> {
    state
        .controls
        .set_queue(request.song_ids, user.map(|user| user.0))?;

    Ok((StatusCode::ACCEPTED, Json(Ack::ok())))
}
