use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, post},
};
use musicbox_models::{Ack, FavoriteCount, FavoriteStatus, Song, SongId};
use snafu::prelude::*;
use std::sync::Arc;

use crate::{AppState, Result, UserId, error::NotFoundSnafu};

pub(crate) fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/favorites", get(index).delete(clear))
        .route("/api/favorites/count", get(count))
        .route("/api/favorites/check/{song_id}", get(check))
        .route("/api/favorites/{song_id}", post(add).delete(remove))
}

async fn index(
    State(state): State<Arc<AppState>>,
    UserId(user_id): UserId,
) -> Result<Json<Vec<Song>>> {
    Ok(Json(state.database.favorites(&user_id).await?))
}

async fn add(
    State(state): State<Arc<AppState>>,
    UserId(user_id): UserId,
    Path(song_id): Path<SongId>,
) -> Result<Json<Ack>> {
    state
        .database
        .song(song_id)
        .await?
        .context(NotFoundSnafu { what: "Song" })?;

    if state.database.add_favorite(&user_id, song_id).await? {
        Ok(Json(Ack::ok()))
    } else {
        Ok(Json(Ack::ok_with("Song already in favorites")))
    }
}

async fn remove(
    State(state): State<Arc<AppState>>,
    UserId(user_id): UserId,
    Path(song_id): Path<SongId>,
) -> Result<Json<Ack>> {
    if state.database.remove_favorite(&user_id, song_id).await? {
        Ok(Json(Ack::ok()))
    } else {
        Ok(Json(Ack::ok_with("Song was not a favorite")))
    }
}

async fn check(
    State(state): State<Arc<AppState>>,
    UserId(user_id): UserId,
    Path(song_id): Path<SongId>,
) -> Result<Json<FavoriteStatus>> {
    let is_favorite = state.database.is_favorite(&user_id, song_id).await?;
    Ok(Json(FavoriteStatus { is_favorite }))
}

async fn count(
    State(state): State<Arc<AppState>>,
    UserId(user_id): UserId,
) -> Result<Json<FavoriteCount>> {
    let count = state.database.favorite_count(&user_id).await?;
    Ok(Json(FavoriteCount { count }))
}

async fn clear(
    State(state): State<Arc<AppState>>,
    UserId(user_id): UserId,
) -> Result<Json<Ack>> {
    let removed = state.database.clear_favorites(&user_id).await?;
    Ok(Json(Ack::ok_with(format!("Removed {removed} favorites"))))
}
