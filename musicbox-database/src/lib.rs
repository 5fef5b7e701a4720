use musicbox_models::{Command, NewSong, Playlist, PlaylistId, Song, SongId, Volume};
use sqlx::{
    Pool, Sqlite, SqlitePool,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};
use std::{path::PathBuf, str::FromStr};
use tracing::debug;

mod error;

pub use error::{Error, Result};

/// Upper bound on the recently played list.
pub const RECENTLY_PLAYED_LIMIT: i64 = 50;

const SONG_COLUMNS: &str = "s.id, s.title, s.artist, s.src_url, s.cover_url, s.category";

/// Hex md5 digest, the form in which the web secret is stored and compared.
pub fn hash_secret(secret: &str) -> String {
    format!("{:x}", md5::compute(secret))
}

#[derive(Debug, Clone)]
pub struct Database {
    pool: Pool<Sqlite>,
}

impl Database {
    /// Opens the database at `database_url`, or at the platform data directory when none is given.
    pub async fn new(database_url: Option<String>) -> Result<Self> {
        let database_url = if let Some(url) = database_url {
            PathBuf::from(url.replace("sqlite://", ""))
        } else {
            let Some(mut url) = dirs::data_local_dir() else {
                return Err(Error::DatabaseLocation);
            };
            url.push("musicbox");

            if !url.exists() {
                let Ok(_) = std::fs::create_dir_all(&url) else {
                    return Err(Error::DatabaseLocation);
                };
            }

            url.push("data.db");

            url
        };

        debug!("DATABASE_URL: {}", database_url.to_string_lossy());

        let options = SqliteConnectOptions::new()
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .filename(database_url)
            .foreign_keys(true)
            .create_if_missing(true);

        let pool = SqlitePool::connect_with(options).await?;

        Database::init(pool).await
    }

    /// A throwaway database living in a single in-memory connection.
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        Database::init(pool).await
    }

    pub async fn init(pool: Pool<Sqlite>) -> Result<Self> {
        sqlx::migrate!("./migrations").run(&pool).await?;

        create_configuration(&pool).await?;

        Ok(Self { pool })
    }

    pub async fn songs(&self) -> Result<Vec<Song>> {
        let rows = sqlx::query_as::<_, SongRow>(&format!(
            "SELECT {SONG_COLUMNS} FROM songs s ORDER BY s.id"
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    pub async fn song(&self, id: SongId) -> Result<Option<Song>> {
        let row = sqlx::query_as::<_, SongRow>(&format!(
            "SELECT {SONG_COLUMNS} FROM songs s WHERE s.id = ?1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Into::into))
    }

    pub async fn songs_by_category(&self, category: &str) -> Result<Vec<Song>> {
        let rows = sqlx::query_as::<_, SongRow>(&format!(
            "SELECT {SONG_COLUMNS} FROM songs s WHERE s.category = ?1 ORDER BY s.id"
        ))
        .bind(category)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Case-insensitive substring match on title or artist.
    pub async fn search_songs(&self, query: &str) -> Result<Vec<Song>> {
        let pattern = format!("%{}%", query.trim().to_lowercase());

        let rows = sqlx::query_as::<_, SongRow>(&format!(
            r#"
            SELECT {SONG_COLUMNS} FROM songs s
            WHERE lower(s.title) LIKE ?1 OR lower(s.artist) LIKE ?1
            ORDER BY s.id
            "#
        ))
        .bind(pattern)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    pub async fn add_song(&self, song: &NewSong) -> Result<Song> {
        let id = sqlx::query(
            r#"
            INSERT INTO songs (title, artist, src_url, cover_url, category)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(&song.title)
        .bind(&song.artist)
        .bind(&song.src_url)
        .bind(&song.cover_url)
        .bind(&song.category)
        .execute(&self.pool)
        .await?
        .last_insert_rowid();

        Ok(Song {
            id,
            title: song.title.clone(),
            artist: song.artist.clone(),
            src_url: song.src_url.clone(),
            cover_url: song.cover_url.clone(),
            category: song.category.clone(),
        })
    }

    pub async fn log_command(
        &self,
        command: Command,
        song_id: Option<SongId>,
        user_id: Option<&str>,
    ) -> Result<()> {
        sqlx::query("INSERT INTO command_log (command, song_id, user_id) VALUES (?1, ?2, ?3)")
            .bind(command.to_string())
            .bind(song_id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    pub async fn log_volume(&self, volume: Volume) -> Result<()> {
        sqlx::query("INSERT INTO volume_log (volume) VALUES (?1)")
            .bind(i64::from(volume.get()))
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Distinct songs the user started or skipped to, most recent first.
    pub async fn recently_played(&self, user_id: &str, limit: i64) -> Result<Vec<Song>> {
        let rows = sqlx::query_as::<_, SongRow>(&format!(
            r#"
            SELECT {SONG_COLUMNS} FROM command_log c
            JOIN songs s ON s.id = c.song_id
            WHERE c.user_id = ?1 AND c.command IN ('PLAY', 'NEXT', 'PREV')
            GROUP BY s.id
            ORDER BY MAX(c.id) DESC
            LIMIT ?2
            "#
        ))
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// The user's playlists, newest first.
    pub async fn playlists(&self, user_id: &str) -> Result<Vec<Playlist>> {
        let rows = sqlx::query_as::<_, PlaylistRow>(
            r#"
            SELECT p.id, p.name, p.user_id, p.created_at, COUNT(ps.song_id) AS song_count
            FROM playlists p
            LEFT JOIN playlist_songs ps ON ps.playlist_id = p.id
            WHERE p.user_id = ?1
            GROUP BY p.id
            ORDER BY p.id DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    pub async fn playlist(&self, id: PlaylistId) -> Result<Option<Playlist>> {
        let row = sqlx::query_as::<_, PlaylistRow>(
            r#"
            SELECT p.id, p.name, p.user_id, p.created_at, COUNT(ps.song_id) AS song_count
            FROM playlists p
            LEFT JOIN playlist_songs ps ON ps.playlist_id = p.id
            WHERE p.id = ?1
            GROUP BY p.id
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Into::into))
    }

    pub async fn create_playlist(&self, user_id: &str, name: &str) -> Result<Playlist> {
        let id = sqlx::query("INSERT INTO playlists (name, user_id) VALUES (?1, ?2)")
            .bind(name)
            .bind(user_id)
            .execute(&self.pool)
            .await?
            .last_insert_rowid();

        self.playlist(id)
            .await?
            .ok_or(Error::Database {
                source: sqlx::Error::RowNotFound,
            })
    }

    /// Removes the playlist with its memberships. Returns whether it existed.
    pub async fn delete_playlist(&self, id: PlaylistId) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM playlist_songs WHERE playlist_id = ?1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        let deleted = sqlx::query("DELETE FROM playlists WHERE id = ?1")
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        tx.commit().await?;

        Ok(deleted > 0)
    }

    /// Songs in insertion order.
    pub async fn playlist_songs(&self, id: PlaylistId) -> Result<Vec<Song>> {
        let rows = sqlx::query_as::<_, SongRow>(&format!(
            r#"
            SELECT {SONG_COLUMNS} FROM playlist_songs ps
            JOIN songs s ON s.id = ps.song_id
            WHERE ps.playlist_id = ?1
            ORDER BY ps.rowid
            "#
        ))
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Returns `false` when the song was already in the playlist.
    pub async fn add_song_to_playlist(&self, id: PlaylistId, song_id: SongId) -> Result<bool> {
        let added = sqlx::query(
            "INSERT OR IGNORE INTO playlist_songs (playlist_id, song_id) VALUES (?1, ?2)",
        )
        .bind(id)
        .bind(song_id)
        .execute(&self.pool)
        .await?
        .rows_affected();

        Ok(added > 0)
    }

    pub async fn remove_song_from_playlist(&self, id: PlaylistId, song_id: SongId) -> Result<bool> {
        let removed =
            sqlx::query("DELETE FROM playlist_songs WHERE playlist_id = ?1 AND song_id = ?2")
                .bind(id)
                .bind(song_id)
                .execute(&self.pool)
                .await?
                .rows_affected();

        Ok(removed > 0)
    }

    /// Favorite songs, most recently added first.
    pub async fn favorites(&self, user_id: &str) -> Result<Vec<Song>> {
        let rows = sqlx::query_as::<_, SongRow>(&format!(
            r#"
            SELECT {SONG_COLUMNS} FROM favorites f
            JOIN songs s ON s.id = f.song_id
            WHERE f.user_id = ?1
            ORDER BY f.rowid DESC
            "#
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Returns `false` when the song was already a favorite.
    pub async fn add_favorite(&self, user_id: &str, song_id: SongId) -> Result<bool> {
        let added = sqlx::query("INSERT OR IGNORE INTO favorites (user_id, song_id) VALUES (?1, ?2)")
            .bind(user_id)
            .bind(song_id)
            .execute(&self.pool)
            .await?
            .rows_affected();

        Ok(added > 0)
    }

    pub async fn remove_favorite(&self, user_id: &str, song_id: SongId) -> Result<bool> {
        let removed = sqlx::query("DELETE FROM favorites WHERE user_id = ?1 AND song_id = ?2")
            .bind(user_id)
            .bind(song_id)
            .execute(&self.pool)
            .await?
            .rows_affected();

        Ok(removed > 0)
    }

    pub async fn is_favorite(&self, user_id: &str, song_id: SongId) -> Result<bool> {
        let found: Option<i64> =
            sqlx::query_scalar("SELECT 1 FROM favorites WHERE user_id = ?1 AND song_id = ?2")
                .bind(user_id)
                .bind(song_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(found.is_some())
    }

    pub async fn favorite_count(&self, user_id: &str) -> Result<i64> {
        let count = sqlx::query_scalar("SELECT COUNT(*) FROM favorites WHERE user_id = ?1")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    pub async fn clear_favorites(&self, user_id: &str) -> Result<u64> {
        let removed = sqlx::query("DELETE FROM favorites WHERE user_id = ?1")
            .bind(user_id)
            .execute(&self.pool)
            .await?
            .rows_affected();

        Ok(removed)
    }

    pub async fn set_web_secret(&self, secret: String) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE configuration
            SET web_secret=?1
            WHERE ROWID = 1
            "#,
        )
        .bind(hash_secret(&secret))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn set_remote_device(&self, device: String) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE configuration
            SET remote_device=?1
            WHERE ROWID = 1
            "#,
        )
        .bind(device)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get_configuration(&self) -> Result<DatabaseConfiguration> {
        Ok(sqlx::query_as::<_, DatabaseConfiguration>(
            r#"
            SELECT web_secret, remote_device FROM configuration
            WHERE ROWID = 1;
            "#,
        )
        .fetch_one(&self.pool)
        .await?)
    }
}

/// Persisted settings. `web_secret` holds the md5 hex digest, never the secret itself.
#[derive(Debug, Clone, Default, sqlx::FromRow)]
pub struct DatabaseConfiguration {
    pub web_secret: Option<String>,
    pub remote_device: Option<String>,
}

#[derive(sqlx::FromRow)]
struct SongRow {
    id: i64,
    title: String,
    artist: String,
    src_url: String,
    cover_url: Option<String>,
    category: Option<String>,
}

impl From<SongRow> for Song {
    fn from(row: SongRow) -> Self {
        Self {
            id: row.id,
            title: row.title,
            artist: row.artist,
            src_url: row.src_url,
            cover_url: row.cover_url,
            category: row.category,
        }
    }
}

#[derive(sqlx::FromRow)]
struct PlaylistRow {
    id: i64,
    name: String,
    user_id: String,
    created_at: String,
    song_count: i64,
}

impl From<PlaylistRow> for Playlist {
    fn from(row: PlaylistRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            user_id: row.user_id,
            created_at: row.created_at,
            song_count: row.song_count,
        }
    }
}

async fn create_configuration(pool: &Pool<Sqlite>) -> Result<()> {
    sqlx::query(
        r#"
            INSERT OR IGNORE INTO configuration (ROWID) VALUES (?1);
            "#,
    )
    .bind(1_i64)
    .execute(pool)
    .await?;

    Ok(())
}
