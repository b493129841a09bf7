//! Playlist queries

use crate::tracks;
use sqlx::{Row, SqliteExecutor, SqlitePool};
use std::path::{Path, PathBuf};
use tome_core::{error::Result, types::*};

fn playlist_from_row(row: &sqlx::sqlite::SqliteRow) -> PlaylistInfo {
    PlaylistInfo {
        id: row.get("id"),
        title: row.get("title"),
        path: PathBuf::from(row.get::<String, _>("path")),
    }
}

/// Get playlist by ID
pub async fn get_by_id<'e, E>(executor: E, id: PlaylistId) -> Result<Option<PlaylistInfo>>
where
    E: SqliteExecutor<'e>,
{
    let row = sqlx::query("SELECT id, title, path FROM playlists WHERE id = ?")
        .bind(id)
        .fetch_optional(executor)
        .await?;

    Ok(row.as_ref().map(playlist_from_row))
}

/// Get playlist together with its ordered track list
///
/// Both reads run in one transaction so the track list always belongs to the
/// returned playlist row.
pub async fn get_with_tracks(pool: &SqlitePool, id: PlaylistId) -> Result<Option<BookData>> {
    let mut tx = pool.begin().await?;

    let Some(playlist) = get_by_id(&mut *tx, id).await? else {
        return Ok(None);
    };
    let tracks = tracks::get_by_playlist(&mut *tx, id).await?;

    tx.commit().await?;

    Ok(Some(BookData::new(playlist, tracks)))
}

/// Create new playlist
pub async fn create(pool: &SqlitePool, title: &str, path: &Path) -> Result<PlaylistInfo> {
    let now = chrono::Utc::now().timestamp();

    let result = sqlx::query("INSERT INTO playlists (title, path, created_at) VALUES (?, ?, ?)")
        .bind(title)
        .bind(path.to_string_lossy().as_ref())
        .bind(now)
        .execute(pool)
        .await?;

    let id = PlaylistId::new(result.last_insert_rowid());

    get_by_id(pool, id).await?.ok_or_else(|| {
        tome_core::TomeError::storage("Failed to retrieve created playlist")
    })
}

/// Delete playlist (tracks and position cascade)
pub async fn delete(pool: &SqlitePool, id: PlaylistId) -> Result<bool> {
    let result = sqlx::query("DELETE FROM playlists WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}
