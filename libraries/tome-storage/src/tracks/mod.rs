//! Playlist track queries

use sqlx::{Row, SqliteExecutor, SqlitePool};
use std::path::{Path, PathBuf};
use tome_core::{error::Result, types::*, TomeError};

fn track_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<TrackEntry> {
    let track_number: i64 = row.get("track_number");
    let track_number = usize::try_from(track_number)
        .map_err(|_| TomeError::storage(format!("Negative track number {track_number}")))?;

    Ok(TrackEntry {
        track_number,
        pl_track_id: row.get("id"),
        file_path: PathBuf::from(row.get::<String, _>("file_path")),
    })
}

/// Get the tracks of a playlist ordered by track number
pub async fn get_by_playlist<'e, E>(executor: E, playlist_id: PlaylistId) -> Result<Vec<TrackEntry>>
where
    E: SqliteExecutor<'e>,
{
    let rows = sqlx::query(
        r#"
        SELECT id, track_number, file_path
        FROM playlist_tracks
        WHERE playlist_id = ?
        ORDER BY track_number
        "#,
    )
    .bind(playlist_id)
    .fetch_all(executor)
    .await?;

    rows.iter().map(track_from_row).collect()
}

/// Append a file to the end of a playlist
pub async fn append(pool: &SqlitePool, playlist_id: PlaylistId, file_path: &Path) -> Result<TrackEntry> {
    let mut tx = pool.begin().await?;

    let next_row = sqlx::query(
        "SELECT COALESCE(MAX(track_number) + 1, 0) AS next_number FROM playlist_tracks WHERE playlist_id = ?",
    )
    .bind(playlist_id)
    .fetch_one(&mut *tx)
    .await?;
    let next_number: i64 = next_row.get("next_number");

    let result = sqlx::query(
        "INSERT INTO playlist_tracks (playlist_id, track_number, file_path) VALUES (?, ?, ?)",
    )
    .bind(playlist_id)
    .bind(next_number)
    .bind(file_path.to_string_lossy().as_ref())
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    Ok(TrackEntry {
        track_number: usize::try_from(next_number)
            .map_err(|_| TomeError::storage("Track number overflow"))?,
        pl_track_id: PlTrackId::new(result.last_insert_rowid()),
        file_path: file_path.to_path_buf(),
    })
}
