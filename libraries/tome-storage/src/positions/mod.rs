//! Position checkpoints, one row per playlist

use sqlx::{Row, SqlitePool};
use tome_core::{error::Result, types::*};

/// Get the checkpoint of a playlist
pub async fn get(pool: &SqlitePool, playlist_id: PlaylistId) -> Result<Option<PositionData>> {
    let row = sqlx::query(
        "SELECT playlist_id, pl_track_id, time_ns FROM positions WHERE playlist_id = ?",
    )
    .bind(playlist_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|r| PositionData {
        time: StreamTime::from_nanos(r.get("time_ns")),
        playlist_id: r.get("playlist_id"),
        pl_track_id: r.get("pl_track_id"),
    }))
}

/// Create or replace the checkpoint of a playlist
pub async fn upsert(pool: &SqlitePool, position: &PositionData) -> Result<()> {
    let now = chrono::Utc::now().timestamp();

    sqlx::query(
        r#"
        INSERT INTO positions (playlist_id, pl_track_id, time_ns, updated_at)
        VALUES (?, ?, ?, ?)
        ON CONFLICT(playlist_id)
        DO UPDATE SET
            pl_track_id = excluded.pl_track_id,
            time_ns = excluded.time_ns,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(position.playlist_id)
    .bind(position.pl_track_id)
    .bind(position.time.as_nanos())
    .bind(now)
    .execute(pool)
    .await?;

    Ok(())
}

/// Delete the checkpoint of a playlist
pub async fn delete(pool: &SqlitePool, playlist_id: PlaylistId) -> Result<bool> {
    let result = sqlx::query("DELETE FROM positions WHERE playlist_id = ?")
        .bind(playlist_id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}
