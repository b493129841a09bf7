use crate::{error::StorageError, playlists, positions, tracks};
use async_trait::async_trait;
use sqlx::SqlitePool;
use tome_core::{error::Result, types::*, PlaylistGateway, PositionGateway};

/// Gateways backed by a `SQLite` database
#[derive(Clone)]
pub struct SqliteLibrary {
    pool: SqlitePool,
}

impl SqliteLibrary {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to `database_url` and bring the schema up to date
    pub async fn open(database_url: &str) -> std::result::Result<Self, StorageError> {
        let pool = crate::create_pool(database_url).await?;
        crate::run_migrations(&pool).await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl PositionGateway for SqliteLibrary {
    async fn get_position(&self, playlist_id: PlaylistId) -> Result<Option<PositionData>> {
        positions::get(&self.pool, playlist_id).await
    }

    async fn save_position(&self, position: &PositionData) -> Result<()> {
        tracing::trace!(
            playlist_id = %position.playlist_id,
            pl_track_id = %position.pl_track_id,
            time = %position.time,
            "Saving position"
        );
        positions::upsert(&self.pool, position).await
    }
}

#[async_trait]
impl PlaylistGateway for SqliteLibrary {
    async fn get_by_id(&self, playlist_id: PlaylistId) -> Result<Option<PlaylistInfo>> {
        playlists::get_by_id(&self.pool, playlist_id).await
    }

    async fn get_track_list_by_playlist_id(
        &self,
        playlist_id: PlaylistId,
    ) -> Result<Vec<TrackEntry>> {
        tracks::get_by_playlist(&self.pool, playlist_id).await
    }

    async fn load_book(&self, playlist_id: PlaylistId) -> Result<Option<BookData>> {
        playlists::get_with_tracks(&self.pool, playlist_id).await
    }
}
