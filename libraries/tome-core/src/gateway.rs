//! Gateways the playback core reads and writes through
//!
//! Both are narrow on purpose: the player only needs to resolve a playlist
//! into tracks and to load/save one checkpoint per playlist. Failures propagate
//! to the caller; a missing checkpoint is `Ok(None)`, never an error.

use crate::error::Result;
use crate::types::{BookData, PlaylistId, PlaylistInfo, PositionData, TrackEntry};
use async_trait::async_trait;

/// Load and save the last known position of a playlist
#[async_trait]
pub trait PositionGateway: Send + Sync {
    /// Last saved checkpoint for a playlist, if any
    async fn get_position(&self, playlist_id: PlaylistId) -> Result<Option<PositionData>>;

    /// Persist a checkpoint, replacing the previous one for its playlist
    async fn save_position(&self, position: &PositionData) -> Result<()>;
}

/// Resolve playlists and their track lists
#[async_trait]
pub trait PlaylistGateway: Send + Sync {
    /// Playlist metadata, `None` if no such playlist exists
    async fn get_by_id(&self, playlist_id: PlaylistId) -> Result<Option<PlaylistInfo>>;

    /// Tracks of a playlist ordered by track number
    async fn get_track_list_by_playlist_id(
        &self,
        playlist_id: PlaylistId,
    ) -> Result<Vec<TrackEntry>>;

    /// Playlist together with its ordered tracks
    ///
    /// The default composes the two reads above. Implementations backed by a
    /// database should override it to read both inside one unit of work.
    async fn load_book(&self, playlist_id: PlaylistId) -> Result<Option<BookData>> {
        let Some(playlist) = self.get_by_id(playlist_id).await? else {
            return Ok(None);
        };
        let tracks = self.get_track_list_by_playlist_id(playlist_id).await?;
        Ok(Some(BookData::new(playlist, tracks)))
    }
}
