//! Position checkpoints and the active stream

use super::ids::{PlTrackId, PlaylistId};
use super::time::StreamTime;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Durable checkpoint: where in which track of which playlist playback was
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionData {
    /// Position within the track
    pub time: StreamTime,

    /// Playlist the checkpoint belongs to
    pub playlist_id: PlaylistId,

    /// Track the checkpoint points into
    pub pl_track_id: PlTrackId,
}

impl PositionData {
    /// Checkpoint at the very start of a track
    pub fn start_of(playlist_id: PlaylistId, pl_track_id: PlTrackId) -> Self {
        Self {
            time: StreamTime::ZERO,
            playlist_id,
            pl_track_id,
        }
    }
}

/// The currently active stream
///
/// Replaced wholesale whenever the track changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamData {
    /// File being streamed
    pub path: PathBuf,

    /// Stream duration, known once the backend has reported it
    pub duration: Option<StreamTime>,

    /// Zero-based track number within the playlist
    pub track_number: usize,

    /// Position that was last persisted
    pub last_saved_position: StreamTime,

    /// Live position checkpoint
    pub position_data: PositionData,
}

impl StreamData {
    /// Start position requested when the stream is loaded
    pub fn start_position(&self) -> StreamTime {
        self.position_data.time
    }
}
