//! Error types for playback control

use thiserror::Error;
use tome_core::{PlaylistId, StreamTime, TomeError};

use crate::pipeline::PipelineState;

/// Failures reported by the pipeline itself
///
/// This is the recoverable class: the command queue logs and drops the
/// failing command, then carries on with the next one.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    /// The pipeline refused a state change
    #[error("Pipeline refused state change to {target}: {reason}")]
    StateChange {
        target: PipelineState,
        reason: String,
    },

    /// The pipeline refused a seek request outright
    #[error("Pipeline refused seek to {0}")]
    SeekRejected(StreamTime),

    /// Pipeline construction or other pipeline failure
    #[error("Pipeline error: {0}")]
    Pipeline(String),

    /// A transport command reached the backend after the stream went away,
    /// e.g. between end of stream and the next track being loaded
    #[error("No stream to {0}")]
    NoStream(&'static str),
}

/// Playback errors
#[derive(Debug, Error)]
pub enum PlaybackError {
    /// Backend operational failure
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// Another backend operation is in flight
    #[error("Backend is busy")]
    Busy,

    /// No stream is loaded
    #[error("No stream loaded")]
    NotLoaded,

    /// `load_stream` called while a stream is loaded
    #[error("A stream is already loaded")]
    AlreadyLoaded,

    /// Position or duration query failed
    #[error("Failed to query {0}")]
    QueryFailed(&'static str),

    /// Playlist resolved to no tracks
    #[error("Playlist {0} has no tracks")]
    EmptyPlaylist(PlaylistId),

    /// Playlist does not exist
    #[error("Playlist not found: {0}")]
    PlaylistNotFound(PlaylistId),

    /// Track number outside the playlist
    #[error("Track {track_number} not found in playlist {playlist}")]
    TrackNotFound {
        playlist: PlaylistId,
        track_number: usize,
    },

    /// Sub-task name was never registered
    #[error("Unknown sub-task: {0}")]
    UnknownSubtask(String),

    /// Sub-task name registered twice
    #[error("Sub-task already registered: {0}")]
    DuplicateSubtask(String),

    /// Gateway failure
    #[error(transparent)]
    Storage(#[from] TomeError),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// The player service has shut down
    #[error("Player service stopped")]
    Stopped,
}

impl PlaybackError {
    /// Whether the command queue may drop the command and continue
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Backend(_))
    }
}

/// Result type for playback operations
pub type Result<T> = std::result::Result<T, PlaybackError>;
