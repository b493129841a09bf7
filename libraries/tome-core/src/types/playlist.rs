//! Playlist and track list types

use super::ids::{PlTrackId, PlaylistId};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Playlist metadata as stored
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaylistInfo {
    /// Playlist ID
    pub id: PlaylistId,

    /// Display title
    pub title: String,

    /// Directory the playlist was created from
    pub path: PathBuf,
}

/// One entry of a playlist's ordered track list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackEntry {
    /// Zero-based position in the playlist. Stored numbers may have gaps;
    /// `BookData::new` renumbers them to list positions
    pub track_number: usize,

    /// Stable per-playlist track identifier
    pub pl_track_id: PlTrackId,

    /// File to stream
    pub file_path: PathBuf,
}

/// A loaded playlist: metadata plus its ordered tracks
///
/// Owned by the player for as long as the playlist stays loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookData {
    /// Playlist metadata
    pub playlist: PlaylistInfo,

    /// Tracks ordered by track number, numbered from 0 without gaps
    pub tracks: Vec<TrackEntry>,
}

impl BookData {
    /// Create book data, ordering tracks by their stored number and then
    /// renumbering them to their position in the list
    pub fn new(playlist: PlaylistInfo, mut tracks: Vec<TrackEntry>) -> Self {
        tracks.sort_by_key(|track| track.track_number);
        for (position, track) in tracks.iter_mut().enumerate() {
            track.track_number = position;
        }
        Self { playlist, tracks }
    }

    /// Playlist ID
    pub fn playlist_id(&self) -> PlaylistId {
        self.playlist.id
    }

    /// Number of tracks
    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    /// Whether the track list is empty
    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// Track at a position; equal to its `track_number`
    pub fn track(&self, track_number: usize) -> Option<&TrackEntry> {
        self.tracks.get(track_number)
    }

    /// Position of the track with the given stable id
    pub fn position_of(&self, pl_track_id: PlTrackId) -> Option<usize> {
        self.tracks
            .iter()
            .position(|track| track.pl_track_id == pl_track_id)
    }

    /// Track number reached by moving `delta` tracks from `from`, wrapping at
    /// both ends of the list
    pub fn wrapped_track_number(&self, from: usize, delta: i64) -> Option<usize> {
        if self.tracks.is_empty() {
            return None;
        }
        let len = self.tracks.len() as i64;
        Some((from as i64 + delta).rem_euclid(len) as usize)
    }
}
