//! In-memory gateways
//!
//! Mirrors `SqliteLibrary` without a database. Every saved checkpoint is kept
//! so callers can inspect the save history.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};
use tome_core::{error::Result, types::*, PlaylistGateway, PositionGateway, TomeError};

#[derive(Default)]
struct Inner {
    playlists: HashMap<PlaylistId, BookData>,
    positions: HashMap<PlaylistId, PositionData>,
    saves: Vec<PositionData>,
    next_playlist_id: i64,
    next_track_id: i64,
    fail_saves: bool,
}

/// Playlists and checkpoints held in memory
#[derive(Default)]
pub struct MemoryLibrary {
    inner: Mutex<Inner>,
}

impl MemoryLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Add a playlist whose tracks are `files` in order
    pub fn add_playlist<I, P>(&self, title: &str, files: I) -> BookData
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        let mut inner = self.lock();

        inner.next_playlist_id += 1;
        let id = PlaylistId::new(inner.next_playlist_id);

        let mut tracks = Vec::new();
        for (track_number, file) in files.into_iter().enumerate() {
            inner.next_track_id += 1;
            tracks.push(TrackEntry {
                track_number,
                pl_track_id: PlTrackId::new(inner.next_track_id),
                file_path: file.into(),
            });
        }

        let playlist = PlaylistInfo {
            id,
            title: title.to_string(),
            path: PathBuf::from(format!("/playlists/{}", id)),
        };
        let book = BookData::new(playlist, tracks);
        inner.playlists.insert(id, book.clone());
        book
    }

    /// Store a checkpoint without recording it as a save
    pub fn set_position(&self, position: PositionData) {
        self.lock().positions.insert(position.playlist_id, position);
    }

    /// Current checkpoint of a playlist
    pub fn position(&self, playlist_id: PlaylistId) -> Option<PositionData> {
        self.lock().positions.get(&playlist_id).copied()
    }

    /// Every checkpoint passed to `save_position`, oldest first
    pub fn saved_positions(&self) -> Vec<PositionData> {
        self.lock().saves.clone()
    }

    pub fn save_count(&self) -> usize {
        self.lock().saves.len()
    }

    /// Make subsequent `save_position` calls fail
    pub fn fail_saves(&self, fail: bool) {
        self.lock().fail_saves = fail;
    }
}

#[async_trait]
impl PositionGateway for MemoryLibrary {
    async fn get_position(&self, playlist_id: PlaylistId) -> Result<Option<PositionData>> {
        Ok(self.position(playlist_id))
    }

    async fn save_position(&self, position: &PositionData) -> Result<()> {
        let mut inner = self.lock();
        if inner.fail_saves {
            return Err(TomeError::storage("save rejected"));
        }
        inner.positions.insert(position.playlist_id, *position);
        inner.saves.push(*position);
        Ok(())
    }
}

#[async_trait]
impl PlaylistGateway for MemoryLibrary {
    async fn get_by_id(&self, playlist_id: PlaylistId) -> Result<Option<PlaylistInfo>> {
        Ok(self
            .lock()
            .playlists
            .get(&playlist_id)
            .map(|book| book.playlist.clone()))
    }

    async fn get_track_list_by_playlist_id(
        &self,
        playlist_id: PlaylistId,
    ) -> Result<Vec<TrackEntry>> {
        Ok(self
            .lock()
            .playlists
            .get(&playlist_id)
            .map(|book| book.tracks.clone())
            .unwrap_or_default())
    }

    async fn load_book(&self, playlist_id: PlaylistId) -> Result<Option<BookData>> {
        Ok(self.lock().playlists.get(&playlist_id).cloned())
    }
}
