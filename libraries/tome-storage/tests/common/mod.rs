//! Test helpers for storage integration tests
//!
//! Databases are real SQLite files in a temp dir so migrations, constraints
//! and cascades behave as in production.

use sqlx::SqlitePool;
use std::path::Path;
use tempfile::TempDir;
use tome_core::types::*;
use tome_storage::SqliteLibrary;

/// Test database wrapper that cleans up on drop
pub struct TestDb {
    pub library: SqliteLibrary,
    _temp_dir: TempDir,
}

impl TestDb {
    /// Create a new test database with migrations applied
    pub async fn new() -> Self {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("test.db");
        let db_url = format!("sqlite://{}", db_path.display());

        let library = SqliteLibrary::open(&db_url)
            .await
            .expect("Failed to open library");

        Self {
            library,
            _temp_dir: temp_dir,
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        self.library.pool()
    }
}

/// Test fixture: playlist with one track per file
pub async fn create_test_playlist(pool: &SqlitePool, title: &str, files: &[&str]) -> BookData {
    let playlist = tome_storage::playlists::create(pool, title, Path::new(&format!("/books/{title}")))
        .await
        .expect("Failed to create playlist");

    let mut tracks = Vec::new();
    for file in files {
        tracks.push(
            tome_storage::tracks::append(pool, playlist.id, Path::new(file))
                .await
                .expect("Failed to append track"),
        );
    }

    BookData::new(playlist, tracks)
}
