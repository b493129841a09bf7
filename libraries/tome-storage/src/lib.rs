//! Tome Storage
//!
//! `SQLite` implementation of the Tome gateways, plus an in-memory library for
//! tests and embedding.
//!
//! # Architecture
//!
//! - **Vertical Slicing**: `playlists`, `tracks` and `positions` each own their queries
//! - **Gateways**: `SqliteLibrary` implements `PositionGateway` and `PlaylistGateway`
//! - **Unit of Work**: reading a playlist with its tracks happens in one transaction
//!
//! # Example
//!
//! ```rust,no_run
//! use tome_core::{PlaylistGateway, PlaylistId};
//! use tome_storage::SqliteLibrary;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let library = SqliteLibrary::open("sqlite://tome.db").await?;
//!
//! if let Some(book) = library.load_book(PlaylistId::new(1)).await? {
//!     println!("{} has {} tracks", book.playlist.title, book.len());
//! }
//! # Ok(())
//! # }
//! ```

mod context;
mod error;
mod memory;

// Vertical slices
pub mod playlists;
pub mod positions;
pub mod tracks;

pub use context::SqliteLibrary;
pub use error::StorageError;
pub use memory::MemoryLibrary;

use sqlx::migrate::Migrator;
use sqlx::sqlite::SqlitePool;

// Embed migrations into binary
static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// Run database migrations
///
/// # Errors
///
/// Returns an error if migrations fail to run
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::migrate::MigrateError> {
    MIGRATOR.run(pool).await
}

/// Create a new `SQLite` pool
///
/// # Arguments
///
/// * `database_url` - `SQLite` connection string (e.g., `<sqlite://tome.db>`)
///
/// # Errors
///
/// Returns an error if the connection fails
pub async fn create_pool(database_url: &str) -> Result<SqlitePool, sqlx::Error> {
    use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
    use std::str::FromStr;

    tracing::debug!(url = database_url, "Creating SQLite pool");

    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .foreign_keys(true)
        .busy_timeout(std::time::Duration::from_secs(30));

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    tracing::info!(url = database_url, "SQLite pool ready");

    Ok(pool)
}
