//! Tome Core
//!
//! Platform-agnostic types, gateway traits and error handling shared by the
//! Tome playback and storage crates.
//!
//! # Architecture
//!
//! The core crate defines:
//! - **Time**: `StreamTime`, a signed nanosecond value with unit conversion
//! - **Domain Types**: `PositionData`, `StreamData`, `BookData`
//! - **Gateways**: `PositionGateway` and `PlaylistGateway`, implemented by storage
//! - **Error Handling**: `TomeError` and `Result`
//!
//! # Example
//!
//! ```rust
//! use tome_core::types::{StreamTime, TimeUnit};
//!
//! let chapter = StreamTime::new(200, TimeUnit::Seconds);
//! assert_eq!(chapter.clock_value(TimeUnit::Minutes), 3);
//! assert_eq!(chapter.clock_value(TimeUnit::Seconds), 20);
//! assert_eq!(chapter.to_string(), "03:20");
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod gateway;
pub mod types;

pub use error::{Result, TomeError};
pub use gateway::{PlaylistGateway, PositionGateway};
pub use types::{
    BookData, PlTrackId, PlaylistId, PlaylistInfo, PositionData, StreamData, StreamTime,
    TimeUnit, TrackEntry,
};
