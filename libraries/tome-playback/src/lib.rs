//! Tome - Playback Control
//!
//! Drives an audiobook player on top of a streaming media pipeline.
//!
//! This crate provides:
//! - A sub-task ledger that reports when a multi-step operation is done
//! - A backend adapter turning an asynchronous pipeline into busy/accepted
//!   operations with a single readiness notification
//! - A LIFO command queue in front of the backend that coalesces seeks
//! - The player state machine (no playlist, paused, playing) with position
//!   checkpoints and end-of-playlist handling
//! - A tokio service and handle wiring it all together
//!
//! # Architecture
//!
//! `tome-playback` does not decode audio itself. The media framework is
//! reached through the `Pipeline` and `PipelineFactory` traits; positions and
//! playlists come from the `tome-core` gateways, which `tome-storage`
//! implements.
//!
//! `ManualPipelineFactory` is a pipeline whose asynchronous steps complete on
//! their own or on request, which makes the whole player testable without a
//! media framework.
//!
//! # Example: Driving a Player
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tome_playback::{ManualPipelineFactory, Player, PlayerConfig, PlayerService};
//! use tome_storage::SqliteLibrary;
//! use tome_core::PlaylistId;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let library = Arc::new(SqliteLibrary::open("sqlite://tome.db").await?);
//! let (player, inbox) = Player::with_library(
//!     Box::new(ManualPipelineFactory::new()),
//!     library,
//!     PlayerConfig::load(None)?,
//! )?;
//!
//! let (handle, task) = PlayerService::spawn(player, inbox);
//! handle.load_playlist(PlaylistId::new(1)).await?;
//! handle.play();
//!
//! handle.shutdown();
//! task.await?;
//! # Ok(())
//! # }
//! ```

mod backend;
mod config;
mod coordinator;
mod error;
mod events;
pub mod pipeline;
mod player;
mod queue;
mod service;

pub use backend::{BackendEvent, StreamBackend};
pub use config::PlayerConfig;
pub use coordinator::TaskCoordinator;
pub use error::{BackendError, PlaybackError, Result};
pub use events::{EventKind, Notifier, PlayerEvent, StateTag, SubscriptionId};
pub use pipeline::{
    ManualPipeline, ManualPipelineFactory, Pipeline, PipelineCall, PipelineFactory,
    PipelineMessage, PipelineState, StateChange,
};
pub use player::{Player, PlayerInbox, SeekAmount};
pub use queue::{Command, CommandQueue};
pub use service::{PlayerHandle, PlayerService, PlayerStatus, PlaylistEvent};
