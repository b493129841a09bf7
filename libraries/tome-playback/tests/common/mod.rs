//! Shared helpers for player integration tests

#![allow(dead_code)]

use std::sync::{Arc, Once};
use tokio::sync::mpsc::UnboundedReceiver;
use tome_core::{BookData, StreamTime};
use tome_playback::{ManualPipelineFactory, Player, PlayerConfig, PlayerEvent, PlayerInbox};
use tome_storage::MemoryLibrary;
use tracing_subscriber::EnvFilter;

static TRACING: Once = Once::new();

/// Route tracing output through the test harness (`RUST_LOG=debug` to see it)
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// A player over a manual pipeline and an in-memory library
pub struct Rig {
    pub player: Player,
    pub inbox: PlayerInbox,
    pub pipeline: ManualPipelineFactory,
    pub library: Arc<MemoryLibrary>,
    pub events: UnboundedReceiver<PlayerEvent>,
}

impl Rig {
    pub fn new() -> Self {
        Self::with_config(PlayerConfig::default())
    }

    pub fn with_config(config: PlayerConfig) -> Self {
        init_tracing();

        let pipeline = ManualPipelineFactory::new();
        let library = Arc::new(MemoryLibrary::new());
        let (mut player, inbox) =
            Player::with_library(Box::new(pipeline.clone()), library.clone(), config).unwrap();
        let (_, events) = player.subscribe();

        Self {
            player,
            inbox,
            pipeline,
            library,
            events,
        }
    }

    /// Add a playlist whose tracks have the given durations in seconds
    pub fn add_book(&self, title: &str, durations: &[i64]) -> BookData {
        let files: Vec<String> = (0..durations.len())
            .map(|n| format!("/books/{title}/{n:02}.ogg"))
            .collect();
        for (file, secs) in files.iter().zip(durations) {
            self.pipeline
                .set_duration(file.as_str(), StreamTime::from_secs(*secs));
        }
        self.library.add_playlist(title, files)
    }

    pub async fn settle(&mut self) {
        self.inbox.run_until_idle(&mut self.player).await.unwrap();
    }

    /// Events emitted since the last call
    pub fn drain_events(&mut self) -> Vec<PlayerEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }
}
