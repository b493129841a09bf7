//! Playback state machine
//!
//! The player holds the loaded playlist and the active stream, exposes the
//! transport API and behaves differently in each state:
//!
//! | State | load_playlist | set_track | play | pause | stop | seek | unload_playlist |
//! |---|---|---|---|---|---|---|---|
//! | NoPlaylistLoaded | load, Paused | - | - | - | - | - | - |
//! | Paused | replace, Paused | reload | Playing | - | rewind to 0 | yes | NoPlaylistLoaded |
//! | Playing | replace, Paused | reload and play | - | Paused | Paused | yes | NoPlaylistLoaded |
//!
//! Operations marked `-` log a warning and do nothing. Device work goes
//! through the `CommandQueue`; backend notifications come back through
//! `handle_backend_event`.

use crate::backend::{BackendEvent, StreamBackend};
use crate::config::PlayerConfig;
use crate::error::{PlaybackError, Result};
use crate::events::{EventKind, Notifier, PlayerEvent, StateTag, SubscriptionId};
use crate::pipeline::{PipelineFactory, PipelineMessage};
use crate::queue::CommandQueue;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tome_core::{
    BookData, PlaylistGateway, PlaylistId, PositionData, PositionGateway, StreamData, StreamTime,
    TimeUnit,
};

/// Named relative seeks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeekAmount {
    ForwardLong,
    ForwardShort,
    ReverseLong,
    ReverseShort,
}

impl SeekAmount {
    /// Signed offset for this amount
    pub fn delta(self, config: &PlayerConfig) -> StreamTime {
        let secs = |value: u64| StreamTime::from_secs(i64::try_from(value).unwrap_or(i64::MAX));
        match self {
            Self::ForwardLong => secs(config.seek_long_secs),
            Self::ForwardShort => secs(config.seek_short_secs),
            Self::ReverseLong => -secs(config.seek_long_secs),
            Self::ReverseShort => -secs(config.seek_short_secs),
        }
    }
}

/// Loaded playlist and its active stream
#[derive(Debug, Clone)]
struct Session {
    book: BookData,
    stream: StreamData,
}

#[derive(Debug)]
enum PlayerState {
    NoPlaylistLoaded,
    Paused(Session),
    Playing(Session),
}

impl PlayerState {
    fn tag(&self) -> StateTag {
        match self {
            Self::NoPlaylistLoaded => StateTag::NoPlaylistLoaded,
            Self::Paused(_) => StateTag::Paused,
            Self::Playing(_) => StateTag::Playing,
        }
    }

    fn session(&self) -> Option<&Session> {
        match self {
            Self::NoPlaylistLoaded => None,
            Self::Paused(session) | Self::Playing(session) => Some(session),
        }
    }

    fn session_mut(&mut self) -> Option<&mut Session> {
        match self {
            Self::NoPlaylistLoaded => None,
            Self::Paused(session) | Self::Playing(session) => Some(session),
        }
    }

    fn into_session(self) -> Option<Session> {
        match self {
            Self::NoPlaylistLoaded => None,
            Self::Paused(session) | Self::Playing(session) => Some(session),
        }
    }
}

/// Whether advancing from `current` to `next` means the playlist ran out
///
/// Advancing always wraps to the first track, so a track number that did not
/// grow marks the end. Non-sequential numbering would break this.
fn playlist_finished(current: usize, next: usize) -> bool {
    next <= current
}

/// Whether enough whole seconds passed since the last checkpoint
fn checkpoint_due(now: StreamTime, last_saved: StreamTime, interval_secs: u64) -> bool {
    let elapsed = (now.get(TimeUnit::Seconds) - last_saved.get(TimeUnit::Seconds)).abs();
    elapsed >= i64::try_from(interval_secs).unwrap_or(i64::MAX)
}

/// Build the stream to resume `book` at
fn resume_stream(book: &BookData, saved: Option<PositionData>) -> Result<StreamData> {
    let first = book
        .track(0)
        .ok_or(PlaybackError::EmptyPlaylist(book.playlist_id()))?;
    let start = PositionData::start_of(book.playlist_id(), first.pl_track_id);

    let (track_number, position) = match saved {
        Some(saved) => match book.position_of(saved.pl_track_id) {
            Some(track_number) => (
                track_number,
                PositionData {
                    playlist_id: book.playlist_id(),
                    ..saved
                },
            ),
            None => {
                tracing::warn!(
                    playlist = %book.playlist_id(),
                    pl_track_id = %saved.pl_track_id,
                    "Saved position points to a missing track, starting over"
                );
                (0, start)
            }
        },
        None => (0, start),
    };

    let track = book.track(track_number).unwrap_or(first);
    Ok(StreamData {
        path: track.file_path.clone(),
        duration: None,
        track_number,
        last_saved_position: position.time,
        position_data: position,
    })
}

/// Receiving ends of the channels the backend posts to
///
/// Kept apart from `Player` so an event loop can wait on them while holding
/// the player mutably.
pub struct PlayerInbox {
    pub(crate) bus: UnboundedReceiver<PipelineMessage>,
    pub(crate) events: UnboundedReceiver<BackendEvent>,
}

impl PlayerInbox {
    /// Deliver everything posted so far and step the backend until nothing
    /// more happens
    pub async fn run_until_idle(&mut self, player: &mut Player) -> Result<()> {
        loop {
            let mut progressed = false;

            while let Ok(message) = self.bus.try_recv() {
                player.handle_pipeline_message(message)?;
                progressed = true;
            }
            while let Ok(event) = self.events.try_recv() {
                player.handle_backend_event(event).await?;
                progressed = true;
            }
            if player.needs_tick() {
                progressed |= player.tick()?;
            }

            if !progressed {
                return Ok(());
            }
        }
    }
}

/// The playback controller
pub struct Player {
    state: PlayerState,
    queue: CommandQueue,
    positions: Arc<dyn PositionGateway>,
    library: Arc<dyn PlaylistGateway>,
    notifier: Notifier,
    config: PlayerConfig,
}

impl Player {
    pub fn new(
        factory: Box<dyn PipelineFactory>,
        positions: Arc<dyn PositionGateway>,
        library: Arc<dyn PlaylistGateway>,
        config: PlayerConfig,
    ) -> Result<(Self, PlayerInbox)> {
        config.validate()?;

        let (bus_tx, bus) = mpsc::unbounded_channel();
        let (events_tx, events) = mpsc::unbounded_channel();
        let backend = StreamBackend::new(factory, bus_tx, events_tx)?;

        tracing::debug!("Player initialised");

        let player = Self {
            state: PlayerState::NoPlaylistLoaded,
            queue: CommandQueue::new(backend),
            positions,
            library,
            notifier: Notifier::new(),
            config,
        };
        Ok((player, PlayerInbox { bus, events }))
    }

    /// Player over one store that serves both gateways
    pub fn with_library<L>(
        factory: Box<dyn PipelineFactory>,
        library: Arc<L>,
        config: PlayerConfig,
    ) -> Result<(Self, PlayerInbox)>
    where
        L: PositionGateway + PlaylistGateway + 'static,
    {
        let positions: Arc<dyn PositionGateway> = library.clone();
        Self::new(factory, positions, library, config)
    }

    pub fn state_tag(&self) -> StateTag {
        self.state.tag()
    }

    pub fn book(&self) -> Option<&BookData> {
        self.state.session().map(|session| &session.book)
    }

    pub fn stream(&self) -> Option<&StreamData> {
        self.state.session().map(|session| &session.stream)
    }

    pub fn queue(&self) -> &CommandQueue {
        &self.queue
    }

    pub fn config(&self) -> &PlayerConfig {
        &self.config
    }

    pub fn subscribe(&mut self) -> (SubscriptionId, UnboundedReceiver<PlayerEvent>) {
        self.notifier.subscribe()
    }

    pub fn subscribe_to(&mut self, kind: EventKind) -> (SubscriptionId, UnboundedReceiver<PlayerEvent>) {
        self.notifier.subscribe_to(kind)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.notifier.unsubscribe(id)
    }

    fn emit(&mut self, event: PlayerEvent) {
        self.notifier.emit(&event);
    }

    fn ignored(&self, operation: &'static str) {
        tracing::warn!(
            operation,
            state = ?self.state.tag(),
            "Operation not available in current state"
        );
    }

    fn announce(&mut self, from: StateTag) {
        let to = self.state.tag();
        if from != to {
            tracing::info!(?from, ?to, "Player state changed");
            self.emit(PlayerEvent::EnterState(to));
        }
    }

    /// Move the current session into another state
    fn switch(&mut self, to: StateTag) {
        let previous = std::mem::replace(&mut self.state, PlayerState::NoPlaylistLoaded);
        let from = previous.tag();
        self.state = match (previous.into_session(), to) {
            (Some(session), StateTag::Paused) => PlayerState::Paused(session),
            (Some(session), StateTag::Playing) => PlayerState::Playing(session),
            (_, StateTag::NoPlaylistLoaded) | (None, _) => PlayerState::NoPlaylistLoaded,
        };
        self.announce(from);
    }

    /// Load a playlist at its saved position, replacing any loaded one
    ///
    /// Fails without changing state if the playlist is missing or empty.
    pub async fn load_playlist(&mut self, playlist_id: PlaylistId) -> Result<()> {
        let book = self
            .library
            .load_book(playlist_id)
            .await?
            .ok_or(PlaybackError::PlaylistNotFound(playlist_id))?;
        if book.is_empty() {
            return Err(PlaybackError::EmptyPlaylist(playlist_id));
        }

        let saved = self.positions.get_position(playlist_id).await?;
        let stream = resume_stream(&book, saved)?;

        if self.state.session().is_some() && self.config.save_on_unload {
            self.save_position().await?;
        }
        self.queue.reload(stream.clone(), false)?;

        tracing::info!(
            playlist = %playlist_id,
            title = %book.playlist.title,
            track = stream.track_number,
            start = %stream.start_position(),
            "Playlist loaded"
        );

        let from = self.state.tag();
        self.state = PlayerState::Paused(Session {
            book: book.clone(),
            stream: stream.clone(),
        });
        self.emit(PlayerEvent::PlaylistLoaded(book));
        self.emit(PlayerEvent::StreamUpdated(stream));
        self.announce(from);
        Ok(())
    }

    /// Switch to another track of the playlist, starting at 0
    pub fn set_track(&mut self, track_number: usize) -> Result<()> {
        let playing = self.state.tag() == StateTag::Playing;
        let Some(session) = self.state.session_mut() else {
            self.ignored("set_track");
            return Ok(());
        };

        let playlist_id = session.book.playlist_id();
        let track = session
            .book
            .track(track_number)
            .ok_or(PlaybackError::TrackNotFound {
                playlist: playlist_id,
                track_number,
            })?;
        let stream = StreamData {
            path: track.file_path.clone(),
            duration: None,
            track_number,
            last_saved_position: StreamTime::ZERO,
            position_data: PositionData::start_of(playlist_id, track.pl_track_id),
        };
        session.stream = stream.clone();

        self.queue.reload(stream.clone(), playing)?;

        tracing::info!(playlist = %playlist_id, track = track_number, "Track selected");
        self.emit(PlayerEvent::StreamUpdated(stream));
        Ok(())
    }

    /// Move `delta` tracks, wrapping at both ends; returns the new track
    pub fn set_track_relative(&mut self, delta: i64) -> Result<Option<usize>> {
        let Some(session) = self.state.session() else {
            self.ignored("set_track_relative");
            return Ok(None);
        };
        let Some(next) = session
            .book
            .wrapped_track_number(session.stream.track_number, delta)
        else {
            return Ok(None);
        };

        self.set_track(next)?;
        Ok(Some(next))
    }

    pub fn play(&mut self) -> Result<()> {
        if self.state.tag() != StateTag::Paused {
            self.ignored("play");
            return Ok(());
        }
        self.queue.play()?;
        self.switch(StateTag::Playing);
        Ok(())
    }

    pub fn pause(&mut self) -> Result<()> {
        if self.state.tag() != StateTag::Playing {
            self.ignored("pause");
            return Ok(());
        }
        self.queue.pause()?;
        self.switch(StateTag::Paused);
        Ok(())
    }

    /// Pause when playing, rewind to the start when paused
    pub fn stop(&mut self) -> Result<()> {
        match self.state.tag() {
            StateTag::Playing => self.pause(),
            StateTag::Paused => {
                self.queue.set_position(StreamTime::ZERO)?;
                if let Some(session) = self.state.session_mut() {
                    session.stream.position_data.time = StreamTime::ZERO;
                }
                self.emit(PlayerEvent::PositionUpdated(StreamTime::ZERO));
                Ok(())
            }
            StateTag::NoPlaylistLoaded => {
                self.ignored("stop");
                Ok(())
            }
        }
    }

    /// Seek relative to the most recent known or pending position
    pub fn seek(&mut self, amount: SeekAmount) -> Result<bool> {
        let Some(session) = self.state.session() else {
            self.ignored("seek");
            return Ok(false);
        };

        let current = match self.queue.query_position() {
            Ok(position) => position,
            Err(err) => {
                tracing::debug!(error = %err, "Position query failed, using last known position");
                session.stream.position_data.time
            }
        };
        self.go_to_position(current + amount.delta(&self.config))
    }

    /// Seek to `position` if it lies strictly inside the stream
    pub fn go_to_position(&mut self, position: StreamTime) -> Result<bool> {
        let Some(session) = self.state.session() else {
            self.ignored("go_to_position");
            return Ok(false);
        };

        let Some(duration) = session.stream.duration else {
            tracing::debug!(%position, "Duration unknown, seek rejected");
            return Ok(false);
        };
        if position <= StreamTime::ZERO || position >= duration {
            tracing::debug!(%position, %duration, "Seek out of range");
            return Ok(false);
        }

        self.queue.set_position(position)?;
        Ok(true)
    }

    pub async fn unload_playlist(&mut self) -> Result<()> {
        if self.state.session().is_none() {
            self.ignored("unload_playlist");
            return Ok(());
        }

        if self.config.save_on_unload {
            self.save_position().await?;
        }
        self.queue.unload_stream()?;

        tracing::info!("Playlist unloaded");
        self.switch(StateTag::NoPlaylistLoaded);
        self.emit(PlayerEvent::PlaylistUnloaded);
        Ok(())
    }

    /// Persist the current position now; `false` if nothing is loaded
    pub async fn save_position(&mut self) -> Result<bool> {
        let Some(position) = self.stream().map(|stream| stream.position_data) else {
            return Ok(false);
        };

        self.positions.save_position(&position).await?;
        tracing::debug!(
            playlist = %position.playlist_id,
            time = %position.time,
            "Position saved"
        );

        if let Some(session) = self.state.session_mut() {
            session.stream.last_saved_position = position.time;
        }
        Ok(true)
    }

    /// React to a backend notification
    pub async fn handle_backend_event(&mut self, event: BackendEvent) -> Result<()> {
        match event {
            BackendEvent::Ready => self.queue.on_ready(),
            BackendEvent::DurationReady(duration) => {
                if let Some(session) = self.state.session_mut() {
                    session.stream.duration = Some(duration);
                    let stream = session.stream.clone();
                    self.emit(PlayerEvent::StreamUpdated(stream));
                }
                Ok(())
            }
            BackendEvent::TimeUpdated(position) => self.update_time(position).await,
            BackendEvent::EndOfStream => self.end_of_stream().await,
            BackendEvent::PipelineError(message) => {
                self.emit(PlayerEvent::Error { message });
                Ok(())
            }
        }
    }

    async fn update_time(&mut self, position: StreamTime) -> Result<()> {
        let Some(session) = self.state.session_mut() else {
            return Ok(());
        };
        session.stream.position_data.time = position;
        let due = checkpoint_due(
            position,
            session.stream.last_saved_position,
            self.config.checkpoint_interval_secs,
        );

        self.emit(PlayerEvent::PositionUpdated(position));
        if due {
            self.save_position().await?;
        }
        Ok(())
    }

    async fn end_of_stream(&mut self) -> Result<()> {
        let Some(session) = self.state.session() else {
            tracing::debug!("End of stream without a playlist, ignoring");
            return Ok(());
        };
        let current = session.stream.track_number;
        let Some(next) = session.book.wrapped_track_number(current, 1) else {
            return Ok(());
        };

        if playlist_finished(current, next) {
            tracing::info!(playlist = %session.book.playlist_id(), "Playlist finished");
            self.switch(StateTag::Paused);
            self.set_track(next)?;
            self.save_position().await?;
            self.emit(PlayerEvent::PlaylistFinished);
        } else {
            tracing::debug!(track = next, "Advancing to next track");
            self.set_track(next)?;
        }
        Ok(())
    }

    pub fn handle_pipeline_message(&mut self, message: PipelineMessage) -> Result<()> {
        self.queue.backend_mut().handle_message(message)
    }

    /// Whether `tick` has work to do
    pub fn needs_tick(&self) -> bool {
        self.queue.backend().needs_tick()
    }

    /// Step the backend load procedure; `true` if anything changed
    pub fn tick(&mut self) -> Result<bool> {
        self.queue.backend_mut().controller_step()
    }

    /// Ask the backend for a position update
    pub fn refresh_time(&self) {
        self.queue.backend().refresh_time();
    }
}

impl std::fmt::Debug for Player {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Player")
            .field("state", &self.state)
            .field("queue", &self.queue)
            .field("notifier", &self.notifier)
            .finish_non_exhaustive()
    }
}
