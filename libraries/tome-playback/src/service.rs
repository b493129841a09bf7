//! Player service
//!
//! Runs a `Player` on a tokio task. Everything the player reacts to arrives
//! on that one task: commands from `PlayerHandle`, pipeline bus messages,
//! backend notifications, the load procedure tick and the position poll.

use crate::error::{PlaybackError, Result};
use crate::events::{EventKind, PlayerEvent, StateTag, SubscriptionId};
use crate::player::{Player, PlayerInbox, SeekAmount};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tome_core::{PlaylistId, StreamData, StreamTime};

/// Playlist browser notifications
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaylistEvent {
    /// A playlist was opened for listening
    Opened(PlaylistId),
    /// The open playlist was closed
    Closed,
}

/// Snapshot returned by `PlayerHandle::status`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerStatus {
    pub state: StateTag,
    pub stream: Option<StreamData>,
}

type Subscription = (SubscriptionId, UnboundedReceiver<PlayerEvent>);

enum PlayerCommand {
    LoadPlaylist {
        playlist_id: PlaylistId,
        reply: oneshot::Sender<Result<()>>,
    },
    UnloadPlaylist,
    SetTrack(usize),
    SetTrackRelative(i64),
    Play,
    Pause,
    Stop,
    Seek(SeekAmount),
    GoToPosition {
        position: StreamTime,
        reply: oneshot::Sender<Result<bool>>,
    },
    Status {
        reply: oneshot::Sender<PlayerStatus>,
    },
    Subscribe {
        kind: Option<EventKind>,
        reply: oneshot::Sender<Subscription>,
    },
    Unsubscribe(SubscriptionId),
    Playlist(PlaylistEvent),
    Shutdown,
}

/// Handle for controlling a running player service
#[derive(Clone)]
pub struct PlayerHandle {
    command_tx: UnboundedSender<PlayerCommand>,
}

impl PlayerHandle {
    fn send(&self, command: PlayerCommand) {
        if self.command_tx.send(command).is_err() {
            tracing::warn!("Player service stopped, command dropped");
        }
    }

    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> PlayerCommand) -> Result<T> {
        let (reply, response) = oneshot::channel();
        self.command_tx
            .send(make(reply))
            .map_err(|_| PlaybackError::Stopped)?;
        response.await.map_err(|_| PlaybackError::Stopped)
    }

    /// Load a playlist and wait until it is in place
    pub async fn load_playlist(&self, playlist_id: PlaylistId) -> Result<()> {
        self.request(|reply| PlayerCommand::LoadPlaylist { playlist_id, reply })
            .await?
    }

    pub fn unload_playlist(&self) {
        self.send(PlayerCommand::UnloadPlaylist);
    }

    pub fn set_track(&self, track_number: usize) {
        self.send(PlayerCommand::SetTrack(track_number));
    }

    pub fn set_track_relative(&self, delta: i64) {
        self.send(PlayerCommand::SetTrackRelative(delta));
    }

    pub fn play(&self) {
        self.send(PlayerCommand::Play);
    }

    pub fn pause(&self) {
        self.send(PlayerCommand::Pause);
    }

    pub fn stop(&self) {
        self.send(PlayerCommand::Stop);
    }

    pub fn seek(&self, amount: SeekAmount) {
        self.send(PlayerCommand::Seek(amount));
    }

    /// Seek to an absolute position; `false` if it is out of range
    pub async fn go_to_position(&self, position: StreamTime) -> Result<bool> {
        self.request(|reply| PlayerCommand::GoToPosition { position, reply })
            .await?
    }

    pub async fn status(&self) -> Result<PlayerStatus> {
        self.request(|reply| PlayerCommand::Status { reply }).await
    }

    pub async fn subscribe(&self) -> Result<Subscription> {
        self.request(|reply| PlayerCommand::Subscribe { kind: None, reply })
            .await
    }

    pub async fn subscribe_to(&self, kind: EventKind) -> Result<Subscription> {
        self.request(|reply| PlayerCommand::Subscribe {
            kind: Some(kind),
            reply,
        })
        .await
    }

    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.send(PlayerCommand::Unsubscribe(id));
    }

    /// Forward a playlist browser notification
    pub fn playlist_event(&self, event: PlaylistEvent) {
        self.send(PlayerCommand::Playlist(event));
    }

    /// Save the position and stop the service
    pub fn shutdown(&self) {
        self.send(PlayerCommand::Shutdown);
    }
}

/// Event loop owning a `Player`
pub struct PlayerService {
    player: Player,
    inbox: PlayerInbox,
    command_rx: UnboundedReceiver<PlayerCommand>,
}

impl PlayerService {
    /// Start the service on the current tokio runtime
    pub fn spawn(player: Player, inbox: PlayerInbox) -> (PlayerHandle, JoinHandle<()>) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let service = Self {
            player,
            inbox,
            command_rx,
        };
        let task = tokio::spawn(service.run());
        (PlayerHandle { command_tx }, task)
    }

    async fn run(self) {
        let Self {
            mut player,
            mut inbox,
            mut command_rx,
        } = self;

        let mut idle_tick = tokio::time::interval(player.config().idle_tick_interval());
        idle_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut position_poll = tokio::time::interval(player.config().position_poll_interval());
        position_poll.set_missed_tick_behavior(MissedTickBehavior::Skip);

        tracing::info!("Player service started");

        loop {
            tokio::select! {
                command = command_rx.recv() => match command {
                    Some(PlayerCommand::Shutdown) | None => break,
                    Some(command) => handle_command(&mut player, command).await,
                },
                Some(message) = inbox.bus.recv() => {
                    if let Err(err) = player.handle_pipeline_message(message) {
                        tracing::error!(error = %err, "Failed to handle pipeline message");
                    }
                }
                Some(event) = inbox.events.recv() => {
                    if let Err(err) = player.handle_backend_event(event).await {
                        tracing::error!(error = %err, "Failed to handle backend event");
                    }
                }
                _ = idle_tick.tick(), if player.needs_tick() => {
                    if let Err(err) = player.tick() {
                        tracing::error!(error = %err, "Backend step failed");
                    }
                }
                _ = position_poll.tick() => player.refresh_time(),
            }
        }

        if let Err(err) = player.save_position().await {
            tracing::warn!(error = %err, "Failed to save position on shutdown");
        }
        tracing::info!("Player service stopped");
    }
}

fn log_failure(operation: &'static str, result: Result<()>) {
    if let Err(err) = result {
        tracing::warn!(operation, error = %err, "Player command failed");
    }
}

async fn handle_command(player: &mut Player, command: PlayerCommand) {
    match command {
        PlayerCommand::LoadPlaylist { playlist_id, reply } => {
            let _ = reply.send(player.load_playlist(playlist_id).await);
        }
        PlayerCommand::UnloadPlaylist => {
            log_failure("unload_playlist", player.unload_playlist().await);
        }
        PlayerCommand::SetTrack(track_number) => {
            log_failure("set_track", player.set_track(track_number));
        }
        PlayerCommand::SetTrackRelative(delta) => {
            log_failure("set_track_relative", player.set_track_relative(delta).map(drop));
        }
        PlayerCommand::Play => log_failure("play", player.play()),
        PlayerCommand::Pause => log_failure("pause", player.pause()),
        PlayerCommand::Stop => log_failure("stop", player.stop()),
        PlayerCommand::Seek(amount) => {
            log_failure("seek", player.seek(amount).map(drop));
        }
        PlayerCommand::GoToPosition { position, reply } => {
            let _ = reply.send(player.go_to_position(position));
        }
        PlayerCommand::Status { reply } => {
            let _ = reply.send(PlayerStatus {
                state: player.state_tag(),
                stream: player.stream().cloned(),
            });
        }
        PlayerCommand::Subscribe { kind, reply } => {
            let subscription = match kind {
                Some(kind) => player.subscribe_to(kind),
                None => player.subscribe(),
            };
            let _ = reply.send(subscription);
        }
        PlayerCommand::Unsubscribe(id) => {
            player.unsubscribe(id);
        }
        PlayerCommand::Playlist(PlaylistEvent::Opened(playlist_id)) => {
            log_failure("load_playlist", player.load_playlist(playlist_id).await);
        }
        PlayerCommand::Playlist(PlaylistEvent::Closed) => {
            log_failure("unload_playlist", player.unload_playlist().await);
        }
        PlayerCommand::Shutdown => {}
    }
}
