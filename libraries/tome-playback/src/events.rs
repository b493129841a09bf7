//! Player events
//!
//! Notifications for the UI layer. Subscribers receive events on an unbounded
//! channel, either every event or only one kind. Subscriptions end with an
//! explicit `unsubscribe` or when the receiver is dropped.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tome_core::{BookData, StreamData, StreamTime};

/// Player state as seen from outside
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateTag {
    NoPlaylistLoaded,
    Paused,
    Playing,
}

/// Events emitted by the player
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum PlayerEvent {
    /// The active stream changed or gained its duration
    StreamUpdated(StreamData),

    /// Position update while playing, or after a reset
    PositionUpdated(StreamTime),

    /// A playlist was loaded
    PlaylistLoaded(BookData),

    /// The playlist was unloaded
    PlaylistUnloaded,

    /// The last track ended; playback is back at the first track
    PlaylistFinished,

    /// The player entered a state
    EnterState(StateTag),

    /// The pipeline reported an error
    Error {
        /// Message from the pipeline
        message: String,
    },
}

/// Discriminant of `PlayerEvent`, used to filter subscriptions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    StreamUpdated,
    PositionUpdated,
    PlaylistLoaded,
    PlaylistUnloaded,
    PlaylistFinished,
    EnterState,
    Error,
}

impl PlayerEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::StreamUpdated(_) => EventKind::StreamUpdated,
            Self::PositionUpdated(_) => EventKind::PositionUpdated,
            Self::PlaylistLoaded(_) => EventKind::PlaylistLoaded,
            Self::PlaylistUnloaded => EventKind::PlaylistUnloaded,
            Self::PlaylistFinished => EventKind::PlaylistFinished,
            Self::EnterState(_) => EventKind::EnterState,
            Self::Error { .. } => EventKind::Error,
        }
    }
}

/// Handle identifying one subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Subscriber {
    id: SubscriptionId,
    kind: Option<EventKind>,
    sender: UnboundedSender<PlayerEvent>,
}

/// Fans player events out to subscribers
#[derive(Default)]
pub struct Notifier {
    subscribers: Vec<Subscriber>,
    next_id: u64,
}

impl Notifier {
    pub fn new() -> Self {
        Self::default()
    }

    fn add(&mut self, kind: Option<EventKind>) -> (SubscriptionId, UnboundedReceiver<PlayerEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.next_id += 1;
        let id = SubscriptionId(self.next_id);
        self.subscribers.push(Subscriber { id, kind, sender });
        (id, receiver)
    }

    /// Receive every event
    pub fn subscribe(&mut self) -> (SubscriptionId, UnboundedReceiver<PlayerEvent>) {
        self.add(None)
    }

    /// Receive events of one kind
    pub fn subscribe_to(
        &mut self,
        kind: EventKind,
    ) -> (SubscriptionId, UnboundedReceiver<PlayerEvent>) {
        self.add(Some(kind))
    }

    /// End a subscription; `false` if it was already gone
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|subscriber| subscriber.id != id);
        self.subscribers.len() != before
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Deliver `event` to every matching subscriber, dropping closed ones
    pub fn emit(&mut self, event: &PlayerEvent) {
        let kind = event.kind();
        self.subscribers.retain(|subscriber| {
            if subscriber.kind.is_some_and(|wanted| wanted != kind) {
                return !subscriber.sender.is_closed();
            }
            subscriber.sender.send(event.clone()).is_ok()
        });
    }
}

impl std::fmt::Debug for Notifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notifier")
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}
