//! Command queue in front of the streaming backend
//!
//! Callers issue commands without checking whether the backend is busy. A
//! command runs at once when nothing is in progress; otherwise it waits for
//! the backend's next readiness notification. Pending commands run most
//! recent first, with two exceptions: a reload always runs unload, load, play
//! in that order, and a command issued while a load is pending runs after
//! that load, since it targets the new stream. A pending seek is retargeted
//! instead of queued twice.

use crate::backend::StreamBackend;
use crate::error::Result;
use std::collections::VecDeque;
use tome_core::{StreamData, StreamTime};

/// A backend operation waiting to run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    LoadStream(Box<StreamData>),
    UnloadStream,
    Play,
    Pause,
    SetPosition(StreamTime),
}

impl Command {
    fn name(&self) -> &'static str {
        match self {
            Self::LoadStream(_) => "load_stream",
            Self::UnloadStream => "unload_stream",
            Self::Play => "play",
            Self::Pause => "pause",
            Self::SetPosition(_) => "set_position",
        }
    }
}

/// Serializes commands into a `StreamBackend`
#[derive(Debug)]
pub struct CommandQueue {
    backend: StreamBackend,
    pending: VecDeque<Command>,
    in_progress: bool,
    subscribed: bool,
}

impl CommandQueue {
    pub fn new(backend: StreamBackend) -> Self {
        Self {
            backend,
            pending: VecDeque::new(),
            in_progress: false,
            subscribed: false,
        }
    }

    pub fn backend(&self) -> &StreamBackend {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut StreamBackend {
        &mut self.backend
    }

    /// Number of commands waiting
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Nothing waiting and nothing in progress
    pub fn is_idle(&self) -> bool {
        !self.in_progress && self.pending.is_empty()
    }

    pub fn load_stream(&mut self, stream: StreamData) -> Result<()> {
        self.push(Command::LoadStream(Box::new(stream)))
    }

    /// Queue an unload, dropping every pending command
    pub fn unload_stream(&mut self) -> Result<()> {
        self.drop_pending("unload_stream");
        self.push(Command::UnloadStream)
    }

    /// Replace the loaded stream, optionally starting playback
    ///
    /// Drops every pending command. The three steps run unload, load, play
    /// regardless of how busy the backend is when they are queued.
    pub fn reload(&mut self, stream: StreamData, play: bool) -> Result<()> {
        self.drop_pending("reload");
        tracing::trace!(path = %stream.path.display(), play, "Queueing reload");
        if play {
            self.pending.push_front(Command::Play);
        }
        self.pending.push_front(Command::LoadStream(Box::new(stream)));
        self.pending.push_front(Command::UnloadStream);
        self.drain_if_idle()
    }

    fn drop_pending(&mut self, reason: &'static str) {
        if !self.pending.is_empty() {
            tracing::debug!(dropped = self.pending.len(), reason, "Clearing pending commands");
            self.pending.clear();
        }
    }

    pub fn play(&mut self) -> Result<()> {
        self.push(Command::Play)
    }

    pub fn pause(&mut self) -> Result<()> {
        self.push(Command::Pause)
    }

    /// Queue a seek, retargeting one that is already pending
    pub fn set_position(&mut self, position: StreamTime) -> Result<()> {
        let queued = self.pending.iter_mut().find_map(|command| match command {
            Command::SetPosition(target) => Some(target),
            _ => None,
        });

        if let Some(target) = queued {
            tracing::debug!(from = %target, to = %position, "Coalescing pending seek");
            *target = position;
            return self.drain_if_idle();
        }

        self.push(Command::SetPosition(position))
    }

    /// Position the stream is at, or will be at once a pending seek runs
    pub fn query_position(&self) -> Result<StreamTime> {
        let queued = self.pending.iter().find_map(|command| match command {
            Command::SetPosition(target) => Some(*target),
            _ => None,
        });
        match queued {
            Some(target) => Ok(target),
            None => self.backend.query_position(),
        }
    }

    pub fn query_duration(&self) -> Result<StreamTime> {
        self.backend.query_duration()
    }

    /// The backend signalled readiness
    pub fn on_ready(&mut self) -> Result<()> {
        if self.subscribed {
            self.pop()
        } else {
            Ok(())
        }
    }

    fn push(&mut self, command: Command) -> Result<()> {
        tracing::trace!(command = command.name(), "Queueing command");

        let pending_load = self
            .pending
            .iter()
            .position(|queued| matches!(queued, Command::LoadStream(_)));

        match pending_load {
            Some(load) if !matches!(command, Command::UnloadStream | Command::LoadStream(_)) => {
                // Runs on the stream being loaded; a newer state change
                // replaces the one already waiting behind the load
                if matches!(command, Command::Play | Command::Pause) {
                    let mut index = 0;
                    self.pending.retain(|queued| {
                        let keep =
                            index <= load || !matches!(queued, Command::Play | Command::Pause);
                        index += 1;
                        keep
                    });
                }
                self.pending.insert(load + 1, command);
            }
            _ => self.pending.push_front(command),
        }

        self.drain_if_idle()
    }

    fn drain_if_idle(&mut self) -> Result<()> {
        if self.in_progress {
            return Ok(());
        }
        self.in_progress = true;
        self.pop()
    }

    fn pop(&mut self) -> Result<()> {
        loop {
            let Some(command) = self.pending.pop_front() else {
                self.in_progress = false;
                self.subscribed = false;
                return Ok(());
            };
            self.subscribed = true;

            match self.execute(&command) {
                Ok(true) => {
                    tracing::debug!(command = command.name(), "Command accepted");
                    // Operations that complete synchronously leave the
                    // backend idle; keep draining instead of waiting for a
                    // notification that is already behind us.
                    if self.backend.is_busy() {
                        return Ok(());
                    }
                }
                Ok(false) => {
                    tracing::trace!(command = command.name(), "Backend busy, waiting");
                    self.pending.push_front(command);
                    return Ok(());
                }
                Err(err) if err.is_recoverable() => {
                    tracing::warn!(command = command.name(), error = %err, "Backend command failed, skipping");
                }
                Err(err) => {
                    tracing::error!(command = command.name(), error = %err, "Command failed, clearing queue");
                    self.pending.clear();
                    self.in_progress = false;
                    self.subscribed = false;
                    return Err(err);
                }
            }
        }
    }

    fn execute(&mut self, command: &Command) -> Result<bool> {
        match command {
            Command::LoadStream(stream) => self.backend.load_stream(stream),
            Command::UnloadStream => self.backend.unload_stream(),
            Command::Play => self.backend.play(),
            Command::Pause => self.backend.pause(),
            Command::SetPosition(position) => self.backend.set_position(*position),
        }
    }
}
