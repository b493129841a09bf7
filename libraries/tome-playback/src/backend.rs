//! Streaming backend adapter
//!
//! Owns at most one pipeline and turns its asynchronous behaviour into
//! operations that return immediately with "accepted" (`Ok(true)`) or "busy"
//! (`Ok(false)`). Completion is reported later with a single
//! `BackendEvent::Ready`, posted when the sub-task ledger becomes idle.
//!
//! Loading is a multi-step procedure driven by `controller_step`, which the
//! owner calls on every idle tick while `needs_tick` is true:
//!
//! 1. wait for the pipeline to preroll into `Paused`
//! 2. apply the requested start position once
//! 3. wait for the duration, nudging the pipeline with a seek if needed
//! 4. end the load

use crate::coordinator::TaskCoordinator;
use crate::error::{BackendError, PlaybackError, Result};
use crate::pipeline::{
    BusSender, Pipeline, PipelineFactory, PipelineMessage, PipelineState, StateChange,
};
use tokio::sync::mpsc::UnboundedSender;
use tome_core::{StreamData, StreamTime};

const UNLOAD_STREAM: &str = "unload_stream";
const DURATION_READY: &str = "duration_ready";
const START_POSITION_SET: &str = "start_position_set";
const SEEK: &str = "seek";
const STATE_CHANGE: &str = "state_change";
const LOAD_STREAM: &str = "load_stream";

const SUBTASKS: [&str; 6] = [
    UNLOAD_STREAM,
    DURATION_READY,
    START_POSITION_SET,
    SEEK,
    STATE_CHANGE,
    LOAD_STREAM,
];

/// Notifications raised by the backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendEvent {
    /// The backend is idle; the last accepted operation has completed
    Ready,
    /// The stream duration became known
    DurationReady(StreamTime),
    /// Current position while playing
    TimeUpdated(StreamTime),
    /// The stream played to its end and has been torn down
    EndOfStream,
    /// The pipeline reported an error
    PipelineError(String),
}

/// Adapter between the command queue and a pipeline
pub struct StreamBackend {
    factory: Box<dyn PipelineFactory>,
    pipeline: Option<Box<dyn Pipeline>>,
    tasks: TaskCoordinator,
    bus: BusSender,
    events: UnboundedSender<BackendEvent>,
    start_position: StreamTime,
    requested_state: Option<PipelineState>,
    awaiting_async_done: bool,
    controller_scheduled: bool,
}

impl StreamBackend {
    /// Create a backend posting pipeline messages to `bus` and its own
    /// notifications to `events`
    pub fn new(
        factory: Box<dyn PipelineFactory>,
        bus: BusSender,
        events: UnboundedSender<BackendEvent>,
    ) -> Result<Self> {
        let ready = events.clone();
        let tasks = TaskCoordinator::with_completion(move || {
            let _ = ready.send(BackendEvent::Ready);
        });
        for name in SUBTASKS {
            tasks.add_subtask(name)?;
        }

        Ok(Self {
            factory,
            pipeline: None,
            tasks,
            bus,
            events,
            start_position: StreamTime::ZERO,
            requested_state: None,
            awaiting_async_done: false,
            controller_scheduled: false,
        })
    }

    fn emit(&self, event: BackendEvent) {
        if self.events.send(event).is_err() {
            tracing::debug!("Backend event dropped, receiver closed");
        }
    }

    fn begin(&self, name: &str) -> Result<bool> {
        self.tasks.begin_subtask(name)
    }

    fn end(&self, name: &str) -> Result<bool> {
        self.tasks.end_subtask(name, false)
    }

    fn abort(&self, name: &str) -> Result<bool> {
        self.tasks.end_subtask(name, true)
    }

    /// Whether any operation is in flight
    pub fn is_busy(&self) -> bool {
        self.tasks.running()
    }

    pub fn is_loaded(&self) -> bool {
        self.pipeline.is_some()
    }

    pub fn running_subtasks(&self) -> Vec<String> {
        self.tasks.running_subtasks()
    }

    /// Whether `controller_step` still has work to do
    pub fn needs_tick(&self) -> bool {
        self.controller_scheduled
    }

    /// State of the loaded pipeline
    pub fn pipeline_state(&self) -> Option<PipelineState> {
        self.pipeline.as_ref().map(|pipeline| pipeline.current_state())
    }

    /// Build a pipeline for `stream` and start prerolling it
    pub fn load_stream(&mut self, stream: &StreamData) -> Result<bool> {
        if self.is_busy() {
            return Ok(false);
        }
        if self.pipeline.is_some() {
            return Err(PlaybackError::AlreadyLoaded);
        }

        let mut pipeline = self.factory.create(&stream.path, self.bus.clone())?;

        self.begin(DURATION_READY)?;
        self.begin(LOAD_STREAM)?;
        self.begin(START_POSITION_SET)?;

        if let Err(err) = pipeline.set_state(PipelineState::Paused) {
            self.abort(START_POSITION_SET)?;
            self.abort(LOAD_STREAM)?;
            self.abort(DURATION_READY)?;
            return Err(err.into());
        }

        tracing::debug!(
            path = %stream.path.display(),
            start = %stream.start_position(),
            "Loading stream"
        );

        self.pipeline = Some(pipeline);
        self.start_position = stream.start_position();
        self.awaiting_async_done = false;
        self.controller_scheduled = true;
        Ok(true)
    }

    /// One step of the load procedure
    ///
    /// Returns whether the step changed anything.
    pub fn controller_step(&mut self) -> Result<bool> {
        if !self.controller_scheduled {
            return Ok(false);
        }
        let Some(pipeline) = self.pipeline.as_mut() else {
            self.controller_scheduled = false;
            return Ok(false);
        };

        let mut progressed = false;

        if self.tasks.subtask_running(START_POSITION_SET) {
            if pipeline.current_state() < PipelineState::Paused {
                return Ok(false);
            }
            if self.start_position > StreamTime::ZERO {
                if pipeline.seek(self.start_position) {
                    self.awaiting_async_done = true;
                } else {
                    tracing::warn!(start = %self.start_position, "Start position refused");
                }
            }
            self.tasks.end_subtask(START_POSITION_SET, false)?;
            progressed = true;
        }

        let mut duration_ready = None;
        if self.tasks.subtask_running(DURATION_READY) {
            duration_ready = pipeline.query_duration();
            if duration_ready.is_none() && !self.awaiting_async_done {
                // Some pipelines only resolve the duration after a seek
                tracing::trace!(start = %self.start_position, "Nudging pipeline for duration");
                self.awaiting_async_done = pipeline.seek(self.start_position);
                progressed |= self.awaiting_async_done;
            }
        }
        if let Some(duration) = duration_ready {
            self.emit(BackendEvent::DurationReady(duration));
            self.end(DURATION_READY)?;
            progressed = true;
        }

        if self.tasks.running_subtasks() == [LOAD_STREAM] {
            self.controller_scheduled = false;
            self.end(LOAD_STREAM)?;
            progressed = true;
        }

        Ok(progressed)
    }

    fn teardown(&mut self) -> std::result::Result<(), BackendError> {
        self.controller_scheduled = false;
        self.requested_state = None;
        self.awaiting_async_done = false;
        match self.pipeline.take() {
            Some(mut pipeline) => pipeline.set_state_blocking(PipelineState::Null),
            None => Ok(()),
        }
    }

    /// Tear down the pipeline, waiting for it to stop
    ///
    /// Accepted without a loaded stream so callers always get `Ready`.
    pub fn unload_stream(&mut self) -> Result<bool> {
        if self.is_busy() {
            return Ok(false);
        }

        self.begin(UNLOAD_STREAM)?;
        if let Err(err) = self.teardown() {
            self.abort(UNLOAD_STREAM)?;
            return Err(err.into());
        }
        tracing::debug!("Stream unloaded");
        self.end(UNLOAD_STREAM)?;
        Ok(true)
    }

    pub fn play(&mut self) -> Result<bool> {
        self.request_state(PipelineState::Playing)
    }

    pub fn pause(&mut self) -> Result<bool> {
        self.request_state(PipelineState::Paused)
    }

    fn request_state(&mut self, target: PipelineState) -> Result<bool> {
        if self.is_busy() {
            return Ok(false);
        }
        let Some(pipeline) = self.pipeline.as_mut() else {
            return Err(BackendError::NoStream("change state").into());
        };

        self.tasks.begin_subtask(STATE_CHANGE)?;
        match pipeline.set_state(target) {
            Ok(StateChange::Async) => {
                self.requested_state = Some(target);
            }
            Ok(StateChange::Success | StateChange::NoPreroll) => {
                self.end(STATE_CHANGE)?;
            }
            Err(err) => {
                self.abort(STATE_CHANGE)?;
                return Err(err.into());
            }
        }
        tracing::debug!(%target, "State change requested");
        Ok(true)
    }

    /// Seek the loaded stream
    ///
    /// A refused seek is an error, distinct from being busy.
    pub fn set_position(&mut self, position: StreamTime) -> Result<bool> {
        if self.is_busy() {
            return Ok(false);
        }
        let Some(pipeline) = self.pipeline.as_mut() else {
            return Err(BackendError::NoStream("seek").into());
        };

        self.tasks.begin_subtask(SEEK)?;
        if !pipeline.seek(position) {
            self.abort(SEEK)?;
            return Err(BackendError::SeekRejected(position).into());
        }
        self.awaiting_async_done = true;
        tracing::debug!(%position, "Seek requested");
        Ok(true)
    }

    pub fn query_position(&self) -> Result<StreamTime> {
        if self.is_busy() {
            return Err(PlaybackError::Busy);
        }
        self.pipeline
            .as_ref()
            .ok_or(PlaybackError::NotLoaded)?
            .query_position()
            .ok_or(PlaybackError::QueryFailed("position"))
    }

    pub fn query_duration(&self) -> Result<StreamTime> {
        self.pipeline
            .as_ref()
            .ok_or(PlaybackError::NotLoaded)?
            .query_duration()
            .ok_or(PlaybackError::QueryFailed("duration"))
    }

    /// Post the current position if the stream is playing and idle
    pub fn refresh_time(&self) {
        if self.is_busy() || self.pipeline_state() != Some(PipelineState::Playing) {
            return;
        }
        if let Ok(position) = self.query_position() {
            self.emit(BackendEvent::TimeUpdated(position));
        }
    }

    /// React to a message from the pipeline bus
    pub fn handle_message(&mut self, message: PipelineMessage) -> Result<()> {
        match message {
            PipelineMessage::StateChanged { new, .. } => {
                if self.requested_state == Some(new) {
                    self.requested_state = None;
                    self.end(STATE_CHANGE)?;
                }
            }
            PipelineMessage::AsyncDone => {
                self.awaiting_async_done = false;
                self.end(SEEK)?;
            }
            PipelineMessage::DurationChanged => {
                tracing::trace!("Duration changed");
            }
            PipelineMessage::Eos => self.end_of_stream()?,
            PipelineMessage::Error(message) => {
                tracing::error!(%message, "Pipeline error");
                self.emit(BackendEvent::PipelineError(message));
            }
        }
        Ok(())
    }

    fn end_of_stream(&mut self) -> Result<()> {
        if self.pipeline.is_none() {
            tracing::debug!("End of stream without a pipeline, ignoring");
            return Ok(());
        }

        tracing::debug!("End of stream");
        if let Err(err) = self.teardown() {
            tracing::warn!(error = %err, "Teardown after end of stream failed");
        }
        self.emit(BackendEvent::EndOfStream);

        // Whatever was in flight died with the pipeline; release it so queued
        // commands are not stuck waiting for readiness.
        for name in self.tasks.running_subtasks() {
            self.end(&name)?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for StreamBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamBackend")
            .field("loaded", &self.is_loaded())
            .field("tasks", &self.tasks)
            .field("controller_scheduled", &self.controller_scheduled)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::ManualPipelineFactory;
    use std::path::PathBuf;
    use tokio::sync::mpsc::{self, UnboundedReceiver};
    use tome_core::{PlTrackId, PlaylistId, PositionData};

    struct Harness {
        backend: StreamBackend,
        pipeline: ManualPipelineFactory,
        bus: UnboundedReceiver<PipelineMessage>,
        events: UnboundedReceiver<BackendEvent>,
    }

    impl Harness {
        fn new() -> Self {
            let pipeline = ManualPipelineFactory::new();
            let (bus_tx, bus) = mpsc::unbounded_channel();
            let (events_tx, events) = mpsc::unbounded_channel();
            let backend =
                StreamBackend::new(Box::new(pipeline.clone()), bus_tx, events_tx).unwrap();
            Self {
                backend,
                pipeline,
                bus,
                events,
            }
        }

        /// Deliver bus messages and tick until nothing changes
        fn settle(&mut self) {
            loop {
                let mut progressed = false;
                while let Ok(message) = self.bus.try_recv() {
                    self.backend.handle_message(message).unwrap();
                    progressed = true;
                }
                if self.backend.needs_tick() {
                    progressed |= self.backend.controller_step().unwrap();
                }
                if !progressed {
                    break;
                }
            }
        }

        fn events(&mut self) -> Vec<BackendEvent> {
            let mut events = Vec::new();
            while let Ok(event) = self.events.try_recv() {
                events.push(event);
            }
            events
        }
    }

    fn stream(path: &str, start_secs: i64) -> StreamData {
        let mut position = PositionData::start_of(PlaylistId::new(1), PlTrackId::new(1));
        position.time = StreamTime::from_secs(start_secs);
        StreamData {
            path: PathBuf::from(path),
            duration: None,
            track_number: 0,
            last_saved_position: position.time,
            position_data: position,
        }
    }

    #[test]
    fn load_converges_to_ready() {
        let mut h = Harness::new();
        h.pipeline.set_duration("/a.ogg", StreamTime::from_secs(10));

        assert!(h.backend.load_stream(&stream("/a.ogg", 0)).unwrap());
        assert!(h.backend.is_busy());

        h.settle();

        assert!(!h.backend.is_busy());
        assert!(!h.backend.needs_tick());
        assert_eq!(
            h.events(),
            vec![
                BackendEvent::DurationReady(StreamTime::from_secs(10)),
                BackendEvent::Ready
            ]
        );
    }

    #[test]
    fn start_position_applied_once() {
        let mut h = Harness::new();
        h.backend.load_stream(&stream("/a.ogg", 7)).unwrap();
        h.settle();

        assert_eq!(h.pipeline.seeks(), vec![StreamTime::from_secs(7)]);
        assert_eq!(h.pipeline.position(), Some(StreamTime::from_secs(7)));
    }

    #[test]
    fn duration_nudge() {
        let mut h = Harness::new();
        h.pipeline.set_nudges_before_duration(1);
        h.backend.load_stream(&stream("/a.ogg", 0)).unwrap();
        h.settle();

        assert_eq!(h.pipeline.seeks(), vec![StreamTime::ZERO]);
        assert!(h
            .events()
            .contains(&BackendEvent::DurationReady(StreamTime::from_secs(60))));
        assert!(!h.backend.is_busy());
    }

    #[test]
    fn busy_operations_are_rejected() {
        let mut h = Harness::new();
        h.backend.load_stream(&stream("/a.ogg", 0)).unwrap();

        assert!(!h.backend.play().unwrap());
        assert!(!h.backend.unload_stream().unwrap());
        assert!(!h.backend.set_position(StreamTime::from_secs(1)).unwrap());
        assert!(!h.backend.load_stream(&stream("/b.ogg", 0)).unwrap());
        assert!(matches!(
            h.backend.query_position(),
            Err(PlaybackError::Busy)
        ));
    }

    #[test]
    fn loading_twice_is_an_invariant_violation() {
        let mut h = Harness::new();
        h.backend.load_stream(&stream("/a.ogg", 0)).unwrap();
        h.settle();

        assert!(matches!(
            h.backend.load_stream(&stream("/b.ogg", 0)),
            Err(PlaybackError::AlreadyLoaded)
        ));
    }

    #[test]
    fn play_completes_on_state_changed() {
        let mut h = Harness::new();
        h.backend.load_stream(&stream("/a.ogg", 0)).unwrap();
        h.settle();
        h.events();

        h.pipeline.set_auto_complete(false);
        assert!(h.backend.play().unwrap());
        assert_eq!(h.backend.running_subtasks(), vec![STATE_CHANGE]);

        h.pipeline.complete_pending();
        h.settle();

        assert!(!h.backend.is_busy());
        assert_eq!(h.backend.pipeline_state(), Some(PipelineState::Playing));
        assert_eq!(h.events(), vec![BackendEvent::Ready]);
    }

    #[test]
    fn failed_state_change_aborts() {
        let mut h = Harness::new();
        h.backend.load_stream(&stream("/a.ogg", 0)).unwrap();
        h.settle();
        h.events();

        h.pipeline.fail_state_changes(true);
        let err = h.backend.play().unwrap_err();

        assert!(err.is_recoverable());
        assert!(!h.backend.is_busy());
        assert!(h.events().is_empty());
    }

    #[test]
    fn refused_seek_is_an_error() {
        let mut h = Harness::new();
        h.backend.load_stream(&stream("/a.ogg", 0)).unwrap();
        h.settle();

        h.pipeline.refuse_seeks(true);
        let err = h.backend.set_position(StreamTime::from_secs(3)).unwrap_err();

        assert!(matches!(
            err,
            PlaybackError::Backend(BackendError::SeekRejected(t)) if t == StreamTime::from_secs(3)
        ));
        assert!(!h.backend.is_busy());
    }

    #[test]
    fn seek_completes_on_async_done() {
        let mut h = Harness::new();
        h.backend.load_stream(&stream("/a.ogg", 0)).unwrap();
        h.settle();
        h.events();

        assert!(h.backend.set_position(StreamTime::from_secs(4)).unwrap());
        assert!(h.backend.is_busy());
        h.settle();

        assert!(!h.backend.is_busy());
        assert_eq!(h.events(), vec![BackendEvent::Ready]);
        assert_eq!(
            h.backend.query_position().unwrap(),
            StreamTime::from_secs(4)
        );
    }

    #[test]
    fn unload_without_stream_still_signals_ready() {
        let mut h = Harness::new();

        assert!(h.backend.unload_stream().unwrap());
        assert!(!h.backend.is_busy());
        assert_eq!(h.events(), vec![BackendEvent::Ready]);
    }

    #[test]
    fn unload_tears_down() {
        let mut h = Harness::new();
        h.backend.load_stream(&stream("/a.ogg", 0)).unwrap();
        h.settle();

        assert!(h.backend.unload_stream().unwrap());
        assert!(!h.backend.is_loaded());
        assert!(matches!(
            h.backend.query_duration(),
            Err(PlaybackError::NotLoaded)
        ));
    }

    #[test]
    fn transport_without_stream_is_recoverable() {
        let mut h = Harness::new();

        let play = h.backend.play().unwrap_err();
        let seek = h.backend.set_position(StreamTime::from_secs(3)).unwrap_err();

        assert!(play.is_recoverable());
        assert!(matches!(
            seek,
            PlaybackError::Backend(BackendError::NoStream(_))
        ));
        assert!(!h.backend.is_busy());
        assert!(h.events().is_empty());
    }

    #[test]
    fn end_of_stream_tears_down_without_ready() {
        let mut h = Harness::new();
        h.backend.load_stream(&stream("/a.ogg", 0)).unwrap();
        h.settle();
        h.backend.play().unwrap();
        h.settle();
        h.events();

        h.pipeline.finish_stream();
        h.settle();

        assert!(!h.backend.is_loaded());
        assert_eq!(h.events(), vec![BackendEvent::EndOfStream]);
    }

    #[test]
    fn time_updates_only_while_playing() {
        let mut h = Harness::new();
        h.backend.load_stream(&stream("/a.ogg", 0)).unwrap();
        h.settle();
        h.events();

        h.backend.refresh_time();
        assert!(h.events().is_empty());

        h.backend.play().unwrap();
        h.settle();
        h.events();
        h.pipeline.advance(StreamTime::from_secs(2));
        h.backend.refresh_time();

        assert_eq!(
            h.events(),
            vec![BackendEvent::TimeUpdated(StreamTime::from_secs(2))]
        );
    }

    #[test]
    fn pipeline_errors_are_forwarded() {
        let mut h = Harness::new();
        h.backend.load_stream(&stream("/a.ogg", 0)).unwrap();
        h.pipeline.post_error("decoder exploded");
        h.settle();

        assert!(h
            .events()
            .contains(&BackendEvent::PipelineError("decoder exploded".to_string())));
    }
}
