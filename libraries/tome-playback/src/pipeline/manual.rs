//! Pipeline driven by hand
//!
//! Runs without a multimedia framework. State changes, seeks, duration
//! discovery and end of stream either complete on their own or wait until the
//! owner of the factory completes them, and every call is recorded. Used for
//! headless operation and throughout the tests.

use super::{BusSender, Pipeline, PipelineFactory, PipelineMessage, PipelineState, StateChange};
use crate::error::BackendError;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tome_core::StreamTime;

/// A call made against a manual pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineCall {
    Create(PathBuf),
    SetState(PipelineState),
    Seek(StreamTime),
}

enum Pending {
    State(PipelineState),
    Seek,
}

struct Stream {
    path: PathBuf,
    state: PipelineState,
    position: StreamTime,
    duration: StreamTime,
    seeks: u32,
    bus: BusSender,
    pending: Vec<Pending>,
}

impl Stream {
    fn post(&self, message: PipelineMessage) {
        // The receiver only goes away when the player is dropped
        let _ = self.bus.send(message);
    }

    fn enter(&mut self, target: PipelineState) {
        let old = self.state;
        self.state = target;
        self.post(PipelineMessage::StateChanged { old, new: target });
    }
}

struct Shared {
    durations: HashMap<PathBuf, StreamTime>,
    default_duration: StreamTime,
    nudges_before_duration: u32,
    auto_complete: bool,
    refuse_seeks: bool,
    fail_state_changes: bool,
    fail_create: bool,
    calls: Vec<PipelineCall>,
    streams: HashMap<u64, Stream>,
    current: Option<u64>,
    next_id: u64,
}

impl Default for Shared {
    fn default() -> Self {
        Self {
            durations: HashMap::new(),
            default_duration: StreamTime::from_secs(60),
            nudges_before_duration: 0,
            auto_complete: true,
            refuse_seeks: false,
            fail_state_changes: false,
            fail_create: false,
            calls: Vec::new(),
            streams: HashMap::new(),
            current: None,
            next_id: 0,
        }
    }
}

impl Shared {
    fn current_stream(&mut self) -> Option<&mut Stream> {
        let id = self.current?;
        self.streams.get_mut(&id)
    }
}

fn lock(shared: &Mutex<Shared>) -> MutexGuard<'_, Shared> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Creates `ManualPipeline`s and controls the one most recently created
///
/// Clones share state: keep one clone to drive and inspect the pipeline
/// while the backend owns another.
#[derive(Clone, Default)]
pub struct ManualPipelineFactory {
    shared: Arc<Mutex<Shared>>,
}

impl ManualPipelineFactory {
    pub fn new() -> Self {
        Self::default()
    }

    fn shared(&self) -> MutexGuard<'_, Shared> {
        lock(&self.shared)
    }

    /// Duration reported for streams of `path`
    pub fn set_duration(&self, path: impl Into<PathBuf>, duration: StreamTime) {
        self.shared().durations.insert(path.into(), duration);
    }

    /// Duration reported for paths without an explicit duration (60s)
    pub fn set_default_duration(&self, duration: StreamTime) {
        self.shared().default_duration = duration;
    }

    /// Number of seeks a stream must see before it reports its duration
    pub fn set_nudges_before_duration(&self, nudges: u32) {
        self.shared().nudges_before_duration = nudges;
    }

    /// Complete state changes and seeks immediately (the default) or only on
    /// `complete_pending`
    pub fn set_auto_complete(&self, auto_complete: bool) {
        self.shared().auto_complete = auto_complete;
    }

    pub fn refuse_seeks(&self, refuse: bool) {
        self.shared().refuse_seeks = refuse;
    }

    pub fn fail_state_changes(&self, fail: bool) {
        self.shared().fail_state_changes = fail;
    }

    pub fn fail_create(&self, fail: bool) {
        self.shared().fail_create = fail;
    }

    /// Finish every outstanding state change and seek of the current stream
    ///
    /// Returns the number of operations completed.
    pub fn complete_pending(&self) -> usize {
        let mut shared = self.shared();
        let Some(stream) = shared.current_stream() else {
            return 0;
        };

        let pending = std::mem::take(&mut stream.pending);
        let count = pending.len();
        for operation in pending {
            match operation {
                Pending::State(target) => {
                    stream.enter(target);
                    stream.post(PipelineMessage::AsyncDone);
                }
                Pending::Seek => stream.post(PipelineMessage::AsyncDone),
            }
        }
        count
    }

    /// Post end of stream for the current stream
    pub fn finish_stream(&self) -> bool {
        let mut shared = self.shared();
        match shared.current_stream() {
            Some(stream) => {
                stream.position = stream.duration;
                stream.post(PipelineMessage::Eos);
                true
            }
            None => false,
        }
    }

    /// Post an error message for the current stream
    pub fn post_error(&self, message: &str) -> bool {
        let mut shared = self.shared();
        match shared.current_stream() {
            Some(stream) => {
                stream.post(PipelineMessage::Error(message.to_string()));
                true
            }
            None => false,
        }
    }

    /// Move the current position, clamped to the stream
    pub fn advance(&self, delta: StreamTime) {
        let mut shared = self.shared();
        if let Some(stream) = shared.current_stream() {
            stream.position = (stream.position + delta).clamp_to(StreamTime::ZERO, stream.duration);
        }
    }

    pub fn calls(&self) -> Vec<PipelineCall> {
        self.shared().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.shared().calls.clear();
    }

    /// Number of requests for `state`, blocking or not
    pub fn state_requests(&self, state: PipelineState) -> usize {
        self.shared()
            .calls
            .iter()
            .filter(|call| **call == PipelineCall::SetState(state))
            .count()
    }

    /// Targets of every seek request, in order
    pub fn seeks(&self) -> Vec<StreamTime> {
        self.shared()
            .calls
            .iter()
            .filter_map(|call| match call {
                PipelineCall::Seek(time) => Some(*time),
                _ => None,
            })
            .collect()
    }

    /// Paths of every pipeline created, in order
    pub fn created(&self) -> Vec<PathBuf> {
        self.shared()
            .calls
            .iter()
            .filter_map(|call| match call {
                PipelineCall::Create(path) => Some(path.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn current_path(&self) -> Option<PathBuf> {
        self.shared().current_stream().map(|stream| stream.path.clone())
    }

    pub fn current_state(&self) -> Option<PipelineState> {
        self.shared().current_stream().map(|stream| stream.state)
    }

    pub fn position(&self) -> Option<StreamTime> {
        self.shared().current_stream().map(|stream| stream.position)
    }
}

impl PipelineFactory for ManualPipelineFactory {
    fn create(&mut self, path: &Path, bus: BusSender) -> Result<Box<dyn Pipeline>, BackendError> {
        let mut shared = self.shared();
        shared.calls.push(PipelineCall::Create(path.to_path_buf()));

        if shared.fail_create {
            return Err(BackendError::Pipeline(format!(
                "cannot open {}",
                path.display()
            )));
        }

        let duration = shared
            .durations
            .get(path)
            .copied()
            .unwrap_or(shared.default_duration);

        shared.next_id += 1;
        let id = shared.next_id;
        shared.streams.insert(
            id,
            Stream {
                path: path.to_path_buf(),
                state: PipelineState::Null,
                position: StreamTime::ZERO,
                duration,
                seeks: 0,
                bus,
                pending: Vec::new(),
            },
        );
        shared.current = Some(id);

        Ok(Box::new(ManualPipeline {
            id,
            shared: Arc::clone(&self.shared),
        }))
    }
}

/// Pipeline created by `ManualPipelineFactory`
pub struct ManualPipeline {
    id: u64,
    shared: Arc<Mutex<Shared>>,
}

impl ManualPipeline {
    fn with_stream<T>(&self, f: impl FnOnce(&mut Stream, &Shared) -> T) -> Option<T> {
        let mut shared = lock(&self.shared);
        let mut stream = shared.streams.remove(&self.id)?;
        let result = f(&mut stream, &shared);
        shared.streams.insert(self.id, stream);
        Some(result)
    }
}

impl Pipeline for ManualPipeline {
    fn set_state(&mut self, target: PipelineState) -> Result<StateChange, BackendError> {
        {
            let mut shared = lock(&self.shared);
            shared.calls.push(PipelineCall::SetState(target));
            if shared.fail_state_changes {
                return Err(BackendError::StateChange {
                    target,
                    reason: "state change refused".to_string(),
                });
            }
        }

        self.with_stream(|stream, shared| {
            if stream.state == target {
                StateChange::Success
            } else if target <= PipelineState::Ready {
                stream.pending.clear();
                stream.enter(target);
                StateChange::Success
            } else if shared.auto_complete {
                stream.enter(target);
                stream.post(PipelineMessage::AsyncDone);
                StateChange::Async
            } else {
                stream.pending.push(Pending::State(target));
                StateChange::Async
            }
        })
        .ok_or_else(|| BackendError::Pipeline("pipeline disposed".to_string()))
    }

    fn set_state_blocking(&mut self, target: PipelineState) -> Result<(), BackendError> {
        {
            let mut shared = lock(&self.shared);
            shared.calls.push(PipelineCall::SetState(target));
            if shared.fail_state_changes {
                return Err(BackendError::StateChange {
                    target,
                    reason: "state change refused".to_string(),
                });
            }
        }

        self.with_stream(|stream, _| {
            stream.pending.clear();
            stream.state = target;
        })
        .ok_or_else(|| BackendError::Pipeline("pipeline disposed".to_string()))
    }

    fn current_state(&self) -> PipelineState {
        lock(&self.shared)
            .streams
            .get(&self.id)
            .map_or(PipelineState::Null, |stream| stream.state)
    }

    fn seek(&mut self, position: StreamTime) -> bool {
        {
            let mut shared = lock(&self.shared);
            shared.calls.push(PipelineCall::Seek(position));
            if shared.refuse_seeks {
                return false;
            }
        }

        self.with_stream(|stream, shared| {
            if stream.state < PipelineState::Paused {
                return false;
            }
            stream.position = position.clamp_to(StreamTime::ZERO, stream.duration);
            stream.seeks += 1;
            if shared.auto_complete {
                stream.post(PipelineMessage::AsyncDone);
            } else {
                stream.pending.push(Pending::Seek);
            }
            true
        })
        .unwrap_or(false)
    }

    fn query_position(&self) -> Option<StreamTime> {
        let shared = lock(&self.shared);
        let stream = shared.streams.get(&self.id)?;
        (stream.state >= PipelineState::Paused).then_some(stream.position)
    }

    fn query_duration(&self) -> Option<StreamTime> {
        let shared = lock(&self.shared);
        let stream = shared.streams.get(&self.id)?;
        let known =
            stream.state >= PipelineState::Paused && stream.seeks >= shared.nudges_before_duration;
        known.then_some(stream.duration)
    }
}

impl Drop for ManualPipeline {
    fn drop(&mut self) {
        let mut shared = lock(&self.shared);
        shared.streams.remove(&self.id);
        if shared.current == Some(self.id) {
            shared.current = None;
        }
    }
}
