//! Multimedia pipeline binding
//!
//! The backend adapter drives a pipeline through this trait and never touches
//! the underlying framework directly. A binding delivers asynchronous
//! completions as `PipelineMessage`s on the bus it was created with.

mod manual;

pub use manual::{ManualPipeline, ManualPipelineFactory, PipelineCall};

use crate::error::BackendError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use tokio::sync::mpsc::UnboundedSender;
use tome_core::StreamTime;

/// Pipeline states, lowest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PipelineState {
    /// Torn down, no resources held
    Null,
    /// Resources allocated, nothing prerolled
    Ready,
    /// Prerolled and stopped
    Paused,
    /// Rendering
    Playing,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Null => "NULL",
            Self::Ready => "READY",
            Self::Paused => "PAUSED",
            Self::Playing => "PLAYING",
        };
        f.write_str(name)
    }
}

/// Outcome of an accepted state change request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateChange {
    /// Target state reached before returning
    Success,
    /// Target state will be reported later through `StateChanged`
    Async,
    /// Reached, but the pipeline cannot preroll (live source)
    NoPreroll,
}

/// Messages a pipeline posts on its bus
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineMessage {
    /// The pipeline changed state
    StateChanged {
        old: PipelineState,
        new: PipelineState,
    },
    /// An asynchronous state change or seek finished
    AsyncDone,
    /// The stream duration may now be queried
    DurationChanged,
    /// End of stream
    Eos,
    /// The pipeline hit an error
    Error(String),
}

/// Bus on which a pipeline posts its messages
pub type BusSender = UnboundedSender<PipelineMessage>;

/// One active decode/render graph for a single stream
pub trait Pipeline: Send {
    /// Request a state without waiting for it
    fn set_state(&mut self, state: PipelineState) -> Result<StateChange, BackendError>;

    /// Move to `state` and wait until it is reached
    fn set_state_blocking(&mut self, state: PipelineState) -> Result<(), BackendError>;

    /// State the pipeline is in right now
    fn current_state(&self) -> PipelineState;

    /// Request a flushing seek; `false` if the pipeline refused it
    ///
    /// Completion is reported with `AsyncDone`.
    fn seek(&mut self, position: StreamTime) -> bool;

    /// Current position, `None` if it cannot be determined yet
    fn query_position(&self) -> Option<StreamTime>;

    /// Stream duration, `None` until the pipeline knows it
    fn query_duration(&self) -> Option<StreamTime>;
}

/// Builds a pipeline for a file
pub trait PipelineFactory: Send {
    /// Construct a pipeline in the `Null` state posting to `bus`
    fn create(&mut self, path: &Path, bus: BusSender) -> Result<Box<dyn Pipeline>, BackendError>;
}
