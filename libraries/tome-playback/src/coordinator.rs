//! Sub-task ledger
//!
//! Many independent asynchronous steps share one "something is in progress"
//! flag. Each step is a named sub-task; the aggregate flag is set while at
//! least one sub-task is running. When the last running sub-task ends without
//! aborting, the completion callback fires.
//!
//! The ledger is `Clone` and every clone shares the same state, so sub-tasks
//! can be begun on one thread and ended on another.

use crate::error::{PlaybackError, Result};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

type CompletionCallback = Box<dyn Fn() + Send + Sync>;

struct Ledger {
    subtasks: HashMap<String, bool>,
    locked: usize,
}

struct Inner {
    ledger: Mutex<Ledger>,
    running: AtomicBool,
    on_complete: Option<CompletionCallback>,
}

/// Rolls many named sub-tasks up into one busy flag
#[derive(Clone)]
pub struct TaskCoordinator {
    inner: Arc<Inner>,
}

impl TaskCoordinator {
    /// Create a ledger without a completion callback
    pub fn new() -> Self {
        Self::build(None)
    }

    /// Create a ledger that calls `on_complete` whenever it becomes idle
    pub fn with_completion<F>(on_complete: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self::build(Some(Box::new(on_complete)))
    }

    fn build(on_complete: Option<CompletionCallback>) -> Self {
        Self {
            inner: Arc::new(Inner {
                ledger: Mutex::new(Ledger {
                    subtasks: HashMap::new(),
                    locked: 0,
                }),
                running: AtomicBool::new(false),
                on_complete,
            }),
        }
    }

    // The ledger holds no invariant a panicking holder could break halfway,
    // so a poisoned lock is still usable.
    fn ledger(&self) -> MutexGuard<'_, Ledger> {
        self.inner
            .ledger
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a sub-task
    pub fn add_subtask(&self, name: &str) -> Result<()> {
        let mut ledger = self.ledger();
        if ledger.subtasks.contains_key(name) {
            return Err(PlaybackError::DuplicateSubtask(name.to_string()));
        }
        ledger.subtasks.insert(name.to_string(), false);
        Ok(())
    }

    /// Try to lock a sub-task without blocking
    ///
    /// Returns `true` if the sub-task was idle and is now running. The first
    /// sub-task to start also sets the aggregate flag.
    pub fn begin_subtask(&self, name: &str) -> Result<bool> {
        let mut ledger = self.ledger();
        let locked = ledger
            .subtasks
            .get_mut(name)
            .ok_or_else(|| PlaybackError::UnknownSubtask(name.to_string()))?;

        if *locked {
            tracing::trace!(subtask = name, "Sub-task already running");
            return Ok(false);
        }

        *locked = true;
        ledger.locked += 1;
        if ledger.locked == 1 {
            self.inner.running.store(true, Ordering::SeqCst);
        }

        tracing::debug!(subtask = name, running = ledger.locked, "Sub-task started");
        Ok(true)
    }

    /// Unlock a sub-task
    ///
    /// If it was the last running sub-task the aggregate flag is cleared and,
    /// unless `abort` is set, the completion callback fires. Ending a sub-task
    /// that is not running is a no-op and returns `false`.
    pub fn end_subtask(&self, name: &str, abort: bool) -> Result<bool> {
        let completed = {
            let mut ledger = self.ledger();
            let locked = ledger
                .subtasks
                .get_mut(name)
                .ok_or_else(|| PlaybackError::UnknownSubtask(name.to_string()))?;

            if !*locked {
                tracing::trace!(subtask = name, "Sub-task not running");
                return Ok(false);
            }

            *locked = false;
            ledger.locked -= 1;
            tracing::debug!(subtask = name, abort, running = ledger.locked, "Sub-task ended");

            if ledger.locked == 0 {
                self.inner.running.store(false, Ordering::SeqCst);
                !abort
            } else {
                false
            }
        };

        // Outside the lock: the callback may call back into the ledger
        if completed {
            if let Some(on_complete) = &self.inner.on_complete {
                on_complete();
            }
        }

        Ok(true)
    }

    /// Whether the named sub-task is running
    pub fn subtask_running(&self, name: &str) -> bool {
        self.ledger().subtasks.get(name).copied().unwrap_or(false)
    }

    /// Names of all running sub-tasks, sorted
    pub fn running_subtasks(&self) -> Vec<String> {
        let ledger = self.ledger();
        let mut names: Vec<String> = ledger
            .subtasks
            .iter()
            .filter(|(_, locked)| **locked)
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    /// Whether any sub-task is running
    pub fn running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }
}

impl Default for TaskCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TaskCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskCoordinator")
            .field("running", &self.running())
            .field("subtasks", &self.running_subtasks())
            .finish()
    }
}
