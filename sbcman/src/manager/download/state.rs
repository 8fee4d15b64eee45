//! Download task state.
//!
//! The state lives in an atomic so the foreground poller and the worker
//! thread never need a lock to read it. Entering `Running` is a
//! compare-and-swap, which is what makes the manager single-flight.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

/// Lifecycle of a download task.
///
/// ```text
/// Idle ──► Running ──► Complete
///             │  └───► Failed
///             └──────► Cancelled
/// ```
///
/// Any terminal state may start a new run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TaskState {
    /// Nothing has run yet.
    Idle = 0,
    /// A worker thread owns the task.
    Running = 1,
    /// The last run installed successfully.
    Complete = 2,
    /// The last run failed.
    Failed = 3,
    /// The last run was cancelled.
    Cancelled = 4,
}

impl TaskState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Running,
            2 => Self::Complete,
            3 => Self::Failed,
            4 => Self::Cancelled,
            _ => Self::Idle,
        }
    }

    /// Whether the task has finished one way or another.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Failed | Self::Cancelled)
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Complete => "complete",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// Atomic cell holding a [`TaskState`].
#[derive(Debug)]
pub struct AtomicTaskState(AtomicU8);

impl Default for AtomicTaskState {
    fn default() -> Self {
        Self::new(TaskState::Idle)
    }
}

impl AtomicTaskState {
    /// Create a cell in the given state.
    pub fn new(state: TaskState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    /// Current state.
    pub fn load(&self) -> TaskState {
        TaskState::from_u8(self.0.load(Ordering::SeqCst))
    }

    /// Overwrite the state.
    pub fn store(&self, state: TaskState) {
        self.0.store(state as u8, Ordering::SeqCst);
    }

    /// Move to `Running` unless a run is already in progress.
    ///
    /// Returns `false` if another run owns the task.
    pub fn try_start(&self) -> bool {
        let mut current = self.0.load(Ordering::SeqCst);
        loop {
            if current == TaskState::Running as u8 {
                return false;
            }
            match self.0.compare_exchange(
                current,
                TaskState::Running as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }

    /// Leave `Running` for `terminal`; a no-op if not running.
    pub fn finish(&self, terminal: TaskState) {
        let _ = self.0.compare_exchange(
            TaskState::Running as u8,
            terminal as u8,
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
    }
}
