use parking_lot::{Mutex, MutexGuard};
use std::sync::atomic::{AtomicU8, Ordering};
use std::fmt::{Display, Formatter};

/// Lifecycle of a run-once operation.
///
/// Transitions only move forward: `NotStarted -> Running -> Completed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RunState {
    NotStarted,
    Running,
    Completed,
}

impl RunState {
    fn to_u8(self) -> u8 {
        match self {
            RunState::NotStarted => 0,
            RunState::Running => 1,
            RunState::Completed => 2,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            0 => RunState::NotStarted,
            1 => RunState::Running,
            _ => RunState::Completed,
        }
    }
}

impl Display for RunState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            RunState::NotStarted => write!(f, "not started"),
            RunState::Running => write!(f, "running"),
            RunState::Completed => write!(f, "completed"),
        }
    }
}

/// Non-blocking guard for work that must happen at most once.
///
/// The guard never waits: a caller that finds it held gets `None` back from
/// [`RunGuard::try_enter`] instead of queueing behind the current holder.
/// The "has run" flag lives behind the same `parking_lot` mutex, so it is
/// only ever read or written by the thread that holds the guard.
///
/// # Examples
///
/// ```
/// use schemaboot::common::{RunGuard, RunState};
///
/// let guard = RunGuard::new();
/// {
///     let mut ticket = guard.try_enter().expect("guard is free");
///     assert!(!ticket.has_run());
///     ticket.start();
///     assert!(guard.try_enter().is_none());
/// } // ticket dropped: the run is now completed
/// assert_eq!(guard.state(), RunState::Completed);
/// ```
pub struct RunGuard {
    state: Mutex<RunState>,
    // last state written by a ticket, readable without the lock
    observed: AtomicU8,
}

impl RunGuard {
    pub fn new() -> Self {
        RunGuard {
            state: Mutex::new(RunState::NotStarted),
            observed: AtomicU8::new(RunState::NotStarted.to_u8()),
        }
    }

    /// Attempts to take the guard without blocking.
    ///
    /// Returns `None` when another caller currently holds it.
    pub fn try_enter(&self) -> Option<RunTicket<'_>> {
        self.state.try_lock().map(|guard| RunTicket {
            guard,
            observed: &self.observed,
        })
    }

    /// Reports the current state without blocking.
    ///
    /// Holding a ticket alone does not change the state, only
    /// [`RunTicket::start`] and the drop of a started ticket do. Observed
    /// states therefore only move forward.
    pub fn state(&self) -> RunState {
        RunState::from_u8(self.observed.load(Ordering::Acquire))
    }
}

impl Default for RunGuard {
    fn default() -> Self {
        Self::new()
    }
}

/// Exclusive access to a [`RunGuard`].
///
/// Dropping a ticket obtained for a run that has not completed yet marks
/// the run as completed, on success, on error and while unwinding alike.
/// The guard itself is released right after.
pub struct RunTicket<'a> {
    guard: MutexGuard<'a, RunState>,
    observed: &'a AtomicU8,
}

impl RunTicket<'_> {
    /// Whether a previous holder already completed the run.
    pub fn has_run(&self) -> bool {
        *self.guard == RunState::Completed
    }

    /// Marks the run as in progress.
    pub fn start(&mut self) {
        if *self.guard == RunState::NotStarted {
            self.set(RunState::Running);
        }
    }
}

impl RunTicket<'_> {
    fn set(&mut self, state: RunState) {
        *self.guard = state;
        self.observed.store(state.to_u8(), Ordering::Release);
    }
}

impl Drop for RunTicket<'_> {
    fn drop(&mut self) {
        if *self.guard == RunState::Running {
            self.set(RunState::Completed);
        }
    }
}
