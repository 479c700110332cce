//! Environment seam between the scheduler and the host event loop
//!
//! The scheduler never manipulates tags itself; it asks the host's event
//! source to move logical time forward whenever every level of the current
//! tag has drained. The [`Environment`] owns that source behind the mutex
//! the tag-advance protocol requires and carries the idempotent scheduler
//! slot.

use crate::error::{Error, Result};
use crate::sched::Scheduler;
use parking_lot::{Mutex, RwLock};
use std::sync::{Arc, Weak};

/// Result of asking the event source for the next tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagOutcome {
    /// A new tag was started; its reactions have been triggered.
    Continue,
    /// The stop tag has been reached; workers should wind down.
    Stop,
}

/// Host-side driver of logical time.
///
/// Implementations own the event queue (or whatever produces tags) and
/// trigger the new tag's reactions on the scheduler they are handed.
pub trait EventSource: Send {
    /// Move logical time to the next tag.
    ///
    /// Called with the environment mutex held, by the single worker that
    /// drove the previous tag to completion. The implementation triggers the
    /// new tag's reactions via [`Scheduler::trigger_reaction`] before
    /// returning. It may block waiting for events, but must observe
    /// [`Scheduler::should_stop`] and return promptly once stop is signaled.
    fn advance_tag(&mut self, scheduler: &Scheduler) -> TagOutcome;

    /// Optionally move the level cursor past levels known to be empty.
    ///
    /// Called during work distribution with the cursor already advanced to
    /// the next candidate level; the cursor points one past the level about
    /// to be inspected. The default leaves the cursor alone.
    fn advance_level(&mut self, cursor: &mut usize) {
        let _ = cursor;
    }
}

/// Execution environment: the event source plus the scheduler installed on
/// it.
///
/// The environment holds only a weak reference to the scheduler; the host
/// owns the `Arc` returned by [`Scheduler::init`], and repeated `init` calls
/// on the same environment hand back that same instance.
pub struct Environment {
    /// The environment mutex: held across `advance_tag` and never across
    /// user reaction code.
    pub(crate) source: Mutex<Box<dyn EventSource>>,
    pub(crate) scheduler: RwLock<Weak<Scheduler>>,
}

impl Environment {
    /// Wrap an event source into an environment.
    pub fn new(source: impl EventSource + 'static) -> Arc<Self> {
        Arc::new(Self {
            source: Mutex::new(Box::new(source)),
            scheduler: RwLock::new(Weak::new()),
        })
    }

    /// The scheduler installed on this environment, if any.
    pub fn scheduler(&self) -> Result<Arc<Scheduler>> {
        self.scheduler
            .read()
            .upgrade()
            .ok_or(Error::NotInitialized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StopImmediately;

    impl EventSource for StopImmediately {
        fn advance_tag(&mut self, _scheduler: &Scheduler) -> TagOutcome {
            TagOutcome::Stop
        }
    }

    #[test]
    fn test_uninitialized_environment_has_no_scheduler() {
        let env = Environment::new(StopImmediately);
        assert!(matches!(env.scheduler(), Err(Error::NotInitialized)));
    }
}
