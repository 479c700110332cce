//! Reaction values
//!
//! A reaction is an atomic unit of user code plus the bookkeeping the
//! scheduler needs: a precomputed dispatch index and the atomic status cell
//! that enforces single-fire-per-tag semantics. Reactions are registered
//! once at startup and live for the whole run; only the status mutates.

use metronome_common::{ReactionIndex, StatusCell};
use std::fmt;
use std::sync::Arc;

/// User code executed when a reaction fires.
///
/// Bodies run to completion on the worker that dequeued them and must not
/// panic; a panicking body takes its worker down with it.
pub type ReactionBody = Box<dyn Fn() + Send + Sync>;

/// An atomic unit of scheduled user code.
///
/// Identity is pointer identity of the owning [`Arc`]; see
/// [`Reaction::same_reaction`].
pub struct Reaction {
    name: String,
    index: ReactionIndex,
    status: StatusCell,
    body: Option<ReactionBody>,
}

impl Reaction {
    /// Create a reaction with a body.
    pub fn new(
        name: impl Into<String>,
        index: ReactionIndex,
        body: impl Fn() + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            index,
            status: StatusCell::new(),
            body: Some(Box::new(body)),
        })
    }

    /// Create a reaction whose body is executed by the host rather than the
    /// worker pool. [`Reaction::run`] is a no-op for these.
    pub fn bodiless(name: impl Into<String>, index: ReactionIndex) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            index,
            status: StatusCell::new(),
            body: None,
        })
    }

    /// Debug name of the reaction.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The precomputed dispatch index.
    pub fn index(&self) -> ReactionIndex {
        self.index
    }

    /// The precedence level encoded in the index.
    pub fn level(&self) -> usize {
        self.index.level()
    }

    /// The atomic status cell.
    pub fn status(&self) -> &StatusCell {
        &self.status
    }

    /// Invoke the reaction body, if any.
    pub fn run(&self) {
        if let Some(body) = &self.body {
            body();
        }
    }

    /// Whether two handles refer to the same reaction.
    pub fn same_reaction(a: &Arc<Reaction>, b: &Arc<Reaction>) -> bool {
        Arc::ptr_eq(a, b)
    }
}

impl fmt::Debug for Reaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reaction")
            .field("name", &self.name)
            .field("level", &self.level())
            .field("key", &self.index.key())
            .field("status", &self.status.load())
            .finish()
    }
}
