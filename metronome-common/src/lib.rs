//! # metronome-common
//!
//! Shared types for the metronome deterministic reactor runtime.
//!
//! This crate defines the vocabulary that the scheduler core, the worker
//! pool, and host runtimes agree on: logical time, tags, reaction indices,
//! and the atomic reaction-status cell that enforces single-fire semantics.
//!
//! ## Design Principles
//!
//! - **`no_std`**: usable from bare-metal hosts and test harnesses alike
//! - **Values, not hierarchies**: reactions are identified by index and
//!   pointer identity; there is no trait object in the hot path
//! - **One writer per transition**: every status transition is a CAS with a
//!   single legal predecessor state

#![no_std]

use core::sync::atomic::{AtomicU32, Ordering};

// ============================================================================
// Time
// ============================================================================

/// A point in time, in nanoseconds.
///
/// Logical and physical time share this representation; which timeline a
/// value belongs to is a property of where it came from, not of its type.
pub type Timestamp = i64;

/// A time interval, in nanoseconds.
pub type Interval = i64;

/// Sentinel for "no time at all" (earlier than every real instant).
pub const NEVER: Timestamp = i64::MIN;

/// Sentinel for "the end of time" (later than every real instant).
pub const FOREVER: Timestamp = i64::MAX;

/// A tag: a logical-time instant plus a microstep counter.
///
/// Tags are the unit of deterministic execution. Ordering is time-major,
/// microstep-minor, which the derived `Ord` provides thanks to field order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Tag {
    /// Logical time instant in nanoseconds.
    pub time: Timestamp,
    /// Superdense-time microstep at `time`.
    pub microstep: u32,
}

impl Tag {
    /// The tag before every real tag.
    pub const NEVER: Tag = Tag {
        time: NEVER,
        microstep: 0,
    };

    /// The tag after every real tag.
    pub const FOREVER: Tag = Tag {
        time: FOREVER,
        microstep: u32::MAX,
    };

    /// Create a tag at `time` with the given microstep.
    pub const fn new(time: Timestamp, microstep: u32) -> Self {
        Self { time, microstep }
    }

    /// The tag one microstep later at the same instant.
    pub const fn next_microstep(self) -> Self {
        Self {
            time: self.time,
            microstep: self.microstep + 1,
        }
    }

    /// The tag `interval` later, at microstep zero.
    ///
    /// Delaying `NEVER` or by a saturating amount stays pinned to the
    /// sentinel rather than wrapping.
    pub const fn delay(self, interval: Interval) -> Self {
        if self.time == NEVER {
            return Self::NEVER;
        }
        Self {
            time: self.time.saturating_add(interval),
            microstep: 0,
        }
    }
}

// ============================================================================
// Reaction index
// ============================================================================

/// Number of bits reserved for the precedence level (upper bits).
pub const LEVEL_BITS: u32 = 16;

/// Number of bits reserved for the deadline tiebreaker (lower bits).
pub const KEY_BITS: u32 = 64 - LEVEL_BITS;

const KEY_MASK: u64 = (1 << KEY_BITS) - 1;

/// Precomputed dispatch key of a reaction.
///
/// The upper [`LEVEL_BITS`] encode the precedence level; the lower
/// [`KEY_BITS`] encode the deadline tiebreaker within that level. Ascending
/// numeric order is therefore level-major, earliest-deadline-minor, which is
/// exactly the dispatch order of the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct ReactionIndex(u64);

impl ReactionIndex {
    /// Pack a level and a deadline tiebreaker into an index.
    ///
    /// Keys wider than [`KEY_BITS`] are truncated; statically assigned keys
    /// never come close to the limit.
    pub const fn new(level: u16, key: u64) -> Self {
        Self(((level as u64) << KEY_BITS) | (key & KEY_MASK))
    }

    /// The precedence level encoded in the upper bits.
    pub const fn level(self) -> usize {
        (self.0 >> KEY_BITS) as usize
    }

    /// The deadline tiebreaker encoded in the lower bits.
    pub const fn key(self) -> u64 {
        self.0 & KEY_MASK
    }

    /// The raw 64-bit key.
    pub const fn raw(self) -> u64 {
        self.0
    }
}

// ============================================================================
// Reaction status
// ============================================================================

/// Execution status of a reaction at the current tag.
///
/// Transitions:
/// ```text
/// Inactive --try_admit--> Queued --retire--> Inactive
/// ```
///
/// Rules:
/// - `Inactive -> Queued` happens only through a successful CAS, so exactly
///   one of any number of racing triggerers admits the reaction per tag
/// - `Queued -> Inactive` is performed only by the worker that executed the
///   reaction; any other observed state is a contract violation
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReactionStatus {
    /// Not scheduled at the current tag.
    #[default]
    Inactive = 0,

    /// Admitted for the current tag; sitting in (or popped from) a ready
    /// queue.
    Queued = 1,

    /// Executing on a worker.
    Running = 2,
}

impl TryFrom<u32> for ReactionStatus {
    type Error = ();

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(ReactionStatus::Inactive),
            1 => Ok(ReactionStatus::Queued),
            2 => Ok(ReactionStatus::Running),
            _ => Err(()),
        }
    }
}

/// Atomic holder of a [`ReactionStatus`].
///
/// All mutation goes through compare-and-swap so that concurrent triggerers
/// resolve their race without a lock and without consulting any queue.
#[derive(Debug, Default)]
pub struct StatusCell(AtomicU32);

impl StatusCell {
    /// A cell starting out `Inactive`.
    pub const fn new() -> Self {
        Self(AtomicU32::new(ReactionStatus::Inactive as u32))
    }

    /// Current status.
    #[inline]
    pub fn load(&self) -> ReactionStatus {
        // The cell is only ever written with valid discriminants.
        ReactionStatus::try_from(self.0.load(Ordering::Acquire)).unwrap_or_default()
    }

    /// Attempt the `Inactive -> Queued` transition.
    ///
    /// Returns `true` iff this caller won the admission race. A `false`
    /// return means the reaction is already admitted (or executing) at the
    /// current tag and the caller must not enqueue it again.
    #[inline]
    pub fn try_admit(&self) -> bool {
        self.0
            .compare_exchange(
                ReactionStatus::Inactive as u32,
                ReactionStatus::Queued as u32,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Attempt the `Queued -> Inactive` transition.
    ///
    /// On failure, returns the status that was actually observed so the
    /// caller can report the contract violation before aborting.
    #[inline]
    pub fn retire(&self) -> Result<(), ReactionStatus> {
        match self.0.compare_exchange(
            ReactionStatus::Queued as u32,
            ReactionStatus::Inactive as u32,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => Ok(()),
            Err(observed) => Err(ReactionStatus::try_from(observed).unwrap_or_default()),
        }
    }
}

// ============================================================================
// Configuration constants
// ============================================================================

/// Configuration constants
pub mod config {
    /// Maximum precedence level assumed when the host supplies no per-level
    /// reaction counts.
    pub const DEFAULT_MAX_REACTION_LEVEL: usize = 100;

    /// Worker id passed to `trigger_reaction` by callers that are not worker
    /// threads.
    pub const ANONYMOUS_WORKER: isize = -1;
}

// ============================================================================
// Tests
// ============================================================================
