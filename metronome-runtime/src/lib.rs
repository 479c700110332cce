//! # Metronome Runtime
//!
//! A deterministic, level-synchronized reaction scheduler for the metronome
//! reactor runtime.
//!
//! Reactions are registered up front, each with a precomputed index whose
//! upper bits encode a precedence level and whose lower bits break ties by
//! deadline. A fixed pool of worker threads drains one level at a time in
//! ascending index order (GEDF-NP); when a tag has fully drained, the worker
//! that went idle last asks the host's event source for the next tag.
//!
//! ## Key Components
//!
//! - **Scheduler**: level-synchronized work distribution with single-fire
//!   admission via an atomic status CAS
//! - **Worker Pool**: OS threads running the get/execute/done loop
//! - **Event Source**: host hook that moves logical time forward
//! - **Watchdog**: per-reactor bounded-time monitors
//!
//! ## Usage
//!
//! ```rust,no_run
//! use metronome_runtime::{
//!     Environment, EventSource, Reaction, Scheduler, SchedulerParams, TagOutcome, WorkerConfig,
//!     WorkerPool,
//! };
//! use metronome_common::config::ANONYMOUS_WORKER;
//! use metronome_common::ReactionIndex;
//!
//! struct SingleTag;
//!
//! impl EventSource for SingleTag {
//!     fn advance_tag(&mut self, _scheduler: &Scheduler) -> TagOutcome {
//!         // A real host pops its event queue and triggers the new tag's
//!         // reactions here.
//!         TagOutcome::Stop
//!     }
//! }
//!
//! let env = Environment::new(SingleTag);
//! let config = WorkerConfig {
//!     num_workers: 2,
//!     ..WorkerConfig::default()
//! };
//! let scheduler = Scheduler::init(&env, config.num_workers, SchedulerParams::default());
//!
//! let hello = Reaction::new("hello", ReactionIndex::new(0, 0), || println!("hello"));
//! scheduler.trigger_reaction(&hello, ANONYMOUS_WORKER);
//!
//! let pool = WorkerPool::spawn(&config, scheduler).unwrap();
//! pool.join().unwrap();
//! ```

pub mod env;
pub mod error;
pub mod pq;
pub mod reaction;
mod ready;
pub mod sched;
pub mod sync;
pub mod watchdog;
pub mod worker;

pub use env::{Environment, EventSource, TagOutcome};
pub use error::{Error, Result};
pub use reaction::{Reaction, ReactionBody};
pub use sched::{Scheduler, SchedulerParams};
pub use watchdog::{Clock, WallClock, Watchdog};
pub use worker::{current_worker_id, WorkerConfig, WorkerPool};

/// Re-export common types
pub use metronome_common::{
    Interval, ReactionIndex, ReactionStatus, StatusCell, Tag, Timestamp, FOREVER, NEVER,
};
