//! Scheduler core: level-synchronized GEDF-NP work distribution
//!
//! A fixed pool of workers drains one precedence level at a time. Within a
//! level, reactions come out in ascending index order; a level only opens
//! once every reaction of the previous level has completed; and the tag only
//! advances once every level has drained. The worker whose idle increment
//! brings the idle count to the pool size is elected to drive level and tag
//! advance while everyone else parks on the scheduling semaphore.

use crate::env::{Environment, TagOutcome};
use crate::reaction::Reaction;
use crate::ready::ReadyTable;
use crate::sync::Semaphore;
use crossbeam::utils::CachePadded;
use metronome_common::config::DEFAULT_MAX_REACTION_LEVEL;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Scheduler construction parameters.
#[derive(Debug, Clone, Default)]
pub struct SchedulerParams {
    /// Number of reactions registered at each precedence level. The length
    /// determines the maximum level; empty means "unknown", which falls back
    /// to [`DEFAULT_MAX_REACTION_LEVEL`] with unsized queues.
    pub num_reactions_per_level: Vec<usize>,
}

impl SchedulerParams {
    fn level_sizes(&self) -> Vec<usize> {
        if self.num_reactions_per_level.is_empty() {
            vec![0; DEFAULT_MAX_REACTION_LEVEL + 1]
        } else {
            self.num_reactions_per_level.clone()
        }
    }
}

/// Level-synchronized reaction scheduler.
///
/// Shared by reference between the worker pool, triggering code, and the
/// host runtime. All methods take `&self`; the type is `Send + Sync`.
/// Dropping the last handle releases every level queue and the scheduling
/// semaphore.
pub struct Scheduler {
    env: Arc<Environment>,
    number_of_workers: usize,
    idle_workers: CachePadded<AtomicU32>,
    should_stop: AtomicBool,
    semaphore: Semaphore,
    ready: ReadyTable,
}

impl Scheduler {
    /// Install a scheduler on `env`, or return the one already installed.
    ///
    /// Idempotent per environment: the first call builds the scheduler and
    /// parks a weak handle in the environment; later calls hand back the
    /// same instance as long as the host still owns it. `number_of_workers`
    /// is clamped to at least 1.
    pub fn init(
        env: &Arc<Environment>,
        number_of_workers: usize,
        params: SchedulerParams,
    ) -> Arc<Self> {
        let mut slot = env.scheduler.write();
        if let Some(existing) = slot.upgrade() {
            debug!("scheduler already initialized");
            return existing;
        }

        let number_of_workers = number_of_workers.max(1);
        debug!(workers = number_of_workers, "initializing scheduler");
        let scheduler = Arc::new(Self {
            env: env.clone(),
            number_of_workers,
            idle_workers: CachePadded::new(AtomicU32::new(0)),
            should_stop: AtomicBool::new(false),
            semaphore: Semaphore::new(0),
            ready: ReadyTable::new(&params.level_sizes()),
        });
        *slot = Arc::downgrade(&scheduler);
        scheduler
    }

    /// Number of workers this scheduler coordinates.
    pub fn number_of_workers(&self) -> usize {
        self.number_of_workers
    }

    /// The environment this scheduler is installed on.
    pub fn environment(&self) -> &Arc<Environment> {
        &self.env
    }

    /// Whether stop has been signaled.
    pub fn should_stop(&self) -> bool {
        self.should_stop.load(Ordering::Acquire)
    }

    /// Ask for one more reaction to execute.
    ///
    /// Blocks until a ready reaction is available for `worker` or it is time
    /// to stop, in which case `None` is returned and the worker should exit.
    /// The returned reaction's status is `Queued`; the caller owes a
    /// matching [`Scheduler::done_with_reaction`].
    pub fn get_ready_reaction(&self, worker: usize) -> Option<Arc<Reaction>> {
        while !self.should_stop() {
            if let Some(reaction) = self.ready.pop_executing() {
                return Some(reaction);
            }

            debug!(worker, "out of ready reactions");
            self.wait_for_work(worker);
        }
        None
    }

    /// Report that `worker` finished executing `reaction`.
    ///
    /// # Panics
    ///
    /// Panics if the reaction's status is anything but `Queued`: a lost or
    /// duplicated reaction cannot be reconciled with deterministic
    /// execution, so the violation is fatal rather than recoverable.
    pub fn done_with_reaction(&self, worker: usize, reaction: &Reaction) {
        if let Err(observed) = reaction.status().retire() {
            panic!(
                "worker {worker}: reaction {} completed with status {observed:?}, expected Queued",
                reaction.name()
            );
        }
    }

    /// Trigger `reaction` at the current tag.
    ///
    /// The status CAS guarantees at most one admission per tag: racing
    /// triggerers lose silently. Reactions triggered from a body must sit at
    /// a higher precedence level than the reaction triggering them, which
    /// the level assignment already guarantees for well-formed programs.
    /// Pass [`metronome_common::config::ANONYMOUS_WORKER`] as `worker` when
    /// the caller is not a worker thread.
    pub fn trigger_reaction(&self, reaction: &Arc<Reaction>, worker: isize) {
        if !reaction.status().try_admit() {
            // Another triggerer won the admission race at this tag.
            return;
        }
        debug!(
            worker,
            reaction = reaction.name(),
            level = reaction.level(),
            "enqueueing reaction"
        );
        self.ready.insert(reaction.clone());
    }

    /// Signal every worker that it is time to stop.
    ///
    /// Idempotent. Each worker observes the flag at its next loop iteration
    /// and returns `None` from [`Scheduler::get_ready_reaction`].
    pub fn signal_stop(&self) {
        if self.should_stop.swap(true, Ordering::AcqRel) {
            return;
        }
        debug!("signaling stop");
        self.semaphore.release(self.number_of_workers - 1);
    }

    /// Park `worker` until the scheduler assigns more work.
    ///
    /// The last worker to go idle is elected to distribute the next level or
    /// advance the tag; everyone else waits on the semaphore.
    fn wait_for_work(&self, worker: usize) {
        let idle = self.idle_workers.fetch_add(1, Ordering::AcqRel) + 1;
        if idle as usize == self.number_of_workers {
            debug!(worker, "last idle worker, driving the schedule");
            self.try_advance_tag_and_distribute();
        } else {
            self.semaphore.acquire();
        }
    }

    /// Advance levels (and, past the last level, the tag) until work has
    /// been distributed or the stop tag is reached.
    ///
    /// Runs on the last-idle worker with the executing queue empty.
    fn try_advance_tag_and_distribute(&self) {
        debug_assert_eq!(self.ready.executing_len(), 0);

        while !self.should_stop() {
            if self.ready.cursor() == self.ready.max_level() + 1 {
                // Nothing more happening at this tag.
                self.ready.reset_cursor();
                let mut source = self.env.source.lock();
                debug!("advancing tag");
                if source.advance_tag(self) == TagOutcome::Stop {
                    debug!("reached stop tag");
                    drop(source);
                    self.signal_stop();
                    break;
                }
            }

            if self.distribute_ready_reactions() > 0 {
                self.notify_workers();
                break;
            }
        }
    }

    /// Point the executing queue at the next level with ready reactions.
    ///
    /// Returns the number of reactions now available to workers, or 0 when
    /// the tag has fully drained.
    fn distribute_ready_reactions(&self) -> usize {
        // Every other worker is parked, so the level queues are quiescent;
        // the event source may still skip levels it knows are empty.
        let mut source = self.env.source.lock();
        self.ready.distribute(|cursor| source.advance_level(cursor))
    }

    /// Wake enough workers to drain the executing queue.
    ///
    /// The caller is itself one of the workers being put back to work, so
    /// one fewer semaphore permit than awakened workers is released.
    fn notify_workers(&self) {
        let idle = self.idle_workers.load(Ordering::Acquire) as usize;
        let to_awaken = idle.min(self.ready.executing_len());
        debug!(to_awaken, "notifying workers");

        self.idle_workers
            .fetch_sub(to_awaken as u32, Ordering::AcqRel);
        if to_awaken > 1 {
            self.semaphore.release(to_awaken - 1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::EventSource;
    use metronome_common::config::ANONYMOUS_WORKER;
    use metronome_common::{ReactionIndex, ReactionStatus};

    struct StopImmediately;

    impl EventSource for StopImmediately {
        fn advance_tag(&mut self, _scheduler: &Scheduler) -> TagOutcome {
            TagOutcome::Stop
        }
    }

    fn two_level_scheduler() -> Arc<Scheduler> {
        let env = Environment::new(StopImmediately);
        Scheduler::init(
            &env,
            1,
            SchedulerParams {
                num_reactions_per_level: vec![4, 4],
            },
        )
    }

    #[test]
    fn test_init_is_idempotent() {
        let env = Environment::new(StopImmediately);
        let first = Scheduler::init(&env, 2, SchedulerParams::default());
        let second = Scheduler::init(&env, 8, SchedulerParams::default());

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.number_of_workers(), 2);
        assert!(Arc::ptr_eq(&env.scheduler().unwrap(), &first));
    }

    #[test]
    fn test_zero_workers_is_clamped() {
        let env = Environment::new(StopImmediately);
        let scheduler = Scheduler::init(&env, 0, SchedulerParams::default());
        assert_eq!(scheduler.number_of_workers(), 1);
    }

    #[test]
    fn test_duplicate_trigger_admits_once() {
        let scheduler = two_level_scheduler();
        let r = Reaction::bodiless("dup", ReactionIndex::new(0, 1));

        scheduler.trigger_reaction(&r, ANONYMOUS_WORKER);
        scheduler.trigger_reaction(&r, ANONYMOUS_WORKER);
        scheduler.trigger_reaction(&r, 0);

        // One admission made it into the level queue; the rest were silent
        // no-ops.
        assert_eq!(r.status().load(), ReactionStatus::Queued);
        let popped = scheduler.get_ready_reaction(0).unwrap();
        assert!(Reaction::same_reaction(&popped, &r));
        scheduler.done_with_reaction(0, &popped);
        assert_eq!(r.status().load(), ReactionStatus::Inactive);
    }

    #[test]
    #[should_panic(expected = "expected Queued")]
    fn test_done_without_admission_is_fatal() {
        let scheduler = two_level_scheduler();
        let r = Reaction::bodiless("never-queued", ReactionIndex::new(0, 1));
        scheduler.done_with_reaction(0, &r);
    }

    /// The scheduler is shared by reference across worker threads and the
    /// host; that only works if it is Send + Sync.
    #[test]
    fn test_scheduler_is_send_and_sync() {
        static_assertions::assert_impl_all!(Scheduler: Send, Sync);
    }

    #[test]
    fn test_signal_stop_is_idempotent() {
        let scheduler = two_level_scheduler();
        scheduler.signal_stop();
        scheduler.signal_stop();
        assert!(scheduler.should_stop());
        assert!(scheduler.get_ready_reaction(0).is_none());
    }
}
