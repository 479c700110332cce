//! Per-level ready queues and the level cursor
//!
//! One priority queue per precedence level, each behind its own mutex, plus
//! the cursor that walks levels within a tag and the pointer to the queue
//! currently being drained by the workers.
//!
//! The cursor and the executing pointer are plain atomics rather than
//! mutex-protected state: they are written only by the last-idle worker
//! while every other worker is parked on the scheduling semaphore, and the
//! semaphore handoff provides the happens-before edge to the workers that
//! read them afterwards.

use crate::pq::ReactionQueue;
use crate::reaction::Reaction;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

pub(crate) struct ReadyTable {
    levels: Box<[Mutex<ReactionQueue>]>,
    /// Points one past the level to execute; 1 means "about to execute
    /// level 0".
    next_level: AtomicUsize,
    /// Index of the level currently dispatched to workers.
    executing: AtomicUsize,
}

impl ReadyTable {
    /// Build a table with one queue per level, pre-sized from the host's
    /// per-level reaction counts.
    pub(crate) fn new(num_reactions_per_level: &[usize]) -> Self {
        debug_assert!(!num_reactions_per_level.is_empty());
        let levels: Box<[Mutex<ReactionQueue>]> = num_reactions_per_level
            .iter()
            .map(|&n| Mutex::new(ReactionQueue::with_capacity(n)))
            .collect();
        Self {
            levels,
            next_level: AtomicUsize::new(1),
            executing: AtomicUsize::new(0),
        }
    }

    /// Highest precedence level.
    pub(crate) fn max_level(&self) -> usize {
        self.levels.len() - 1
    }

    /// Current cursor value.
    pub(crate) fn cursor(&self) -> usize {
        self.next_level.load(Ordering::Acquire)
    }

    /// Reset the cursor for a fresh tag.
    pub(crate) fn reset_cursor(&self) {
        self.next_level.store(0, Ordering::Release);
    }

    /// Insert an admitted reaction into the queue of its own level.
    pub(crate) fn insert(&self, reaction: Arc<Reaction>) {
        let level = reaction.level();
        assert!(
            level <= self.max_level(),
            "reaction {} has level {} but the table tops out at {}",
            reaction.name(),
            level,
            self.max_level()
        );
        self.levels[level].lock().insert(reaction);
    }

    /// Pop the lowest-index reaction from the executing queue.
    pub(crate) fn pop_executing(&self) -> Option<Arc<Reaction>> {
        let level = self.executing.load(Ordering::Acquire);
        self.levels[level].lock().pop_min()
    }

    /// Size of the executing queue.
    pub(crate) fn executing_len(&self) -> usize {
        let level = self.executing.load(Ordering::Acquire);
        self.levels[level].lock().len()
    }

    /// Walk the cursor forward to the next level with work.
    ///
    /// Must only run on the last-idle worker. The cursor advances by one
    /// each round (forward progress is owed by this table, not the hook);
    /// `skip_hook` may then push it further past levels the host knows are
    /// empty. Returns the size of the newly executing queue, or 0 when every
    /// remaining level is empty (the caller advances the tag).
    pub(crate) fn distribute<F>(&self, mut skip_hook: F) -> usize
    where
        F: FnMut(&mut usize),
    {
        let max = self.max_level();
        let mut cursor = self.next_level.load(Ordering::Acquire);
        let mut dispatched = 0;

        while cursor <= max {
            cursor += 1;
            skip_hook(&mut cursor);
            // A hook that overshoots lands on "past the last level".
            cursor = cursor.min(max + 1);

            let level = cursor - 1;
            let ready = self.levels[level].lock().len();
            if ready > 0 {
                self.executing.store(level, Ordering::Release);
                dispatched = ready;
                break;
            }
        }

        self.next_level.store(cursor, Ordering::Release);
        dispatched
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use metronome_common::ReactionIndex;

    fn reaction(name: &str, level: u16, key: u64) -> Arc<Reaction> {
        Reaction::bodiless(name, ReactionIndex::new(level, key))
    }

    #[test]
    fn test_distribute_walks_to_first_nonempty_level() {
        let table = ReadyTable::new(&[1, 1, 1]);
        table.insert(reaction("r2", 2, 0));

        // Level 0 already dispatched (cursor 1) and empty; levels 1 is
        // empty too, so the walk should land on level 2.
        assert_eq!(table.distribute(|_| {}), 1);
        assert_eq!(table.pop_executing().unwrap().name(), "r2");
        assert_eq!(table.cursor(), 3);
    }

    #[test]
    fn test_distribute_returns_zero_when_drained() {
        let table = ReadyTable::new(&[1, 1]);
        assert_eq!(table.distribute(|_| {}), 0);
        assert_eq!(table.cursor(), table.max_level() + 1);
    }

    #[test]
    fn test_distribute_after_tag_reset_starts_at_level_zero() {
        let table = ReadyTable::new(&[2, 1]);
        table.insert(reaction("a", 0, 1));
        table.insert(reaction("b", 0, 2));

        table.reset_cursor();
        assert_eq!(table.distribute(|_| {}), 2);
        assert_eq!(table.pop_executing().unwrap().name(), "a");
        assert_eq!(table.pop_executing().unwrap().name(), "b");
    }

    #[test]
    fn test_skip_hook_may_jump_levels() {
        let table = ReadyTable::new(&[1, 1, 1, 1]);
        table.insert(reaction("r1", 1, 0));
        table.insert(reaction("r3", 3, 0));

        table.reset_cursor();
        // Host knows levels 0..=2 are empty this tag and jumps straight to
        // level 3; the reaction parked at level 1 simply waits for its turn
        // on a later walk in a real run, but here the jump must be honored.
        assert_eq!(table.distribute(|cursor| *cursor = 4), 1);
        assert_eq!(table.pop_executing().unwrap().name(), "r3");
    }

    #[test]
    fn test_overshooting_hook_is_clamped() {
        let table = ReadyTable::new(&[1, 1]);
        table.insert(reaction("r1", 1, 0));

        table.reset_cursor();
        assert_eq!(table.distribute(|cursor| *cursor = 99), 1);
        assert_eq!(table.cursor(), table.max_level() + 1);
    }

    #[test]
    #[should_panic(expected = "tops out")]
    fn test_insert_beyond_max_level_is_fatal() {
        let table = ReadyTable::new(&[1]);
        table.insert(reaction("too-deep", 5, 0));
    }
}
