//! Worker thread management
//!
//! Each worker thread runs the get/execute/done loop against the scheduler
//! until stop is signaled. Workers are plain OS threads; reactions run to
//! completion on the worker that dequeued them.

use crate::error::{Error, Result};
use crate::sched::Scheduler;
use std::cell::Cell;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{debug, info};

thread_local! {
    /// The worker id for the current thread
    static WORKER_ID: Cell<Option<usize>> = const { Cell::new(None) };
}

/// Get the current worker id, if running on a pool worker thread
pub fn current_worker_id() -> Option<usize> {
    WORKER_ID.with(|id| id.get())
}

/// Set the current thread's worker id (called during worker startup)
fn set_current_worker(id: usize) {
    WORKER_ID.with(|cell| cell.set(Some(id)));
}

/// Worker pool configuration
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Number of workers (default: number of CPUs)
    pub num_workers: usize,

    /// Worker thread name prefix
    pub name_prefix: String,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            num_workers: std::thread::available_parallelism()
                .map(NonZeroUsize::get)
                .unwrap_or(1),
            name_prefix: "metronome-worker".to_string(),
        }
    }
}

/// Fixed pool of reaction-executing worker threads
pub struct WorkerPool {
    handles: Vec<(usize, JoinHandle<()>)>,
    scheduler: Arc<Scheduler>,
}

impl WorkerPool {
    /// Spawn one worker thread per scheduler worker slot.
    ///
    /// The pool size is dictated by the scheduler the pool serves; the
    /// idle-barrier arithmetic depends on exactly that many workers
    /// participating, so a configuration that disagrees (the scheduler
    /// clamps a worker count of 0 to 1, for one) is rejected rather than
    /// silently overridden.
    pub fn spawn(config: &WorkerConfig, scheduler: Arc<Scheduler>) -> Result<Self> {
        let num_workers = scheduler.number_of_workers();
        if config.num_workers != num_workers {
            return Err(Error::InvalidWorker {
                configured: config.num_workers,
                expected: num_workers,
            });
        }

        info!(num_workers, "starting worker pool");
        let mut handles = Vec::with_capacity(num_workers);
        for id in 0..num_workers {
            let scheduler = scheduler.clone();
            let handle = std::thread::Builder::new()
                .name(format!("{}-{}", config.name_prefix, id))
                .spawn(move || worker_main(id, scheduler))?;
            handles.push((id, handle));
        }

        Ok(Self { handles, scheduler })
    }

    /// Number of workers in the pool
    pub fn num_workers(&self) -> usize {
        self.scheduler.number_of_workers()
    }

    /// The scheduler this pool serves
    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    /// Wait for every worker to observe stop and exit.
    ///
    /// Returns an error naming the first worker whose thread panicked (a
    /// reaction body violated its no-panic contract).
    pub fn join(mut self) -> Result<()> {
        for (id, handle) in self.handles.drain(..) {
            handle.join().map_err(|_| Error::WorkerPanicked(id))?;
        }
        info!("worker pool shutdown complete");
        Ok(())
    }

    /// Signal stop and join all workers, swallowing worker panics.
    pub fn shutdown(&mut self) {
        self.scheduler.signal_stop();
        for (_, handle) in self.handles.drain(..) {
            let _ = handle.join();
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Body of a pool worker thread.
fn worker_main(id: usize, scheduler: Arc<Scheduler>) {
    set_current_worker(id);
    debug!(worker = id, "worker started");

    while let Some(reaction) = scheduler.get_ready_reaction(id) {
        debug!(worker = id, reaction = reaction.name(), "executing reaction");
        reaction.run();
        scheduler.done_with_reaction(id, &reaction);
    }

    debug!(worker = id, "worker stopping");
}
