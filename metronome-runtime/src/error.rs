//! Error types for the metronome runtime

use thiserror::Error;

/// Alias for `Result<T, Error>`
pub type Result<T> = std::result::Result<T, Error>;

/// Metronome runtime errors
#[derive(Error, Debug)]
pub enum Error {
    /// Failed to spawn a worker or watchdog thread
    #[error("thread spawn failed: {0}")]
    Spawn(#[from] std::io::Error),

    /// Worker pool configuration does not match the scheduler it serves
    #[error("config asks for {configured} workers but the scheduler coordinates {expected}")]
    InvalidWorker {
        /// Worker count in the pool configuration
        configured: usize,
        /// Worker count the scheduler was initialized with
        expected: usize,
    },

    /// No scheduler has been installed on the environment
    #[error("scheduler not initialized")]
    NotInitialized,

    /// A worker thread panicked while executing a reaction body
    #[error("worker {0} panicked while executing a reaction")]
    WorkerPanicked(usize),
}
