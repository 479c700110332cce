//! Counting semaphore for worker parking
//!
//! Workers that go idle without being the last idle worker block here until
//! the distributing worker hands out permits. Built from a mutex-guarded
//! count and a condition variable, which is all the scheduler needs: permits
//! are released in small batches and every waiter re-checks the count after
//! waking.

use parking_lot::{Condvar, Mutex};

/// Counting semaphore.
pub struct Semaphore {
    count: Mutex<usize>,
    cond: Condvar,
}

impl Semaphore {
    /// A semaphore holding `permits` initial permits.
    pub fn new(permits: usize) -> Self {
        Self {
            count: Mutex::new(permits),
            cond: Condvar::new(),
        }
    }

    /// Block until a permit is available, then take it.
    pub fn acquire(&self) {
        let mut count = self.count.lock();
        while *count == 0 {
            self.cond.wait(&mut count);
        }
        *count -= 1;
    }

    /// Release `permits` permits, waking as many waiters.
    pub fn release(&self, permits: usize) {
        if permits == 0 {
            return;
        }
        let mut count = self.count.lock();
        *count += permits;
        if permits == 1 {
            self.cond.notify_one();
        } else {
            self.cond.notify_all();
        }
    }

    /// Permits currently available.
    pub fn available(&self) -> usize {
        *self.count.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_acquire_consumes_permits() {
        let sem = Semaphore::new(2);
        sem.acquire();
        sem.acquire();
        assert_eq!(sem.available(), 0);

        sem.release(3);
        assert_eq!(sem.available(), 3);
    }

    #[test]
    fn test_release_zero_is_noop() {
        let sem = Semaphore::new(0);
        sem.release(0);
        assert_eq!(sem.available(), 0);
    }

    #[test]
    fn test_release_wakes_blocked_acquirers() {
        let sem = Arc::new(Semaphore::new(0));
        let handles: Vec<_> = (0..3)
            .map(|_| {
                let sem = sem.clone();
                thread::spawn(move || sem.acquire())
            })
            .collect();

        // Give the threads time to block before handing out permits.
        thread::sleep(Duration::from_millis(50));
        sem.release(3);

        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(sem.available(), 0);
    }
}
