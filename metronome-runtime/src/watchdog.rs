//! Per-reactor watchdog timers
//!
//! A watchdog monitors that its owning reactor renews a time budget before
//! physical time catches up with the budget's expiration. Each watchdog owns
//! a dedicated monitor thread that sleeps on the reactor's condition
//! variable and, if the budget runs out without a renewal, invokes the
//! handler under the reactor mutex.
//!
//! All watchdog state transitions happen under the reactor mutex, and the
//! monitor re-checks both the expiration and the terminate flag after every
//! wake: wakes may be spurious, and the expiration may have moved while the
//! monitor slept.

use crate::error::Result;
use metronome_common::{Interval, Timestamp, NEVER};
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::debug;

/// Time capability handed to a watchdog.
///
/// `logical` is the time of the current tag as maintained by the host
/// runtime; budgets are measured from it. `physical` is what the budget is
/// raced against.
pub trait Clock: Send + Sync + 'static {
    /// Current physical time in nanoseconds.
    fn physical(&self) -> Timestamp;

    /// Time of the current tag in nanoseconds.
    fn logical(&self) -> Timestamp;
}

/// Clock for hosts whose logical timeline tracks the wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct WallClock;

impl Clock for WallClock {
    fn physical(&self) -> Timestamp {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as Timestamp)
            .unwrap_or(0)
    }

    fn logical(&self) -> Timestamp {
        self.physical()
    }
}

/// Watchdog fields guarded by the reactor mutex.
struct WatchdogState {
    /// Physical-time deadline, or `NEVER` while the watchdog is idle.
    expiration: Timestamp,
    /// Whether the monitor is currently watching a deadline.
    active: bool,
    /// Set exactly once, at shutdown.
    terminate: bool,
}

struct WatchdogShared {
    /// The reactor mutex: held across every state mutation and across the
    /// handler invocation.
    state: Mutex<WatchdogState>,
    cond: Condvar,
}

/// A bounded-time monitor owned by one reactor.
///
/// Dropping the watchdog terminates and joins its monitor thread.
pub struct Watchdog {
    name: String,
    min_expiration: Interval,
    clock: Arc<dyn Clock>,
    shared: Arc<WatchdogShared>,
    thread: Option<JoinHandle<()>>,
}

impl Watchdog {
    /// Spawn a watchdog and its monitor thread.
    ///
    /// `min_expiration` is the baseline budget added to every
    /// [`Watchdog::start`]. The handler runs on the monitor thread, under
    /// the reactor mutex, and must not panic.
    pub fn spawn(
        name: impl Into<String>,
        min_expiration: Interval,
        clock: impl Clock,
        handler: impl FnMut() + Send + 'static,
    ) -> Result<Self> {
        let name = name.into();
        let clock = Arc::new(clock);
        let shared = Arc::new(WatchdogShared {
            state: Mutex::new(WatchdogState {
                expiration: NEVER,
                active: false,
                terminate: false,
            }),
            cond: Condvar::new(),
        });

        let thread = std::thread::Builder::new()
            .name(format!("watchdog-{name}"))
            .spawn({
                let shared = shared.clone();
                let clock: Arc<dyn Clock> = clock.clone();
                let name = name.clone();
                move || monitor_main(&name, &shared, &*clock, handler)
            })?;

        Ok(Self {
            name,
            min_expiration,
            clock,
            shared,
            thread: Some(thread),
        })
    }

    /// Name of this watchdog.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Arm (or renew) the watchdog.
    ///
    /// The new expiration is the current logical time plus the baseline
    /// budget plus `additional`. An idle monitor is signaled to start
    /// watching; an active one picks up the moved expiration at its next
    /// wake.
    pub fn start(&self, additional: Interval) {
        let mut state = self.shared.state.lock();
        state.terminate = false;
        state.expiration = self
            .clock
            .logical()
            .saturating_add(self.min_expiration)
            .saturating_add(additional);
        if !state.active {
            self.shared.cond.notify_one();
        }
    }

    /// Disarm the watchdog; the handler will not run for the current budget.
    pub fn stop(&self) {
        let mut state = self.shared.state.lock();
        state.expiration = NEVER;
        self.shared.cond.notify_one();
    }

    /// Whether the monitor is currently watching a deadline.
    pub fn is_active(&self) -> bool {
        self.shared.state.lock().active
    }

    /// Terminate the monitor thread and join it.
    pub fn shutdown(&mut self) {
        {
            let mut state = self.shared.state.lock();
            state.terminate = true;
            state.expiration = NEVER;
            self.shared.cond.notify_one();
        }
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Monitor thread: idle-wait, timed-wait, fire, repeat until terminated.
fn monitor_main(
    name: &str,
    shared: &WatchdogShared,
    clock: &dyn Clock,
    mut handler: impl FnMut(),
) {
    debug!(watchdog = name, "monitor started");
    let mut state = shared.state.lock();

    loop {
        if state.terminate {
            break;
        }

        if state.expiration == NEVER {
            // Idle: wait for a budget to watch.
            state.active = false;
            shared.cond.wait(&mut state);
            continue;
        }

        state.active = true;
        let now = clock.physical();
        if now < state.expiration {
            // The expiration may move (renewal) or clear (stop) while we
            // sleep; whatever happens, re-evaluate from the top.
            let remaining = Duration::from_nanos((state.expiration - now) as u64);
            shared.cond.wait_for(&mut state, remaining);
            continue;
        }

        // Budget exhausted with no extension: fire under the reactor mutex.
        debug!(watchdog = name, "budget expired, invoking handler");
        handler();
        state.active = false;
        state.expiration = NEVER;
    }

    state.active = false;
    debug!(watchdog = name, "monitor terminated");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    const MS: Interval = 1_000_000;

    fn counting_watchdog(budget: Interval) -> (Watchdog, Arc<AtomicUsize>) {
        let fired = Arc::new(AtomicUsize::new(0));
        let watchdog = Watchdog::spawn("test", budget, WallClock, {
            let fired = fired.clone();
            move || {
                fired.fetch_add(1, Ordering::SeqCst);
            }
        })
        .unwrap();
        (watchdog, fired)
    }

    #[test]
    fn test_fires_once_after_budget() {
        let (watchdog, fired) = counting_watchdog(50 * MS);
        watchdog.start(0);

        thread::sleep(Duration::from_millis(250));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        // After firing the monitor returns to idle-wait and does not refire.
        assert!(!watchdog.is_active());
    }

    #[test]
    fn test_renewal_extends_the_budget() {
        let (watchdog, fired) = counting_watchdog(150 * MS);
        watchdog.start(0);

        // Renew well before the first budget elapses, pushing the deadline
        // out by another full budget plus slack.
        thread::sleep(Duration::from_millis(50));
        watchdog.start(150 * MS);

        // Past the original deadline the handler must not have run.
        thread::sleep(Duration::from_millis(150));
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        // With no further renewal it eventually does.
        thread::sleep(Duration::from_millis(400));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_stop_prevents_firing() {
        let (watchdog, fired) = counting_watchdog(100 * MS);
        watchdog.start(0);
        thread::sleep(Duration::from_millis(20));
        watchdog.stop();

        thread::sleep(Duration::from_millis(250));
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert!(!watchdog.is_active());

        // The monitor is back in idle-wait and can be armed again.
        watchdog.start(0);
        thread::sleep(Duration::from_millis(250));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_shutdown_joins_monitor() {
        let (mut watchdog, fired) = counting_watchdog(60_000 * MS);
        watchdog.start(0);
        watchdog.shutdown();
        // Terminated before the budget could possibly expire.
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }
}
