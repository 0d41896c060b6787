// Synchronization primitives
//
// Pools hand out locks and wait conditions through `SyncFactory` so that the
// executor, async caller and preflight suite never name a concrete substrate.
// Access is closure-scoped: the protected value is only reachable inside `with`.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Mutual exclusion around a value.
pub trait Lock<T>: Send + Sync {
    /// Run `f` with exclusive access to the protected value.
    fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> R;
}

/// A lock paired with a wait/notify mechanism.
pub trait WaitCondition<T>: Send + Sync {
    /// Run `f` with exclusive access to the protected value.
    fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> R;

    /// Wake up every thread blocked in [`wait_until`](Self::wait_until).
    fn notify_all(&self);

    /// Block until `ready` yields a value or `timeout` elapses.
    ///
    /// `ready` is evaluated under the lock before the first wait and after every
    /// wakeup. `None` timeout waits indefinitely. Returns `None` on timeout.
    fn wait_until<R>(
        &self,
        timeout: Option<Duration>,
        ready: impl FnMut(&mut T) -> Option<R>,
    ) -> Option<R>;
}

/// Factory for synchronization primitives compatible with one thread substrate.
pub trait SyncFactory: Send + Sync + 'static {
    type Lock<T: Send + 'static>: Lock<T> + 'static;
    type WaitCondition<T: Send + 'static>: WaitCondition<T> + 'static;

    fn create_lock<T: Send + 'static>(&self, value: T) -> Self::Lock<T>;

    fn create_wait_condition<T: Send + 'static>(&self, value: T) -> Self::WaitCondition<T>;
}

fn lock_ignoring_poison<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // Panics in task bodies are caught by the pools, a poisoned guard still holds
    // consistent data for every user in this crate.
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// `std::sync::Mutex` backed lock
#[derive(Debug, Default)]
pub struct StdLock<T> {
    inner: Mutex<T>,
}

impl<T> StdLock<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: Mutex::new(value),
        }
    }
}

impl<T: Send> Lock<T> for StdLock<T> {
    fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let mut guard = lock_ignoring_poison(&self.inner);
        f(&mut guard)
    }
}

/// `std::sync::Mutex` + `Condvar` backed wait condition
#[derive(Debug, Default)]
pub struct StdWaitCondition<T> {
    state: Mutex<T>,
    condvar: Condvar,
}

impl<T> StdWaitCondition<T> {
    pub fn new(value: T) -> Self {
        Self {
            state: Mutex::new(value),
            condvar: Condvar::new(),
        }
    }
}

impl<T: Send> WaitCondition<T> for StdWaitCondition<T> {
    fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let mut guard = lock_ignoring_poison(&self.state);
        f(&mut guard)
    }

    fn notify_all(&self) {
        // Taking the lock orders the notification after any state change made
        // under `with`, so a waiter cannot miss it between check and wait.
        let _guard = lock_ignoring_poison(&self.state);
        self.condvar.notify_all();
    }

    fn wait_until<R>(
        &self,
        timeout: Option<Duration>,
        mut ready: impl FnMut(&mut T) -> Option<R>,
    ) -> Option<R> {
        let mut guard = lock_ignoring_poison(&self.state);
        if let Some(value) = ready(&mut guard) {
            return Some(value);
        }

        match timeout {
            Some(timeout) => {
                let deadline = Instant::now() + timeout;
                loop {
                    let now = Instant::now();
                    if now >= deadline {
                        return None;
                    }
                    let (next, _) = self
                        .condvar
                        .wait_timeout(guard, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner);
                    guard = next;
                    if let Some(value) = ready(&mut guard) {
                        return Some(value);
                    }
                }
            }
            None => loop {
                guard = self
                    .condvar
                    .wait(guard)
                    .unwrap_or_else(PoisonError::into_inner);
                if let Some(value) = ready(&mut guard) {
                    return Some(value);
                }
            },
        }
    }
}

/// Factory producing the std-backed primitives. Shared by the OS-thread pool
/// and the manual single-thread pool.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdSyncFactory;

impl SyncFactory for StdSyncFactory {
    type Lock<T: Send + 'static> = StdLock<T>;
    type WaitCondition<T: Send + 'static> = StdWaitCondition<T>;

    fn create_lock<T: Send + 'static>(&self, value: T) -> StdLock<T> {
        StdLock::new(value)
    }

    fn create_wait_condition<T: Send + 'static>(&self, value: T) -> StdWaitCondition<T> {
        StdWaitCondition::new(value)
    }
}

/// Count down latch built on a factory-created wait condition.
///
/// Threads block in [`wait`](Self::wait) until [`decrease`](Self::decrease)
/// has been called `count` times.
pub struct CountDownLatch<W: WaitCondition<usize>> {
    count: W,
}

impl<W: WaitCondition<usize>> CountDownLatch<W> {
    /// Wrap a wait condition holding the initial count:
    /// `CountDownLatch::new(pool.create_wait_condition(3))`.
    pub fn new(count: W) -> Self {
        Self { count }
    }

    pub fn decrease(&self) {
        let reached_zero = self.count.with(|count| {
            *count = count.saturating_sub(1);
            *count == 0
        });
        if reached_zero {
            self.count.notify_all();
        }
    }

    pub fn wait(&self) {
        self.count
            .wait_until(None, |count| (*count == 0).then_some(()));
    }

    /// Wait at most `timeout`; returns whether the latch reached zero.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        self.count
            .wait_until(Some(timeout), |count| (*count == 0).then_some(()))
            .is_some()
    }

    pub fn count(&self) -> usize {
        self.count.with(|count| *count)
    }
}
