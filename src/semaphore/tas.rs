use core::fmt::{self, Debug, Formatter};
use core::sync::atomic::Ordering::Relaxed;

use crate::cfg::atomic::AtomicUsize;
use crate::relax::Relax;
use crate::tas::RawTasLock;

#[cfg(test)]
use crate::test::RawExclusive;

/// A counting semaphore whose count is guarded by a test-and-set spinlock.
///
/// [`wait`] takes the spinlock, decrements the count if it is positive and
/// releases the spinlock, retrying until it succeeds. [`signal`] takes the
/// spinlock and increments. Waiters are not ordered, so under adversarial
/// scheduling a waiter may starve.
///
/// # Example
///
/// ```
/// use ticketsync::semaphore::yields::TasSemaphore;
///
/// let sem = TasSemaphore::new(1);
/// sem.wait();
/// assert!(!sem.try_wait());
/// sem.signal();
/// assert_eq!(sem.value(), 1);
/// ```
/// [`wait`]: TasSemaphore::wait
/// [`signal`]: TasSemaphore::signal
pub struct TasSemaphore<R> {
    value: AtomicUsize,
    lock: RawTasLock<R>,
}

impl<R> TasSemaphore<R> {
    /// Creates a semaphore holding `permits`.
    #[must_use]
    pub fn new(permits: usize) -> Self {
        Self { value: AtomicUsize::new(permits), lock: RawTasLock::new() }
    }

    /// Returns a snapshot of the current count.
    pub fn value(&self) -> usize {
        self.value.load(Relaxed)
    }

    /// Takes one permit if available. Caller holds `lock`.
    fn take(&self) -> bool {
        let value = self.value.load(Relaxed);
        if value > 0 {
            self.value.store(value - 1, Relaxed);
        }
        value > 0
    }
}

impl<R: Relax> TasSemaphore<R> {
    /// Takes one permit, spinning until one is available.
    ///
    /// The spinlock is only taken once the count reads positive.
    pub fn wait(&self) {
        let mut relax = R::new();
        loop {
            while self.value() == 0 {
                relax.relax();
            }
            if self.lock.lock_with(|| self.take()) {
                return;
            }
        }
    }

    /// Takes one permit if one is available right now.
    pub fn try_wait(&self) -> bool {
        self.lock.lock_with(|| self.take())
    }

    /// Returns one permit.
    pub fn signal(&self) {
        self.lock.lock_with(|| self.value.fetch_add(1, Relaxed));
    }
}

impl<R> Debug for TasSemaphore<R> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("TasSemaphore").field("value", &self.value()).finish()
    }
}

#[cfg(test)]
impl<R: Relax> RawExclusive for TasSemaphore<R> {
    fn new() -> Self {
        Self::new(1)
    }

    fn acquire(&self) {
        self.wait();
    }

    unsafe fn release(&self) {
        self.signal();
    }
}

#[cfg(all(not(loom), test))]
mod test {
    use std::sync::Arc;
    use std::thread;

    use crate::semaphore::yields::TasSemaphore;
    use crate::test::tests;

    #[test]
    fn binary_semaphore_as_mutex() {
        tests::counter::<TasSemaphore>(5, 1000);
    }

    #[test]
    fn never_two_holders() {
        tests::never_two_holders::<TasSemaphore>();
    }

    #[test]
    fn counts_signals_and_waits() {
        let sem = TasSemaphore::new(2);
        sem.signal();
        sem.wait();
        sem.wait();
        assert_eq!(sem.value(), 1);
        assert!(sem.try_wait());
        assert!(!sem.try_wait());
        assert_eq!(sem.value(), 0);
    }

    #[test]
    fn wait_blocks_until_signal() {
        let sem = Arc::new(TasSemaphore::new(0));
        let c_sem = Arc::clone(&sem);
        let waiter = thread::spawn(move || c_sem.wait());
        sem.signal();
        waiter.join().unwrap();
        assert_eq!(sem.value(), 0);
    }

    #[test]
    fn quiescent_count_matches_history() {
        const THREADS: usize = 4;
        const ROUNDS: usize = 250;
        let sem = Arc::new(TasSemaphore::new(3));
        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                let sem = Arc::clone(&sem);
                thread::spawn(move || {
                    for _ in 0..ROUNDS {
                        sem.wait();
                        sem.signal();
                        sem.signal();
                        sem.wait();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(sem.value(), 3);
    }

    #[test]
    fn empty_wait_leaves_spinlock_free() {
        let sem = Arc::new(TasSemaphore::new(0));
        let c_sem = Arc::clone(&sem);
        let waiter = thread::spawn(move || c_sem.wait());
        for _ in 0..100 {
            thread::yield_now();
            assert!(!sem.lock.is_locked());
        }
        sem.signal();
        waiter.join().unwrap();
        assert_eq!(sem.value(), 0);
    }

    #[test]
    fn debug_shows_value() {
        let sem = TasSemaphore::new(4);
        assert_eq!(format!("{sem:?}"), "TasSemaphore { value: 4 }");
    }
}

#[cfg(all(loom, test))]
mod model {
    use crate::loom::models;
    use crate::relax::Yield;

    #[test]
    fn lock_join() {
        models::lock_join::<super::TasSemaphore<Yield>>();
    }
}
