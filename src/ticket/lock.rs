use core::fmt::{self, Debug, Formatter};
use core::marker::PhantomData;
use core::sync::atomic::Ordering::{Acquire, Relaxed, Release};

use crate::cfg::atomic::AtomicUsize;
use crate::relax::Relax;

#[cfg(test)]
use crate::test::RawExclusive;

/// A FIFO spinlock built from two monotonically increasing counters.
///
/// A thread draws a ticket from `next` and spins until `serving` reaches it.
/// Releasing advances `serving` by one, which admits the next ticket holder.
/// Threads are therefore admitted strictly in the order they drew tickets.
///
/// This is the raw lock, it does not protect any data. See [`Mutex`] for the
/// RAII wrapper. The lock is not reentrant: acquiring it twice from the same
/// thread deadlocks.
///
/// # Example
///
/// ```
/// use ticketsync::ticket::RawTicketLock;
/// use ticketsync::relax::Yield;
///
/// let lock = RawTicketLock::<Yield>::new();
/// lock.lock();
/// assert!(lock.is_locked());
/// // SAFETY: the lock is held by this thread.
/// unsafe { lock.unlock() };
/// assert!(!lock.is_locked());
/// ```
/// [`Mutex`]: super::Mutex
pub struct RawTicketLock<R> {
    next: AtomicUsize,
    serving: AtomicUsize,
    relax: PhantomData<fn() -> R>,
}

impl<R> RawTicketLock<R> {
    /// Creates a new, unlocked ticket lock (const).
    #[cfg(not(all(loom, test)))]
    #[must_use]
    pub const fn new() -> Self {
        let next = AtomicUsize::new(0);
        let serving = AtomicUsize::new(0);
        Self { next, serving, relax: PhantomData }
    }

    /// Creates a new, unlocked and Loom based ticket lock (non-const).
    #[cfg(all(loom, test))]
    #[cfg(not(tarpaulin_include))]
    #[must_use]
    pub fn new() -> Self {
        let next = AtomicUsize::new(0);
        let serving = AtomicUsize::new(0);
        Self { next, serving, relax: PhantomData }
    }

    /// Releases the lock, admitting the next ticket holder.
    ///
    /// # Safety
    ///
    /// The calling thread must currently hold the lock. Releasing a lock that
    /// is not held skips a waiter's turn and breaks mutual exclusion.
    #[inline]
    pub unsafe fn unlock(&self) {
        self.serving.fetch_add(1, Release);
    }

    /// Returns `true` if some thread holds the lock or is queued for it.
    ///
    /// The answer may be stale by the time it is observed.
    pub fn is_locked(&self) -> bool {
        self.next.load(Relaxed) != self.serving.load(Relaxed)
    }

    /// Number of tickets drawn but not yet released, holder included.
    #[cfg(all(not(loom), test))]
    pub(crate) fn backlog(&self) -> usize {
        self.next.load(Relaxed).wrapping_sub(self.serving.load(Relaxed))
    }
}

impl<R: Relax> RawTicketLock<R> {
    /// Draws a ticket and spins until it is being served.
    pub fn lock(&self) {
        let ticket = self.next.fetch_add(1, Relaxed);
        let mut relax = R::new();
        while self.serving.load(Acquire) != ticket {
            relax.relax();
        }
    }

    /// Acquires the lock only if no other thread holds it or waits for it.
    ///
    /// A successful attempt draws the ticket currently being served, so it
    /// never jumps ahead of a queued waiter.
    pub fn try_lock(&self) -> bool {
        let serving = self.serving.load(Acquire);
        let ticket = serving.wrapping_add(1);
        self.next.compare_exchange(serving, ticket, Acquire, Relaxed).is_ok()
    }
}

#[cfg(not(tarpaulin_include))]
impl<R> Default for RawTicketLock<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> Debug for RawTicketLock<R> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let mut d = f.debug_struct("RawTicketLock");
        d.field("next", &self.next.load(Relaxed));
        d.field("serving", &self.serving.load(Relaxed));
        d.finish()
    }
}

#[cfg(test)]
impl<R: Relax> RawExclusive for RawTicketLock<R> {
    fn new() -> Self {
        Self::new()
    }

    fn acquire(&self) {
        self.lock();
    }

    unsafe fn release(&self) {
        // SAFETY: Caller guaranteed that this thread holds the lock.
        unsafe { self.unlock() }
    }
}

#[cfg(all(not(loom), test))]
mod test {
    use std::sync::mpsc::channel;
    use std::sync::Arc;
    use std::thread;

    use super::RawTicketLock;
    use crate::relax::Yield;
    use crate::test::tests;

    type Lock = RawTicketLock<Yield>;

    #[test]
    fn lots_and_lots_lock() {
        tests::lots_and_lots::<Lock>();
    }

    #[test]
    fn smoke() {
        tests::smoke::<Lock>();
    }

    #[test]
    fn never_two_holders() {
        tests::never_two_holders::<Lock>();
    }

    #[test]
    fn try_lock_fails_while_held() {
        let lock = Lock::new();
        assert!(lock.try_lock());
        assert!(!lock.try_lock());
        // SAFETY: held by this thread through `try_lock`.
        unsafe { lock.unlock() };
        assert!(lock.try_lock());
        // SAFETY: held by this thread through `try_lock`.
        unsafe { lock.unlock() };
    }

    #[test]
    fn debug_shows_counters() {
        let lock = Lock::new();
        lock.lock();
        assert_eq!(format!("{lock:?}"), "RawTicketLock { next: 1, serving: 0 }");
        // SAFETY: held by this thread.
        unsafe { lock.unlock() };
    }

    #[test]
    fn admits_in_ticket_order() {
        const WAITERS: usize = 4;
        let lock = Arc::new(Lock::new());
        let (tx, rx) = channel();
        lock.lock();
        let mut handles = Vec::new();
        for id in 0..WAITERS {
            let c_lock = Arc::clone(&lock);
            let tx = tx.clone();
            handles.push(thread::spawn(move || {
                c_lock.lock();
                tx.send(id).unwrap();
                // SAFETY: held by this thread.
                unsafe { c_lock.unlock() };
            }));
            // Wait until this waiter has drawn its ticket before spawning the
            // next one, so draw order is the spawn order.
            while lock.backlog() != id + 2 {
                thread::yield_now();
            }
        }
        // SAFETY: held by this thread.
        unsafe { lock.unlock() };
        for handle in handles {
            handle.join().unwrap();
        }
        drop(tx);
        let order: Vec<_> = rx.iter().collect();
        assert_eq!(order, (0..WAITERS).collect::<Vec<_>>());
    }
}

#[cfg(all(loom, test))]
mod model {
    use crate::loom::models;
    use crate::relax::Yield;

    #[test]
    fn lock_join() {
        models::lock_join::<super::RawTicketLock<Yield>>();
    }
}
