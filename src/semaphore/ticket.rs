use core::fmt::{self, Debug, Formatter};
use core::sync::atomic::Ordering::{Acquire, Relaxed, Release};

use crate::cfg::atomic::AtomicUsize;
use crate::relax::Relax;
use crate::ticket::RawTicketLock;

#[cfg(test)]
use crate::test::RawExclusive;

/// A counting semaphore that serves waiters in ticket order.
///
/// A waiter draws a ticket and spins until it is served, then spins until the
/// count is positive, decrements it and passes the turn to the next ticket.
/// Only the served waiter ever decrements, so permits are handed out strictly
/// in the order waiters arrived. [`signal`] does not draw a ticket and only
/// touches the count.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use std::thread;
///
/// use ticketsync::semaphore::yields::TicketSemaphore;
///
/// let sem = Arc::new(TicketSemaphore::new(0));
/// let c_sem = Arc::clone(&sem);
/// let waiter = thread::spawn(move || c_sem.wait());
/// sem.signal();
/// waiter.join().unwrap();
/// assert_eq!(sem.value(), 0);
/// ```
/// [`signal`]: TicketSemaphore::signal
pub struct TicketSemaphore<R> {
    value: AtomicUsize,
    turn: RawTicketLock<R>,
}

impl<R> TicketSemaphore<R> {
    /// Creates a semaphore holding `permits`.
    #[must_use]
    pub fn new(permits: usize) -> Self {
        Self { value: AtomicUsize::new(permits), turn: RawTicketLock::new() }
    }

    /// Returns a snapshot of the current count.
    pub fn value(&self) -> usize {
        self.value.load(Relaxed)
    }

    /// Returns one permit.
    pub fn signal(&self) {
        self.value.fetch_add(1, Release);
    }
}

impl<R: Relax> TicketSemaphore<R> {
    /// Takes one permit, waiting for this thread's turn and then for a permit.
    pub fn wait(&self) {
        self.turn.lock();
        let mut relax = R::new();
        while self.value.load(Acquire) == 0 {
            relax.relax();
        }
        self.take();
    }

    /// Takes one permit only if no waiter is queued and a permit is available.
    pub fn try_wait(&self) -> bool {
        if !self.turn.try_lock() {
            return false;
        }
        if self.value.load(Acquire) == 0 {
            // SAFETY: The turn was taken by `try_lock` above.
            unsafe { self.turn.unlock() };
            return false;
        }
        self.take();
        true
    }

    /// Decrements the count and passes the turn on. Caller holds the turn and
    /// observed a positive count.
    fn take(&self) {
        self.value.fetch_sub(1, Relaxed);
        // SAFETY: Caller holds the turn.
        unsafe { self.turn.unlock() };
    }
}

impl<R> Debug for TicketSemaphore<R> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("TicketSemaphore").field("value", &self.value()).finish()
    }
}

#[cfg(test)]
impl<R: Relax> RawExclusive for TicketSemaphore<R> {
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
    use std::sync::mpsc::channel;
    use std::sync::Arc;
    use std::thread;

    use crate::semaphore::yields::TicketSemaphore;
    use crate::test::tests;

    #[test]
    fn binary_semaphore_as_mutex() {
        tests::counter::<TicketSemaphore>(5, 1000);
    }

    #[test]
    fn never_two_holders() {
        tests::never_two_holders::<TicketSemaphore>();
    }

    #[test]
    fn counts_signals_and_waits() {
        let sem = TicketSemaphore::new(1);
        sem.signal();
        sem.wait();
        assert_eq!(sem.value(), 1);
        assert!(sem.try_wait());
        assert!(!sem.try_wait());
    }

    #[test]
    fn try_wait_does_not_overtake_queued_waiter() {
        let sem = Arc::new(TicketSemaphore::new(0));
        let c_sem = Arc::clone(&sem);
        let waiter = thread::spawn(move || c_sem.wait());
        while !sem.turn.is_locked() {
            thread::yield_now();
        }
        sem.signal();
        waiter.join().unwrap();
        assert_eq!(sem.value(), 0);
        assert!(!sem.try_wait());
    }

    #[test]
    fn permits_follow_arrival_order() {
        const WAITERS: usize = 4;
        let sem = Arc::new(TicketSemaphore::new(0));
        let (tx, rx) = channel();
        let mut handles = Vec::new();
        for id in 0..WAITERS {
            let c_sem = Arc::clone(&sem);
            let tx = tx.clone();
            handles.push(thread::spawn(move || {
                c_sem.wait();
                tx.send(id).unwrap();
            }));
            // The first waiter holds the turn, later ones queue behind it.
            // Wait for each to draw a ticket before spawning the next.
            while sem.turn_backlog() != id + 1 {
                thread::yield_now();
            }
        }
        drop(tx);
        for expected in 0..WAITERS {
            sem.signal();
            assert_eq!(rx.recv().unwrap(), expected);
        }
        for handle in handles {
            handle.join().unwrap();
        }
    }
}

#[cfg(all(not(loom), test))]
impl<R> TicketSemaphore<R> {
    /// Number of tickets drawn but not yet served, including the holder.
    fn turn_backlog(&self) -> usize {
        self.turn.backlog()
    }
}

#[cfg(all(loom, test))]
mod model {
    use crate::loom::models;
    use crate::relax::Yield;

    #[test]
    fn lock_join() {
        models::lock_join::<super::TicketSemaphore<Yield>>();
    }
}
