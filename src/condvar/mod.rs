//! Spin-based condition variables that cooperate with the ticket lock.
//!
//! A waiter releases an external [`RawTicketLock`], spins until it is woken
//! and reacquires the lock before returning. Callers must re-check their
//! predicate after every wake, because wakes may be spurious.
//!
//! Two flavours implement the [`Notify`] trait:
//!
//! - [`Condvar`] publishes wake tokens through one shared test-and-set flag
//!   plus a waiter count. It starts with a token available, so the first wait
//!   returns immediately. Overlapping signals collapse into a single token,
//!   so a wake can be lost when several signals land before any waiter
//!   consumes one.
//! - [`TicketCondvar`] gives every waiter a generation ticket drawn while the
//!   external lock is held. A signal wakes exactly one unwoken waiter, oldest
//!   first, and a broadcast wakes every waiter registered so far. No wake is
//!   lost as long as signalers notify while holding the external lock.
//!
//! [`RawTicketLock`]: crate::ticket::RawTicketLock

mod flag;
mod turnstile;

pub use flag::Condvar;
pub use turnstile::TicketCondvar;

use crate::relax::Relax;
use crate::ticket::{MutexGuard, RawTicketLock};

/// A condition variable that waits with an external ticket lock.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use std::thread;
///
/// use ticketsync::condvar::Notify;
/// use ticketsync::condvar::yields::TicketCondvar;
/// use ticketsync::ticket::yields::Mutex;
///
/// let pair = Arc::new((Mutex::new(false), TicketCondvar::new()));
/// let c_pair = Arc::clone(&pair);
///
/// thread::spawn(move || {
///     let (lock, cvar) = &*c_pair;
///     let mut started = lock.lock();
///     *started = true;
///     cvar.notify_one();
/// });
///
/// let (lock, cvar) = &*pair;
/// let started = cvar.wait_while(lock.lock(), |started| !*started);
/// assert!(*started);
/// ```
pub trait Notify {
    /// Creates a condition variable with no registered waiters.
    fn new() -> Self
    where
        Self: Sized;

    /// Registers the caller as a waiter, releases `lock`, spins until woken
    /// and reacquires `lock`.
    ///
    /// # Safety
    ///
    /// The calling thread must hold `lock`. It holds it again on return.
    unsafe fn wait_raw<L: Relax>(&self, lock: &RawTicketLock<L>);

    /// Wakes one waiter, if any is registered.
    fn notify_one(&self);

    /// Wakes every registered waiter.
    fn notify_all(&self);

    /// Releases the mutex behind `guard`, waits for a wake and returns a guard
    /// over the reacquired mutex.
    fn wait<'a, T: ?Sized, L: Relax>(&self, guard: MutexGuard<'a, T, L>) -> MutexGuard<'a, T, L>
    where
        Self: Sized,
    {
        let mutex = guard.leak();
        // SAFETY: The guard held the lock, and it was leaked so it will not
        // release it a second time.
        unsafe { self.wait_raw(&mutex.raw) };
        MutexGuard::new(mutex)
    }

    /// Waits for as long as `condition` returns `true`, re-checking it after
    /// every wake with the mutex held.
    fn wait_while<'a, T, L, F>(
        &self,
        mut guard: MutexGuard<'a, T, L>,
        mut condition: F,
    ) -> MutexGuard<'a, T, L>
    where
        Self: Sized,
        T: ?Sized,
        L: Relax,
        F: FnMut(&mut T) -> bool,
    {
        while condition(&mut *guard) {
            guard = self.wait(guard);
        }
        guard
    }
}

/// Condition variable aliases that spin while signaling the processor that it
/// is running a busy-wait spin-loop.
pub mod spins {
    use crate::relax::Spin;

    /// A [`condvar::Condvar`] that implements the [`Spin`] relax strategy.
    ///
    /// [`condvar::Condvar`]: super::Condvar
    pub type Condvar = super::Condvar<Spin>;

    /// A [`condvar::TicketCondvar`] that implements the [`Spin`] relax
    /// strategy.
    ///
    /// [`condvar::TicketCondvar`]: super::TicketCondvar
    pub type TicketCondvar = super::TicketCondvar<Spin>;
}

/// Condition variable aliases that yield the current time slice to the
/// scheduler while waiting.
pub mod yields {
    use crate::relax::Yield;

    /// A [`condvar::Condvar`] that implements the [`Yield`] relax strategy.
    ///
    /// [`condvar::Condvar`]: super::Condvar
    pub type Condvar = super::Condvar<Yield>;

    /// A [`condvar::TicketCondvar`] that implements the [`Yield`] relax
    /// strategy.
    ///
    /// [`condvar::TicketCondvar`]: super::TicketCondvar
    pub type TicketCondvar = super::TicketCondvar<Yield>;
}
