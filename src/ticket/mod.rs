//! FIFO ticket lock.
//!
//! A ticket lock hands out monotonically increasing tickets and serves them in
//! order, so it is fair: a thread that started waiting earlier is always
//! admitted first. All waiters spin on the same `serving` counter.
//!
//! [`RawTicketLock`] is the bare lock with explicit `lock`/`unlock`, which is
//! also the external lock the condition variables in [`condvar`] release and
//! reacquire while waiting. [`Mutex`] wraps it with data and RAII guards.
//!
//! Both are generic over the [`Relax`] strategy. The modules below provide
//! aliases bound to one strategy each.
//!
//! [`condvar`]: crate::condvar
//! [`Relax`]: crate::relax::Relax

mod lock;
mod mutex;

pub use lock::RawTicketLock;
pub use mutex::{Mutex, MutexGuard};

/// Ticket lock aliases that spin while signaling the processor that it is
/// running a busy-wait spin-loop.
pub mod spins {
    use crate::relax::Spin;

    /// A [`ticket::RawTicketLock`] that implements the [`Spin`] relax strategy.
    ///
    /// [`ticket::RawTicketLock`]: super::RawTicketLock
    pub type RawTicketLock = super::RawTicketLock<Spin>;

    /// A [`ticket::Mutex`] that implements the [`Spin`] relax strategy.
    ///
    /// # Example
    ///
    /// ```
    /// use ticketsync::ticket::spins::Mutex;
    ///
    /// let mutex = Mutex::new(0);
    /// assert_eq!(*mutex.lock(), 0);
    /// ```
    /// [`ticket::Mutex`]: super::Mutex
    pub type Mutex<T> = super::Mutex<T, Spin>;

    /// A [`ticket::MutexGuard`] that implements the [`Spin`] relax strategy.
    ///
    /// [`ticket::MutexGuard`]: super::MutexGuard
    pub type MutexGuard<'a, T> = super::MutexGuard<'a, T, Spin>;

    /// Aliases that spin with exponential backoff.
    pub mod backoff {
        use crate::relax::SpinBackoff;

        /// A [`ticket::Mutex`] that implements the [`SpinBackoff`] relax
        /// strategy.
        ///
        /// [`ticket::Mutex`]: crate::ticket::Mutex
        pub type Mutex<T> = crate::ticket::Mutex<T, SpinBackoff>;

        /// A [`ticket::MutexGuard`] that implements the [`SpinBackoff`] relax
        /// strategy.
        ///
        /// [`ticket::MutexGuard`]: crate::ticket::MutexGuard
        pub type MutexGuard<'a, T> = crate::ticket::MutexGuard<'a, T, SpinBackoff>;
    }
}

/// Ticket lock aliases that yield the current time slice to the scheduler on
/// every failed observation.
pub mod yields {
    use crate::relax::Yield;

    /// A [`ticket::RawTicketLock`] that implements the [`Yield`] relax strategy.
    ///
    /// [`ticket::RawTicketLock`]: super::RawTicketLock
    pub type RawTicketLock = super::RawTicketLock<Yield>;

    /// A [`ticket::Mutex`] that implements the [`Yield`] relax strategy.
    ///
    /// # Example
    ///
    /// ```
    /// use ticketsync::ticket::yields::Mutex;
    ///
    /// let mutex = Mutex::new(0);
    /// assert_eq!(*mutex.lock(), 0);
    /// ```
    /// [`ticket::Mutex`]: super::Mutex
    pub type Mutex<T> = super::Mutex<T, Yield>;

    /// A [`ticket::MutexGuard`] that implements the [`Yield`] relax strategy.
    ///
    /// [`ticket::MutexGuard`]: super::MutexGuard
    pub type MutexGuard<'a, T> = super::MutexGuard<'a, T, Yield>;

    /// Aliases that back off exponentially before falling back to yielding.
    pub mod backoff {
        use crate::relax::YieldBackoff;

        /// A [`ticket::Mutex`] that implements the [`YieldBackoff`] relax
        /// strategy.
        ///
        /// [`ticket::Mutex`]: crate::ticket::Mutex
        pub type Mutex<T> = crate::ticket::Mutex<T, YieldBackoff>;

        /// A [`ticket::MutexGuard`] that implements the [`YieldBackoff`] relax
        /// strategy.
        ///
        /// [`ticket::MutexGuard`]: crate::ticket::MutexGuard
        pub type MutexGuard<'a, T> = crate::ticket::MutexGuard<'a, T, YieldBackoff>;
    }
}
