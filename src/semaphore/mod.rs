//! Counting semaphores.
//!
//! Two flavours with the same `new`/`wait`/`signal` surface and different
//! progress properties:
//!
//! - [`TasSemaphore`] guards its count with a test-and-set spinlock. Cheap,
//!   but waiters are admitted in no particular order.
//! - [`TicketSemaphore`] queues waiters behind a ticket lock, so permits are
//!   handed out in arrival order. Signalers never queue.
//!
//! In both, the count never goes below zero, and at every quiescent point it
//! equals the initial permits plus signals minus completed waits.

mod tas;
mod ticket;

pub use tas::TasSemaphore;
pub use ticket::TicketSemaphore;

/// Semaphore aliases that spin while signaling the processor that it is
/// running a busy-wait spin-loop.
pub mod spins {
    use crate::relax::Spin;

    /// A [`semaphore::TasSemaphore`] that implements the [`Spin`] relax
    /// strategy.
    ///
    /// [`semaphore::TasSemaphore`]: super::TasSemaphore
    pub type TasSemaphore = super::TasSemaphore<Spin>;

    /// A [`semaphore::TicketSemaphore`] that implements the [`Spin`] relax
    /// strategy.
    ///
    /// [`semaphore::TicketSemaphore`]: super::TicketSemaphore
    pub type TicketSemaphore = super::TicketSemaphore<Spin>;
}

/// Semaphore aliases that yield the current time slice to the scheduler on
/// every failed observation.
pub mod yields {
    use crate::relax::Yield;

    /// A [`semaphore::TasSemaphore`] that implements the [`Yield`] relax
    /// strategy.
    ///
    /// # Example
    ///
    /// ```
    /// use ticketsync::semaphore::yields::TasSemaphore;
    ///
    /// let sem = TasSemaphore::new(1);
    /// sem.wait();
    /// sem.signal();
    /// ```
    /// [`semaphore::TasSemaphore`]: super::TasSemaphore
    pub type TasSemaphore = super::TasSemaphore<Yield>;

    /// A [`semaphore::TicketSemaphore`] that implements the [`Yield`] relax
    /// strategy.
    ///
    /// # Example
    ///
    /// ```
    /// use ticketsync::semaphore::yields::TicketSemaphore;
    ///
    /// let sem = TicketSemaphore::new(1);
    /// sem.wait();
    /// sem.signal();
    /// ```
    /// [`semaphore::TicketSemaphore`]: super::TicketSemaphore
    pub type TicketSemaphore = super::TicketSemaphore<Yield>;
}
