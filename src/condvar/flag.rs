use core::fmt::{self, Debug, Formatter};
use core::marker::PhantomData;
use core::sync::atomic::Ordering::SeqCst;

use super::Notify;
use crate::cfg::atomic::{AtomicBool, AtomicUsize};
use crate::relax::Relax;
use crate::ticket::RawTicketLock;

/// A condition variable built from one test-and-set flag and a waiter count.
///
/// The flag being clear means a wake token is available. A waiter reads the
/// flag until it is clear and then test-and-sets it, which both consumes the
/// token and re-arms the flag for everyone else. [`notify_one`] clears the flag
/// once if anyone is waiting. [`notify_all`] clears it once per registered
/// waiter, relaxing between clears so each token has a chance to be consumed
/// before the next is published.
///
/// The flag starts clear, so the very first wait on a fresh condition
/// variable returns without a signal. Since there is no per-waiter token,
/// clears that land before a waiter re-arms the flag collapse into one, and
/// the extra wakes are lost. Waiters must re-check their predicate, and
/// callers that cannot tolerate a lost wake should re-notify until their
/// waiters have observed the state change, or use [`TicketCondvar`].
///
/// [`notify_one`]: Notify::notify_one
/// [`notify_all`]: Notify::notify_all
/// [`TicketCondvar`]: super::TicketCondvar
pub struct Condvar<R> {
    signal: AtomicBool,
    waiters: AtomicUsize,
    relax: PhantomData<fn() -> R>,
}

impl<R> Condvar<R> {
    /// Creates a condition variable with a wake token available (const).
    #[cfg(not(all(loom, test)))]
    #[must_use]
    pub const fn new() -> Self {
        let signal = AtomicBool::new(false);
        let waiters = AtomicUsize::new(0);
        Self { signal, waiters, relax: PhantomData }
    }

    /// Creates a Loom based condition variable with a wake token available
    /// (non-const).
    #[cfg(all(loom, test))]
    #[cfg(not(tarpaulin_include))]
    #[must_use]
    pub fn new() -> Self {
        let signal = AtomicBool::new(false);
        let waiters = AtomicUsize::new(0);
        Self { signal, waiters, relax: PhantomData }
    }

    /// Number of threads between releasing and reacquiring the external lock.
    pub fn waiters(&self) -> usize {
        self.waiters.load(SeqCst)
    }

    /// Publishes one wake token.
    fn publish(&self) {
        self.signal.store(false, SeqCst);
    }
}

impl<R: Relax> Notify for Condvar<R> {
    fn new() -> Self {
        Self::new()
    }

    unsafe fn wait_raw<L: Relax>(&self, lock: &RawTicketLock<L>) {
        self.waiters.fetch_add(1, SeqCst);
        // SAFETY: Caller guaranteed that this thread holds `lock`.
        unsafe { lock.unlock() };
        let mut relax = R::new();
        loop {
            while self.signal.load(SeqCst) {
                relax.relax();
            }
            if !self.signal.swap(true, SeqCst) {
                break;
            }
        }
        lock.lock();
        self.waiters.fetch_sub(1, SeqCst);
    }

    fn notify_one(&self) {
        if self.waiters() > 0 {
            self.publish();
        }
    }

    fn notify_all(&self) {
        let waiters = self.waiters();
        let mut relax = R::new();
        for _ in 0..waiters {
            self.publish();
            relax.relax();
        }
    }
}

#[cfg(not(tarpaulin_include))]
impl<R> Default for Condvar<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> Debug for Condvar<R> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let mut d = f.debug_struct("Condvar");
        d.field("signaled", &!self.signal.load(SeqCst));
        d.field("waiters", &self.waiters());
        d.finish()
    }
}

#[cfg(all(not(loom), test))]
mod test {
    use std::sync::Arc;
    use std::thread;

    use crate::condvar::yields::Condvar;
    use crate::condvar::Notify;
    use crate::ticket::yields::Mutex;

    #[test]
    fn first_wait_consumes_initial_token() {
        let mutex = Mutex::new(());
        let cvar = Condvar::new();
        let guard = cvar.wait(mutex.lock());
        drop(guard);
        assert_eq!(cvar.waiters(), 0);
        assert_eq!(format!("{cvar:?}"), "Condvar { signaled: false, waiters: 0 }");
    }

    #[test]
    fn notify_without_waiters_is_dropped() {
        let mutex = Mutex::new(());
        let cvar = Condvar::new();
        // Consume the initial token.
        drop(cvar.wait(mutex.lock()));
        cvar.notify_one();
        assert_eq!(format!("{cvar:?}"), "Condvar { signaled: false, waiters: 0 }");
    }

    #[test]
    fn single_waiter_handshake() {
        const ROUNDS: usize = 200;
        let pair = Arc::new((Mutex::new(0_usize), Condvar::new()));
        let c_pair = Arc::clone(&pair);
        let waiter = thread::spawn(move || {
            let (lock, cvar) = &*c_pair;
            for round in 1..=ROUNDS {
                let guard = cvar.wait_while(lock.lock(), |turn| *turn < round);
                assert!(*guard >= round);
            }
        });
        let (lock, cvar) = &*pair;
        for _ in 0..ROUNDS {
            let mut turn = lock.lock();
            *turn += 1;
            cvar.notify_one();
            drop(turn);
            thread::yield_now();
        }
        waiter.join().unwrap();
    }

    #[test]
    fn broadcast_reaches_every_waiter_eventually() {
        const WAITERS: usize = 4;
        let pair = Arc::new((Mutex::new(false), Condvar::new()));
        let handles: Vec<_> = (0..WAITERS)
            .map(|_| {
                let pair = Arc::clone(&pair);
                thread::spawn(move || {
                    let (lock, cvar) = &*pair;
                    drop(cvar.wait_while(lock.lock(), |go| !*go));
                })
            })
            .collect();
        let (lock, cvar) = &*pair;
        *lock.lock() = true;
        // Tokens can collapse, so keep broadcasting until everyone is out.
        while !handles.iter().all(|h| h.is_finished()) {
            cvar.notify_all();
            thread::yield_now();
        }
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(cvar.waiters(), 0);
    }
}

#[cfg(all(loom, test))]
mod model {
    use crate::loom::models;
    use crate::relax::Yield;

    #[test]
    fn single_waiter_is_woken() {
        models::wait_notify::<super::Condvar<Yield>>();
    }
}
