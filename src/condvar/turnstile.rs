use core::fmt::{self, Debug, Formatter};
use core::marker::PhantomData;
use core::sync::atomic::Ordering::SeqCst;

use super::Notify;
use crate::cfg::atomic::AtomicUsize;
use crate::relax::Relax;
use crate::ticket::RawTicketLock;

/// A condition variable that hands every waiter its own generation ticket.
///
/// A waiter draws a ticket from `next` while still holding the external
/// lock, then spins until `woken` has moved past its ticket. Tickets in
/// `woken..next` belong to waiters that have not been woken yet.
/// [`notify_one`] advances `woken` by one if that range is non-empty, and
/// [`notify_all`] advances it to `next`.
///
/// Each signal wakes at most one waiter and never wakes a thread that started
/// waiting after it, and wakes happen in the order waiters arrived. A signal
/// issued while holding the external lock is never lost, since any waiter
/// that checked its predicate under that lock has already drawn its ticket.
///
/// [`notify_one`]: Notify::notify_one
/// [`notify_all`]: Notify::notify_all
pub struct TicketCondvar<R> {
    next: AtomicUsize,
    woken: AtomicUsize,
    relax: PhantomData<fn() -> R>,
}

/// Returns `true` if `ahead` is past `behind` in wrapping ticket order.
#[inline]
fn passed(ahead: usize, behind: usize) -> bool {
    (ahead.wrapping_sub(behind) as isize) > 0
}

impl<R> TicketCondvar<R> {
    /// Creates a condition variable with no waiters (const).
    #[cfg(not(all(loom, test)))]
    #[must_use]
    pub const fn new() -> Self {
        let next = AtomicUsize::new(0);
        let woken = AtomicUsize::new(0);
        Self { next, woken, relax: PhantomData }
    }

    /// Creates a Loom based condition variable with no waiters (non-const).
    #[cfg(all(loom, test))]
    #[cfg(not(tarpaulin_include))]
    #[must_use]
    pub fn new() -> Self {
        let next = AtomicUsize::new(0);
        let woken = AtomicUsize::new(0);
        Self { next, woken, relax: PhantomData }
    }

    /// Number of registered waiters that have not been woken yet.
    pub fn waiters(&self) -> usize {
        let woken = self.woken.load(SeqCst);
        self.next.load(SeqCst).wrapping_sub(woken)
    }
}

impl<R: Relax> Notify for TicketCondvar<R> {
    fn new() -> Self {
        Self::new()
    }

    unsafe fn wait_raw<L: Relax>(&self, lock: &RawTicketLock<L>) {
        let ticket = self.next.fetch_add(1, SeqCst);
        // SAFETY: Caller guaranteed that this thread holds `lock`.
        unsafe { lock.unlock() };
        let mut relax = R::new();
        while !passed(self.woken.load(SeqCst), ticket) {
            relax.relax();
        }
        lock.lock();
    }

    fn notify_one(&self) {
        let _ = self.woken.fetch_update(SeqCst, SeqCst, |woken| {
            let next = self.next.load(SeqCst);
            passed(next, woken).then(|| woken.wrapping_add(1))
        });
    }

    fn notify_all(&self) {
        let next = self.next.load(SeqCst);
        let _ = self
            .woken
            .fetch_update(SeqCst, SeqCst, |woken| passed(next, woken).then_some(next));
    }
}

#[cfg(not(tarpaulin_include))]
impl<R> Default for TicketCondvar<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> Debug for TicketCondvar<R> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("TicketCondvar").field("waiters", &self.waiters()).finish()
    }
}

#[cfg(all(not(loom), test))]
mod test {
    use std::sync::mpsc::channel;
    use std::sync::Arc;
    use std::thread;

    use super::passed;
    use crate::condvar::yields::TicketCondvar;
    use crate::condvar::Notify;
    use crate::ticket::yields::Mutex;

    #[test]
    fn passed_wraps() {
        assert!(passed(1, 0));
        assert!(!passed(0, 0));
        assert!(!passed(0, 1));
        assert!(passed(0, usize::MAX));
    }

    #[test]
    fn notify_without_waiters_is_a_no_op() {
        let cvar = TicketCondvar::new();
        cvar.notify_one();
        cvar.notify_all();
        assert_eq!(cvar.waiters(), 0);
        assert_eq!(format!("{cvar:?}"), "TicketCondvar { waiters: 0 }");
    }

    #[test]
    fn notify_one_wakes_oldest_waiter() {
        const WAITERS: usize = 3;
        let pair = Arc::new((Mutex::new(0_usize), TicketCondvar::new()));
        let (tx, rx) = channel();
        let mut handles = Vec::new();
        for id in 0..WAITERS {
            let c_pair = Arc::clone(&pair);
            let tx = tx.clone();
            handles.push(thread::spawn(move || {
                let (lock, cvar) = &*c_pair;
                let guard = cvar.wait(lock.lock());
                tx.send(id).unwrap();
                drop(guard);
            }));
            while pair.1.waiters() != id + 1 {
                thread::yield_now();
            }
        }
        drop(tx);
        for expected in 0..WAITERS {
            let guard = pair.0.lock();
            pair.1.notify_one();
            drop(guard);
            assert_eq!(rx.recv().unwrap(), expected);
        }
        for handle in handles {
            handle.join().unwrap();
        }
    }

    #[test]
    fn notify_all_wakes_everyone_once() {
        const WAITERS: usize = 5;
        let pair = Arc::new((Mutex::new(false), TicketCondvar::new()));
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
        let mut go = lock.lock();
        *go = true;
        cvar.notify_all();
        drop(go);
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(cvar.waiters(), 0);
    }

    #[test]
    fn ping_pong() {
        const ROUNDS: usize = 500;
        let pair = Arc::new((Mutex::new(0_usize), TicketCondvar::new()));
        let c_pair = Arc::clone(&pair);
        let odd = thread::spawn(move || {
            let (lock, cvar) = &*c_pair;
            for round in 0..ROUNDS {
                let mut turn = cvar.wait_while(lock.lock(), |turn| *turn % 2 == 0);
                assert_eq!(*turn, round * 2 + 1);
                *turn += 1;
                cvar.notify_all();
            }
        });
        let (lock, cvar) = &*pair;
        for round in 0..ROUNDS {
            let mut turn = cvar.wait_while(lock.lock(), |turn| *turn % 2 == 1);
            assert_eq!(*turn, round * 2);
            *turn += 1;
            cvar.notify_all();
        }
        odd.join().unwrap();
        assert_eq!(*lock.lock(), ROUNDS * 2);
    }
}

#[cfg(all(loom, test))]
mod model {
    use crate::loom::models;
    use crate::relax::Yield;

    #[test]
    fn notify_one_is_not_lost() {
        models::wait_notify::<super::TicketCondvar<Yield>>();
    }
}
