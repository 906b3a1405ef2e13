/// A lock-like primitive with explicit acquire and release, used to run the
/// same mutual exclusion suite against every primitive of this crate.
///
/// Semaphores initialized with one permit and the exclusive side of the
/// readers-writer lock implement it too.
pub trait RawExclusive {
    /// Creates a new instance in its released state.
    fn new() -> Self;

    /// Blocks until the calling thread holds exclusive access.
    fn acquire(&self);

    /// Gives up exclusive access.
    ///
    /// # Safety
    ///
    /// The calling thread must hold exclusive access through `acquire`.
    unsafe fn release(&self);
}

#[cfg(all(not(loom), test))]
pub mod tests {
    use core::cell::UnsafeCell;
    use core::sync::atomic::{AtomicUsize, Ordering::SeqCst};
    use std::sync::Arc;
    use std::thread;

    use super::RawExclusive;

    const ITERS: u64 = 1000;
    const CONCURRENCY: u64 = 3;
    const EXPECTED_VALUE: u64 = ITERS * CONCURRENCY * 2;

    /// A counter that is only mutated while `L` is held.
    struct Guarded<L> {
        lock: L,
        count: UnsafeCell<u64>,
        inside: AtomicUsize,
    }

    // SAFETY: `count` is only accessed between `acquire` and `release`.
    unsafe impl<L: Sync> Sync for Guarded<L> {}

    impl<L: RawExclusive> Guarded<L> {
        fn new() -> Self {
            Self { lock: L::new(), count: UnsafeCell::new(0), inside: AtomicUsize::new(0) }
        }

        fn inc(&self) {
            self.lock.acquire();
            let holders = self.inside.fetch_add(1, SeqCst);
            assert_eq!(holders, 0, "two threads inside the critical section");
            // SAFETY: We hold exclusive access.
            unsafe { *self.count.get() += 1 };
            self.inside.fetch_sub(1, SeqCst);
            // SAFETY: Acquired above.
            unsafe { self.lock.release() };
        }

        fn get(&self) -> u64 {
            self.lock.acquire();
            // SAFETY: We hold exclusive access.
            let value = unsafe { *self.count.get() };
            // SAFETY: Acquired above.
            unsafe { self.lock.release() };
            value
        }
    }

    fn run<L>(threads: u64, iters: u64) -> u64
    where
        L: RawExclusive + Send + Sync + 'static,
    {
        let guarded = Arc::new(Guarded::<L>::new());
        let handles: Vec<_> = (0..threads)
            .map(|_| {
                let guarded = Arc::clone(&guarded);
                thread::spawn(move || {
                    for _ in 0..iters {
                        guarded.inc();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        guarded.get()
    }

    /// Several threads increment a shared, non-atomic integer.
    pub fn lots_and_lots<L>()
    where
        L: RawExclusive + Send + Sync + 'static,
    {
        assert_eq!(run::<L>(CONCURRENCY * 2, ITERS), EXPECTED_VALUE);
    }

    /// Runs `threads * iters` increments and checks that none were lost.
    pub fn counter<L>(threads: u64, iters: u64)
    where
        L: RawExclusive + Send + Sync + 'static,
    {
        assert_eq!(run::<L>(threads, iters), threads * iters);
    }

    /// Acquire and release twice on the same thread.
    pub fn smoke<L: RawExclusive>() {
        let lock = L::new();
        lock.acquire();
        // SAFETY: Acquired above.
        unsafe { lock.release() };
        lock.acquire();
        // SAFETY: Acquired above.
        unsafe { lock.release() };
    }

    /// Checks that the critical section is never entered twice at once, with
    /// a yield inside it to widen the window.
    pub fn never_two_holders<L>()
    where
        L: RawExclusive + Send + Sync + 'static,
    {
        let guarded = Arc::new(Guarded::<L>::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let guarded = Arc::clone(&guarded);
                thread::spawn(move || {
                    for _ in 0..200 {
                        guarded.lock.acquire();
                        assert_eq!(guarded.inside.fetch_add(1, SeqCst), 0);
                        thread::yield_now();
                        assert_eq!(guarded.inside.fetch_sub(1, SeqCst), 1);
                        // SAFETY: Acquired above.
                        unsafe { guarded.lock.release() };
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
    }
}
