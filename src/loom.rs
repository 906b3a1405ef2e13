pub mod models {
    use core::array;

    use loom::cell::UnsafeCell;
    use loom::model::Builder;
    use loom::sync::Arc;
    use loom::thread;

    use crate::condvar::Notify;
    use crate::relax::Yield;
    use crate::test::RawExclusive;
    use crate::ticket::Mutex;

    type Int = usize;
    const THREADS: Int = 2;
    const PREEMPTIONS: usize = 3;

    /// Explores `f` with a bounded number of preemptions per execution.
    fn model<F: Fn() + Sync + Send + 'static>(f: F) {
        let mut builder = Builder::new();
        builder.preemption_bound = Some(PREEMPTIONS);
        builder.check(f);
    }

    /// A Loom tracked integer that is only accessed while `L` is held.
    struct Shared<L> {
        lock: L,
        data: UnsafeCell<Int>,
    }

    // SAFETY: `data` is only accessed between `acquire` and `release`.
    unsafe impl<L: Sync> Sync for Shared<L> {}

    impl<L: RawExclusive> Shared<L> {
        fn inc(&self) {
            self.lock.acquire();
            // SAFETY: We hold exclusive access.
            self.data.with_mut(|ptr| unsafe { *ptr += 1 });
            // SAFETY: Acquired above.
            unsafe { self.lock.release() };
        }

        fn get(&self) -> Int {
            self.lock.acquire();
            // SAFETY: We hold exclusive access.
            let value = self.data.with(|ptr| unsafe { *ptr });
            // SAFETY: Acquired above.
            unsafe { self.lock.release() };
            value
        }
    }

    /// Evaluates that concurrent `acquire` calls will serialize all mutations
    /// against the shared data, therefore no data races.
    pub fn lock_join<L: RawExclusive + Send + Sync + 'static>() {
        model(|| {
            let shared = Arc::new(Shared { lock: L::new(), data: UnsafeCell::new(0) });
            let handles: [_; THREADS] = array::from_fn(|_| {
                let shared = Arc::clone(&shared);
                thread::spawn(move || shared.inc())
            });
            for handle in handles {
                handle.join().unwrap();
            }
            assert_eq!(THREADS, shared.get());
        });
    }

    /// Evaluates that a waiter which checked its predicate under the lock
    /// observes a flag set and signaled under the same lock.
    pub fn wait_notify<C: Notify + Send + Sync + 'static>() {
        model(|| {
            let pair = Arc::new((Mutex::<bool, Yield>::new(false), C::new()));
            let c_pair = Arc::clone(&pair);
            let notifier = thread::spawn(move || {
                let (lock, cvar) = &*c_pair;
                let mut ready = lock.lock();
                *ready = true;
                cvar.notify_one();
            });
            let (lock, cvar) = &*pair;
            let ready = cvar.wait_while(lock.lock(), |ready| !*ready);
            assert!(*ready);
            drop(ready);
            notifier.join().unwrap();
        });
    }
}
