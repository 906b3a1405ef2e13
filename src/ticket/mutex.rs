use core::cell::UnsafeCell;
use core::fmt::{self, Debug, Display, Formatter};
use core::ops::{Deref, DerefMut};

use super::RawTicketLock;
use crate::relax::Relax;

/// A mutual exclusion primitive protecting shared data with a FIFO ticket
/// lock.
///
/// The data can only be accessed through the RAII guards returned by
/// [`lock`], or from within the closure given to [`lock_with`]. The guard is
/// also what the condition variables of this crate consume and give back
/// while waiting, see [`Notify::wait`].
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use std::thread;
///
/// use ticketsync::ticket::yields::Mutex;
///
/// const N: usize = 10;
///
/// let data = Arc::new(Mutex::new(0));
/// let handles: Vec<_> = (0..N)
///     .map(|_| {
///         let data = Arc::clone(&data);
///         thread::spawn(move || *data.lock() += 1)
///     })
///     .collect();
/// for handle in handles {
///     handle.join().unwrap();
/// }
/// assert_eq!(*data.lock(), N);
/// ```
/// [`lock`]: Mutex::lock
/// [`lock_with`]: Mutex::lock_with
/// [`Notify::wait`]: crate::condvar::Notify::wait
pub struct Mutex<T: ?Sized, R> {
    pub(crate) raw: RawTicketLock<R>,
    data: UnsafeCell<T>,
}

// Same unsafe impls as `std::sync::Mutex`.
unsafe impl<T: ?Sized + Send, R> Send for Mutex<T, R> {}
unsafe impl<T: ?Sized + Send, R> Sync for Mutex<T, R> {}

impl<T, R> Mutex<T, R> {
    /// Creates a new mutex in an unlocked state ready for use.
    #[inline]
    pub fn new(value: T) -> Self {
        Self { raw: RawTicketLock::new(), data: UnsafeCell::new(value) }
    }

    /// Consumes this mutex, returning the underlying data.
    #[inline]
    pub fn into_inner(self) -> T {
        self.data.into_inner()
    }
}

impl<T: ?Sized, R: Relax> Mutex<T, R> {
    /// Acquires this mutex, spinning until it is this thread's turn.
    ///
    /// Waiters are served in the order they called `lock`.
    #[inline]
    pub fn lock(&self) -> MutexGuard<'_, T, R> {
        self.raw.lock();
        MutexGuard::new(self)
    }

    /// Attempts to acquire this mutex without waiting.
    ///
    /// Fails if the mutex is held or if any thread is already queued for it.
    #[inline]
    pub fn try_lock(&self) -> Option<MutexGuard<'_, T, R>> {
        self.raw.try_lock().then(|| MutexGuard::new(self))
    }

    /// Acquires this mutex and then runs the closure against its guard.
    ///
    /// ```
    /// use ticketsync::ticket::yields::Mutex;
    ///
    /// let mutex = Mutex::new(1);
    /// mutex.lock_with(|mut guard| *guard += 1);
    /// assert_eq!(mutex.lock_with(|guard| *guard), 2);
    /// ```
    #[inline]
    pub fn lock_with<F, Ret>(&self, f: F) -> Ret
    where
        F: FnOnce(MutexGuard<'_, T, R>) -> Ret,
    {
        f(self.lock())
    }
}

impl<T: ?Sized, R> Mutex<T, R> {
    /// Returns a mutable reference to the underlying data.
    ///
    /// Since this call borrows the `Mutex` mutably, no actual locking needs to
    /// take place.
    #[inline(always)]
    pub fn get_mut(&mut self) -> &mut T {
        self.data.get_mut()
    }
}

impl<T: Default, R> Default for Mutex<T, R> {
    #[inline]
    fn default() -> Self {
        Self::new(Default::default())
    }
}

impl<T, R> From<T> for Mutex<T, R> {
    #[inline]
    fn from(data: T) -> Self {
        Self::new(data)
    }
}

impl<T: ?Sized + Debug, R: Relax> Debug for Mutex<T, R> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let mut d = f.debug_struct("Mutex");
        self.lock_with(|guard| {
            d.field("data", &&*guard);
        });
        d.finish()
    }
}

/// An RAII implementation of a "scoped lock" of a [`Mutex`]. When this
/// structure is dropped (falls out of scope), the lock is released.
#[must_use = "if unused the Mutex will immediately unlock"]
pub struct MutexGuard<'a, T: ?Sized, R> {
    pub(crate) lock: &'a Mutex<T, R>,
}

// Same unsafe Sync impl as `std::sync::MutexGuard`.
unsafe impl<T: ?Sized + Sync, R> Sync for MutexGuard<'_, T, R> {}

impl<'a, T: ?Sized, R> MutexGuard<'a, T, R> {
    /// Wraps a mutex whose raw lock the current thread holds.
    pub(crate) const fn new(lock: &'a Mutex<T, R>) -> Self {
        Self { lock }
    }

    /// Consumes the guard without releasing the lock, returning the mutex.
    ///
    /// The caller becomes responsible for releasing the raw lock.
    pub(crate) fn leak(self) -> &'a Mutex<T, R> {
        let lock = self.lock;
        core::mem::forget(self);
        lock
    }
}

impl<T: ?Sized, R> Drop for MutexGuard<'_, T, R> {
    #[inline]
    fn drop(&mut self) {
        // SAFETY: A guard instance holds the lock locked, and drop only ever
        // runs once.
        unsafe { self.lock.raw.unlock() }
    }
}

impl<T: ?Sized, R> Deref for MutexGuard<'_, T, R> {
    type Target = T;

    #[inline(always)]
    fn deref(&self) -> &T {
        // SAFETY: A guard instance holds the lock locked.
        unsafe { &*self.lock.data.get() }
    }
}

impl<T: ?Sized, R> DerefMut for MutexGuard<'_, T, R> {
    #[inline(always)]
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: A guard instance holds the lock locked.
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<T: ?Sized + Debug, R> Debug for MutexGuard<'_, T, R> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        (**self).fmt(f)
    }
}

impl<T: ?Sized + Display, R> Display for MutexGuard<'_, T, R> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        (**self).fmt(f)
    }
}

#[cfg(all(not(loom), test))]
mod test {
    // Adapted from the test suite of Rust's `std::sync::Mutex`.
    //
    // Copyright 2014 The Rust Project Developers.
    //
    // Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
    // http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
    // <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
    // option. This file may not be copied, modified, or distributed
    // except according to those terms.

    use std::sync::mpsc::channel;
    use std::sync::Arc;
    use std::thread;

    use crate::relax::Yield;
    use crate::ticket::yields::Mutex;

    #[derive(Eq, PartialEq, Debug)]
    struct NonCopy(u32);

    #[test]
    fn lots_and_lots() {
        const ITERS: u32 = 1000;
        const CONCURRENCY: u32 = 6;

        let mutex = Arc::new(Mutex::new(0));
        let handles: Vec<_> = (0..CONCURRENCY)
            .map(|_| {
                let mutex = Arc::clone(&mutex);
                thread::spawn(move || {
                    for _ in 0..ITERS {
                        *mutex.lock() += 1;
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(*mutex.lock(), ITERS * CONCURRENCY);
    }

    #[test]
    fn try_lock() {
        let mutex = Mutex::new(());
        let guard = mutex.try_lock();
        assert!(guard.is_some());
        assert!(mutex.try_lock().is_none());
        drop(guard);
        assert!(mutex.try_lock().is_some());
    }

    #[test]
    fn test_guard_debug_display() {
        let value = 42;
        let mutex = Mutex::new(value);
        let guard = mutex.lock();
        assert_eq!(format!("{value:?}"), format!("{guard:?}"));
        assert_eq!(format!("{value}"), format!("{guard}"));
    }

    #[test]
    fn test_mutex_debug() {
        let mutex = Mutex::new(42);
        assert_eq!(format!("{mutex:?}"), "Mutex { data: 42 }");
    }

    #[test]
    fn test_mutex_default_from() {
        let mut mutex: Mutex<u32> = Default::default();
        assert_eq!(*mutex.get_mut(), 0);
        let mut mutex = Mutex::from(7);
        assert_eq!(*mutex.get_mut(), 7);
    }

    #[test]
    fn test_into_inner_get_mut() {
        let mut mutex = Mutex::new(NonCopy(10));
        *mutex.get_mut() = NonCopy(20);
        assert_eq!(mutex.into_inner(), NonCopy(20));
    }

    #[test]
    fn test_lock_arc_nested() {
        let arc = Arc::new(Mutex::new(1));
        let arc2 = Arc::new(Mutex::new(arc));
        let (tx, rx) = channel();
        let _t = thread::spawn(move || {
            let lock = arc2.lock();
            let lock2 = lock.lock();
            assert_eq!(*lock2, 1);
            tx.send(()).unwrap();
        });
        rx.recv().unwrap();
    }

    #[test]
    fn test_lock_arc_access_in_unwind() {
        let arc = Arc::new(Mutex::new(1));
        let arc2 = arc.clone();
        let _ = thread::spawn(move || {
            struct Unwinder {
                i: Arc<Mutex<i32>>,
            }
            impl Drop for Unwinder {
                fn drop(&mut self) {
                    *self.i.lock() += 1;
                }
            }
            let _u = Unwinder { i: arc2 };
            panic!();
        })
        .join();
        assert_eq!(*arc.lock(), 2);
    }

    #[test]
    fn test_lock_unsized() {
        let mutex: &super::Mutex<[i32], Yield> = &Mutex::new([1, 2, 3]);
        {
            let mut guard = mutex.lock();
            guard[0] = 4;
            guard[2] = 5;
        }
        let comp: &[i32] = &[4, 2, 5];
        assert_eq!(&*mutex.lock(), comp);
    }
}
