//! Test-and-set spinlock.
//!
//! The lock is a single atomic flag. Acquiring swaps `true` in until the
//! previous value was `false`. There is no queue, so there is no fairness
//! among contending threads. It backs the [`TasSemaphore`] and the
//! [`LocalStorage`] table.
//!
//! [`TasSemaphore`]: crate::semaphore::TasSemaphore
//! [`LocalStorage`]: crate::local::LocalStorage

use core::fmt::{self, Debug, Formatter};
use core::marker::PhantomData;
use core::sync::atomic::Ordering::{Acquire, Relaxed, Release};

use crate::cfg::atomic::AtomicBool;
use crate::relax::Relax;

#[cfg(test)]
use crate::test::RawExclusive;

/// A raw test-and-set spinlock.
///
/// # Example
///
/// ```
/// use ticketsync::tas::RawTasLock;
/// use ticketsync::relax::Yield;
///
/// let lock = RawTasLock::<Yield>::new();
/// let value = lock.lock_with(|| 42);
/// assert_eq!(value, 42);
/// assert!(!lock.is_locked());
/// ```
pub struct RawTasLock<R> {
    locked: AtomicBool,
    relax: PhantomData<fn() -> R>,
}

impl<R> RawTasLock<R> {
    /// Creates a new, unlocked spinlock (const).
    #[cfg(not(all(loom, test)))]
    #[must_use]
    pub const fn new() -> Self {
        Self { locked: AtomicBool::new(false), relax: PhantomData }
    }

    /// Creates a new, unlocked and Loom based spinlock (non-const).
    #[cfg(all(loom, test))]
    #[cfg(not(tarpaulin_include))]
    #[must_use]
    pub fn new() -> Self {
        Self { locked: AtomicBool::new(false), relax: PhantomData }
    }

    /// Attempts to set the flag once, returning `true` on success.
    #[inline]
    pub fn try_lock(&self) -> bool {
        !self.locked.swap(true, Acquire)
    }

    /// Clears the flag.
    ///
    /// # Safety
    ///
    /// The calling thread must currently hold the lock.
    #[inline]
    pub unsafe fn unlock(&self) {
        self.locked.store(false, Release);
    }

    /// Returns `true` if the flag is currently set.
    pub fn is_locked(&self) -> bool {
        self.locked.load(Relaxed)
    }
}

impl<R: Relax> RawTasLock<R> {
    /// Spins until the flag was found clear by test-and-set.
    ///
    /// Contended waiters only read the flag and retry the swap once it reads
    /// clear.
    pub fn lock(&self) {
        let mut relax = R::new();
        while !self.try_lock() {
            while self.is_locked() {
                relax.relax();
            }
        }
    }

    /// Runs `f` while holding the lock.
    pub fn lock_with<F, Ret>(&self, f: F) -> Ret
    where
        F: FnOnce() -> Ret,
    {
        struct Unlock<'a, R>(&'a RawTasLock<R>);

        impl<R> Drop for Unlock<'_, R> {
            fn drop(&mut self) {
                // SAFETY: Constructed only after `lock` returned.
                unsafe { self.0.unlock() }
            }
        }

        self.lock();
        let _unlock = Unlock(self);
        f()
    }
}

#[cfg(not(tarpaulin_include))]
impl<R> Default for RawTasLock<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> Debug for RawTasLock<R> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawTasLock").field("locked", &self.is_locked()).finish()
    }
}

#[cfg(test)]
impl<R: Relax> RawExclusive for RawTasLock<R> {
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
    use std::panic::{self, AssertUnwindSafe};

    use super::RawTasLock;
    use crate::relax::{Spin, Yield};
    use crate::test::tests;

    #[test]
    fn lots_and_lots_lock() {
        tests::lots_and_lots::<RawTasLock<Yield>>();
    }

    #[test]
    fn lots_and_lots_lock_spin() {
        tests::lots_and_lots::<RawTasLock<Spin>>();
    }

    #[test]
    fn smoke() {
        tests::smoke::<RawTasLock<Yield>>();
    }

    #[test]
    fn never_two_holders() {
        tests::never_two_holders::<RawTasLock<Yield>>();
    }

    #[test]
    fn try_lock_fails_while_held() {
        let lock = RawTasLock::<Yield>::new();
        assert!(lock.try_lock());
        assert!(!lock.try_lock());
        // SAFETY: held by this thread.
        unsafe { lock.unlock() };
        assert!(lock.try_lock());
    }

    #[test]
    fn lock_with_unlocks_on_unwind() {
        let lock = RawTasLock::<Yield>::new();
        let result = panic::catch_unwind(AssertUnwindSafe(|| lock.lock_with(|| panic!())));
        assert!(result.is_err());
        assert!(!lock.is_locked());
    }
}

#[cfg(all(loom, test))]
mod model {
    use crate::loom::models;
    use crate::relax::Yield;

    #[test]
    fn lock_join() {
        models::lock_join::<super::RawTasLock<Yield>>();
    }
}
