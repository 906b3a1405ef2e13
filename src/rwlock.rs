//! A readers-writer lock whose admission is serialized by a ticket lock.
//!
//! Every state change happens while holding an internal [`RawTicketLock`]
//! called `admin`. Readers wait on the lock's condition variable while a
//! writer is active. Writers wait while readers are inside or another writer
//! holds the lock. The last reader out signals one waiter and a departing
//! writer broadcasts to all of them.
//!
//! The condition variable flavour is a type parameter and defaults to
//! [`TicketCondvar`], which never loses a wake. [`Condvar`] can collapse
//! overlapping wakes, but every transition that could unblock a waiter
//! signals again under `admin`, and every waiter re-checks the state under
//! `admin`, so the wait loops still converge.
//!
//! [`Condvar`]: crate::condvar::Condvar

use core::cell::UnsafeCell;
use core::fmt::{self, Debug, Display, Formatter};
use core::ops::{Deref, DerefMut};
use core::sync::atomic::Ordering::SeqCst;

use crate::cfg::atomic::{AtomicBool, AtomicUsize};
use crate::condvar::{Notify, TicketCondvar};
use crate::relax::Relax;
use crate::ticket::RawTicketLock;

#[cfg(test)]
use crate::test::RawExclusive;

/// The raw readers-writer lock, it does not protect any data.
pub struct RawRwLock<R, C = TicketCondvar<R>> {
    admin: RawTicketLock<R>,
    readers: AtomicUsize,
    writer: AtomicBool,
    cv: C,
}

impl<R, C: Notify> RawRwLock<R, C> {
    /// Creates an unlocked readers-writer lock.
    #[must_use]
    pub fn new() -> Self {
        Self {
            admin: RawTicketLock::new(),
            readers: AtomicUsize::new(0),
            writer: AtomicBool::new(false),
            cv: C::new(),
        }
    }
}

impl<R, C> RawRwLock<R, C> {
    /// Number of readers currently inside.
    pub fn readers(&self) -> usize {
        self.readers.load(SeqCst)
    }

    /// Returns `true` if a writer holds the lock.
    pub fn is_write_locked(&self) -> bool {
        self.writer.load(SeqCst)
    }
}

impl<R: Relax, C: Notify> RawRwLock<R, C> {
    /// Enters as a reader, waiting for as long as a writer is active.
    pub fn lock_shared(&self) {
        self.admin.lock();
        while self.writer.load(SeqCst) {
            // SAFETY: `admin` is held by this thread.
            unsafe { self.cv.wait_raw(&self.admin) };
        }
        self.readers.fetch_add(1, SeqCst);
        // SAFETY: `admin` is held by this thread.
        unsafe { self.admin.unlock() };
    }

    /// Leaves as a reader. The last reader out wakes one waiter.
    ///
    /// # Safety
    ///
    /// The calling thread must have entered through [`lock_shared`] and not
    /// left yet.
    ///
    /// [`lock_shared`]: RawRwLock::lock_shared
    pub unsafe fn unlock_shared(&self) {
        if self.readers.fetch_sub(1, SeqCst) == 1 {
            self.signal(|cv| cv.notify_one());
        }
    }

    /// Enters as the only writer, waiting until no reader and no other writer
    /// is inside.
    pub fn lock_exclusive(&self) {
        self.admin.lock();
        while self.readers.load(SeqCst) > 0 || self.writer.load(SeqCst) {
            // SAFETY: `admin` is held by this thread.
            unsafe { self.cv.wait_raw(&self.admin) };
        }
        // Only `admin` holders raise the flag, so nobody raced us to it.
        self.writer.store(true, SeqCst);
        // SAFETY: `admin` is held by this thread.
        unsafe { self.admin.unlock() };
    }

    /// Leaves as the writer and wakes every waiter.
    ///
    /// # Safety
    ///
    /// The calling thread must hold the lock through [`lock_exclusive`].
    ///
    /// [`lock_exclusive`]: RawRwLock::lock_exclusive
    pub unsafe fn unlock_exclusive(&self) {
        self.writer.store(false, SeqCst);
        self.signal(|cv| cv.notify_all());
    }

    /// Notifies under `admin`, so a waiter is either registered already or
    /// has yet to check the state that was just changed.
    fn signal(&self, notify: impl FnOnce(&C)) {
        self.admin.lock();
        notify(&self.cv);
        // SAFETY: Locked above.
        unsafe { self.admin.unlock() };
    }
}

impl<R, C: Notify> Default for RawRwLock<R, C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R, C> Debug for RawRwLock<R, C> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let mut d = f.debug_struct("RawRwLock");
        d.field("readers", &self.readers());
        d.field("writer", &self.is_write_locked());
        d.finish()
    }
}

#[cfg(test)]
impl<R: Relax, C: Notify> RawExclusive for RawRwLock<R, C> {
    fn new() -> Self {
        Self::new()
    }

    fn acquire(&self) {
        self.lock_exclusive();
    }

    unsafe fn release(&self) {
        // SAFETY: Caller guaranteed that this thread holds the write side.
        unsafe { self.unlock_exclusive() }
    }
}

/// A readers-writer lock protecting shared data.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use std::thread;
///
/// use ticketsync::rwlock::yields::RwLock;
///
/// let lock = Arc::new(RwLock::new(5));
/// let c_lock = Arc::clone(&lock);
/// thread::spawn(move || *c_lock.write() += 1).join().unwrap();
///
/// let r1 = lock.read();
/// let r2 = lock.read();
/// assert_eq!(*r1 + *r2, 12);
/// ```
pub struct RwLock<T: ?Sized, R, C = TicketCondvar<R>> {
    raw: RawRwLock<R, C>,
    data: UnsafeCell<T>,
}

// Same unsafe impls as `std::sync::RwLock`.
unsafe impl<T: ?Sized + Send, R, C: Send> Send for RwLock<T, R, C> {}
unsafe impl<T: ?Sized + Send + Sync, R, C: Sync> Sync for RwLock<T, R, C> {}

impl<T, R, C: Notify> RwLock<T, R, C> {
    /// Creates a new, unlocked readers-writer lock around `value`.
    #[inline]
    pub fn new(value: T) -> Self {
        Self { raw: RawRwLock::new(), data: UnsafeCell::new(value) }
    }
}

impl<T, R, C> RwLock<T, R, C> {
    /// Consumes this lock, returning the underlying data.
    #[inline]
    pub fn into_inner(self) -> T {
        self.data.into_inner()
    }
}

impl<T: ?Sized, R, C> RwLock<T, R, C> {
    /// Returns a mutable reference to the underlying data.
    ///
    /// Since this call borrows the lock mutably, no actual locking needs to
    /// take place.
    #[inline(always)]
    pub fn get_mut(&mut self) -> &mut T {
        self.data.get_mut()
    }
}

impl<T: ?Sized, R: Relax, C: Notify> RwLock<T, R, C> {
    /// Acquires shared read access, waiting while a writer is inside.
    #[inline]
    pub fn read(&self) -> RwLockReadGuard<'_, T, R, C> {
        self.raw.lock_shared();
        RwLockReadGuard { lock: self }
    }

    /// Acquires exclusive write access, waiting until every reader and any
    /// other writer has left.
    #[inline]
    pub fn write(&self) -> RwLockWriteGuard<'_, T, R, C> {
        self.raw.lock_exclusive();
        RwLockWriteGuard { lock: self }
    }
}

impl<T: Default, R, C: Notify> Default for RwLock<T, R, C> {
    #[inline]
    fn default() -> Self {
        Self::new(Default::default())
    }
}

impl<T, R, C: Notify> From<T> for RwLock<T, R, C> {
    #[inline]
    fn from(data: T) -> Self {
        Self::new(data)
    }
}

impl<T: ?Sized + Debug, R: Relax, C: Notify> Debug for RwLock<T, R, C> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let mut d = f.debug_struct("RwLock");
        d.field("data", &&*self.read());
        d.finish()
    }
}

/// Shared access to the data of a [`RwLock`], released on drop.
#[must_use = "if unused the RwLock will immediately unlock"]
pub struct RwLockReadGuard<'a, T: ?Sized, R: Relax, C: Notify> {
    lock: &'a RwLock<T, R, C>,
}

// Same unsafe Sync impl as `std::sync::RwLockReadGuard`.
unsafe impl<T: ?Sized + Sync, R: Relax, C: Notify + Sync> Sync for RwLockReadGuard<'_, T, R, C> {}

impl<T: ?Sized, R: Relax, C: Notify> Drop for RwLockReadGuard<'_, T, R, C> {
    #[inline]
    fn drop(&mut self) {
        // SAFETY: A read guard instance entered as a reader.
        unsafe { self.lock.raw.unlock_shared() }
    }
}

impl<T: ?Sized, R: Relax, C: Notify> Deref for RwLockReadGuard<'_, T, R, C> {
    type Target = T;

    #[inline(always)]
    fn deref(&self) -> &T {
        // SAFETY: No writer is inside while a reader is.
        unsafe { &*self.lock.data.get() }
    }
}

impl<T: ?Sized + Debug, R: Relax, C: Notify> Debug for RwLockReadGuard<'_, T, R, C> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        (**self).fmt(f)
    }
}

impl<T: ?Sized + Display, R: Relax, C: Notify> Display for RwLockReadGuard<'_, T, R, C> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        (**self).fmt(f)
    }
}

/// Exclusive access to the data of a [`RwLock`], released on drop.
#[must_use = "if unused the RwLock will immediately unlock"]
pub struct RwLockWriteGuard<'a, T: ?Sized, R: Relax, C: Notify> {
    lock: &'a RwLock<T, R, C>,
}

// Same unsafe Sync impl as `std::sync::RwLockWriteGuard`.
unsafe impl<T: ?Sized + Sync, R: Relax, C: Notify + Sync> Sync for RwLockWriteGuard<'_, T, R, C> {}

impl<T: ?Sized, R: Relax, C: Notify> Drop for RwLockWriteGuard<'_, T, R, C> {
    #[inline]
    fn drop(&mut self) {
        // SAFETY: A write guard instance holds the write side.
        unsafe { self.lock.raw.unlock_exclusive() }
    }
}

impl<T: ?Sized, R: Relax, C: Notify> Deref for RwLockWriteGuard<'_, T, R, C> {
    type Target = T;

    #[inline(always)]
    fn deref(&self) -> &T {
        // SAFETY: A write guard instance holds the write side.
        unsafe { &*self.lock.data.get() }
    }
}

impl<T: ?Sized, R: Relax, C: Notify> DerefMut for RwLockWriteGuard<'_, T, R, C> {
    #[inline(always)]
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: A write guard instance holds the write side.
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<T: ?Sized + Debug, R: Relax, C: Notify> Debug for RwLockWriteGuard<'_, T, R, C> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        (**self).fmt(f)
    }
}

impl<T: ?Sized + Display, R: Relax, C: Notify> Display for RwLockWriteGuard<'_, T, R, C> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        (**self).fmt(f)
    }
}

/// Readers-writer lock aliases that spin while signaling the processor that
/// it is running a busy-wait spin-loop.
pub mod spins {
    use crate::condvar::{Condvar, TicketCondvar};
    use crate::relax::Spin;

    /// A [`rwlock::RawRwLock`] that implements the [`Spin`] relax strategy.
    ///
    /// [`rwlock::RawRwLock`]: super::RawRwLock
    pub type RawRwLock = super::RawRwLock<Spin, TicketCondvar<Spin>>;

    /// A [`rwlock::RwLock`] that implements the [`Spin`] relax strategy.
    ///
    /// [`rwlock::RwLock`]: super::RwLock
    pub type RwLock<T> = super::RwLock<T, Spin, TicketCondvar<Spin>>;

    /// A [`rwlock::RwLock`] that implements the [`Spin`] relax strategy and
    /// waits on the flag based [`Condvar`].
    ///
    /// [`rwlock::RwLock`]: super::RwLock
    pub type FlagRwLock<T> = super::RwLock<T, Spin, Condvar<Spin>>;
}

/// Readers-writer lock aliases that yield the current time slice to the
/// scheduler while waiting.
pub mod yields {
    use crate::condvar::{Condvar, TicketCondvar};
    use crate::relax::Yield;

    /// A [`rwlock::RawRwLock`] that implements the [`Yield`] relax strategy.
    ///
    /// [`rwlock::RawRwLock`]: super::RawRwLock
    pub type RawRwLock = super::RawRwLock<Yield, TicketCondvar<Yield>>;

    /// A [`rwlock::RwLock`] that implements the [`Yield`] relax strategy.
    ///
    /// [`rwlock::RwLock`]: super::RwLock
    pub type RwLock<T> = super::RwLock<T, Yield, TicketCondvar<Yield>>;

    /// A [`rwlock::RwLock`] that implements the [`Yield`] relax strategy and
    /// waits on the flag based [`Condvar`].
    ///
    /// ```
    /// use ticketsync::rwlock::yields::FlagRwLock;
    ///
    /// let lock = FlagRwLock::new(vec![1]);
    /// lock.write().push(2);
    /// assert_eq!(*lock.read(), [1, 2]);
    /// ```
    /// [`rwlock::RwLock`]: super::RwLock
    pub type FlagRwLock<T> = super::RwLock<T, Yield, Condvar<Yield>>;
}

#[cfg(all(not(loom), test))]
mod test {
    use std::sync::atomic::{AtomicBool, Ordering::SeqCst};
    use std::sync::mpsc::channel;
    use std::sync::Arc;
    use std::thread;

    use crate::condvar::yields::{Condvar, TicketCondvar};
    use crate::condvar::Notify;
    use crate::relax::Yield;
    use crate::rwlock::yields::{RawRwLock, RwLock};
    use crate::test::tests;

    #[test]
    fn lots_and_lots_write() {
        tests::lots_and_lots::<RawRwLock>();
    }

    #[test]
    fn smoke() {
        tests::smoke::<RawRwLock>();
    }

    #[test]
    fn never_two_writers() {
        tests::never_two_holders::<RawRwLock>();
    }

    #[test]
    fn readers_overlap() {
        let lock = Arc::new(RwLock::new(7));
        let held = lock.read();
        let c_lock = Arc::clone(&lock);
        let (tx, rx) = channel();
        let reader = thread::spawn(move || {
            let value = *c_lock.read();
            tx.send(value).unwrap();
        });
        // The second reader gets in while the first guard is still alive.
        assert_eq!(rx.recv().unwrap(), 7);
        assert_eq!(*held, 7);
        drop(held);
        reader.join().unwrap();
    }

    #[test]
    fn writer_waits_for_readers() {
        let lock = Arc::new(RwLock::new(0));
        let entered = Arc::new(AtomicBool::new(false));
        let held = lock.read();
        let writer = {
            let lock = Arc::clone(&lock);
            let entered = Arc::clone(&entered);
            thread::spawn(move || {
                let mut guard = lock.write();
                entered.store(true, SeqCst);
                *guard += 1;
            })
        };
        for _ in 0..100 {
            thread::yield_now();
            assert!(!entered.load(SeqCst));
        }
        drop(held);
        writer.join().unwrap();
        assert!(entered.load(SeqCst));
        assert_eq!(*lock.read(), 1);
    }

    #[test]
    fn reader_waits_for_writer() {
        let lock = Arc::new(RwLock::new(0));
        let mut held = lock.write();
        let reader = {
            let lock = Arc::clone(&lock);
            thread::spawn(move || *lock.read())
        };
        for _ in 0..100 {
            thread::yield_now();
            assert!(!reader.is_finished());
            assert_eq!(lock.raw.readers(), 0);
        }
        *held = 100;
        drop(held);
        assert_eq!(reader.join().unwrap(), 100);
    }

    fn flag_stress<C>(writers: usize, readers: usize, iters: usize)
    where
        C: Notify + Send + Sync + 'static,
    {
        let lock = Arc::new(super::RwLock::<bool, Yield, C>::new(false));
        let mut handles = Vec::new();
        for _ in 0..writers {
            let lock = Arc::clone(&lock);
            handles.push(thread::spawn(move || {
                for _ in 0..iters {
                    let mut flag = lock.write();
                    *flag = true;
                    thread::yield_now();
                    assert!(*flag);
                    *flag = false;
                }
            }));
        }
        for _ in 0..readers {
            let lock = Arc::clone(&lock);
            handles.push(thread::spawn(move || {
                for _ in 0..iters {
                    let flag = lock.read();
                    let before = *flag;
                    thread::yield_now();
                    assert_eq!(before, *flag);
                    assert!(!before);
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        assert!(!*lock.read());
    }

    #[test]
    fn flag_stays_stable_under_contention() {
        flag_stress::<TicketCondvar>(3, 3, 500);
    }

    #[test]
    fn flag_stays_stable_with_flag_condvar() {
        flag_stress::<Condvar>(3, 3, 500);
    }

    #[test]
    fn debug_and_accessors() {
        let mut lock = RwLock::new(42);
        assert_eq!(format!("{lock:?}"), "RwLock { data: 42 }");
        *lock.get_mut() += 1;
        {
            let guard = lock.read();
            assert_eq!(format!("{guard:?}"), "43");
            assert_eq!(format!("{guard}"), "43");
            assert_eq!(format!("{:?}", lock.raw), "RawRwLock { readers: 1, writer: false }");
        }
        {
            let guard = lock.write();
            assert_eq!(format!("{guard}"), "43");
            assert_eq!(format!("{:?}", lock.raw), "RawRwLock { readers: 0, writer: true }");
        }
        assert_eq!(lock.into_inner(), 43);
    }

    #[test]
    fn default_and_from() {
        let lock: RwLock<u32> = RwLock::default();
        assert_eq!(*lock.read(), 0);
        let lock: RwLock<u32> = RwLock::from(3);
        assert_eq!(*lock.read(), 3);
    }
}

#[cfg(all(loom, test))]
mod model {
    use crate::condvar::TicketCondvar;
    use crate::loom::models;
    use crate::relax::Yield;

    #[test]
    fn lock_join() {
        models::lock_join::<super::RawRwLock<Yield, TicketCondvar<Yield>>>();
    }
}
