//! A fixed-capacity table of per-thread values.
//!
//! Each thread registers a slot with [`alloc`], keyed by its
//! [`std::thread::ThreadId`], and then reads and writes only that slot.
//! Lookups scan the table under a test-and-set spinlock. Free slots are
//! `None`, so there is no reserved thread key.
//!
//! [`alloc`]: LocalStorage::alloc

use core::array;
use core::cell::UnsafeCell;
use core::fmt::{self, Debug, Formatter};
use std::thread::{self, ThreadId};

use crate::error::{Error, Result};
use crate::relax::Relax;
use crate::tas::RawTasLock;

/// Default number of slots in a [`LocalStorage`] table.
pub const MAX_THREADS: usize = 64;

struct Slot<T> {
    owner: ThreadId,
    data: Option<T>,
}

type Slots<T, const N: usize> = [Option<Slot<T>>; N];

/// A table of up to `N` per-thread values guarded by a [`RawTasLock`].
///
/// Slots are not released when their thread exits. A thread that is done
/// with the table should call [`free`] so that another thread can take its
/// slot.
///
/// # Example
///
/// ```
/// use std::thread;
///
/// use ticketsync::local::yields::LocalStorage;
///
/// let storage: LocalStorage<usize> = LocalStorage::new();
/// thread::scope(|s| {
///     for n in 0..4 {
///         let storage = &storage;
///         s.spawn(move || {
///             storage.alloc().unwrap();
///             storage.set(n).unwrap();
///             assert_eq!(storage.get().unwrap(), Some(n));
///             assert_eq!(storage.free(), Some(n));
///         });
///     }
/// });
/// assert!(storage.is_empty());
/// ```
/// [`free`]: LocalStorage::free
pub struct LocalStorage<T, R, const N: usize = MAX_THREADS> {
    lock: RawTasLock<R>,
    slots: UnsafeCell<Slots<T, N>>,
}

// SAFETY: `slots` is only accessed while holding `lock`, and values may be
// taken out by a thread other than the one that stored them.
unsafe impl<T: Send, R, const N: usize> Sync for LocalStorage<T, R, N> {}

impl<T, R, const N: usize> LocalStorage<T, R, N> {
    /// Creates a table with every slot free.
    #[must_use]
    pub fn new() -> Self {
        let slots = UnsafeCell::new(array::from_fn(|_| None));
        Self { lock: RawTasLock::new(), slots }
    }

    /// Number of slots in the table.
    pub const fn capacity(&self) -> usize {
        N
    }
}

impl<T, R: Relax, const N: usize> LocalStorage<T, R, N> {
    /// Runs `f` against the slot array while holding the table lock.
    fn with_slots<F, Ret>(&self, f: F) -> Ret
    where
        F: FnOnce(&mut Slots<T, N>) -> Ret,
    {
        self.lock.lock_with(|| {
            // SAFETY: The table lock is held for the duration of `f`.
            let slots = unsafe { &mut *self.slots.get() };
            f(slots)
        })
    }

    /// Runs `f` against the calling thread's slot, if it has one.
    fn with_own<F, Ret>(&self, f: F) -> Result<Ret>
    where
        F: FnOnce(&mut Slot<T>) -> Ret,
    {
        let thread = thread::current().id();
        self.with_slots(|slots| owned_by(slots, thread).map(f))
            .ok_or(Error::Uninitialized { thread })
    }

    /// Registers a slot for the calling thread.
    ///
    /// Registering twice from the same thread leaves the table unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CapacityExhausted`] if the thread has no slot and
    /// every slot is taken.
    pub fn alloc(&self) -> Result<()> {
        let thread = thread::current().id();
        let claimed = self.with_slots(|slots| {
            if owned_by(slots, thread).is_some() {
                return true;
            }
            match slots.iter_mut().find(|slot| slot.is_none()) {
                Some(free) => {
                    *free = Some(Slot { owner: thread, data: None });
                    true
                }
                None => false,
            }
        });
        if !claimed {
            tracing::warn!(?thread, capacity = N, "thread storage table is full");
            return Err(Error::CapacityExhausted { thread });
        }
        Ok(())
    }

    /// Returns a clone of the calling thread's value, `None` if it has not
    /// stored one.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Uninitialized`] if the thread has no slot.
    pub fn get(&self) -> Result<Option<T>>
    where
        T: Clone,
    {
        self.with(|data| data.cloned())
    }

    /// Runs `f` against the calling thread's value while holding the table
    /// lock.
    ///
    /// The table lock is not reentrant: calling any other method of this
    /// table from within `f` spins forever.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Uninitialized`] if the thread has no slot.
    pub fn with<F, Ret>(&self, f: F) -> Result<Ret>
    where
        F: FnOnce(Option<&T>) -> Ret,
    {
        self.with_own(|slot| f(slot.data.as_ref()))
    }

    /// Stores `value` in the calling thread's slot, dropping the previous
    /// value outside of the table lock.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Uninitialized`] if the thread has no slot.
    pub fn set(&self, value: T) -> Result<()> {
        let previous = self.with_own(|slot| slot.data.replace(value))?;
        drop(previous);
        Ok(())
    }

    /// Releases the calling thread's slot, returning its value.
    ///
    /// Does nothing if the thread has no slot.
    pub fn free(&self) -> Option<T> {
        let thread = thread::current().id();
        self.with_slots(|slots| {
            let slot = slots.iter_mut().find(|slot| owns(slot, thread))?;
            slot.take().and_then(|slot| slot.data)
        })
    }

    /// Number of registered threads.
    pub fn len(&self) -> usize {
        self.with_slots(|slots| slots.iter().flatten().count())
    }

    /// Returns `true` if no thread is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn owns<T>(slot: &Option<Slot<T>>, thread: ThreadId) -> bool {
    slot.as_ref().is_some_and(|slot| slot.owner == thread)
}

fn owned_by<T>(slots: &mut [Option<Slot<T>>], thread: ThreadId) -> Option<&mut Slot<T>> {
    slots.iter_mut().flatten().find(|slot| slot.owner == thread)
}

impl<T, R, const N: usize> Default for LocalStorage<T, R, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, R: Relax, const N: usize> Debug for LocalStorage<T, R, N> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let mut d = f.debug_struct("LocalStorage");
        d.field("len", &self.len());
        d.field("capacity", &self.capacity());
        d.finish()
    }
}

/// Storage table aliases that spin while signaling the processor that it is
/// running a busy-wait spin-loop.
pub mod spins {
    use super::MAX_THREADS;
    use crate::relax::Spin;

    /// A [`local::LocalStorage`] that implements the [`Spin`] relax strategy.
    ///
    /// [`local::LocalStorage`]: super::LocalStorage
    pub type LocalStorage<T, const N: usize = MAX_THREADS> = super::LocalStorage<T, Spin, N>;
}

/// Storage table aliases that yield the current time slice to the scheduler
/// while waiting.
pub mod yields {
    use super::MAX_THREADS;
    use crate::relax::Yield;

    /// A [`local::LocalStorage`] that implements the [`Yield`] relax
    /// strategy.
    ///
    /// [`local::LocalStorage`]: super::LocalStorage
    pub type LocalStorage<T, const N: usize = MAX_THREADS> = super::LocalStorage<T, Yield, N>;
}

#[cfg(all(not(loom), test))]
mod test {
    use std::thread;

    use super::yields::LocalStorage;
    use super::MAX_THREADS;
    use crate::error::Error;

    #[test]
    fn lifecycle() {
        let storage = LocalStorage::<usize>::new();
        storage.alloc().unwrap();
        assert_eq!(storage.get().unwrap(), None);
        storage.set(0xA).unwrap();
        assert_eq!(storage.get().unwrap(), Some(0xA));
        storage.set(0xB).unwrap();
        assert_eq!(storage.get().unwrap(), Some(0xB));
        assert_eq!(storage.free(), Some(0xB));
        storage.alloc().unwrap();
        assert_eq!(storage.get().unwrap(), None);
    }

    #[test]
    fn alloc_is_idempotent() {
        let storage = LocalStorage::<u8>::new();
        storage.alloc().unwrap();
        storage.set(1).unwrap();
        storage.alloc().unwrap();
        assert_eq!(storage.len(), 1);
        assert_eq!(storage.get().unwrap(), Some(1));
    }

    #[test]
    fn unregistered_thread_is_uninitialized() {
        let storage = LocalStorage::<u8>::new();
        let thread = thread::current().id();
        let err = storage.get().unwrap_err();
        assert!(matches!(err, Error::Uninitialized { thread: t } if t == thread));
        assert_eq!(err.exit_code(), 2);
        assert!(matches!(storage.set(3), Err(Error::Uninitialized { .. })));
        assert_eq!(storage.free(), None);
        assert!(storage.is_empty());
    }

    #[test]
    fn full_table_rejects_new_threads() {
        let storage = LocalStorage::<u8, 2>::new();
        storage.alloc().unwrap();
        thread::scope(|s| {
            s.spawn(|| storage.alloc().unwrap()).join().unwrap();
            let (thread, result) = s
                .spawn(|| (thread::current().id(), storage.alloc()))
                .join()
                .unwrap();
            let err = result.unwrap_err();
            assert!(matches!(err, Error::CapacityExhausted { thread: t } if t == thread));
            assert_eq!(err.exit_code(), 1);
        });
        // Threads that already hold a slot are unaffected.
        storage.alloc().unwrap();
        assert_eq!(storage.len(), storage.capacity());
        storage.free();
        thread::scope(|s| s.spawn(|| storage.alloc().unwrap()).join().unwrap());
    }

    #[test]
    fn threads_see_only_their_own_value() {
        let storage = LocalStorage::<usize>::new();
        thread::scope(|s| {
            for n in 0..8 {
                let storage = &storage;
                s.spawn(move || {
                    storage.alloc().unwrap();
                    for round in 0..100 {
                        storage.set(n * 1000 + round).unwrap();
                        thread::yield_now();
                        assert_eq!(storage.get().unwrap(), Some(n * 1000 + round));
                    }
                    assert_eq!(storage.free(), Some(n * 1000 + 99));
                });
            }
        });
        assert!(storage.is_empty());
    }

    #[test]
    fn with_borrows_without_clone() {
        struct Opaque(u32);
        let storage = LocalStorage::<Opaque>::new();
        storage.alloc().unwrap();
        assert!(storage.with(|data| data.is_none()).unwrap());
        storage.set(Opaque(9)).unwrap();
        assert_eq!(storage.with(|data| data.map(|o| o.0)).unwrap(), Some(9));
    }

    #[test]
    fn debug() {
        let storage = LocalStorage::<u8>::new();
        storage.alloc().unwrap();
        let expected = format!("LocalStorage {{ len: 1, capacity: {MAX_THREADS} }}");
        assert_eq!(format!("{storage:?}"), expected);
    }
}
