#![cfg(not(loom))]

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering::Relaxed};
use std::sync::Arc;
use std::thread;

use ticketsync::condvar::yields::TicketCondvar;
use ticketsync::condvar::Notify;
use ticketsync::driver::{self, Config, MAX_NUM};
use ticketsync::local::yields::LocalStorage;
use ticketsync::relax::Yield;
use ticketsync::rwlock::{self, yields::FlagRwLock, yields::RwLock};
use ticketsync::semaphore::yields::{TasSemaphore, TicketSemaphore};
use ticketsync::ticket::yields::Mutex;

fn ticket_mutex_counter(threads: u64, iters: u64) {
    let counter = Arc::new(Mutex::new(0_u64));
    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let counter = Arc::clone(&counter);
            thread::spawn(move || {
                for _ in 0..iters {
                    *counter.lock() += 1;
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(*counter.lock(), threads * iters);
}

#[test]
fn ticket_mutex_counter_reduced() {
    ticket_mutex_counter(10, 10_000);
}

#[test]
#[ignore = "one million contended handoffs"]
fn ticket_mutex_counter_full() {
    ticket_mutex_counter(10, 100_000);
}

/// Increments with a separate load and store, so any overlap of two critical
/// sections loses an update.
fn semaphore_counter<W, S>(wait: W, signal: S) -> u64
where
    W: Fn() + Send + Sync + 'static,
    S: Fn() + Send + Sync + 'static,
{
    const THREADS: usize = 5;
    const ITERS: usize = 1000;
    let count = Arc::new(AtomicU64::new(0));
    let wait = Arc::new(wait);
    let signal = Arc::new(signal);
    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let (count, wait, signal) = (Arc::clone(&count), Arc::clone(&wait), Arc::clone(&signal));
            thread::spawn(move || {
                for _ in 0..ITERS {
                    wait();
                    let value = count.load(Relaxed);
                    thread::yield_now();
                    count.store(value + 1, Relaxed);
                    signal();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    count.load(Relaxed)
}

#[test]
fn tas_semaphore_as_mutex() {
    let sem = Arc::new(TasSemaphore::new(1));
    let (w, s) = (Arc::clone(&sem), Arc::clone(&sem));
    assert_eq!(semaphore_counter(move || w.wait(), move || s.signal()), 5000);
    assert_eq!(sem.value(), 1);
}

#[test]
fn ticket_semaphore_as_mutex() {
    let sem = Arc::new(TicketSemaphore::new(1));
    let (w, s) = (Arc::clone(&sem), Arc::clone(&sem));
    assert_eq!(semaphore_counter(move || w.wait(), move || s.signal()), 5000);
    assert_eq!(sem.value(), 1);
}

type Flag<C> = rwlock::RwLock<bool, Yield, C>;

fn rwlock_stress<C>(flag: Flag<C>, writers: usize, readers: usize, iters: usize)
where
    C: Notify + Send + Sync + 'static,
{
    let flag = Arc::new(flag);
    let bugs = Arc::new(AtomicBool::new(false));
    let mut handles = Vec::new();
    for _ in 0..writers {
        let (flag, bugs) = (Arc::clone(&flag), Arc::clone(&bugs));
        handles.push(thread::spawn(move || {
            for _ in 0..iters {
                let mut guard = flag.write();
                *guard = true;
                thread::yield_now();
                if !*guard {
                    bugs.store(true, Relaxed);
                }
                *guard = false;
            }
        }));
    }
    for _ in 0..readers {
        let (flag, bugs) = (Arc::clone(&flag), Arc::clone(&bugs));
        handles.push(thread::spawn(move || {
            for _ in 0..iters {
                let guard = flag.read();
                let first = *guard;
                thread::yield_now();
                if first != *guard || first {
                    bugs.store(true, Relaxed);
                }
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }
    assert!(!bugs.load(Relaxed), "a reader overlapped a writer");
}

#[test]
fn rwlock_stress_reduced() {
    rwlock_stress(RwLock::new(false), 10, 10, 1000);
}

#[test]
fn flag_condvar_rwlock_stress_reduced() {
    rwlock_stress(FlagRwLock::new(false), 10, 10, 1000);
}

#[test]
#[ignore = "two million lock acquisitions with a yield inside each"]
fn rwlock_stress_full() {
    rwlock_stress(RwLock::new(false), 10, 10, 100_000);
}

#[test]
#[ignore = "two million lock acquisitions with a yield inside each"]
fn flag_condvar_rwlock_stress_full() {
    rwlock_stress(FlagRwLock::new(false), 10, 10, 100_000);
}

#[test]
fn local_storage_lifecycle() {
    let storage = Arc::new(LocalStorage::<usize>::new());
    let c_storage = Arc::clone(&storage);
    thread::spawn(move || {
        let storage = &*c_storage;
        storage.alloc().unwrap();
        storage.set(0xA).unwrap();
        assert_eq!(storage.get().unwrap(), Some(0xA));
        storage.set(0xB).unwrap();
        assert_eq!(storage.get().unwrap(), Some(0xB));
        assert_eq!(storage.free(), Some(0xB));
        storage.alloc().unwrap();
        assert_eq!(storage.get().unwrap(), None);
    })
    .join()
    .unwrap();
    // The spawned thread exited without freeing its second slot.
    assert_eq!(storage.len(), 1);
    assert!(storage.get().is_err());
}

#[test]
#[ignore = "produces and consumes one million values"]
fn driver_full_range() {
    let config = Config::new(4, 3, 42).unwrap();
    let mut out = Vec::new();
    let report = driver::run::<TicketCondvar, _>(config, &mut out).unwrap();
    assert_eq!(report.produced, MAX_NUM);
    assert_eq!(report.consumed, MAX_NUM);
    let mut seen = vec![false; MAX_NUM];
    let text = String::from_utf8(out).unwrap();
    for line in text.lines().filter(|line| line.starts_with("Consumer")) {
        let n: usize = line.split_whitespace().nth(3).unwrap().trim_end_matches('.').parse().unwrap();
        assert!(!seen[n], "{n} consumed twice");
        seen[n] = true;
    }
    assert!(seen.iter().all(|&s| s));
}
