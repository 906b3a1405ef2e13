//! User-space synchronization primitives built entirely on atomics and busy
//! waiting, and a producer/consumer driver exercising them.
//!
//! No primitive in this crate blocks in the kernel. Every wait loop spins
//! according to a [`Relax`] strategy chosen through a type parameter, and each
//! module offers `spins` and `yields` aliases that fix it.
//!
//! - [`ticket`]: a FIFO ticket lock and a [`Mutex`] built on it.
//! - [`tas`]: a test-and-set spinlock with no fairness.
//! - [`semaphore`]: counting semaphores backed by either lock.
//! - [`condvar`]: two condition variables that wait with an external
//!   ticket lock, behind the [`Notify`] trait.
//! - [`rwlock`]: a readers-writer lock whose admission goes through a ticket
//!   lock and a condition variable.
//! - [`local`]: a fixed-capacity table of per-thread values.
//! - [`driver`]: the producer/consumer run behind the `cp_pattern` binary.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use std::thread;
//!
//! use ticketsync::condvar::Notify;
//! use ticketsync::condvar::yields::TicketCondvar;
//! use ticketsync::ticket::yields::Mutex;
//!
//! let pair = Arc::new((Mutex::new(Vec::new()), TicketCondvar::new()));
//! let producer = {
//!     let pair = Arc::clone(&pair);
//!     thread::spawn(move || {
//!         let (queue, ready) = &*pair;
//!         for n in 0..10 {
//!             queue.lock().push(n);
//!             ready.notify_one();
//!         }
//!     })
//! };
//!
//! let (queue, ready) = &*pair;
//! let mut guard = ready.wait_while(queue.lock(), |queue| queue.len() < 10);
//! assert_eq!(guard.drain(..).sum::<i32>(), 45);
//! drop(guard);
//! producer.join().unwrap();
//! ```
//!
//! [`Relax`]: relax::Relax
//! [`Mutex`]: ticket::Mutex
//! [`Notify`]: condvar::Notify

#![allow(clippy::doc_markdown)]
#![allow(clippy::inline_always)]
#![allow(clippy::module_name_repetitions)]
#![warn(missing_docs)]
#![warn(rust_2024_compatibility)]
#![warn(clippy::undocumented_unsafe_blocks)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod condvar;
pub mod driver;
pub mod local;
pub mod relax;
pub mod rwlock;
pub mod semaphore;
pub mod tas;
pub mod ticket;

mod error;
pub use error::{Error, Result};

pub(crate) mod cfg;

#[cfg(test)]
pub(crate) mod test;

#[cfg(all(loom, test))]
#[cfg(not(tarpaulin))]
pub(crate) mod loom;
