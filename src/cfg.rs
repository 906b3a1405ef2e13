//! Switches the atomic, thread and hint backends between `std` and Loom.
//!
//! Every primitive in this crate imports its atomics, yielding and spin hints
//! from here, so that `RUSTFLAGS="--cfg loom"` runs the model checks against
//! Loom's instrumented types without touching the primitives themselves.

pub mod atomic {
    #[cfg(not(all(loom, test)))]
    pub use core::sync::atomic::{AtomicBool, AtomicUsize};

    #[cfg(all(loom, test))]
    #[cfg(not(tarpaulin_include))]
    pub use loom::sync::atomic::{AtomicBool, AtomicUsize};
}

pub mod hint {
    #[cfg(not(all(loom, test)))]
    pub use core::hint::spin_loop;

    #[cfg(all(loom, test))]
    #[cfg(not(tarpaulin_include))]
    pub use loom::hint::spin_loop;
}

pub mod thread {
    #[cfg(not(all(loom, test)))]
    pub use std::thread::yield_now;

    #[cfg(all(loom, test))]
    #[cfg(not(tarpaulin_include))]
    pub use loom::thread::yield_now;
}
