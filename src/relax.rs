// Derived from relax.rs of spin-rs, reworked so that every strategy is a
// stateful value created once per wait loop and so that yielding goes through
// the Loom-aware thread backend.
//
// https://github.com/mvdnes/spin-rs/blob/5860ee114094cf200b97348ff332155fbd7159b4/src/relax.rs
//
// Copyright (c) 2014 Mathijs van de Nes
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Strategies that determine what a waiting thread does on each iteration of
//! a busy-wait loop.
//!
//! Every primitive in this crate is generic over one of these strategies. A
//! fresh strategy value is created at the start of each wait loop, and
//! [`Relax::relax`] is called once per failed observation.

use crate::cfg::{hint, thread};

/// A trait implemented by spinning relax strategies.
///
/// # Example
///
/// ```
/// use ticketsync::relax::Relax;
///
/// struct Pause;
///
/// impl Relax for Pause {
///     #[inline(always)]
///     fn new() -> Self {
///         Self
///     }
///
///     #[inline(always)]
///     fn relax(&mut self) {
///         core::hint::spin_loop();
///     }
/// }
/// ```
pub trait Relax {
    /// Returns the initial value for this relaxing strategy.
    fn new() -> Self;

    /// Performs the relaxing operation during a period of contention.
    fn relax(&mut self);
}

/// Spins while hinting the processor via [`core::hint::spin_loop`].
///
/// The scheduler cannot tell this apart from useful work. With more threads
/// than cores a FIFO ticket lock degrades badly under this strategy, because
/// the next ticket holder may be descheduled while everyone behind it burns
/// its time slice. Prefer [`Yield`] in that situation.
pub struct Spin;

impl Relax for Spin {
    #[inline(always)]
    fn new() -> Self {
        Self
    }

    #[inline(always)]
    fn relax(&mut self) {
        hint::spin_loop();
    }
}

/// Yields the current time slice to the scheduler on every iteration.
///
/// This is the strategy the producer/consumer driver runs with.
pub struct Yield;

impl Relax for Yield {
    #[inline(always)]
    fn new() -> Self {
        Self
    }

    #[inline(always)]
    fn relax(&mut self) {
        thread::yield_now();
    }
}

// Exponential backoff is based on the crossbeam-utils implementation.
// https://github.com/crossbeam-rs/crossbeam/blob/371de8c2d304db07662450995848f3dc9598ac99/crossbeam-utils/src/backoff.rs
//
// Copyright (c) 2019 The Crossbeam Project Developers
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

type Uint = u32;

/// Spins with exponential backoff, saturating at `1 << MAX` hints per call.
pub struct SpinBackoff {
    inner: Backoff<{ Self::MAX }>,
}

impl SpinBackoff {
    const MAX: Uint = 6;
}

// The shift must stay below the bit width.
const _: () = assert!(SpinBackoff::MAX < Uint::BITS);

impl Relax for SpinBackoff {
    #[inline(always)]
    fn new() -> Self {
        Self { inner: Backoff::default() }
    }

    #[inline(always)]
    fn relax(&mut self) {
        self.inner.spin();
        self.inner.step();
    }
}

/// Spins with exponential backoff until the backoff saturates, then yields to
/// the scheduler on every further call.
pub struct YieldBackoff {
    inner: Backoff<{ Self::MAX }>,
}

impl YieldBackoff {
    const MAX: Uint = SpinBackoff::MAX;
}

const _: () = assert!(YieldBackoff::MAX < Uint::BITS);

impl Relax for YieldBackoff {
    #[inline(always)]
    fn new() -> Self {
        Self { inner: Backoff::default() }
    }

    #[inline(always)]
    fn relax(&mut self) {
        if self.inner.saturated() {
            thread::yield_now();
        } else {
            self.inner.spin();
            self.inner.step();
        }
    }
}

/// Shift counter shared by the backoff strategies.
#[derive(Default)]
struct Backoff<const MAX: Uint>(Uint);

impl<const MAX: Uint> Backoff<MAX> {
    fn saturated(&self) -> bool {
        self.0 >= MAX
    }

    fn spin(&self) {
        for _ in 0..1 << self.0.min(MAX) {
            hint::spin_loop();
        }
    }

    fn step(&mut self) {
        if self.0 < MAX {
            self.0 += 1;
        }
    }
}

#[cfg(all(not(loom), test))]
mod test {
    use super::{Relax, SpinBackoff, Spin, Uint, Yield, YieldBackoff};

    fn returns<R: Relax>(iters: Uint) {
        let mut relax = R::new();
        for _ in 0..=iters {
            relax.relax();
        }
    }

    #[test]
    fn spins() {
        returns::<Spin>(10);
    }

    #[test]
    fn spins_backoff() {
        returns::<SpinBackoff>(SpinBackoff::MAX * 10);
    }

    #[test]
    fn yields() {
        returns::<Yield>(10);
    }

    #[test]
    fn yields_backoff() {
        returns::<YieldBackoff>(YieldBackoff::MAX * 10);
    }

    #[test]
    fn backoff_saturates() {
        let mut backoff = super::Backoff::<3>::default();
        for _ in 0..10 {
            backoff.step();
        }
        assert!(backoff.saturated());
        assert_eq!(backoff.0, 3);
    }
}
