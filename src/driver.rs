//! The producer/consumer driver behind the `cp_pattern` binary.
//!
//! Producers draw random integers in `0..max_num` and enqueue every value the
//! first time it is drawn. Consumers dequeue values and report whether each
//! one is divisible by six. The queue and the set of seen values share one
//! ticket [`Mutex`], the two condition variables wake consumers on new work
//! and the main thread once every value has been produced.
//!
//! The run ends once `max_num` distinct values were produced and the queue
//! has drained. The main thread then raises a stop flag and broadcasts until
//! every consumer has left.

use std::collections::hash_map::DefaultHasher;
use std::collections::VecDeque;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::io::{self, Write};
use std::panic;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering::SeqCst};
use std::thread::{self, Builder};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info, warn};

use crate::condvar::Notify;
use crate::error::{Error, Result};
use crate::relax::Yield;
use crate::ticket::Mutex;

/// Number of distinct values a full run produces and consumes.
pub const MAX_NUM: usize = 1_000_000;

/// Parameters of one producer/consumer run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// Number of consumer threads.
    pub consumers: usize,
    /// Number of producer threads.
    pub producers: usize,
    /// Seed of the producers' random sources.
    pub seed: u64,
    /// Values are drawn from `0..max_num`, and the run ends after each one
    /// was produced once.
    pub max_num: usize,
}

impl Config {
    /// Validates a configuration over the full `0..MAX_NUM` range.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if any parameter is zero.
    pub fn new(consumers: usize, producers: usize, seed: u64) -> Result<Self> {
        positive("consumers", consumers as u64)?;
        positive("producers", producers as u64)?;
        positive("seed", seed)?;
        Ok(Self { consumers, producers, seed, max_num: MAX_NUM })
    }

    /// Shrinks or grows the value range.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if `max_num` is zero.
    pub fn with_max_num(self, max_num: usize) -> Result<Self> {
        positive("max_num", max_num as u64)?;
        Ok(Self { max_num, ..self })
    }
}

fn positive(name: &str, value: u64) -> Result<()> {
    if value == 0 {
        return Err(Error::InvalidArgument(format!("{name} must be a positive integer")));
    }
    Ok(())
}

/// Counters observed at the end of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Report {
    /// Distinct values enqueued by producers.
    pub produced: usize,
    /// Values dequeued and reported by consumers.
    pub consumed: usize,
}

/// A fixed-size set of integers in `0..len`.
struct Seen {
    words: Vec<u64>,
}

impl Seen {
    fn new(len: usize) -> Self {
        Self { words: vec![0; len.div_ceil(64)] }
    }

    /// Adds `n`, returning `true` if it was not present.
    fn insert(&mut self, n: usize) -> bool {
        let (word, bit) = (n / 64, 1 << (n % 64));
        let fresh = self.words[word] & bit == 0;
        self.words[word] |= bit;
        fresh
    }
}

/// State guarded by the queue lock.
struct State {
    queue: VecDeque<usize>,
    seen: Seen,
}

/// Writes protocol lines, keeping the first error and skipping later writes.
struct Printer<W> {
    out: W,
    error: Option<io::Error>,
}

impl<W: Write> Printer<W> {
    fn line(&mut self, args: fmt::Arguments<'_>) {
        if self.error.is_some() {
            return;
        }
        if let Err(err) = self.out.write_fmt(args).and_then(|()| self.out.write_all(b"\n")) {
            self.error = Some(err);
        }
    }

    fn finish(mut self) -> io::Result<()> {
        match self.error.take() {
            Some(err) => Err(err),
            None => self.out.flush(),
        }
    }
}

/// Everything the threads of one run share.
struct Context<C, W> {
    max_num: usize,
    seed: u64,
    queue: Mutex<State, Yield>,
    printer: Mutex<Printer<W>, Yield>,
    is_empty: C,
    produced_done: C,
    produced: AtomicUsize,
    consumed: AtomicUsize,
    stop: AtomicBool,
    live_consumers: AtomicUsize,
}

/// Decrements the live consumer count when a consumer returns or unwinds.
struct Live<'a>(&'a AtomicUsize);

impl Drop for Live<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, SeqCst);
    }
}

impl<C: Notify, W: Write> Context<C, W> {
    fn new(config: &Config, out: W) -> Self {
        let state = State { queue: VecDeque::new(), seen: Seen::new(config.max_num) };
        Self {
            max_num: config.max_num,
            seed: config.seed,
            queue: Mutex::new(state),
            printer: Mutex::new(Printer { out, error: None }),
            is_empty: C::new(),
            produced_done: C::new(),
            produced: AtomicUsize::new(0),
            consumed: AtomicUsize::new(0),
            stop: AtomicBool::new(false),
            live_consumers: AtomicUsize::new(0),
        }
    }

    fn print(&self, args: fmt::Arguments<'_>) {
        self.printer.lock().line(args);
    }

    fn produce(&self, index: usize) {
        let id = thread_key();
        let mut rng = StdRng::seed_from_u64(self.seed.wrapping_add(index as u64));
        while self.produced.load(SeqCst) < self.max_num && !self.stop.load(SeqCst) {
            let n = rng.gen_range(0..self.max_num);
            let mut state = self.queue.lock();
            if state.seen.insert(n) {
                state.queue.push_back(n);
                self.print(format_args!("Producer {id} generated number: {n}"));
                if self.produced.fetch_add(1, SeqCst) + 1 == self.max_num {
                    self.produced_done.notify_one();
                }
                self.is_empty.notify_one();
            }
        }
        debug!(index, "producer finished");
    }

    fn consume(&self) {
        let _live = Live(&self.live_consumers);
        let id = thread_key();
        loop {
            let mut state = self.queue.lock();
            let n = loop {
                if let Some(n) = state.queue.pop_front() {
                    break n;
                }
                if self.stop.load(SeqCst) {
                    return;
                }
                state = self.is_empty.wait(state);
            };
            drop(state);
            self.consumed.fetch_add(1, SeqCst);
            let verdict = if n % 6 == 0 { "True" } else { "False" };
            self.print(format_args!("Consumer {id} checked {n}. Is it divisible by 6? {verdict}"));
        }
    }

    /// Blocks until every value in the range has been produced.
    fn wait_produced(&self) {
        let guard = self.queue.lock();
        let guard = self.produced_done.wait_while(guard, |_| {
            self.produced.load(SeqCst) < self.max_num
        });
        drop(guard);
    }

    /// Spins until consumers have taken every queued value.
    fn wait_drained(&self) {
        while !self.queue.lock().queue.is_empty() {
            thread::yield_now();
        }
    }

    /// Raises the stop flag and broadcasts until no consumer is left waiting.
    fn shutdown(&self) {
        self.stop.store(true, SeqCst);
        while self.live_consumers.load(SeqCst) > 0 {
            let guard = self.queue.lock();
            self.is_empty.notify_all();
            drop(guard);
            thread::yield_now();
        }
    }
}

/// A stable numeric identity for the calling thread.
fn thread_key() -> u64 {
    let mut hasher = DefaultHasher::new();
    thread::current().id().hash(&mut hasher);
    hasher.finish()
}

fn spawn_error(role: &str, err: &io::Error) -> Error {
    warn!(role, %err, "failed to spawn worker thread");
    Error::ResourceExhausted(format!("failed to spawn {role} thread: {err}"))
}

/// Runs producers and consumers to completion, writing one line per
/// enqueued and per consumed value to `out`.
///
/// # Errors
///
/// Returns [`Error::ResourceExhausted`] if a worker thread cannot be
/// spawned, in which case the threads that did start are stopped and joined
/// first. Returns [`Error::Io`] if writing to `out` failed.
///
/// # Example
///
/// ```
/// use ticketsync::condvar::yields::TicketCondvar;
/// use ticketsync::driver::{self, Config};
///
/// let config = Config::new(2, 2, 7)?.with_max_num(100)?;
/// let mut out = Vec::new();
/// let report = driver::run::<TicketCondvar, _>(config, &mut out)?;
/// assert_eq!(report.consumed, 100);
/// assert_eq!(String::from_utf8(out).unwrap().lines().count(), 200);
/// # Ok::<(), ticketsync::Error>(())
/// ```
pub fn run<C, W>(config: Config, out: W) -> Result<Report>
where
    C: Notify + Send + Sync,
    W: Write + Send,
{
    info!(
        consumers = config.consumers,
        producers = config.producers,
        seed = config.seed,
        max_num = config.max_num,
        "starting producer/consumer run"
    );
    let context = Context::<C, W>::new(&config, out);
    let ctx = &context;
    let spawned = thread::scope(|s| {
        let mut handles = Vec::with_capacity(config.producers + config.consumers);
        let mut spawned = Ok(());
        for index in 0..config.producers {
            let builder = Builder::new().name(format!("producer-{index}"));
            match builder.spawn_scoped(s, move || ctx.produce(index)) {
                Ok(handle) => handles.push(handle),
                Err(err) => {
                    spawned = Err(spawn_error("producer", &err));
                    break;
                }
            }
        }
        if spawned.is_ok() {
            for index in 0..config.consumers {
                ctx.live_consumers.fetch_add(1, SeqCst);
                let builder = Builder::new().name(format!("consumer-{index}"));
                match builder.spawn_scoped(s, move || ctx.consume()) {
                    Ok(handle) => handles.push(handle),
                    Err(err) => {
                        ctx.live_consumers.fetch_sub(1, SeqCst);
                        spawned = Err(spawn_error("consumer", &err));
                        break;
                    }
                }
            }
        }
        debug!(threads = handles.len(), "workers spawned");
        if spawned.is_ok() {
            ctx.wait_produced();
            info!("every value produced, draining queue");
            ctx.wait_drained();
        }
        ctx.shutdown();
        for handle in handles {
            match handle.join() {
                Ok(()) => {}
                Err(payload) => panic::resume_unwind(payload),
            }
        }
        spawned
    });
    let report = Report {
        produced: context.produced.load(SeqCst),
        consumed: context.consumed.load(SeqCst),
    };
    spawned?;
    context.printer.into_inner().finish()?;
    info!(produced = report.produced, consumed = report.consumed, "run finished");
    Ok(report)
}

#[cfg(all(not(loom), test))]
mod test {
    use std::collections::BTreeSet;
    use std::io::{self, Write};

    use super::{run, Config, Seen, MAX_NUM};
    use crate::condvar::yields::{Condvar, TicketCondvar};
    use crate::error::Error;

    /// Splits output into produced and consumed values, checking verdicts.
    fn parse(out: &[u8]) -> (Vec<usize>, Vec<usize>) {
        let text = std::str::from_utf8(out).unwrap();
        let mut produced = Vec::new();
        let mut consumed = Vec::new();
        for line in text.lines() {
            let words: Vec<_> = line.split_whitespace().collect();
            match words[0] {
                "Producer" => {
                    assert_eq!(words[2..4], ["generated", "number:"]);
                    produced.push(words[4].parse().unwrap());
                }
                "Consumer" => {
                    let n: usize = words[3].trim_end_matches('.').parse().unwrap();
                    let verdict = if n % 6 == 0 { "True" } else { "False" };
                    assert_eq!(words.last(), Some(&verdict), "{line}");
                    consumed.push(n);
                }
                other => panic!("unexpected line prefix {other:?}"),
            }
        }
        (produced, consumed)
    }

    fn check_complete(out: &[u8], max_num: usize) {
        let (produced, consumed) = parse(out);
        assert_eq!(produced.len(), max_num);
        assert_eq!(consumed.len(), max_num);
        let expected: BTreeSet<_> = (0..max_num).collect();
        assert_eq!(produced.iter().copied().collect::<BTreeSet<_>>(), expected);
        assert_eq!(consumed.iter().copied().collect::<BTreeSet<_>>(), expected);
    }

    #[test]
    fn config_rejects_zero() {
        assert!(matches!(Config::new(0, 1, 1), Err(Error::InvalidArgument(_))));
        assert!(matches!(Config::new(1, 0, 1), Err(Error::InvalidArgument(_))));
        assert!(matches!(Config::new(1, 1, 0), Err(Error::InvalidArgument(_))));
        let config = Config::new(4, 3, 42).unwrap();
        assert_eq!(config.max_num, MAX_NUM);
        assert!(config.with_max_num(0).is_err());
        assert_eq!(config.with_max_num(10).unwrap().max_num, 10);
    }

    #[test]
    fn seen_reports_first_insert_only() {
        let mut seen = Seen::new(130);
        assert!(seen.insert(0));
        assert!(seen.insert(129));
        assert!(!seen.insert(129));
        assert!(seen.insert(64));
        assert!(!seen.insert(0));
    }

    #[test]
    fn every_value_once_with_ticket_condvar() {
        let config = Config::new(4, 3, 42).unwrap().with_max_num(2000).unwrap();
        let mut out = Vec::new();
        let report = run::<TicketCondvar, _>(config, &mut out).unwrap();
        assert_eq!(report.produced, 2000);
        assert_eq!(report.consumed, 2000);
        check_complete(&out, 2000);
    }

    #[test]
    fn every_value_once_with_flag_condvar() {
        let config = Config::new(4, 3, 42).unwrap().with_max_num(2000).unwrap();
        let mut out = Vec::new();
        let report = run::<Condvar, _>(config, &mut out).unwrap();
        assert_eq!(report.consumed, 2000);
        check_complete(&out, 2000);
    }

    #[test]
    fn single_producer_is_reproducible() {
        let config = Config::new(2, 1, 9).unwrap().with_max_num(300).unwrap();
        let draw = || {
            let mut out = Vec::new();
            run::<TicketCondvar, _>(config, &mut out).unwrap();
            parse(&out).0
        };
        assert_eq!(draw(), draw());
    }

    #[test]
    fn more_consumers_than_values() {
        let config = Config::new(8, 1, 3).unwrap().with_max_num(4).unwrap();
        let mut out = Vec::new();
        let report = run::<TicketCondvar, _>(config, &mut out).unwrap();
        assert_eq!(report.consumed, 4);
        check_complete(&out, 4);
    }

    struct Broken;

    impl Write for Broken {
        fn write(&mut self, _: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn write_failure_is_reported_after_the_run() {
        let config = Config::new(2, 2, 1).unwrap().with_max_num(50).unwrap();
        let err = run::<TicketCondvar, _>(config, Broken).unwrap_err();
        match err {
            Error::Io(err) => assert_eq!(err.kind(), io::ErrorKind::BrokenPipe),
            other => panic!("unexpected error {other:?}"),
        }
    }
}
