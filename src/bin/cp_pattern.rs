//! Runs the producer/consumer driver over `0..1_000_000`.
//!
//! ```text
//! cp_pattern <consumers> <producers> <seed>
//! ```
//!
//! Protocol lines go to stdout. Diagnostics go to stderr, filtered through
//! `RUST_LOG` (default `warn`).

use std::io::{self, BufWriter};
use std::process;

use clap::error::ErrorKind;
use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

use ticketsync::condvar::yields::Condvar;
use ticketsync::driver::{self, Config};

const USAGE: &str = "usage: cp pattern [consumers] [producers] [seed]";

/// Spawns producers that enqueue every integer below one million exactly once
/// and consumers that check each one for divisibility by six.
#[derive(Debug, Parser)]
#[command(name = "cp_pattern", version)]
struct Args {
    /// Number of consumer threads.
    #[arg(value_parser = clap::value_parser!(u32).range(1..))]
    consumers: u32,

    /// Number of producer threads.
    #[arg(value_parser = clap::value_parser!(u32).range(1..))]
    producers: u32,

    /// Seed of the producers' random sources.
    #[arg(value_parser = clap::value_parser!(u32).range(1..))]
    seed: u32,
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(io::stderr).init();
}

fn execute(args: &Args) -> ticketsync::Result<()> {
    let config = Config::new(args.consumers as usize, args.producers as usize, args.seed.into())?;
    let out = BufWriter::new(io::stdout());
    driver::run::<Condvar, _>(config, out)?;
    Ok(())
}

fn main() {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(err) => match err.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => err.exit(),
            _ => {
                eprintln!("{USAGE}");
                process::exit(1);
            }
        },
    };
    init_logging();
    if let Err(err) = execute(&args) {
        error!(%err, "producer/consumer run failed");
        eprintln!("cp_pattern: {err}");
        process::exit(err.exit_code());
    }
}
