use std::io;
use std::thread::ThreadId;

/// Errors surfaced by the thread-keyed storage table and the producer/consumer
/// driver.
///
/// Misuse of the raw primitives (unlocking a lock that is not held, releasing
/// a read lock twice) is not detected and is not represented here.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A malformed invocation or configuration.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The storage table has no free slot for the calling thread.
    #[error("thread {thread:?} failed to initialize, not enough space")]
    CapacityExhausted {
        /// The thread that could not be registered.
        thread: ThreadId,
    },

    /// The calling thread accessed its storage slot before allocating one.
    #[error("thread {thread:?} hasn't been initialized in the storage table")]
    Uninitialized {
        /// The thread that has no slot.
        thread: ThreadId,
    },

    /// A worker thread could not be created.
    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    /// Writing protocol lines to the output failed.
    #[error("failed to write output")]
    Io(#[from] io::Error),
}

impl Error {
    /// The process exit code a command line front end should terminate with.
    ///
    /// Storage lookups on an unregistered thread map to `2`, every other
    /// failure maps to `1`.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Uninitialized { .. } => 2,
            _ => 1,
        }
    }
}

/// A specialized `Result` type for this crate.
pub type Result<T, E = Error> = core::result::Result<T, E>;

#[cfg(all(not(loom), test))]
mod test {
    use std::thread;

    use super::Error;

    #[test]
    fn exit_codes_discriminate_storage_errors() {
        let thread = thread::current().id();
        assert_eq!(Error::Uninitialized { thread }.exit_code(), 2);
        assert_eq!(Error::CapacityExhausted { thread }.exit_code(), 1);
        assert_eq!(Error::InvalidArgument("seed".into()).exit_code(), 1);
        assert_eq!(Error::ResourceExhausted("spawn".into()).exit_code(), 1);
    }

    #[test]
    fn capacity_message_names_thread() {
        let thread = thread::current().id();
        let msg = Error::CapacityExhausted { thread }.to_string();
        assert_eq!(msg, format!("thread {thread:?} failed to initialize, not enough space"));
    }
}
