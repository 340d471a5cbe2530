//! The stream substrate: durable, replayable, per-subject topics with
//! independent durable cursors.
//!
//! Every pipeline stage composes through this seam; producers and
//! consumers never hold direct references to each other. The contract is
//! deliberately narrow:
//!
//! - within a single subject, delivery order equals publish order for one
//!   cursor;
//! - delivery is at-least-once, so consumers dedupe by `(file_id, seq)`;
//! - a fresh `consumer_id` replays the subject from its beginning, which is
//!   the fan-out mechanism that lets every matcher see the whole
//!   comparison file;
//! - a reattached `consumer_id` resumes at its retained position.
//!
//! [`MemoryBroker`] is the in-process provider; a durable provider with
//! the same contract can be substituted at the [`StreamProvider`] seam.

pub mod memory;

use core::fmt::{self, Display, Formatter};
use core::time::Duration;

pub use memory::MemoryBroker;

/// Stream holding primary-file sections, one subject per file id.
pub const PRIMARY_SECTIONS_STREAM: &str = "primary-file-sections";
/// Stream holding comparison-file sections, one subject per file id.
pub const COMPARISON_SECTIONS_STREAM: &str = "comparison-file-sections";
/// Stream carrying verdict-annotated sections back to the reassembler.
pub const REASSEMBLY_STREAM: &str = "file-sections-to-be-reconstructed";

/// Subject carrying one task's finished sections on the reassembly stream.
#[must_use]
pub fn reassembly_subject(task_id: &str) -> String {
    format!("Reconstruct-{task_id}")
}

/// Substrate failure modes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Error {
    /// The provider is shut down or otherwise unreachable.
    TransportUnavailable,
    /// The payload exceeds the provider's message size limit.
    PayloadTooLarge { size: usize, limit: usize },
    /// No message arrived within the per-operation deadline. The caller
    /// decides whether to retry or abort.
    Transient,
    /// The subject was never registered on the stream.
    UnknownSubject { subject: String },
    /// No cursor exists under this consumer id.
    UnknownCursor { consumer_id: String },
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::TransportUnavailable => f.write_str("stream transport unavailable"),
            Self::PayloadTooLarge { size, limit } => {
                write!(f, "payload of {size} bytes exceeds the {limit} byte limit")
            }
            Self::Transient => f.write_str("no message within the deadline"),
            Self::UnknownSubject { subject } => write!(f, "unknown subject [{subject}]"),
            Self::UnknownCursor { consumer_id } => write!(f, "unknown cursor [{consumer_id}]"),
        }
    }
}

impl std::error::Error for Error {}

/// A durable, replayable topic provider.
pub trait StreamProvider: Send + Sync {
    /// Register `subject` on `stream`. Idempotent; registering an
    /// additional subject never disturbs retained messages.
    fn ensure_topic(&self, stream: &str, subject: &str) -> Result<(), Error>;

    /// Remove a subject and its retained messages. Removing an absent
    /// subject is a no-op.
    fn delete_topic(&self, stream: &str, subject: &str) -> Result<(), Error>;

    /// Atomically append one payload to a registered subject.
    fn publish(&self, subject: &str, payload: &[u8]) -> Result<(), Error>;

    /// Create or reattach the durable cursor `consumer_id`, filtered to
    /// `subject`. A fresh cursor starts at the subject's first message.
    fn open_cursor(
        &self,
        stream: &str,
        subject: &str,
        consumer_id: &str,
    ) -> Result<Box<dyn StreamCursor>, Error>;

    /// Remove a cursor and its retained position.
    fn close_cursor(&self, consumer_id: &str) -> Result<(), Error>;
}

/// A durable position in one subject.
pub trait StreamCursor: Send {
    /// The next payload in publish order, acknowledged before return.
    /// Blocks up to `deadline`, then returns [`Error::Transient`].
    fn next(&mut self, deadline: Duration) -> Result<Vec<u8>, Error>;
}

/// Default retry budget for [`publish_with_retry`].
pub const DEFAULT_PUBLISH_ATTEMPTS: u32 = 5;

/// Publish with exponential backoff while the transport is unavailable.
/// Every other failure is returned immediately.
///
/// # Errors
///
/// Returns [`Error::TransportUnavailable`] once the budget is exhausted,
/// or the first non-retryable publish error.
pub fn publish_with_retry(
    provider: &dyn StreamProvider,
    subject: &str,
    payload: &[u8],
    attempts: u32,
) -> Result<(), Error> {
    let mut delay = Duration::from_millis(50);
    let mut left = attempts.max(1);
    loop {
        match provider.publish(subject, payload) {
            Err(Error::TransportUnavailable) => {
                left -= 1;
                if left == 0 {
                    return Err(Error::TransportUnavailable);
                }
                tracing::warn!(subject, backoff_ms = delay.as_millis() as u64, "transport unavailable, backing off");
                std::thread::sleep(delay);
                delay = delay.saturating_mul(2);
            }
            other => return other,
        }
    }
}

/// Closes a durable cursor when dropped, so the close survives early
/// returns and panics in the owning stage.
pub struct CursorGuard<'a> {
    provider: &'a dyn StreamProvider,
    consumer_id: String,
}

impl<'a> CursorGuard<'a> {
    pub fn new(provider: &'a dyn StreamProvider, consumer_id: impl Into<String>) -> Self {
        Self {
            provider,
            consumer_id: consumer_id.into(),
        }
    }
}

impl Drop for CursorGuard<'_> {
    fn drop(&mut self) {
        match self.provider.close_cursor(&self.consumer_id) {
            Ok(()) => tracing::trace!(consumer_id = %self.consumer_id, "cursor closed"),
            Err(err) => {
                tracing::warn!(consumer_id = %self.consumer_id, %err, "failed to close cursor");
            }
        }
    }
}
