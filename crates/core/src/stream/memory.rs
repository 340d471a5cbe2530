//! In-process implementation of the stream substrate.
//!
//! One coarse lock guards the whole broker: traffic is section-sized
//! messages, not per-row, so contention stays on the control plane.
//! Messages are retained for the life of the broker, which is what lets a
//! fresh cursor replay a subject from the beginning.

use core::time::Duration;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use hashbrown::{HashMap, HashSet};

use super::{Error, StreamCursor, StreamProvider};

/// Largest accepted payload, matching what a hosted substrate would
/// enforce per message.
pub const DEFAULT_PAYLOAD_LIMIT: usize = 8 * 1024 * 1024;

#[derive(Debug, Default)]
struct CursorState {
    subject: String,
    position: usize,
}

#[derive(Debug, Default)]
struct BrokerState {
    shut_down: bool,
    /// Stream name -> registered subjects.
    streams: HashMap<String, HashSet<String>>,
    /// Subject -> retained message log, in publish order.
    subjects: HashMap<String, Vec<Arc<[u8]>>>,
    /// Consumer id -> durable position.
    cursors: HashMap<String, CursorState>,
}

#[derive(Debug)]
struct Shared {
    state: Mutex<BrokerState>,
    arrived: Condvar,
    payload_limit: usize,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, BrokerState> {
        // A panic while holding the lock leaves consistent state behind;
        // recover the guard instead of propagating the poison.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// In-memory stream provider. Cheap to clone; clones share one broker.
#[derive(Clone, Debug)]
pub struct MemoryBroker {
    shared: Arc<Shared>,
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBroker {
    #[must_use]
    pub fn new() -> Self {
        Self::with_payload_limit(DEFAULT_PAYLOAD_LIMIT)
    }

    #[must_use]
    pub fn with_payload_limit(payload_limit: usize) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(BrokerState::default()),
                arrived: Condvar::new(),
                payload_limit,
            }),
        }
    }

    /// Number of cursors currently open across all subjects.
    #[must_use]
    pub fn live_cursors(&self) -> usize {
        self.shared.lock().cursors.len()
    }

    /// Number of messages retained on a subject; `None` when the subject
    /// was never registered.
    #[must_use]
    pub fn retained(&self, subject: &str) -> Option<usize> {
        self.shared.lock().subjects.get(subject).map(Vec::len)
    }

    /// Flip the broker into a state where every subsequent operation
    /// returns [`Error::TransportUnavailable`]. Blocked `next` calls wake
    /// up and fail.
    pub fn shut_down(&self) {
        self.shared.lock().shut_down = true;
        self.shared.arrived.notify_all();
    }
}

impl StreamProvider for MemoryBroker {
    fn ensure_topic(&self, stream: &str, subject: &str) -> Result<(), Error> {
        let mut state = self.shared.lock();
        if state.shut_down {
            return Err(Error::TransportUnavailable);
        }
        state
            .streams
            .entry(stream.to_owned())
            .or_default()
            .insert(subject.to_owned());
        state.subjects.entry(subject.to_owned()).or_default();
        tracing::trace!(stream, subject, "topic ensured");
        Ok(())
    }

    fn delete_topic(&self, stream: &str, subject: &str) -> Result<(), Error> {
        let mut state = self.shared.lock();
        if state.shut_down {
            return Err(Error::TransportUnavailable);
        }
        if let Some(subjects) = state.streams.get_mut(stream) {
            subjects.remove(subject);
        }
        state.subjects.remove(subject);
        tracing::trace!(stream, subject, "topic deleted");
        Ok(())
    }

    fn publish(&self, subject: &str, payload: &[u8]) -> Result<(), Error> {
        if payload.len() > self.shared.payload_limit {
            return Err(Error::PayloadTooLarge {
                size: payload.len(),
                limit: self.shared.payload_limit,
            });
        }
        let mut state = self.shared.lock();
        if state.shut_down {
            return Err(Error::TransportUnavailable);
        }
        let Some(log) = state.subjects.get_mut(subject) else {
            return Err(Error::UnknownSubject {
                subject: subject.to_owned(),
            });
        };
        log.push(Arc::from(payload));
        self.shared.arrived.notify_all();
        Ok(())
    }

    fn open_cursor(
        &self,
        stream: &str,
        subject: &str,
        consumer_id: &str,
    ) -> Result<Box<dyn StreamCursor>, Error> {
        let mut state = self.shared.lock();
        if state.shut_down {
            return Err(Error::TransportUnavailable);
        }
        let registered = state
            .streams
            .get(stream)
            .is_some_and(|subjects| subjects.contains(subject));
        if !registered {
            return Err(Error::UnknownSubject {
                subject: subject.to_owned(),
            });
        }
        let cursor = state.cursors.entry(consumer_id.to_owned()).or_default();
        if cursor.subject != subject {
            // Reattaching under the same durable name with a different
            // filter resets the cursor, mirroring a create-or-update
            // consumer call.
            *cursor = CursorState {
                subject: subject.to_owned(),
                position: 0,
            };
        }
        tracing::debug!(stream, subject, consumer_id, position = cursor.position, "cursor open");
        Ok(Box::new(MemoryCursor {
            shared: Arc::clone(&self.shared),
            consumer_id: consumer_id.to_owned(),
        }))
    }

    fn close_cursor(&self, consumer_id: &str) -> Result<(), Error> {
        let mut state = self.shared.lock();
        if state.shut_down {
            return Err(Error::TransportUnavailable);
        }
        if state.cursors.remove(consumer_id).is_none() {
            return Err(Error::UnknownCursor {
                consumer_id: consumer_id.to_owned(),
            });
        }
        tracing::debug!(consumer_id, "cursor removed");
        Ok(())
    }
}

struct MemoryCursor {
    shared: Arc<Shared>,
    consumer_id: String,
}

impl StreamCursor for MemoryCursor {
    fn next(&mut self, deadline: Duration) -> Result<Vec<u8>, Error> {
        let wake_at = Instant::now() + deadline;
        let mut state = self.shared.lock();
        loop {
            if state.shut_down {
                return Err(Error::TransportUnavailable);
            }
            let (subject, position) = {
                let cursor =
                    state
                        .cursors
                        .get(&self.consumer_id)
                        .ok_or_else(|| Error::UnknownCursor {
                            consumer_id: self.consumer_id.clone(),
                        })?;
                (cursor.subject.clone(), cursor.position)
            };
            let Some(log) = state.subjects.get(&subject) else {
                return Err(Error::UnknownSubject { subject });
            };
            if position < log.len() {
                let payload = Arc::clone(&log[position]);
                if let Some(cursor) = state.cursors.get_mut(&self.consumer_id) {
                    // Advancing the durable position is the acknowledgement.
                    cursor.position = position + 1;
                }
                return Ok(payload.to_vec());
            }
            let timeout = wake_at.saturating_duration_since(Instant::now());
            if timeout.is_zero() {
                return Err(Error::Transient);
            }
            state = self
                .shared
                .arrived
                .wait_timeout(state, timeout)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }
}
