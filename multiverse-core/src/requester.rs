// src/requester.rs

//! Recovery of messages referenced before they arrive.
//!
//! When a stored message names a parent the local node has never seen, the
//! requester records the gap and emits a `Request` event; the tangle forwards
//! it to the neighbors, and the owning peer's ticker re-issues stale requests
//! until the message arrives. There is no hard deadline: a request retries
//! for as long as the gap exists.

use crate::events::Event;
use crate::types::MessageId;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::debug;

/// Events emitted by [`Requester`]
pub struct RequesterEvents {
    /// A missing message should be requested from the neighbors
    pub request: Event<MessageId>,
}

/// Tracks missing parent references
pub struct Requester {
    /// Missing messages and the time they were last requested
    missing: std::sync::Mutex<HashMap<MessageId, Instant>>,

    /// Event surface
    pub events: RequesterEvents,
}

impl Requester {
    /// Creates a requester with no outstanding requests
    pub fn new() -> Self {
        Self {
            missing: std::sync::Mutex::new(HashMap::new()),
            events: RequesterEvents {
                request: Event::new(),
            },
        }
    }

    /// Registers a missing message and emits the first `Request` for it.
    ///
    /// Observing the same gap twice is benign; only the first observation
    /// emits.
    pub fn start_request(&self, id: MessageId) {
        let first = {
            let mut missing = match self.missing.lock() {
                Ok(guard) => guard,
                Err(_) => return,
            };
            if missing.contains_key(&id) {
                false
            } else {
                missing.insert(id, Instant::now());
                true
            }
        };

        if first {
            self.events.request.trigger(&id);
        }
    }

    /// Drops the entry for a message that arrived
    pub fn stop_request(&self, id: &MessageId) {
        if let Ok(mut missing) = self.missing.lock() {
            missing.remove(id);
        }
    }

    /// Re-emits `Request` for every entry older than the request interval
    pub fn reissue_stale(&self, interval: Duration) {
        let now = Instant::now();
        let due: Vec<MessageId> = {
            let mut missing = match self.missing.lock() {
                Ok(guard) => guard,
                Err(_) => return,
            };
            missing
                .iter_mut()
                .filter(|(_, last)| now.duration_since(**last) >= interval)
                .map(|(id, last)| {
                    *last = now;
                    *id
                })
                .collect()
        };

        for id in due {
            debug!(message = %id, "re-requesting missing message");
            self.events.request.trigger(&id);
        }
    }

    /// Checks whether a message is currently being requested
    pub fn is_requested(&self, id: &MessageId) -> bool {
        self.missing
            .lock()
            .map(|missing| missing.contains_key(id))
            .unwrap_or(false)
    }

    /// Number of outstanding requests
    pub fn pending(&self) -> usize {
        self.missing.lock().map(|missing| missing.len()).unwrap_or(0)
    }
}

impl Default for Requester {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_first_observation_emits_request() {
        let requester = Requester::new();
        let requests = Arc::new(AtomicUsize::new(0));

        let counter = requests.clone();
        requester.events.request.attach(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let id = MessageId::new();
        requester.start_request(id);
        requester.start_request(id);

        assert_eq!(requests.load(Ordering::SeqCst), 1);
        assert!(requester.is_requested(&id));
        assert_eq!(requester.pending(), 1);
    }

    #[test]
    fn test_arrival_stops_request() {
        let requester = Requester::new();
        let id = MessageId::new();

        requester.start_request(id);
        requester.stop_request(&id);

        assert!(!requester.is_requested(&id));
        assert_eq!(requester.pending(), 0);
    }

    #[test]
    fn test_reissue_only_when_stale() {
        let requester = Requester::new();
        let requests = Arc::new(AtomicUsize::new(0));

        let counter = requests.clone();
        requester.events.request.attach(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let id = MessageId::new();
        requester.start_request(id);
        assert_eq!(requests.load(Ordering::SeqCst), 1);

        requester.reissue_stale(Duration::from_secs(3600));
        assert_eq!(requests.load(Ordering::SeqCst), 1);

        requester.reissue_stale(Duration::ZERO);
        assert_eq!(requests.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_resolved_request_is_not_reissued() {
        let requester = Requester::new();
        let requests = Arc::new(AtomicUsize::new(0));

        let counter = requests.clone();
        requester.events.request.attach(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let id = MessageId::new();
        requester.start_request(id);
        requester.stop_request(&id);
        requester.reissue_stale(Duration::ZERO);

        assert_eq!(requests.load(Ordering::SeqCst), 1);
    }
}
