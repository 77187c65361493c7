// src/events.rs

//! Publish/subscribe surface used by every tangle component.
//!
//! Each observable occurrence is an [`Event`] holding a registry of handler
//! closures. Observers (typically the simulation harness) attach handlers
//! once during setup; components trigger events synchronously, invoking the
//! handlers in registration order.

use std::sync::{Arc, Mutex};

/// A single event with an attachable list of handlers.
///
/// Handlers are stored behind `Arc` so that triggering can snapshot the
/// registry and invoke the handlers without holding the lock; a handler is
/// therefore free to trigger further events, including this one.
pub struct Event<T> {
    handlers: Mutex<Vec<Arc<dyn Fn(&T) + Send + Sync>>>,
}

impl<T> Event<T> {
    /// Creates an event with no handlers attached
    pub fn new() -> Self {
        Self {
            handlers: Mutex::new(Vec::new()),
        }
    }

    /// Attaches a handler; it will be invoked on every subsequent trigger
    pub fn attach<F>(&self, handler: F)
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        if let Ok(mut handlers) = self.handlers.lock() {
            handlers.push(Arc::new(handler));
        }
    }

    /// Invokes all attached handlers, in registration order
    pub fn trigger(&self, args: &T) {
        let snapshot: Vec<_> = match self.handlers.lock() {
            Ok(handlers) => handlers.clone(),
            // A poisoned registry means an observer panicked; dropping the
            // notification is benign for the simulation.
            Err(_) => return,
        };

        for handler in snapshot {
            handler(args);
        }
    }

    /// Number of attached handlers
    pub fn handler_count(&self) -> usize {
        self.handlers.lock().map(|h| h.len()).unwrap_or(0)
    }
}

impl<T> Default for Event<T> {
    fn default() -> Self {
        Self::new()
    }
}
