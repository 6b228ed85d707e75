use std::{
    panic::{AssertUnwindSafe, catch_unwind},
    sync::Arc,
};

use dashmap::DashMap;
use foldhash::fast::RandomState;

use crate::{Value, error::panic_message};

pub type Listener = Arc<dyn Fn(&Value) + Send + Sync>;

/// Local publish/subscribe table keyed by event name.
///
/// Listeners are identified by their `Arc` allocation, so the handle passed
/// to [`on`](Emitter::on) is the one to pass to [`off`](Emitter::off).
#[derive(Default)]
pub struct Emitter {
    events: DashMap<String, Vec<Listener>, RandomState>,
}

impl Emitter {
    /// Registers `listener` for `event`, after any already registered.
    pub fn on(&self, event: impl Into<String>, listener: Listener) {
        self.events.entry(event.into()).or_default().push(listener);
    }

    /// Removes the first registration of `listener` for `event`.
    ///
    /// Returns false if it was not registered.
    pub fn off(&self, event: &str, listener: &Listener) -> bool {
        let Some(mut listeners) = self.events.get_mut(event) else {
            return false;
        };
        let Some(idx) = listeners.iter().position(|l| Arc::ptr_eq(l, listener)) else {
            return false;
        };
        listeners.remove(idx);
        let now_empty = listeners.is_empty();
        drop(listeners);
        if now_empty {
            self.events.remove_if(event, |_, l| l.is_empty());
        }
        true
    }

    /// Calls every listener of `event` in registration order.
    ///
    /// A panicking listener is logged and skipped, so later listeners still
    /// run.
    pub fn emit(&self, event: &str, payload: &Value) {
        // listeners may call on/off, so the shard lock is released first.
        let Some(listeners) = self.events.get(event).map(|l| l.value().clone()) else {
            tracing::trace!("no listener for event {event}");
            return;
        };
        for listener in &listeners {
            if let Err(panic) = catch_unwind(AssertUnwindSafe(|| listener(payload))) {
                let reason = panic_message(panic.as_ref());
                tracing::error!("listener for event {event} panicked: {reason}");
            }
        }
    }

    /// Number of listeners currently registered for `event`.
    #[must_use]
    pub fn listener_count(&self, event: &str) -> usize {
        self.events.get(event).map_or(0, |l| l.len())
    }
}

impl std::fmt::Debug for Emitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Emitter")
            .field("events", &self.events.len())
            .finish()
    }
}
