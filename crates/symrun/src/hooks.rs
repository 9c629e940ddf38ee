//! # Hook Registry
//!
//! Maps event-channel names to ordered subscriber lists. Registration order
//! is invocation order. One-shot subscriptions are removed from the registry
//! *before* their single invocation, so a panicking callback is still gone
//! afterwards.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::panic::catch_unwind;
use std::sync::Arc;
use std::sync::Mutex;

use serde_json::Value;

/// A subscriber callback. Identity is the `Arc` allocation: `off` removes
/// the exact handler reference that was registered.
pub type HookHandler = Arc<dyn Fn(Value) + Send + Sync>;

struct Entry {
    handler: HookHandler,
    once: bool,
}

/// Ordered, channel-keyed subscriber registry.
#[derive(Default)]
pub struct HookRegistry {
    channels: Mutex<HashMap<String, Vec<Entry>>>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes `handler` to `channel` for every future dispatch.
    pub fn on(&self, channel: &str, handler: HookHandler) {
        self.insert(channel, handler, false);
    }

    /// Subscribes `handler` to `channel` for the next dispatch only.
    pub fn once(&self, channel: &str, handler: HookHandler) {
        self.insert(channel, handler, true);
    }

    fn insert(&self, channel: &str, handler: HookHandler, once: bool) {
        let mut channels = self.channels.lock().unwrap();
        channels
            .entry(channel.to_string())
            .or_default()
            .push(Entry { handler, once });
    }

    /// Removes every registration of the given handler reference on
    /// `channel`. Handlers are compared by `Arc` identity, not by shape.
    pub fn off(&self, channel: &str, handler: &HookHandler) {
        let mut channels = self.channels.lock().unwrap();
        if let Some(entries) = channels.get_mut(channel) {
            entries.retain(|entry| !Arc::ptr_eq(&entry.handler, handler));
            if entries.is_empty() {
                channels.remove(channel);
            }
        }
    }

    /// Invokes every handler registered under the exact `channel` name, in
    /// registration order. One-shot entries are unregistered first; a panic
    /// in one callback is logged and does not stop the rest.
    pub fn dispatch(&self, channel: &str, payload: &Value) {
        let to_run: Vec<HookHandler> = {
            let mut channels = self.channels.lock().unwrap();
            let Some(entries) = channels.get_mut(channel) else {
                return;
            };
            let handlers = entries.iter().map(|e| Arc::clone(&e.handler)).collect();
            entries.retain(|e| !e.once);
            if entries.is_empty() {
                channels.remove(channel);
            }
            handlers
        };

        for handler in to_run {
            let payload = payload.clone();
            if catch_unwind(AssertUnwindSafe(|| handler(payload))).is_err() {
                tracing::error!(channel, "hook callback panicked");
            }
        }
    }

    /// Number of handlers currently registered under `channel`.
    pub fn handler_count(&self, channel: &str) -> usize {
        self.channels
            .lock()
            .unwrap()
            .get(channel)
            .map_or(0, |entries| entries.len())
    }
}
