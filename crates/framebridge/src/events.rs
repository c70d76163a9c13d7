//! Event handler registry for emissions arriving from the responder.
//!
//! One handler per event name; registering again replaces the previous one.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use serde_json::Value;

pub type Handler = Arc<dyn Fn(Value) + Send + Sync>;

#[derive(Default)]
pub struct EventRegistry {
    handlers: DashMap<String, Handler>,
    closed: AtomicBool,
}

impl EventRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&self, name: impl Into<String>, handler: F)
    where
        F: Fn(Value) + Send + Sync + 'static,
    {
        self.handlers.insert(name.into(), Arc::new(handler));
    }

    /// Run the handler for `name`. False if none is registered or the
    /// registry has been closed.
    pub fn dispatch(&self, name: &str, data: Value) -> bool {
        if self.closed.load(Ordering::SeqCst) {
            return false;
        }
        // Clone out so a handler may register further handlers.
        let handler = match self.handlers.get(name) {
            Some(h) => h.value().clone(),
            None => return false,
        };
        handler(data);
        true
    }

    /// Drop every handler and refuse further dispatch.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.handlers.clear();
    }
}
