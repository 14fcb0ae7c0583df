use parking_lot::Mutex;
use std::sync::Arc;
use tracing::warn;

/// Notification attached to a successful invocation, e.g. `voteCasted`
/// carrying the club name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerEvent {
    pub name: String,
    pub payload: Vec<u8>,
}

impl LedgerEvent {
    pub fn new(name: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            payload: payload.into(),
        }
    }
}

pub trait EventHook: Send + Sync {
    fn on_event(&self, event: &LedgerEvent);
}

/// Fan-out to registered hooks. Delivery is best effort: a panicking hook is
/// logged and skipped, and never fails the invocation that emitted.
#[derive(Default, Clone)]
pub struct EventBus {
    hooks: Arc<Mutex<Vec<Arc<dyn EventHook>>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_hook(&self, hook: Arc<dyn EventHook>) {
        self.hooks.lock().push(hook);
    }

    pub fn remove_hook(&self, hook: &Arc<dyn EventHook>) {
        let mut hooks = self.hooks.lock();
        hooks.retain(|existing| !Arc::ptr_eq(existing, hook));
    }

    pub fn hook_count(&self) -> usize {
        self.hooks.lock().len()
    }

    pub fn emit(&self, event: LedgerEvent) {
        let hooks = self.hooks.lock().clone();
        for hook in &hooks {
            if std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| hook.on_event(&event)))
                .is_err()
            {
                warn!(event = %event.name, "event hook panicked while handling event");
            }
        }
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("hooks", &self.hook_count())
            .finish()
    }
}
