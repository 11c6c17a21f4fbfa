//! Listener registry and reverse-call events.

use crate::engine::handle::{Engine, EngineInner};
use std::sync::{Arc, Mutex, Weak};

/// Observer for calls originating in script.
///
/// Implementations are invoked on the runtime's execution thread while it is
/// blocked on the fan-out, so they must not perform long-running or blocking
/// work.
pub trait CallListener: Send + Sync {
    /// Handle one script-to-host invocation.
    fn function_called(&self, event: &ScriptCallEvent);
}

/// Event raised when a registered function is called by script.
///
/// Immutable once constructed; consumed synchronously by dispatch.
pub struct ScriptCallEvent {
    engine: Weak<EngineInner>,
    function_name: String,
    args_json: String,
}

impl ScriptCallEvent {
    pub(crate) fn new(engine: Weak<EngineInner>, function_name: String, args_json: String) -> Self {
        Self {
            engine,
            function_name,
            args_json,
        }
    }

    /// The engine the call originated from, if it is still alive.
    ///
    /// The event holds only a back-reference: an engine that has already been
    /// dropped yields `None` rather than keeping the instance alive.
    pub fn engine(&self) -> Option<Engine> {
        self.engine.upgrade().map(Engine::from_inner)
    }

    /// Name of the function that was called by script.
    pub fn function_name(&self) -> &str {
        &self.function_name
    }

    /// JSON-serialized array of the arguments passed by script.
    pub fn args_json(&self) -> &str {
        &self.args_json
    }
}

/// Thread-safe set of listeners, preserving registration order.
///
/// Set semantics are by `Arc` identity: adding the same listener twice has no
/// additional effect and removing an absent listener is a no-op. Dispatch
/// works against [`snapshot`](Self::snapshot), so concurrent add/remove during
/// a fan-out can never skip or duplicate a delivery relative to the snapshot.
pub(crate) struct ListenerRegistry {
    listeners: Mutex<Vec<Arc<dyn CallListener>>>,
}

impl ListenerRegistry {
    pub(crate) fn new() -> Self {
        Self {
            listeners: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn add(&self, listener: Arc<dyn CallListener>) {
        let mut listeners = self.listeners.lock().unwrap();
        if !listeners.iter().any(|known| Arc::ptr_eq(known, &listener)) {
            listeners.push(listener);
        }
    }

    pub(crate) fn remove(&self, listener: &Arc<dyn CallListener>) {
        self.listeners
            .lock()
            .unwrap()
            .retain(|known| !Arc::ptr_eq(known, listener));
    }

    /// Stable copy of the current listeners, in registration order.
    pub(crate) fn snapshot(&self) -> Vec<Arc<dyn CallListener>> {
        self.listeners.lock().unwrap().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Recorder;

    impl CallListener for Recorder {
        fn function_called(&self, _event: &ScriptCallEvent) {}
    }

    #[test]
    fn test_add_is_idempotent_per_listener() {
        let registry = ListenerRegistry::new();
        let listener: Arc<dyn CallListener> = Arc::new(Recorder);

        registry.add(listener.clone());
        registry.add(listener.clone());

        assert_eq!(registry.snapshot().len(), 1);
    }

    #[test]
    fn test_remove_absent_listener_is_noop() {
        let registry = ListenerRegistry::new();
        let present: Arc<dyn CallListener> = Arc::new(Recorder);
        let absent: Arc<dyn CallListener> = Arc::new(Recorder);

        registry.add(present);
        registry.remove(&absent);

        assert_eq!(registry.snapshot().len(), 1);
    }

    #[test]
    fn test_snapshot_preserves_registration_order() {
        let registry = ListenerRegistry::new();
        let first: Arc<dyn CallListener> = Arc::new(Recorder);
        let second: Arc<dyn CallListener> = Arc::new(Recorder);
        let third: Arc<dyn CallListener> = Arc::new(Recorder);

        registry.add(first.clone());
        registry.add(second.clone());
        registry.add(third.clone());
        registry.remove(&second);

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert!(Arc::ptr_eq(&snapshot[0], &first));
        assert!(Arc::ptr_eq(&snapshot[1], &third));
    }

    #[test]
    fn test_event_accessors() {
        let event = ScriptCallEvent::new(
            Weak::new(),
            "onUpdate".to_string(),
            "[42]".to_string(),
        );

        assert_eq!(event.function_name(), "onUpdate");
        assert_eq!(event.args_json(), "[42]");
        assert!(event.engine().is_none());
    }
}
