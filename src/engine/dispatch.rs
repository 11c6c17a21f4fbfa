//! Reverse-call dispatcher: script-to-host fan-out.

use crate::engine::error::Error;
use crate::engine::handle::EngineInner;
use crate::engine::listeners::{ListenerRegistry, ScriptCallEvent};
use std::collections::HashSet;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, Weak};

/// Registered reverse-call names plus the fan-out path.
///
/// `dispatch` runs on the runtime's execution thread whenever script calls a
/// name previously passed to `register_reverse_call`. It is fire-and-forget
/// from script's perspective: no value flows back, and no host-side failure
/// is allowed to propagate into the runtime.
pub(crate) struct ReverseCalls {
    engine: Weak<EngineInner>,
    names: Mutex<HashSet<String>>,
    listeners: Arc<ListenerRegistry>,
}

impl ReverseCalls {
    pub(crate) fn new(engine: Weak<EngineInner>, listeners: Arc<ListenerRegistry>) -> Self {
        Self {
            engine,
            names: Mutex::new(HashSet::new()),
            listeners,
        }
    }

    /// Record a name as registered. Returns `false` if it already was.
    pub(crate) fn register(&self, name: &str) -> bool {
        self.names.lock().unwrap().insert(name.to_string())
    }

    /// Deliver one script-to-host call to every registered listener.
    pub(crate) fn dispatch(&self, function_name: &str, args_json: String) {
        log::trace!("dispatch(\"{}\", ...)", function_name);

        if !self.names.lock().unwrap().contains(function_name) {
            // Script invoked a name the bridge never installed; no listener
            // gets to see it.
            log::warn!(
                "{}",
                Error::Protocol(format!(
                    "script invoked unregistered function `{}`",
                    function_name
                ))
            );
            return;
        }

        let event = ScriptCallEvent::new(
            self.engine.clone(),
            function_name.to_string(),
            args_json,
        );

        for listener in self.listeners.snapshot() {
            let outcome = catch_unwind(AssertUnwindSafe(|| listener.function_called(&event)));
            if outcome.is_err() {
                log::error!(
                    "{}",
                    Error::Listener {
                        function_name: function_name.to_string(),
                    }
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::listeners::CallListener;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Recorder {
        log: Arc<Mutex<Vec<String>>>,
        tag: &'static str,
    }

    impl CallListener for Recorder {
        fn function_called(&self, event: &ScriptCallEvent) {
            self.log.lock().unwrap().push(format!(
                "{}:{}:{}",
                self.tag,
                event.function_name(),
                event.args_json()
            ));
        }
    }

    struct Panicker;

    impl CallListener for Panicker {
        fn function_called(&self, _event: &ScriptCallEvent) {
            panic!("listener defect");
        }
    }

    fn reverse_calls() -> (Arc<ReverseCalls>, Arc<ListenerRegistry>) {
        let listeners = Arc::new(ListenerRegistry::new());
        let reverse = Arc::new(ReverseCalls::new(Weak::new(), listeners.clone()));
        (reverse, listeners)
    }

    #[test]
    fn test_unregistered_name_invokes_zero_listeners() {
        let (reverse, listeners) = reverse_calls();
        let log = Arc::new(Mutex::new(Vec::new()));
        listeners.add(Arc::new(Recorder {
            log: log.clone(),
            tag: "l1",
        }));

        reverse.dispatch("unknown", "[]".to_string());

        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn test_fanout_delivers_in_registration_order() {
        let (reverse, listeners) = reverse_calls();
        let log = Arc::new(Mutex::new(Vec::new()));
        listeners.add(Arc::new(Recorder {
            log: log.clone(),
            tag: "l1",
        }));
        listeners.add(Arc::new(Recorder {
            log: log.clone(),
            tag: "l2",
        }));

        assert!(reverse.register("onUpdate"));
        reverse.dispatch("onUpdate", "[42]".to_string());

        let entries = log.lock().unwrap();
        assert_eq!(
            *entries,
            vec![
                "l1:onUpdate:[42]".to_string(),
                "l2:onUpdate:[42]".to_string()
            ]
        );
    }

    #[test]
    fn test_panicking_listener_does_not_block_later_listeners() {
        let (reverse, listeners) = reverse_calls();
        let log = Arc::new(Mutex::new(Vec::new()));
        listeners.add(Arc::new(Recorder {
            log: log.clone(),
            tag: "first",
        }));
        listeners.add(Arc::new(Panicker));
        listeners.add(Arc::new(Recorder {
            log: log.clone(),
            tag: "third",
        }));

        reverse.register("onUpdate");
        reverse.dispatch("onUpdate", "[1]".to_string());

        let entries = log.lock().unwrap();
        assert_eq!(
            *entries,
            vec![
                "first:onUpdate:[1]".to_string(),
                "third:onUpdate:[1]".to_string()
            ]
        );
    }

    /// A listener that registers another listener while a fan-out is running.
    struct AddDuringDispatch {
        listeners: Arc<ListenerRegistry>,
        late: Arc<Mutex<Vec<String>>>,
        hits: AtomicUsize,
    }

    impl CallListener for AddDuringDispatch {
        fn function_called(&self, _event: &ScriptCallEvent) {
            if self.hits.fetch_add(1, Ordering::SeqCst) == 0 {
                self.listeners.add(Arc::new(Recorder {
                    log: self.late.clone(),
                    tag: "late",
                }));
            }
        }
    }

    #[test]
    fn test_listener_added_during_dispatch_misses_current_event() {
        let (reverse, listeners) = reverse_calls();
        let late = Arc::new(Mutex::new(Vec::new()));
        listeners.add(Arc::new(AddDuringDispatch {
            listeners: listeners.clone(),
            late: late.clone(),
            hits: AtomicUsize::new(0),
        }));

        reverse.register("onUpdate");
        reverse.dispatch("onUpdate", "[1]".to_string());
        assert!(late.lock().unwrap().is_empty());

        // The late listener was registered, so the next dispatch reaches it.
        reverse.dispatch("onUpdate", "[2]".to_string());
        assert_eq!(*late.lock().unwrap(), vec!["late:onUpdate:[2]".to_string()]);
    }

    #[test]
    fn test_register_is_idempotent() {
        let (reverse, _listeners) = reverse_calls();
        assert!(reverse.register("onUpdate"));
        assert!(!reverse.register("onUpdate"));
    }
}
