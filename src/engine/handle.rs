//! Host-facing engine handle.

use crate::engine::config::EngineConfig;
use crate::engine::dispatch::ReverseCalls;
use crate::engine::error::{Error, Result};
use crate::engine::initialize_platform_once;
use crate::engine::listeners::{CallListener, ListenerRegistry};
use crate::engine::ops;
use crate::engine::pending::{Completion, PendingOps};
use crate::engine::runner::{spawn_engine_thread, EngineCommand};
use crate::engine::state::EngineState;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, Weak};
use tokio::sync::mpsc;

/// One embedded JavaScript engine instance.
///
/// The engine walks a strict linear lifecycle (see [`EngineState`]); all
/// runtime-touching calls are asynchronous and non-blocking at the call site,
/// returning a [`Completion`] that resolves once the runtime thread posts the
/// outcome. `Engine` is a cheap handle: clones share the same instance.
///
/// Dropping the last handle without calling [`stop`](Engine::stop) tears the
/// runtime thread down and cancels any outstanding operations.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

pub(crate) struct EngineInner {
    config: EngineConfig,
    state: Mutex<EngineState>,
    tx: Mutex<Option<mpsc::UnboundedSender<EngineCommand>>>,
    pending: Arc<PendingOps>,
    listeners: Arc<ListenerRegistry>,
    reverse: Arc<ReverseCalls>,
    /// Script files defined before `start`, forwarded at bootstrap.
    scripts: Mutex<Vec<(String, String)>>,
}

impl EngineInner {
    pub(crate) fn set_state(&self, next: EngineState) {
        let mut state = self.state.lock().unwrap();
        log::trace!("engine state {} -> {}", *state, next);
        *state = next;
    }

    fn send(&self, command: EngineCommand) -> Result<()> {
        let tx = self.tx.lock().unwrap();
        match tx.as_ref() {
            Some(tx) => tx
                .send(command)
                .map_err(|_| Error::Protocol("engine thread is no longer running".to_string())),
            None => Err(Error::Protocol(
                "engine thread was never started".to_string(),
            )),
        }
    }
}

impl Engine {
    /// Name of the reserved main script loaded at start.
    pub const MAIN_SCRIPT_NAME: &'static str = ops::MAIN_SCRIPT_NAME;

    /// Create an engine in the `Uninitialized` state.
    pub fn new(config: EngineConfig) -> Self {
        let pending = Arc::new(PendingOps::new());
        let listeners = Arc::new(ListenerRegistry::new());
        let inner = Arc::new_cyclic(|weak: &Weak<EngineInner>| {
            let reverse = Arc::new(ReverseCalls::new(weak.clone(), listeners.clone()));
            EngineInner {
                config,
                state: Mutex::new(EngineState::Uninitialized),
                tx: Mutex::new(None),
                pending,
                listeners,
                reverse,
                scripts: Mutex::new(Vec::new()),
            }
        });
        Self { inner }
    }

    pub(crate) fn from_inner(inner: Arc<EngineInner>) -> Self {
        Self { inner }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> EngineState {
        *self.inner.state.lock().unwrap()
    }

    /// Allocate the underlying runtime: the one-time V8 platform setup, the
    /// dedicated runtime thread and the isolate.
    ///
    /// Permitted only in `Uninitialized`. A failure leaves the engine in the
    /// terminal `Stopped` state.
    pub fn initialize(&self) -> Result<()> {
        log::trace!("Engine::initialize()");

        let mut state = self.inner.state.lock().unwrap();
        if *state != EngineState::Uninitialized {
            return Err(Error::invalid_state("initialize", *state));
        }
        self.inner.config.validate()?;

        initialize_platform_once();
        match spawn_engine_thread(
            self.inner.config.clone(),
            Arc::downgrade(&self.inner),
            self.inner.pending.clone(),
            self.inner.reverse.clone(),
        ) {
            Ok(tx) => {
                *self.inner.tx.lock().unwrap() = Some(tx);
                *state = EngineState::Initialized;
                Ok(())
            }
            Err(err) => {
                *state = EngineState::Stopped;
                Err(err)
            }
        }
    }

    /// Register a named script file with the runtime.
    ///
    /// Permitted from `Initialized` onward: definitions made before `start`
    /// are buffered and forwarded at bootstrap. The main script name is
    /// reserved.
    pub fn define_script_file(&self, name: &str, code: &str) -> Result<()> {
        log::trace!("Engine::define_script_file(\"{}\", ...)", name);

        if name == Self::MAIN_SCRIPT_NAME {
            return Err(Error::InvalidScriptName(name.to_string()));
        }

        let state = self.inner.state.lock().unwrap();
        match *state {
            EngineState::Initialized => {
                self.inner
                    .scripts
                    .lock()
                    .unwrap()
                    .push((name.to_string(), code.to_string()));
                Ok(())
            }
            EngineState::Starting | EngineState::Started => self.inner.send(
                EngineCommand::DefineScript {
                    name: name.to_string(),
                    code: code.to_string(),
                },
            ),
            other => Err(Error::invalid_state("define_script_file", other)),
        }
    }

    /// Bootstrap the runtime's execution context.
    ///
    /// Returns immediately; the completion resolves once scripts are loaded
    /// and the event loop is running, or fails with [`Error::Startup`]. A
    /// failed start leaves the engine in the terminal `Stopped` state.
    pub fn start(&self, working_directory: impl Into<PathBuf>) -> Result<Completion<()>> {
        let working_directory = working_directory.into();
        log::trace!("Engine::start({})", working_directory.display());

        let mut state = self.inner.state.lock().unwrap();
        if *state != EngineState::Initialized {
            return Err(Error::invalid_state("start", *state));
        }

        let scripts = std::mem::take(&mut *self.inner.scripts.lock().unwrap());
        let (handle, completion) = self.inner.pending.issue_void();
        if let Err(err) = self.inner.send(EngineCommand::Start {
            working_directory,
            scripts,
            handle,
        }) {
            self.inner.pending.discard(handle);
            *state = EngineState::Stopped;
            return Err(err);
        }
        *state = EngineState::Starting;
        Ok(completion)
    }

    /// Evaluate script code and return its result as JSON text.
    ///
    /// Permitted only in `Started`. Script failures (including timeouts)
    /// surface through the completion as [`Error::Script`].
    pub fn call_script(&self, code: &str) -> Result<Completion<String>> {
        log::trace!("Engine::call_script(...)");

        let state = self.inner.state.lock().unwrap();
        if *state != EngineState::Started {
            return Err(Error::invalid_state("call_script", *state));
        }

        let (handle, completion) = self.inner.pending.issue_text();
        if let Err(err) = self.inner.send(EngineCommand::CallScript {
            code: code.to_string(),
            handle,
        }) {
            self.inner.pending.discard(handle);
            return Err(err);
        }
        Ok(completion)
    }

    /// Expose a global function of the given name to script; calls to it are
    /// delivered to the registered listeners.
    ///
    /// Permitted only in `Started`. Registering a name twice is a no-op.
    pub fn register_reverse_call(&self, name: &str) -> Result<()> {
        log::trace!("Engine::register_reverse_call(\"{}\")", name);

        let state = self.inner.state.lock().unwrap();
        if *state != EngineState::Started {
            return Err(Error::invalid_state("register_reverse_call", *state));
        }

        if !self.inner.reverse.register(name) {
            return Ok(());
        }
        self.inner.send(EngineCommand::RegisterReverseCall {
            name: name.to_string(),
        })
    }

    /// Add a reverse-call listener. Adding the same listener twice has no
    /// additional effect. Permitted in any state.
    pub fn add_listener(&self, listener: Arc<dyn CallListener>) {
        self.inner.listeners.add(listener);
    }

    /// Remove a reverse-call listener. Removing an absent listener is a
    /// no-op. Permitted in any state.
    pub fn remove_listener(&self, listener: &Arc<dyn CallListener>) {
        self.inner.listeners.remove(listener);
    }

    /// Tear the runtime down.
    ///
    /// Returns immediately; the completion resolves once teardown finishes.
    /// Any operation still pending at that point is force-resolved with
    /// [`Error::Cancelled`]. The engine cannot be restarted.
    pub fn stop(&self) -> Result<Completion<()>> {
        log::trace!("Engine::stop()");

        let mut state = self.inner.state.lock().unwrap();
        if *state != EngineState::Started {
            return Err(Error::invalid_state("stop", *state));
        }

        let (handle, completion) = self.inner.pending.issue_void();
        if let Err(err) = self.inner.send(EngineCommand::Stop { handle }) {
            self.inner.pending.discard(handle);
            *state = EngineState::Stopped;
            return Err(err);
        }
        *state = EngineState::Stopping;
        Ok(completion)
    }
}
