//! Runtime thread backed by `deno_core::JsRuntime`.
//!
//! This module hosts the JavaScript engine on a dedicated OS thread with a
//! single-threaded Tokio runtime. Commands from the host are forwarded through
//! [`EngineCommand`] and executed sequentially on that thread; completions are
//! posted back through the shared pending-operation registry, never through
//! pointers crossing the boundary.

use crate::engine::config::EngineConfig;
use crate::engine::dispatch::ReverseCalls;
use crate::engine::error::Error;
use crate::engine::handle::EngineInner;
use crate::engine::loader::ScriptFileLoader;
use crate::engine::ops::{bridge_extension, reverse_call_wrapper, MAIN_SCRIPT_CODE, MAIN_SCRIPT_NAME};
use crate::engine::pending::{OpHandle, OpValue, PendingOps};
use crate::engine::state::EngineState;
use deno_core::{v8, JsRuntime, PollEventLoopOptions, RuntimeOptions};
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::mpsc;

type InitSignalChannel = (
    std::sync::mpsc::Sender<Result<(), String>>,
    std::sync::mpsc::Receiver<Result<(), String>>,
);

/// Commands sent to the runtime thread.
pub(crate) enum EngineCommand {
    Start {
        working_directory: PathBuf,
        scripts: Vec<(String, String)>,
        handle: OpHandle,
    },
    CallScript {
        code: String,
        handle: OpHandle,
    },
    DefineScript {
        name: String,
        code: String,
    },
    RegisterReverseCall {
        name: String,
    },
    Stop {
        handle: OpHandle,
    },
}

/// Spawn the dedicated runtime thread and wait for the isolate to exist.
///
/// Blocks the caller only for isolate construction; everything after that is
/// asynchronous through the command channel.
pub(crate) fn spawn_engine_thread(
    config: EngineConfig,
    engine: Weak<EngineInner>,
    pending: Arc<PendingOps>,
    reverse: Arc<ReverseCalls>,
) -> Result<mpsc::UnboundedSender<EngineCommand>, Error> {
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<EngineCommand>();
    let (init_tx, init_rx): InitSignalChannel = std::sync::mpsc::channel();

    std::thread::Builder::new()
        .name("jshost-engine".to_string())
        .spawn(move || {
            let tokio_rt = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(rt) => rt,
                Err(err) => {
                    let _ = init_tx.send(Err(format!("failed to build tokio runtime: {}", err)));
                    return;
                }
            };

            let mut core = match EngineCore::new(config, reverse) {
                Ok(core) => {
                    let _ = init_tx.send(Ok(()));
                    core
                }
                Err(err) => {
                    let _ = init_tx.send(Err(err));
                    return;
                }
            };

            tokio_rt.block_on(async move {
                core.run(cmd_rx, engine, pending).await;
            });
        })
        .map_err(|e| Error::Initialization(format!("failed to spawn engine thread: {}", e)))?;

    match init_rx.recv() {
        Ok(Ok(())) => Ok(cmd_tx),
        Ok(Err(err)) => Err(Error::Initialization(err)),
        Err(_) => Err(Error::Initialization(
            "engine thread exited during initialization".to_string(),
        )),
    }
}

struct EngineCore {
    js_runtime: JsRuntime,
    loader: Rc<ScriptFileLoader>,
    execution_timeout: Option<Duration>,
}

impl EngineCore {
    fn new(config: EngineConfig, reverse: Arc<ReverseCalls>) -> Result<Self, String> {
        let EngineConfig {
            max_heap_size,
            initial_heap_size,
            execution_timeout,
            bootstrap_script,
        } = config;

        let create_params = max_heap_size.map(|max| {
            v8::CreateParams::default().heap_limits(initial_heap_size.unwrap_or(0), max)
        });

        let loader = Rc::new(ScriptFileLoader::new());
        let mut js_runtime = JsRuntime::new(RuntimeOptions {
            extensions: vec![bridge_extension(reverse)],
            create_params,
            module_loader: Some(loader.clone()),
            ..Default::default()
        });

        if let Some(script) = bootstrap_script {
            js_runtime
                .execute_script("<bootstrap>", script)
                .map_err(|err| err.to_string())?;
        }

        Ok(Self {
            js_runtime,
            loader,
            execution_timeout,
        })
    }

    async fn run(
        &mut self,
        mut rx: mpsc::UnboundedReceiver<EngineCommand>,
        engine: Weak<EngineInner>,
        pending: Arc<PendingOps>,
    ) {
        while let Some(cmd) = rx.recv().await {
            match cmd {
                EngineCommand::Start {
                    working_directory,
                    scripts,
                    handle,
                } => match self.bootstrap(&working_directory, scripts) {
                    Ok(()) => {
                        set_state(&engine, EngineState::Started);
                        pending.resolve(handle, OpValue::Void);
                        log::debug!("engine started in {}", working_directory.display());
                    }
                    Err(err) => {
                        log::error!("failed to start engine: {}", err);
                        set_state(&engine, EngineState::Stopped);
                        pending.reject(handle, Error::Startup(err));
                        break;
                    }
                },
                EngineCommand::CallScript { code, handle } => match self.eval(code).await {
                    Ok(result_json) => pending.resolve(handle, OpValue::Text(result_json)),
                    Err(err) => pending.reject(handle, Error::Script(err)),
                },
                EngineCommand::DefineScript { name, code } => {
                    self.loader.define(name, code);
                }
                EngineCommand::RegisterReverseCall { name } => {
                    if let Err(err) = self.install_reverse_call(&name) {
                        log::error!("failed to register reverse call `{}`: {}", name, err);
                    }
                }
                EngineCommand::Stop { handle } => {
                    set_state(&engine, EngineState::Stopped);
                    pending.resolve(handle, OpValue::Void);
                    log::debug!("engine stopped");
                    break;
                }
            }
        }

        // Stopped, failed to start, or every sender is gone. Whatever is still
        // outstanding can never resolve; waiters observe cancellation instead.
        pending.cancel_all();
    }

    fn bootstrap(
        &mut self,
        working_directory: &Path,
        scripts: Vec<(String, String)>,
    ) -> Result<(), String> {
        if !working_directory.is_dir() {
            return Err(format!(
                "working directory `{}` is not a directory",
                working_directory.display()
            ));
        }
        self.loader
            .set_working_directory(working_directory.to_path_buf());

        self.js_runtime
            .execute_script(MAIN_SCRIPT_NAME, MAIN_SCRIPT_CODE)
            .map_err(|err| format!("failed to load {}: {}", MAIN_SCRIPT_NAME, err))?;

        for (name, source) in scripts {
            self.loader.define(name, source);
        }
        Ok(())
    }

    /// Evaluate script code, drive the event loop until any resulting promise
    /// settles, and return the result as JSON text.
    async fn eval(&mut self, code: String) -> Result<String, String> {
        let global_value = self
            .js_runtime
            .execute_script("<call_script>", code)
            .map_err(|err| err.to_string())?;

        let resolve_future = self.js_runtime.resolve(global_value);
        let poll_options = PollEventLoopOptions::default();

        let resolved = if let Some(timeout) = self.execution_timeout {
            tokio::time::timeout(
                timeout,
                self.js_runtime
                    .with_event_loop_promise(resolve_future, poll_options),
            )
            .await
            .map_err(|_| {
                format!(
                    "script evaluation timed out after {}ms",
                    timeout.as_millis()
                )
            })?
            .map_err(|err| err.to_string())?
        } else {
            self.js_runtime
                .with_event_loop_promise(resolve_future, poll_options)
                .await
                .map_err(|err| err.to_string())?
        };

        let scope = &mut self.js_runtime.handle_scope();
        let local = v8::Local::new(scope, resolved);

        // The wire format is JSON text produced inside the isolate.
        // `undefined` has no JSON encoding and normalizes to `null`.
        if local.is_undefined() {
            return Ok("null".to_string());
        }
        match v8::json::stringify(scope, local) {
            Some(text) => Ok(text.to_rust_string_lossy(scope)),
            None => Err("failed to serialize script result as JSON".to_string()),
        }
    }

    fn install_reverse_call(&mut self, name: &str) -> Result<(), String> {
        self.js_runtime
            .execute_script("<register_reverse_call>", reverse_call_wrapper(name))
            .map(|_| ())
            .map_err(|err| err.to_string())
    }
}

/// Record a lifecycle transition observed on the runtime thread.
///
/// The thread holds only a weak back-reference: if the host has already
/// dropped the engine, a late transition is ignored rather than touching
/// freed state.
fn set_state(engine: &Weak<EngineInner>, next: EngineState) {
    match engine.upgrade() {
        Some(inner) => inner.set_state(next),
        None => log::trace!("engine dropped before `{}` transition; ignoring", next),
    }
}
