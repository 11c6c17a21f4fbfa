//! Embedded JavaScript engine with an asynchronous bidirectional call bridge.
//!
//! Each [`Engine`] owns a single V8 isolate (via `deno_core`) running on a
//! dedicated OS thread with a single-threaded Tokio event loop. Host threads
//! issue asynchronous requests that resolve through [`Completion`] futures;
//! script-to-host calls fan out to registered [`CallListener`]s.

pub mod config;
mod dispatch;
pub mod error;
pub mod handle;
pub mod listeners;
mod loader;
mod ops;
pub mod pending;
mod runner;
pub mod state;

use once_cell::sync::OnceCell;

/// Tracks the one-time V8 platform initialization.
///
/// V8 requires exactly one platform to be initialized per process before any
/// isolate is created. This is a singleton initialized on first access.
static V8_PLATFORM: OnceCell<()> = OnceCell::new();

/// Initialize the V8 platform exactly once.
///
/// Safe to call multiple times; subsequent calls are no-ops. Invoked by
/// `Engine::initialize` before the first isolate is constructed.
pub fn initialize_platform_once() {
    V8_PLATFORM.get_or_init(|| {
        deno_core::JsRuntime::init_platform(None, false);
    });
}

/// Check if the V8 platform has been initialized.
pub fn is_platform_initialized() -> bool {
    V8_PLATFORM.get().is_some()
}

// Re-export key types for convenience
pub use config::EngineConfig;
pub use error::{Error, Result};
pub use handle::Engine;
pub use listeners::{CallListener, ScriptCallEvent};
pub use pending::Completion;
pub use state::EngineState;
