//! `jshost` embeds a JavaScript runtime inside a host application and exposes
//! an asynchronous bidirectional call bridge.
//!
//! The host drives the engine through a strict linear lifecycle and invokes
//! script without blocking: every runtime-touching call returns a
//! [`Completion`] future that resolves once the runtime's own thread posts
//! the outcome. In the other direction, script calls host-registered function
//! names and the host observes them through [`CallListener`] fan-out.
//!
//! ```no_run
//! use jshost::{Engine, EngineConfig};
//!
//! # async fn example() -> jshost::Result<()> {
//! let engine = Engine::new(EngineConfig::default());
//! engine.initialize()?;
//! engine.start("/tmp")?.await?;
//!
//! let result = engine.call_script("6 * 7")?.await?;
//! assert_eq!(result, "42");
//!
//! engine.stop()?.await?;
//! # Ok(())
//! # }
//! ```

mod engine;

pub use engine::{
    initialize_platform_once, is_platform_initialized, CallListener, Completion, Engine,
    EngineConfig, EngineState, Error, Result, ScriptCallEvent,
};
