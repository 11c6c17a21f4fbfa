//! Engine lifecycle states.

use std::fmt;

/// Lifecycle state of an [`Engine`](crate::Engine).
///
/// The machine is strictly linear:
///
/// ```text
/// Uninitialized -> Initialized -> Starting -> Started -> Stopping -> Stopped
///                                     |
///                                     +-- (startup failure) --------> Stopped
/// ```
///
/// `Starting` and `Stopping` are the transitional states observed while an
/// asynchronous `start`/`stop` is in flight; the engine reaches `Started` or
/// `Stopped` only once the runtime thread confirms the transition. There is
/// no re-entry: a stopped engine is permanently unusable.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EngineState {
    /// Constructed, but the runtime resource has not been allocated.
    Uninitialized,
    /// The runtime thread and isolate exist; the engine has not bootstrapped.
    Initialized,
    /// A `start` is in flight.
    Starting,
    /// The runtime is bootstrapped and accepting calls.
    Started,
    /// A `stop` is in flight.
    Stopping,
    /// Terminal. The instance must be discarded.
    Stopped,
}

impl EngineState {
    /// Whether the engine can never again accept an operation.
    pub fn is_terminal(&self) -> bool {
        matches!(self, EngineState::Stopped)
    }
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EngineState::Uninitialized => "uninitialized",
            EngineState::Initialized => "initialized",
            EngineState::Starting => "starting",
            EngineState::Started => "started",
            EngineState::Stopping => "stopping",
            EngineState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}
