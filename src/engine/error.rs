//! Error types for the engine bridge.

use crate::engine::state::EngineState;

/// Convenience alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors surfaced by the bridge, one variant per failure class.
///
/// Failures that originate inside the runtime's own execution (script errors,
/// startup failures) are delivered through the pending operation that issued
/// them, never as panics. Defects in the collaborator (duplicate completions,
/// unregistered reverse calls) are logged as [`Error::Protocol`] and contained.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The operation is not permitted in the engine's current lifecycle state.
    /// Fatal to the call, not to the engine.
    #[error("`{operation}` is not permitted while the engine is {state}")]
    InvalidState {
        operation: &'static str,
        state: EngineState,
    },

    /// The underlying runtime could not be allocated. The engine is unusable
    /// and must be discarded.
    #[error("failed to initialize the runtime: {0}")]
    Initialization(String),

    /// The runtime failed to bootstrap. Surfaced through the `start`
    /// completion; the engine is unusable and must be discarded.
    #[error("failed to start the runtime: {0}")]
    Startup(String),

    /// Script evaluation failed or timed out. Surfaced through the
    /// operation's completion.
    #[error("script evaluation failed: {0}")]
    Script(String),

    /// A defect in the runtime collaborator: an unregistered reverse-call
    /// name, or a completion for an unknown or already-resolved handle.
    /// Logged and dropped, never delivered to a waiter.
    #[error("bridge protocol violation: {0}")]
    Protocol(String),

    /// A listener panicked during fan-out. Caught and logged per listener;
    /// never aborts delivery to the remaining listeners.
    #[error("listener panicked while handling `{function_name}`")]
    Listener { function_name: String },

    /// The pending operation was force-resolved by engine shutdown.
    #[error("operation cancelled by engine shutdown")]
    Cancelled,

    /// A reserved or otherwise unusable script file name.
    #[error("invalid script file name `{0}`")]
    InvalidScriptName(String),

    /// The engine configuration is inconsistent.
    #[error("invalid engine configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    pub(crate) fn invalid_state(operation: &'static str, state: EngineState) -> Self {
        Error::InvalidState { operation, state }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_state_message_names_operation_and_state() {
        let err = Error::invalid_state("call_script", EngineState::Stopped);
        let message = err.to_string();
        assert!(message.contains("call_script"));
        assert!(message.contains("stopped"));
    }
}
