//! Engine configuration.
//!
//! This module defines the configuration structure for embedded engines,
//! including heap limits, execution timeouts and bootstrap options.

use crate::engine::error::{Error, Result};
use std::time::Duration;

/// Configuration for a single [`Engine`](crate::Engine) instance.
///
/// All fields are optional; the defaults give an unbounded heap, no execution
/// timeout and no bootstrap script.
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    /// Maximum V8 heap size in bytes.
    pub max_heap_size: Option<usize>,
    /// Initial V8 heap size in bytes. Requires `max_heap_size`.
    pub initial_heap_size: Option<usize>,
    /// Upper bound on a single `call_script` evaluation, including any
    /// promise resolution it triggers on the runtime's event loop.
    pub execution_timeout: Option<Duration>,
    /// Script executed once when the isolate is created, before `start`.
    pub bootstrap_script: Option<String>,
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum heap size in bytes.
    pub fn with_max_heap_size(mut self, bytes: usize) -> Self {
        self.max_heap_size = Some(bytes);
        self
    }

    /// Set the initial heap size in bytes.
    pub fn with_initial_heap_size(mut self, bytes: usize) -> Self {
        self.initial_heap_size = Some(bytes);
        self
    }

    /// Bound every script evaluation by the given timeout.
    pub fn with_execution_timeout(mut self, timeout: Duration) -> Self {
        self.execution_timeout = Some(timeout);
        self
    }

    /// Execute the given script once, when the isolate is created.
    pub fn with_bootstrap(mut self, script: impl Into<String>) -> Self {
        self.bootstrap_script = Some(script.into());
        self
    }

    /// Validate internal consistency. Called by `Engine::initialize`.
    pub(crate) fn validate(&self) -> Result<()> {
        if self.initial_heap_size.is_some() && self.max_heap_size.is_none() {
            return Err(Error::InvalidConfig(
                "initial_heap_size requires max_heap_size to be set as well".to_string(),
            ));
        }
        if let (Some(initial), Some(max)) = (self.initial_heap_size, self.max_heap_size) {
            if initial > max {
                return Err(Error::InvalidConfig(format!(
                    "initial_heap_size ({}) cannot exceed max_heap_size ({})",
                    initial, max
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn test_builder_sets_fields() {
        let config = EngineConfig::new()
            .with_max_heap_size(10 * 1024 * 1024)
            .with_initial_heap_size(1024 * 1024)
            .with_execution_timeout(Duration::from_secs(5))
            .with_bootstrap("globalThis.VERSION = '1.0.0';");

        assert_eq!(config.max_heap_size, Some(10 * 1024 * 1024));
        assert_eq!(config.initial_heap_size, Some(1024 * 1024));
        assert_eq!(config.execution_timeout, Some(Duration::from_secs(5)));
        assert!(config.bootstrap_script.is_some());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_initial_heap_requires_max_heap() {
        let config = EngineConfig::new().with_initial_heap_size(1024);
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_initial_heap_cannot_exceed_max_heap() {
        let config = EngineConfig::new()
            .with_max_heap_size(1024)
            .with_initial_heap_size(2048);
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
    }
}
