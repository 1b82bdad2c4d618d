//! Configuration for load runs.
//!
//! This module controls how chain tasks are dispatched. A panicking callback
//! is always recorded as a failed step, whatever the dispatch mode.

use serde::{Deserialize, Serialize};

/// How chain tasks are driven during a load run.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Dispatch {
    /// All chains are polled by the `load` future itself and interleave at
    /// each awaited callback. Needs no runtime.
    #[default]
    Inline,
    /// Every chain is handed to `tokio::spawn` and may run in parallel on a
    /// multi-threaded runtime. Must be awaited inside a Tokio runtime.
    ///
    /// Dropping the `load` future aborts the chain tasks it spawned, so no
    /// chain keeps running detached once its results can no longer be read.
    Spawn,
}

/// Configuration for a [`Loader`](crate::Loader).
///
/// # Examples
///
/// ```ignore
/// use step_loader::{Dispatch, LoaderConfig};
///
/// let config = LoaderConfig::new()
///     .with_dispatch(Dispatch::Spawn);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoaderConfig {
    /// How chain tasks are driven.
    ///
    /// **Default:** [`Dispatch::Inline`]
    #[serde(default)]
    pub dispatch: Dispatch,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl LoaderConfig {
    /// Creates a new configuration with default values.
    ///
    /// Default values:
    /// - `dispatch`: `Dispatch::Inline`
    pub fn new() -> Self {
        Self {
            dispatch: Dispatch::Inline,
        }
    }

    /// Sets how chain tasks are dispatched.
    pub fn with_dispatch(mut self, dispatch: Dispatch) -> Self {
        self.dispatch = dispatch;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_default_config() {
        let config = LoaderConfig::default();
        assert_eq!(config.dispatch, Dispatch::Inline);
    }

    #[test]
    fn test_with_dispatch() {
        let config = LoaderConfig::new().with_dispatch(Dispatch::Spawn);
        assert_eq!(config.dispatch, Dispatch::Spawn);
    }

    #[test]
    fn test_deserialize_fills_defaults() {
        let config: LoaderConfig = serde_json::from_value(json!({})).unwrap();
        assert_eq!(config, LoaderConfig::default());

        let config: LoaderConfig = serde_json::from_value(json!({"dispatch": "spawn"})).unwrap();
        assert_eq!(config.dispatch, Dispatch::Spawn);
    }

    #[test]
    fn test_serialize_snake_case() {
        let value = serde_json::to_value(LoaderConfig::new()).unwrap();
        assert_eq!(value, json!({"dispatch": "inline"}));
    }
}
