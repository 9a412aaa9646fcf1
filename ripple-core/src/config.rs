//! Runtime Configuration
//!
//! A [`Config`] is handed to [`Runtime::new`] and stays fixed for the
//! lifetime of that runtime. All fields have defaults, so a partial JSON
//! document is enough:
//!
//! ```rust
//! use ripple_core::{Config, TickHost};
//!
//! let config = Config::from_json(r#"{ "sync": true }"#).unwrap();
//! assert!(config.sync);
//! assert_eq!(config.max_update_count, 100);
//! assert_eq!(config.tick_host, TickHost::Manual);
//! ```
//!
//! [`Runtime::new`]: crate::reactive::Runtime::new

use serde::Deserialize;

use crate::error::Result;

/// Default bound on how often one subscriber may be re-queued in a flush.
pub const DEFAULT_MAX_UPDATE_COUNT: usize = 100;

/// Which deferred-execution primitive flushes the tick queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TickHost {
    /// Flushes are parked until [`Runtime::run_microtasks`] is called.
    ///
    /// [`Runtime::run_microtasks`]: crate::reactive::Runtime::run_microtasks
    #[default]
    Manual,

    /// Flushes run as tokio tasks on a `LocalSet` driven by `Runtime::run_until`.
    LocalSet,
}

/// Runtime configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Run queued subscribers immediately instead of at the next tick.
    pub sync: bool,

    /// Re-queue bound per subscriber and flush before the flush is aborted.
    pub max_update_count: usize,

    /// Suppress misuse warnings.
    pub silent: bool,

    /// Preferred tick host.
    pub tick_host: TickHost,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sync: false,
            max_update_count: DEFAULT_MAX_UPDATE_COUNT,
            silent: false,
            tick_host: TickHost::Manual,
        }
    }
}

impl Config {
    /// Parse a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(source: &str) -> Result<Self> {
        Ok(serde_json::from_str(source)?)
    }

    /// A configuration that flushes synchronously.
    pub fn synchronous() -> Self {
        Self {
            sync: true,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ReactiveError;

    #[test]
    fn defaults_apply_to_missing_fields() {
        let config = Config::from_json(r#"{ "silent": true }"#).unwrap();
        assert!(config.silent);
        assert!(!config.sync);
        assert_eq!(config.max_update_count, DEFAULT_MAX_UPDATE_COUNT);
    }

    #[test]
    fn tick_host_uses_snake_case() {
        let config = Config::from_json(r#"{ "tick_host": "local_set" }"#).unwrap();
        assert_eq!(config.tick_host, TickHost::LocalSet);
    }

    #[test]
    fn malformed_json_is_a_config_error() {
        let err = Config::from_json("{ sync: yes").unwrap_err();
        assert!(matches!(err, ReactiveError::Config(_)));
    }
}
