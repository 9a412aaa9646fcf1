//! Error types for the reactive runtime.
//!
//! Only two kinds of failure ever leave the runtime as an `Err`: evaluation
//! errors raised by non-user computations, and the runaway-update guard of
//! the scheduler. Everything raised by user watchers is routed through the
//! runtime's error hook instead (see [`Runtime::on_error`]).
//!
//! [`Runtime::on_error`]: crate::reactive::Runtime::on_error

use thiserror::Error;

use crate::reactive::SubscriberId;

/// Errors produced by the reactive runtime.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ReactiveError {
    /// A getter or change callback failed.
    #[error("{0}")]
    Evaluation(String),

    /// A subscriber kept re-queuing itself during a single flush.
    #[error(
        "infinite update loop in watcher {id} (\"{expression}\"): re-queued more than {limit} times in one flush"
    )]
    InfiniteUpdateLoop {
        id: SubscriberId,
        expression: String,
        limit: usize,
    },

    /// The runtime configuration could not be loaded.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl ReactiveError {
    /// Shorthand used by getters and callbacks to fail an evaluation.
    pub fn evaluation(message: impl Into<String>) -> Self {
        Self::Evaluation(message.into())
    }
}

impl From<serde_json::Error> for ReactiveError {
    fn from(err: serde_json::Error) -> Self {
        Self::Config(err.to_string())
    }
}

pub type Result<T, E = ReactiveError> = std::result::Result<T, E>;
