//! Error types for the engine.
//!
//! Nothing here is fatal to the process. Transport errors, including a panic
//! inside a subscriber, are swallowed at the fan-out boundary and a panicking
//! tick at the producer loop boundary; only the registry, configuration and
//! runner surfaces hand errors back to their callers.

use std::path::PathBuf;

use thiserror::Error;

/// Failure reported by a subscriber's transport.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("transport closed")]
    Closed,

    #[error("push rejected: {0}")]
    Rejected(String),

    /// The weakly referenced subscriber no longer exists.
    #[error("subscriber dropped")]
    Dropped,

    /// The subscriber panicked while handling the push.
    #[error("subscriber panicked: {0}")]
    Panicked(String),
}

/// Registry operations on a specific connection.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PortError {
    #[error("connection '{0}' already exists")]
    AlreadyConnected(String),

    #[error("no connection named '{0}'")]
    UnknownConnection(String),

    #[error("statistics are disabled for connection '{0}'")]
    StatisticsDisabled(String),
}

/// Producer thread control failures.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("producer is already running")]
    AlreadyRunning,

    #[error("failed to spawn producer thread: {0}")]
    Spawn(#[source] std::io::Error),
}

/// Configuration loading and validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("unknown waveform shape '{0}'")]
    UnknownShape(String),
}

/// Text of a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
