//! Error types for embedded workers.

use crate::worker::state::LifecycleState;
use crate::worker::WorkerIdentity;

/// Top-level error type for worker management.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Lifecycle error: {0}")]
    Lifecycle(#[from] LifecycleError),

    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),
}

impl Error {
    /// True when the worker was asked to do something before it was ready.
    pub fn is_not_ready(&self) -> bool {
        matches!(self, Self::Lifecycle(LifecycleError::NotReady { .. }))
    }
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {key}. {hint}")]
    MissingRequired { key: String, hint: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Worker lifecycle errors.
#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error("Worker {identity} is not ready: {reason}")]
    NotReady {
        identity: WorkerIdentity,
        reason: String,
    },

    #[error("Worker {identity} cannot transition from {from} to {to}")]
    InvalidTransition {
        identity: WorkerIdentity,
        from: LifecycleState,
        to: LifecycleState,
    },

    #[error("Worker {identity} is not registered")]
    UnknownWorker { identity: WorkerIdentity },

    #[error("Worker {identity} is already registered")]
    DuplicateWorker { identity: WorkerIdentity },

    #[error("Acknowledgment for worker {identity} was dropped before resolving")]
    AcknowledgmentDropped { identity: WorkerIdentity },

    #[error("Coordinator is no longer running")]
    CoordinatorClosed,
}

/// Errors raised by the engine collaborator.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Engine build failed for entry module {entry_module}: {reason}")]
    BuildFailed {
        entry_module: String,
        reason: String,
    },
}

/// Message delivery errors.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Failed to encode message envelope: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Result type alias for worker management.
pub type Result<T> = std::result::Result<T, Error>;
