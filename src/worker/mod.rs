//! Worker system — lifecycle of one embedded script worker.
//!
//! Core components:
//! - `state` — Lifecycle state machine (Uninitialized → Initialized → Running ⇄ Stopped)
//! - `ack` — Resolve-once "worker started" acknowledgment
//! - `engine` — Engine collaborator traits and package list
//! - `host` — WorkerHost: config plus the lazily built engine
//! - `channel` — Message envelope delivery into the worker
//! - `controller` — The lifecycle controller tying it together

pub mod ack;
pub mod channel;
pub mod controller;
pub mod engine;
pub mod host;
pub mod state;

use serde::{Deserialize, Serialize};

pub use ack::{acknowledgment, AcknowledgmentReceiver, PendingAcknowledgment};
pub use channel::{MessageChannel, MessageEnvelope};
pub use controller::{ControllerDeps, WorkerLifecycleController};
pub use engine::{EngineFactory, EngineInstance, MessageReceiver, Package, WorkerContext};
pub use host::WorkerHost;
pub use state::{LifecycleState, StateTransition};

/// Key identifying one worker within the host process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkerIdentity(pub i64);

impl std::fmt::Display for WorkerIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for WorkerIdentity {
    fn from(key: i64) -> Self {
        Self(key)
    }
}
