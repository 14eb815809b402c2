//! Worker lifecycle state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Transition history is capped to this many entries.
const MAX_TRANSITIONS: usize = 200;

/// Lifecycle state of a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    /// Waiting for a host context; no engine exists.
    Uninitialized,
    /// Worker host built, engine not started.
    Initialized,
    /// Engine attached and following host foreground/background.
    Running,
    /// Engine destroyed.
    Stopped,
}

impl LifecycleState {
    /// Check if this state allows transitioning to another state.
    pub fn can_transition_to(&self, target: LifecycleState) -> bool {
        use LifecycleState::*;

        matches!(
            (self, target),
            (Uninitialized, Initialized)
                | (Initialized, Running)
                | (Running, Stopped)
                // Restart after a stop
                | (Stopped, Running)
        )
    }

    /// True once a worker host exists.
    pub fn is_initialized(&self) -> bool {
        !matches!(self, Self::Uninitialized)
    }
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Uninitialized => "uninitialized",
            Self::Initialized => "initialized",
            Self::Running => "running",
            Self::Stopped => "stopped",
        };
        write!(f, "{s}")
    }
}

/// A state transition event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransition {
    /// Previous state.
    pub from: LifecycleState,
    /// New state.
    pub to: LifecycleState,
    /// When the transition occurred.
    pub timestamp: DateTime<Utc>,
    /// Reason for the transition.
    pub reason: Option<String>,
}

/// Current state plus bounded transition history.
#[derive(Debug, Clone, Serialize)]
pub struct LifecycleRecord {
    state: LifecycleState,
    transitions: Vec<StateTransition>,
}

impl LifecycleRecord {
    pub fn new() -> Self {
        Self {
            state: LifecycleState::Uninitialized,
            transitions: Vec::new(),
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn transitions(&self) -> &[StateTransition] {
        &self.transitions
    }

    /// Move to `to`, returning the rejected pair if the edge is not allowed.
    pub fn transition_to(
        &mut self,
        to: LifecycleState,
        reason: Option<String>,
    ) -> Result<(), (LifecycleState, LifecycleState)> {
        if !self.state.can_transition_to(to) {
            return Err((self.state, to));
        }

        self.transitions.push(StateTransition {
            from: self.state,
            to,
            timestamp: Utc::now(),
            reason,
        });

        if self.transitions.len() > MAX_TRANSITIONS {
            let drain_count = self.transitions.len() - MAX_TRANSITIONS;
            self.transitions.drain(..drain_count);
        }

        self.state = to;
        Ok(())
    }
}

impl Default for LifecycleRecord {
    fn default() -> Self {
        Self::new()
    }
}
