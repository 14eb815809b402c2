//! Host foreground/background notifications.

use serde::{Deserialize, Serialize};

use crate::coordinator::ControllerListener;
use crate::worker::WorkerIdentity;

/// Lifecycle notification emitted by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostEvent {
    /// Host came to the foreground.
    Resume,
    /// Host went to the background.
    Pause,
    /// Host is being torn down.
    Destroy,
}

impl std::fmt::Display for HostEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Resume => "resume",
            Self::Pause => "pause",
            Self::Destroy => "destroy",
        };
        write!(f, "{s}")
    }
}

/// Registry of listeners for host lifecycle events.
///
/// Implementations deliver events by calling `ControllerListener::on_host_event`,
/// which marshals them onto the coordination queue.
pub trait HostLifecycle: Send + Sync {
    fn add_lifecycle_listener(&self, listener: ControllerListener);
    fn remove_lifecycle_listener(&self, identity: WorkerIdentity);
}
