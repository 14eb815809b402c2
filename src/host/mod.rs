//! Host-side collaborators.
//!
//! - `probe` — looks up the host's current execution context
//! - `lifecycle` — foreground/background notifications from the host

pub mod lifecycle;
pub mod probe;

pub use lifecycle::{HostEvent, HostLifecycle};
pub use probe::{ExecutionContextProbe, HostContext, HostContextHandle};
