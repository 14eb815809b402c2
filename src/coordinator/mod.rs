//! Coordination queue — the single place controller state is touched.
//!
//! Everything that changes a worker's lifecycle arrives here as a [`Command`]:
//! host calls, scheduled retries, host foreground/background events and engine
//! ready notifications. A [`Scheduler`] puts commands on the queue; the
//! [`Coordinator`] drains it one command at a time.

pub mod scheduler;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;

use crate::error::{Error, Result};
use crate::host::{HostContextHandle, HostEvent};
use crate::worker::engine::WorkerContext;
use crate::worker::state::LifecycleState;
use crate::worker::WorkerIdentity;

pub use scheduler::{Coordinator, CoordinatorHandle};

/// Engine transition forwarded from a host event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Resume,
    Pause,
}

/// Work item addressed to one worker's controller.
pub enum Command {
    /// Host asked the worker to start.
    Start,
    /// Host asked the worker to stop.
    Stop,
    /// Host asked to deliver a message; the verdict goes to `reply`.
    PostMessage {
        payload: String,
        reply: oneshot::Sender<Result<()>>,
    },
    /// Scheduled re-attempt of initialization.
    RetryInitialize,
    /// Scheduled re-attempt of initialization followed by start.
    RetryStart,
    /// Host lifecycle notification.
    Host(HostEvent),
    /// Deferred resume/pause of the engine.
    Forward {
        transition: Transition,
        host: Option<HostContextHandle>,
    },
    /// Engine finished creating its worker context.
    EngineReady(Arc<dyn WorkerContext>),
    /// Report the current lifecycle state.
    Inspect(oneshot::Sender<LifecycleState>),
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Stop => "stop",
            Self::PostMessage { .. } => "post_message",
            Self::RetryInitialize => "retry_initialize",
            Self::RetryStart => "retry_start",
            Self::Host(_) => "host_event",
            Self::Forward { .. } => "forward",
            Self::EngineReady(_) => "engine_ready",
            Self::Inspect(_) => "inspect",
        }
    }

    /// True for the self-scheduled retry commands.
    pub fn is_retry(&self) -> bool {
        matches!(self, Self::RetryInitialize | Self::RetryStart)
    }

    /// Answer a command that could not be routed to a controller.
    pub(crate) fn reject(self, error: Error) {
        if let Self::PostMessage { reply, .. } = self {
            let _ = reply.send(Err(error));
        }
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Host(event) => write!(f, "Host({event})"),
            Self::Forward { transition, .. } => write!(f, "Forward({transition:?})"),
            other => f.write_str(other.name()),
        }
    }
}

/// Puts commands on the coordination queue.
pub trait Scheduler: Send + Sync {
    /// Enqueue behind everything already posted.
    fn post(&self, target: WorkerIdentity, command: Command);

    /// Enqueue once, no earlier than `delay` from now. Cannot be cancelled.
    fn schedule_after(&self, delay: Duration, target: WorkerIdentity, command: Command);
}

/// Callback handle given to the engine and the host on a controller's behalf.
///
/// Calls never reach the controller directly; they are posted to the queue.
#[derive(Clone)]
pub struct ControllerListener {
    target: WorkerIdentity,
    scheduler: Arc<dyn Scheduler>,
}

impl ControllerListener {
    pub fn new(target: WorkerIdentity, scheduler: Arc<dyn Scheduler>) -> Self {
        Self { target, scheduler }
    }

    pub fn target(&self) -> WorkerIdentity {
        self.target
    }

    pub fn on_engine_ready(&self, context: Arc<dyn WorkerContext>) {
        self.scheduler
            .post(self.target, Command::EngineReady(context));
    }

    pub fn on_host_event(&self, event: HostEvent) {
        self.scheduler.post(self.target, Command::Host(event));
    }
}

impl fmt::Debug for ControllerListener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControllerListener")
            .field("target", &self.target)
            .finish()
    }
}
