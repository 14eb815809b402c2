//! Worker lifecycle controller.
//!
//! Brings a worker up once the host has a live execution context, follows the
//! host's foreground/background transitions while running, and tears the engine
//! down on stop. All methods run on the coordination queue; nothing here blocks.
//!
//! While no host context exists the controller polls with a fixed delay and no
//! limit. Each scheduled retry re-checks `is_initialized` first, which is what
//! ends the loop, since scheduled commands cannot be cancelled.

use std::sync::Arc;

use tracing::{debug, error, info, trace, warn};

use crate::config::{ControllerConfig, WorkerConfig};
use crate::coordinator::{Command, ControllerListener, Scheduler, Transition};
use crate::error::{LifecycleError, Result};
use crate::host::{ExecutionContextProbe, HostContextHandle, HostEvent, HostLifecycle};
use crate::worker::ack::PendingAcknowledgment;
use crate::worker::channel::MessageChannel;
use crate::worker::engine::{package_list, EngineFactory, Package, WorkerContext, MESSAGE_RECEIVER};
use crate::worker::host::WorkerHost;
use crate::worker::state::{LifecycleRecord, LifecycleState, StateTransition};
use crate::worker::WorkerIdentity;

/// Collaborators a controller needs.
#[derive(Clone)]
pub struct ControllerDeps {
    pub probe: Arc<dyn ExecutionContextProbe>,
    pub scheduler: Arc<dyn Scheduler>,
    pub host_lifecycle: Arc<dyn HostLifecycle>,
    pub engine_factory: Arc<dyn EngineFactory>,
    pub config: ControllerConfig,
}

/// Owns one worker's lifecycle state and engine.
pub struct WorkerLifecycleController {
    identity: WorkerIdentity,
    config: WorkerConfig,
    /// Full ordered package list, fixed at construction.
    packages: Vec<Package>,
    deps: ControllerDeps,
    record: LifecycleRecord,
    worker_host: Option<WorkerHost>,
    /// Taken on the first ready notification.
    pending_ack: Option<PendingAcknowledgment>,
    ready_listener_attached: bool,
}

impl WorkerLifecycleController {
    /// Create a controller and try to initialize it right away.
    ///
    /// Nothing is scheduled yet. If the host has no context, the retry loop
    /// begins with [`activate`](Self::activate), once the controller is
    /// reachable through its scheduler.
    pub fn new(
        identity: WorkerIdentity,
        config: WorkerConfig,
        packages: &[Package],
        ack: PendingAcknowledgment,
        deps: ControllerDeps,
    ) -> Result<Self> {
        config.validate()?;

        let mut controller = Self {
            identity,
            config,
            packages: package_list(packages),
            deps,
            record: LifecycleRecord::new(),
            worker_host: None,
            pending_ack: Some(ack),
            ready_listener_attached: false,
        };

        controller.try_initialize()?;
        Ok(controller)
    }

    /// Begin polling for a host context if initialization has not happened.
    ///
    /// Call once, after the controller can receive commands from its
    /// scheduler. Retries posted earlier would have nowhere to land.
    pub fn activate(&mut self) {
        if !self.is_initialized() {
            self.schedule_retry(Command::RetryInitialize);
        }
    }

    pub fn identity(&self) -> WorkerIdentity {
        self.identity
    }

    pub fn state(&self) -> LifecycleState {
        self.record.state()
    }

    pub fn transitions(&self) -> &[StateTransition] {
        self.record.transitions()
    }

    pub fn is_initialized(&self) -> bool {
        self.worker_host.is_some()
    }

    pub fn has_pending_acknowledgment(&self) -> bool {
        self.pending_ack.is_some()
    }

    pub fn worker_host(&self) -> Option<&WorkerHost> {
        self.worker_host.as_ref()
    }

    /// Process one command from the coordination queue.
    pub fn handle(&mut self, command: Command) {
        trace!(worker = %self.identity, command = command.name(), "Handling command");

        let result = match command {
            Command::Start => self.start(),
            Command::Stop => {
                self.stop();
                Ok(())
            }
            Command::PostMessage { payload, reply } => {
                let _ = reply.send(self.post_message(&payload));
                Ok(())
            }
            Command::RetryInitialize => self.retry_initialize(),
            Command::RetryStart => self.retry_start(),
            Command::Host(event) => {
                self.on_host_event(event);
                Ok(())
            }
            Command::Forward { transition, host } => {
                self.forward(transition, host);
                Ok(())
            }
            Command::EngineReady(context) => {
                self.on_engine_ready(context);
                Ok(())
            }
            Command::Inspect(reply) => {
                let _ = reply.send(self.state());
                Ok(())
            }
        };

        if let Err(e) = result {
            error!(worker = %self.identity, error = %e, "Worker command failed");
        }
    }

    /// Start the worker.
    ///
    /// Before initialization this schedules a combined initialize-and-start
    /// retry instead of failing. Calling it while running does nothing.
    pub fn start(&mut self) -> Result<()> {
        match self.state() {
            LifecycleState::Uninitialized => {
                debug!(worker = %self.identity, "Start requested before host context, deferring");
                self.schedule_retry(Command::RetryStart);
                return Ok(());
            }
            LifecycleState::Running => {
                debug!(worker = %self.identity, "Start ignored, already running");
                return Ok(());
            }
            LifecycleState::Initialized | LifecycleState::Stopped => {}
        }

        let listener = ControllerListener::new(self.identity, Arc::clone(&self.deps.scheduler));
        let worker_host = self
            .worker_host
            .as_mut()
            .ok_or_else(|| LifecycleError::NotReady {
                identity: self.identity,
                reason: "worker host missing".to_string(),
            })?;
        let engine = worker_host.engine()?;

        if !self.ready_listener_attached {
            engine.add_ready_listener(listener.clone());
            self.ready_listener_attached = true;
        }
        if !engine.has_started_context() {
            engine.create_context_in_background();
        }

        self.deps.host_lifecycle.add_lifecycle_listener(listener);
        self.transition(LifecycleState::Running, "started")?;
        info!(worker = %self.identity, "Worker started");

        // Assume the host is in the foreground when it starts a worker.
        self.on_host_resume();
        Ok(())
    }

    /// Stop the worker, destroying the engine's context.
    ///
    /// Does nothing unless the worker is running.
    pub fn stop(&mut self) {
        if self.state() != LifecycleState::Running {
            debug!(worker = %self.identity, state = %self.state(), "Stop ignored, no engine attached");
            return;
        }

        self.deps
            .host_lifecycle
            .remove_lifecycle_listener(self.identity);
        if let Some(engine) = self.worker_host.as_mut().and_then(|host| host.built_engine()) {
            engine.destroy();
        }

        if let Err(e) = self.transition(LifecycleState::Stopped, "stopped") {
            warn!(worker = %self.identity, error = %e, "Unexpected state after stop");
        }
        info!(worker = %self.identity, "Worker stopped");
    }

    /// Deliver a message to the running worker.
    pub fn post_message(&self, payload: &str) -> Result<()> {
        if self.state() != LifecycleState::Running {
            return Err(LifecycleError::NotReady {
                identity: self.identity,
                reason: format!("worker is {}", self.state()),
            }
            .into());
        }

        let engine = self
            .worker_host
            .as_ref()
            .and_then(|host| host.engine_ref())
            .ok_or_else(|| LifecycleError::NotReady {
                identity: self.identity,
                reason: "no engine attached".to_string(),
            })?;

        MessageChannel::new(self.identity).deliver(engine, payload)
    }

    fn on_host_event(&mut self, event: HostEvent) {
        match event {
            HostEvent::Resume => self.on_host_resume(),
            HostEvent::Pause => self.on_host_pause(),
            HostEvent::Destroy => {
                info!(worker = %self.identity, "Host destroyed, stopping worker");
                self.stop();
            }
        }
    }

    fn on_host_resume(&self) {
        self.post_forward(Transition::Resume);
    }

    fn on_host_pause(&self) {
        self.post_forward(Transition::Pause);
    }

    fn post_forward(&self, transition: Transition) {
        if self.state() != LifecycleState::Running {
            debug!(worker = %self.identity, ?transition, "Host transition ignored, worker not running");
            return;
        }
        let host = self.deps.probe.current_context();
        self.deps
            .scheduler
            .post(self.identity, Command::Forward { transition, host });
    }

    fn forward(&mut self, transition: Transition, host: Option<HostContextHandle>) {
        if self.state() != LifecycleState::Running {
            debug!(worker = %self.identity, ?transition, "Dropping engine transition, worker not running");
            return;
        }
        let Some(engine) = self.worker_host.as_mut().and_then(|h| h.built_engine()) else {
            return;
        };
        match transition {
            Transition::Resume => engine.resume(host.as_ref()),
            Transition::Pause => engine.pause(host.as_ref()),
        }
        debug!(worker = %self.identity, ?transition, "Engine transition forwarded");
    }

    fn on_engine_ready(&mut self, context: Arc<dyn WorkerContext>) {
        let Some(ack) = self.pending_ack.take() else {
            trace!(worker = %self.identity, "Ready notification ignored, already acknowledged");
            return;
        };
        let Some(receiver) = context.receiver(MESSAGE_RECEIVER) else {
            warn!(worker = %self.identity, "Worker context has no message receiver");
            self.pending_ack = Some(ack);
            return;
        };

        receiver.initialize(self.identity, self.deps.probe.current_context(), ack);
        info!(worker = %self.identity, "Worker ready");
    }

    fn retry_initialize(&mut self) -> Result<()> {
        if self.is_initialized() {
            return Ok(());
        }
        if !self.try_initialize()? {
            self.schedule_retry(Command::RetryInitialize);
        }
        Ok(())
    }

    fn retry_start(&mut self) -> Result<()> {
        if self.is_initialized() || self.try_initialize()? {
            return self.start();
        }
        self.schedule_retry(Command::RetryStart);
        Ok(())
    }

    /// Build the worker host if a host context exists. Returns whether the
    /// controller is initialized afterwards.
    fn try_initialize(&mut self) -> Result<bool> {
        if self.is_initialized() {
            return Ok(true);
        }
        let Some(host) = self.deps.probe.current_context() else {
            debug!(worker = %self.identity, "Host context not available yet");
            return Ok(false);
        };

        self.worker_host = Some(WorkerHost::new(
            self.config.clone(),
            self.packages.clone(),
            Arc::clone(&self.deps.engine_factory),
            host,
        ));
        self.transition(LifecycleState::Initialized, "host context available")?;
        info!(
            worker = %self.identity,
            entry_module = %self.config.entry_module,
            "Worker initialized"
        );
        Ok(true)
    }

    fn schedule_retry(&self, command: Command) {
        let delay = self.deps.config.retry_delay;
        debug!(
            worker = %self.identity,
            command = command.name(),
            ?delay,
            "Scheduling retry"
        );
        self.deps
            .scheduler
            .schedule_after(delay, self.identity, command);
    }

    fn transition(&mut self, to: LifecycleState, reason: &str) -> Result<()> {
        self.record
            .transition_to(to, Some(reason.to_string()))
            .map_err(|(from, to)| {
                LifecycleError::InvalidTransition {
                    identity: self.identity,
                    from,
                    to,
                }
                .into()
            })
    }
}
