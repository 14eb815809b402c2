//! Tokio-backed coordination loop.
//!
//! One task owns every registered controller and processes commands in FIFO
//! order, so controller state never needs a lock. Delayed commands are parked in
//! short-lived sleeper tasks and enqueued when their delay elapses.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::coordinator::{Command, Scheduler};
use crate::error::{LifecycleError, Result};
use crate::worker::controller::WorkerLifecycleController;
use crate::worker::state::LifecycleState;
use crate::worker::WorkerIdentity;

enum Envelope {
    Register {
        controller: Box<WorkerLifecycleController>,
        reply: oneshot::Sender<Result<()>>,
    },
    Dispatch {
        target: WorkerIdentity,
        command: Command,
    },
    Remove {
        target: WorkerIdentity,
        reply: oneshot::Sender<bool>,
    },
    Shutdown,
}

/// The coordination loop. Owns the controllers registered with it.
pub struct Coordinator {
    rx: mpsc::UnboundedReceiver<Envelope>,
    controllers: HashMap<WorkerIdentity, WorkerLifecycleController>,
}

/// Cloneable handle for posting to a running [`Coordinator`].
#[derive(Clone)]
pub struct CoordinatorHandle {
    tx: mpsc::UnboundedSender<Envelope>,
    runtime: tokio::runtime::Handle,
}

impl Coordinator {
    /// Spawn the loop on the current tokio runtime.
    ///
    /// Must be called from within a runtime.
    pub fn spawn() -> (CoordinatorHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let coordinator = Self {
            rx,
            controllers: HashMap::new(),
        };
        let handle = CoordinatorHandle {
            tx,
            runtime: tokio::runtime::Handle::current(),
        };
        let join = tokio::spawn(coordinator.run());
        (handle, join)
    }

    async fn run(mut self) {
        info!("Coordinator started");

        while let Some(envelope) = self.rx.recv().await {
            match envelope {
                Envelope::Register { controller, reply } => {
                    let _ = reply.send(self.register(*controller));
                }
                Envelope::Dispatch { target, command } => self.dispatch(target, command),
                Envelope::Remove { target, reply } => {
                    let removed = match self.controllers.remove(&target) {
                        Some(mut controller) => {
                            controller.stop();
                            true
                        }
                        None => false,
                    };
                    let _ = reply.send(removed);
                }
                Envelope::Shutdown => break,
            }
        }

        for controller in self.controllers.values_mut() {
            controller.stop();
        }
        info!(workers = self.controllers.len(), "Coordinator stopped");
    }

    fn register(&mut self, controller: WorkerLifecycleController) -> Result<()> {
        let identity = controller.identity();
        if self.controllers.contains_key(&identity) {
            return Err(LifecycleError::DuplicateWorker { identity }.into());
        }
        debug!(worker = %identity, state = %controller.state(), "Worker registered");
        self.controllers
            .entry(identity)
            .or_insert(controller)
            .activate();
        Ok(())
    }

    fn dispatch(&mut self, target: WorkerIdentity, command: Command) {
        match self.controllers.get_mut(&target) {
            Some(controller) => controller.handle(command),
            None => {
                warn!(worker = %target, command = command.name(), "Dropping command for unknown worker");
                command.reject(LifecycleError::UnknownWorker { identity: target }.into());
            }
        }
    }
}

impl CoordinatorHandle {
    /// This handle as a scheduler for controllers and listeners.
    pub fn scheduler(&self) -> Arc<dyn Scheduler> {
        Arc::new(self.clone())
    }

    /// Hand a controller over to the coordination loop.
    pub async fn register(&self, controller: WorkerLifecycleController) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(Envelope::Register {
            controller: Box::new(controller),
            reply,
        })?;
        rx.await.map_err(|_| LifecycleError::CoordinatorClosed)?
    }

    pub fn start(&self, identity: WorkerIdentity) -> Result<()> {
        self.send(Envelope::Dispatch {
            target: identity,
            command: Command::Start,
        })
    }

    pub fn stop(&self, identity: WorkerIdentity) -> Result<()> {
        self.send(Envelope::Dispatch {
            target: identity,
            command: Command::Stop,
        })
    }

    /// Deliver a message and wait for the controller's verdict.
    pub async fn post_message(
        &self,
        identity: WorkerIdentity,
        payload: impl Into<String>,
    ) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(Envelope::Dispatch {
            target: identity,
            command: Command::PostMessage {
                payload: payload.into(),
                reply,
            },
        })?;
        rx.await.map_err(|_| LifecycleError::CoordinatorClosed)?
    }

    /// Current lifecycle state of a registered worker.
    pub async fn state(&self, identity: WorkerIdentity) -> Result<LifecycleState> {
        let (reply, rx) = oneshot::channel();
        self.send(Envelope::Dispatch {
            target: identity,
            command: Command::Inspect(reply),
        })?;
        // An unknown worker drops the reply sender without answering.
        rx.await
            .map_err(|_| LifecycleError::UnknownWorker { identity }.into())
    }

    /// Stop a worker and forget it. Returns false if it was not registered.
    pub async fn remove(&self, identity: WorkerIdentity) -> Result<bool> {
        let (reply, rx) = oneshot::channel();
        self.send(Envelope::Remove {
            target: identity,
            reply,
        })?;
        rx.await
            .map_err(|_| LifecycleError::CoordinatorClosed.into())
    }

    /// Stop every worker and end the loop after the commands already queued.
    pub fn shutdown(&self) {
        let _ = self.tx.send(Envelope::Shutdown);
    }

    fn send(&self, envelope: Envelope) -> Result<()> {
        self.tx
            .send(envelope)
            .map_err(|_| LifecycleError::CoordinatorClosed.into())
    }
}

impl Scheduler for CoordinatorHandle {
    fn post(&self, target: WorkerIdentity, command: Command) {
        if self.tx.send(Envelope::Dispatch { target, command }).is_err() {
            debug!(worker = %target, "Coordinator closed, command dropped");
        }
    }

    fn schedule_after(&self, delay: Duration, target: WorkerIdentity, command: Command) {
        let tx = self.tx.clone();
        self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            if tx.send(Envelope::Dispatch { target, command }).is_err() {
                debug!(worker = %target, "Coordinator closed, delayed command dropped");
            }
        });
    }
}
