//! In-memory collaborators for tests and the demo host.
//!
//! None of these talk to a real engine or host UI. They record what the
//! controller asked of them so tests can assert on it.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::coordinator::{Command, ControllerListener, Scheduler};
use crate::error::EngineError;
use crate::host::{ExecutionContextProbe, HostContext, HostContextHandle, HostEvent, HostLifecycle};
use crate::worker::ack::PendingAcknowledgment;
use crate::worker::controller::WorkerLifecycleController;
use crate::worker::engine::{
    EngineFactory, EngineInstance, EngineOptions, MessageReceiver, Package, WorkerContext,
    MESSAGE_RECEIVER,
};
use crate::worker::WorkerIdentity;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ── Probe ────────────────────────────────────────────────────────────────

/// Probe whose host context can be attached and detached at will.
pub struct FakeProbe {
    context: Mutex<Option<Arc<HostContext>>>,
    absent_polls: AtomicUsize,
    polls: AtomicUsize,
}

impl FakeProbe {
    /// A context is present from the first poll.
    pub fn present() -> Arc<Self> {
        Self::build(true, 0)
    }

    /// No context until `attach` is called.
    pub fn absent() -> Arc<Self> {
        Self::build(false, 0)
    }

    /// Reports absent for the first `polls` polls, present afterwards.
    pub fn absent_for(polls: usize) -> Arc<Self> {
        Self::build(true, polls)
    }

    fn build(present: bool, absent_polls: usize) -> Arc<Self> {
        let context = present.then(|| Arc::new(HostContext::new(1, "main")));
        Arc::new(Self {
            context: Mutex::new(context),
            absent_polls: AtomicUsize::new(absent_polls),
            polls: AtomicUsize::new(0),
        })
    }

    pub fn attach(&self) {
        *lock(&self.context) = Some(Arc::new(HostContext::new(1, "main")));
    }

    /// Drop the context; handles given out earlier stop resolving.
    pub fn detach(&self) {
        *lock(&self.context) = None;
    }

    pub fn polls(&self) -> usize {
        self.polls.load(Ordering::SeqCst)
    }
}

impl ExecutionContextProbe for FakeProbe {
    fn current_context(&self) -> Option<HostContextHandle> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        let skip = self
            .absent_polls
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if skip {
            return None;
        }
        lock(&self.context).as_ref().map(HostContextHandle::from)
    }
}

// ── Scheduler ────────────────────────────────────────────────────────────

/// A command captured by [`ManualScheduler`].
#[derive(Debug)]
pub struct ScheduledCommand {
    pub target: WorkerIdentity,
    /// `None` for immediate posts.
    pub delay: Option<Duration>,
    pub command: Command,
}

/// Scheduler that queues commands until a test runs them.
#[derive(Default)]
pub struct ManualScheduler {
    queue: Mutex<VecDeque<ScheduledCommand>>,
    retries: AtomicUsize,
}

impl ManualScheduler {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn pending(&self) -> usize {
        lock(&self.queue).len()
    }

    /// Names of queued commands, oldest first.
    pub fn pending_names(&self) -> Vec<&'static str> {
        lock(&self.queue).iter().map(|c| c.command.name()).collect()
    }

    /// Total retry commands ever scheduled.
    pub fn retries_scheduled(&self) -> usize {
        self.retries.load(Ordering::SeqCst)
    }

    pub fn drain(&self) -> Vec<ScheduledCommand> {
        lock(&self.queue).drain(..).collect()
    }

    /// Run everything queued right now against `controller`. Commands queued
    /// while running wait for the next call. Returns how many ran.
    pub fn run_pending(&self, controller: &mut WorkerLifecycleController) -> usize {
        let batch = self.drain();
        let count = batch.len();
        for scheduled in batch {
            if scheduled.target == controller.identity() {
                controller.handle(scheduled.command);
            }
        }
        count
    }

    /// Keep running until the queue is empty or `max_rounds` is reached.
    pub fn run_until_idle(&self, controller: &mut WorkerLifecycleController, max_rounds: usize) {
        for _ in 0..max_rounds {
            if self.run_pending(controller) == 0 {
                break;
            }
        }
    }

    fn push(&self, target: WorkerIdentity, delay: Option<Duration>, command: Command) {
        if command.is_retry() {
            self.retries.fetch_add(1, Ordering::SeqCst);
        }
        lock(&self.queue).push_back(ScheduledCommand {
            target,
            delay,
            command,
        });
    }
}

impl Scheduler for ManualScheduler {
    fn post(&self, target: WorkerIdentity, command: Command) {
        self.push(target, None, command);
    }

    fn schedule_after(&self, delay: Duration, target: WorkerIdentity, command: Command) {
        self.push(target, Some(delay), command);
    }
}

// ── Host lifecycle ───────────────────────────────────────────────────────

/// Host lifecycle registry that records listener changes.
#[derive(Default)]
pub struct RecordingHostLifecycle {
    listeners: Mutex<HashMap<WorkerIdentity, ControllerListener>>,
    added: AtomicUsize,
    removed: AtomicUsize,
}

impl RecordingHostLifecycle {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Deliver `event` to every registered listener.
    pub fn emit(&self, event: HostEvent) {
        let listeners: Vec<_> = lock(&self.listeners).values().cloned().collect();
        for listener in listeners {
            listener.on_host_event(event);
        }
    }

    pub fn is_listening(&self, identity: WorkerIdentity) -> bool {
        lock(&self.listeners).contains_key(&identity)
    }

    pub fn added(&self) -> usize {
        self.added.load(Ordering::SeqCst)
    }

    pub fn removed(&self) -> usize {
        self.removed.load(Ordering::SeqCst)
    }
}

impl HostLifecycle for RecordingHostLifecycle {
    fn add_lifecycle_listener(&self, listener: ControllerListener) {
        self.added.fetch_add(1, Ordering::SeqCst);
        lock(&self.listeners).insert(listener.target(), listener);
    }

    fn remove_lifecycle_listener(&self, identity: WorkerIdentity) {
        self.removed.fetch_add(1, Ordering::SeqCst);
        lock(&self.listeners).remove(&identity);
    }
}

// ── Engine ───────────────────────────────────────────────────────────────

/// Engine call, as recorded by [`EngineRecorder`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineCall {
    AddReadyListener,
    CreateContext,
    Resume,
    Pause,
    Destroy,
}

#[derive(Default)]
struct EngineRecord {
    builds: usize,
    build_error: Option<String>,
    options: Option<EngineOptions>,
    packages: Vec<String>,
    calls: Vec<EngineCall>,
    listeners: Vec<ControllerListener>,
    started: bool,
    context: Option<Arc<FakeWorkerContext>>,
    without_receiver: bool,
}

/// Shared view of everything the fake engines did.
pub struct EngineRecorder {
    record: Mutex<EngineRecord>,
    receiver: Arc<RecordingReceiver>,
    auto_ready: bool,
}

impl EngineRecorder {
    pub fn builds(&self) -> usize {
        lock(&self.record).builds
    }

    pub fn options(&self) -> Option<EngineOptions> {
        lock(&self.record).options.clone()
    }

    pub fn packages(&self) -> Vec<String> {
        lock(&self.record).packages.clone()
    }

    pub fn calls(&self) -> Vec<EngineCall> {
        lock(&self.record).calls.clone()
    }

    pub fn count(&self, call: EngineCall) -> usize {
        lock(&self.record)
            .calls
            .iter()
            .filter(|c| **c == call)
            .count()
    }

    pub fn receiver(&self) -> Arc<RecordingReceiver> {
        Arc::clone(&self.receiver)
    }

    /// Make every following build fail.
    pub fn fail_builds(&self, reason: &str) {
        lock(&self.record).build_error = Some(reason.to_string());
    }

    /// Contexts created from now on register no message receiver.
    pub fn without_receiver(&self) {
        lock(&self.record).without_receiver = true;
    }

    /// Notify every ready listener with the current context, as the engine
    /// would after (re)creating it. Returns the number of listeners notified.
    pub fn fire_ready(&self) -> usize {
        let (listeners, context) = {
            let record = lock(&self.record);
            (record.listeners.clone(), record.context.clone())
        };
        let Some(context) = context else {
            return 0;
        };
        for listener in &listeners {
            listener.on_engine_ready(Arc::clone(&context) as Arc<dyn WorkerContext>);
        }
        listeners.len()
    }
}

/// Factory producing [`FakeEngine`]s that share one [`EngineRecorder`].
pub struct FakeEngineFactory {
    recorder: Arc<EngineRecorder>,
}

impl FakeEngineFactory {
    pub fn new() -> (Arc<Self>, Arc<EngineRecorder>) {
        Self::create(false)
    }

    /// Engines announce readiness as soon as context creation starts.
    pub fn auto_ready() -> (Arc<Self>, Arc<EngineRecorder>) {
        Self::create(true)
    }

    fn create(auto_ready: bool) -> (Arc<Self>, Arc<EngineRecorder>) {
        let recorder = Arc::new(EngineRecorder {
            record: Mutex::new(EngineRecord::default()),
            receiver: Arc::new(RecordingReceiver::default()),
            auto_ready,
        });
        let factory = Arc::new(Self {
            recorder: Arc::clone(&recorder),
        });
        (factory, recorder)
    }
}

impl EngineFactory for FakeEngineFactory {
    fn build(
        &self,
        options: &EngineOptions,
        packages: &[Package],
    ) -> Result<Box<dyn EngineInstance>, EngineError> {
        let mut record = lock(&self.recorder.record);
        if let Some(reason) = &record.build_error {
            return Err(EngineError::BuildFailed {
                entry_module: options.entry_module.clone(),
                reason: reason.clone(),
            });
        }
        record.builds += 1;
        record.options = Some(options.clone());
        record.packages = packages.iter().map(|p| p.name().to_string()).collect();
        Ok(Box::new(FakeEngine {
            recorder: Arc::clone(&self.recorder),
        }))
    }
}

/// Engine that records calls instead of running scripts.
pub struct FakeEngine {
    recorder: Arc<EngineRecorder>,
}

impl FakeEngine {
    fn record(&self, call: EngineCall) -> MutexGuard<'_, EngineRecord> {
        let mut record = lock(&self.recorder.record);
        record.calls.push(call);
        record
    }
}

impl EngineInstance for FakeEngine {
    fn has_started_context(&self) -> bool {
        lock(&self.recorder.record).started
    }

    fn create_context_in_background(&mut self) {
        {
            let mut record = self.record(EngineCall::CreateContext);
            record.started = true;
            let receiver = (!record.without_receiver).then(|| self.recorder.receiver());
            record.context = Some(Arc::new(FakeWorkerContext { receiver }));
        }
        if self.recorder.auto_ready {
            self.recorder.fire_ready();
        }
    }

    fn add_ready_listener(&mut self, listener: ControllerListener) {
        self.record(EngineCall::AddReadyListener)
            .listeners
            .push(listener);
    }

    fn resume(&mut self, _host: Option<&HostContextHandle>) {
        self.record(EngineCall::Resume);
    }

    fn pause(&mut self, _host: Option<&HostContextHandle>) {
        self.record(EngineCall::Pause);
    }

    fn destroy(&mut self) {
        let mut record = self.record(EngineCall::Destroy);
        record.started = false;
        record.context = None;
    }

    fn current_worker_context(&self) -> Option<Arc<dyn WorkerContext>> {
        lock(&self.recorder.record)
            .context
            .clone()
            .map(|context| context as Arc<dyn WorkerContext>)
    }
}

/// Worker context exposing at most one receiver.
pub struct FakeWorkerContext {
    receiver: Option<Arc<RecordingReceiver>>,
}

impl WorkerContext for FakeWorkerContext {
    fn receiver(&self, name: &str) -> Option<Arc<dyn MessageReceiver>> {
        if name != MESSAGE_RECEIVER {
            return None;
        }
        self.receiver
            .clone()
            .map(|receiver| receiver as Arc<dyn MessageReceiver>)
    }
}

/// Receiver that resolves acknowledgments immediately and records messages.
#[derive(Default)]
pub struct RecordingReceiver {
    initialized: Mutex<Vec<WorkerIdentity>>,
    emitted: Mutex<Vec<(String, serde_json::Value)>>,
}

impl RecordingReceiver {
    /// Identities the receiver was initialized for, in order.
    pub fn initialized(&self) -> Vec<WorkerIdentity> {
        lock(&self.initialized).clone()
    }

    pub fn emitted(&self) -> Vec<(String, serde_json::Value)> {
        lock(&self.emitted).clone()
    }
}

impl MessageReceiver for RecordingReceiver {
    fn initialize(
        &self,
        identity: WorkerIdentity,
        _host: Option<HostContextHandle>,
        ack: PendingAcknowledgment,
    ) {
        lock(&self.initialized).push(identity);
        ack.resolve(identity);
    }

    fn emit(&self, event: &str, body: serde_json::Value) {
        lock(&self.emitted).push((event.to_string(), body));
    }
}
