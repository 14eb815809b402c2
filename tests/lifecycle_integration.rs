//! Integration tests for worker lifecycles on the tokio coordinator.
//!
//! Each test spins up a coordinator, registers controllers backed by the
//! in-memory engine, and drives them the way a host would.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::time::timeout;

use embedded_workers::config::{ControllerConfig, WorkerConfig};
use embedded_workers::coordinator::{Coordinator, CoordinatorHandle};
use embedded_workers::error::{Error, LifecycleError};
use embedded_workers::host::HostEvent;
use embedded_workers::testing::{
    EngineCall, EngineRecorder, FakeEngineFactory, FakeProbe, RecordingHostLifecycle,
};
use embedded_workers::worker::{
    acknowledgment, AcknowledgmentReceiver, ControllerDeps, LifecycleState,
    WorkerLifecycleController, WorkerIdentity,
};

/// Maximum time any test is allowed to run before we consider it hung.
const TEST_TIMEOUT: Duration = Duration::from_secs(5);

struct TestWorker {
    identity: WorkerIdentity,
    ack: AcknowledgmentReceiver,
    recorder: Arc<EngineRecorder>,
}

fn build_controller(
    handle: &CoordinatorHandle,
    key: i64,
    probe: Arc<FakeProbe>,
    host: Arc<RecordingHostLifecycle>,
) -> (WorkerLifecycleController, TestWorker) {
    let (factory, recorder) = FakeEngineFactory::auto_ready();
    let identity = WorkerIdentity(key);
    let (pending, ack) = acknowledgment(identity);
    let deps = ControllerDeps {
        probe,
        scheduler: handle.scheduler(),
        host_lifecycle: host,
        engine_factory: factory,
        config: ControllerConfig {
            retry_delay: Duration::from_millis(5),
        },
    };
    let controller = WorkerLifecycleController::new(
        identity,
        WorkerConfig::new("index").with_bundle_resource("worker"),
        &[],
        pending,
        deps,
    )
    .unwrap();
    (
        controller,
        TestWorker {
            identity,
            ack,
            recorder,
        },
    )
}

async fn spawn_worker(
    handle: &CoordinatorHandle,
    key: i64,
    probe: Arc<FakeProbe>,
    host: Arc<RecordingHostLifecycle>,
) -> TestWorker {
    let (controller, worker) = build_controller(handle, key, probe, host);
    handle.register(controller).await.unwrap();
    worker
}

/// Let queued commands, and the commands they post, run.
async fn flush(handle: &CoordinatorHandle, identity: WorkerIdentity) {
    handle.state(identity).await.unwrap();
    handle.state(identity).await.unwrap();
}

#[tokio::test]
async fn deferred_start_completes_once_context_appears() {
    let (handle, _join) = Coordinator::spawn();
    let probe = FakeProbe::absent();
    let host = RecordingHostLifecycle::new();
    let worker = spawn_worker(&handle, 42, probe.clone(), host).await;

    handle.start(worker.identity).unwrap();
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(
        handle.state(worker.identity).await.unwrap(),
        LifecycleState::Uninitialized
    );
    assert_eq!(worker.recorder.builds(), 0);

    probe.attach();
    let acked = timeout(TEST_TIMEOUT, worker.ack.wait())
        .await
        .expect("acknowledgment timed out")
        .unwrap();
    assert_eq!(acked, WorkerIdentity(42));
    assert_eq!(
        handle.state(worker.identity).await.unwrap(),
        LifecycleState::Running
    );

    handle.post_message(worker.identity, "hello").await.unwrap();
    assert_eq!(
        worker.recorder.receiver().emitted(),
        vec![("message".to_string(), json!({"key": 42, "message": "hello"}))]
    );
}

#[tokio::test]
async fn late_registration_keeps_initialization_retrying() {
    let (handle, _join) = Coordinator::spawn();
    let probe = FakeProbe::absent();
    let host = RecordingHostLifecycle::new();
    let (controller, worker) = build_controller(&handle, 8, probe.clone(), host);

    // Several retry delays pass before the controller is handed over.
    tokio::time::sleep(Duration::from_millis(20)).await;
    handle.register(controller).await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(
        handle.state(worker.identity).await.unwrap(),
        LifecycleState::Uninitialized
    );

    probe.attach();
    timeout(TEST_TIMEOUT, async {
        while handle.state(worker.identity).await.unwrap() != LifecycleState::Initialized {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("worker never initialized");
    assert_eq!(worker.recorder.builds(), 0);
}

#[tokio::test]
async fn start_stop_then_post_is_not_ready() {
    let (handle, _join) = Coordinator::spawn();
    let host = RecordingHostLifecycle::new();
    let worker = spawn_worker(&handle, 1, FakeProbe::present(), host).await;

    handle.start(worker.identity).unwrap();
    timeout(TEST_TIMEOUT, worker.ack.wait())
        .await
        .expect("acknowledgment timed out")
        .unwrap();

    handle.stop(worker.identity).unwrap();
    let err = handle
        .post_message(worker.identity, "late")
        .await
        .unwrap_err();
    assert!(err.is_not_ready());
    assert_eq!(worker.recorder.count(EngineCall::Destroy), 1);
    assert_eq!(
        handle.state(worker.identity).await.unwrap(),
        LifecycleState::Stopped
    );
}

#[tokio::test]
async fn post_before_start_is_not_ready() {
    let (handle, _join) = Coordinator::spawn();
    let host = RecordingHostLifecycle::new();
    let worker = spawn_worker(&handle, 1, FakeProbe::present(), host).await;

    let err = handle
        .post_message(worker.identity, "early")
        .await
        .unwrap_err();
    assert!(err.is_not_ready());
    assert!(worker.recorder.calls().is_empty());
}

#[tokio::test]
async fn unknown_worker_is_reported() {
    let (handle, _join) = Coordinator::spawn();

    let err = handle
        .post_message(WorkerIdentity(99), "anyone?")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Lifecycle(LifecycleError::UnknownWorker { .. })
    ));
    assert!(handle.state(WorkerIdentity(99)).await.is_err());
}

#[tokio::test]
async fn duplicate_registration_rejected() {
    let (handle, _join) = Coordinator::spawn();
    let host = RecordingHostLifecycle::new();
    let _first = spawn_worker(&handle, 7, FakeProbe::present(), host.clone()).await;

    let (controller, _second) = build_controller(&handle, 7, FakeProbe::present(), host);
    let err = handle.register(controller).await.unwrap_err();
    assert!(matches!(
        err,
        Error::Lifecycle(LifecycleError::DuplicateWorker { .. })
    ));
}

#[tokio::test]
async fn host_pause_and_resume_reach_engine() {
    let (handle, _join) = Coordinator::spawn();
    let host = RecordingHostLifecycle::new();
    let worker = spawn_worker(&handle, 3, FakeProbe::present(), host.clone()).await;

    handle.start(worker.identity).unwrap();
    timeout(TEST_TIMEOUT, worker.ack.wait())
        .await
        .expect("acknowledgment timed out")
        .unwrap();
    flush(&handle, worker.identity).await;

    host.emit(HostEvent::Pause);
    flush(&handle, worker.identity).await;
    host.emit(HostEvent::Resume);
    flush(&handle, worker.identity).await;

    assert_eq!(worker.recorder.count(EngineCall::Pause), 1);
    assert_eq!(worker.recorder.count(EngineCall::Resume), 2);
}

#[tokio::test]
async fn remove_stops_and_forgets_worker() {
    let (handle, _join) = Coordinator::spawn();
    let host = RecordingHostLifecycle::new();
    let worker = spawn_worker(&handle, 4, FakeProbe::present(), host.clone()).await;

    handle.start(worker.identity).unwrap();
    timeout(TEST_TIMEOUT, worker.ack.wait())
        .await
        .expect("acknowledgment timed out")
        .unwrap();

    assert!(handle.remove(worker.identity).await.unwrap());
    assert!(!handle.remove(worker.identity).await.unwrap());
    assert_eq!(worker.recorder.count(EngineCall::Destroy), 1);
    assert!(!host.is_listening(worker.identity));
}

#[tokio::test]
async fn shutdown_stops_every_worker() {
    let (handle, join) = Coordinator::spawn();
    let host = RecordingHostLifecycle::new();
    let first = spawn_worker(&handle, 1, FakeProbe::present(), host.clone()).await;
    let second = spawn_worker(&handle, 2, FakeProbe::present(), host.clone()).await;

    handle.start(first.identity).unwrap();
    handle.start(second.identity).unwrap();
    timeout(TEST_TIMEOUT, first.ack.wait())
        .await
        .expect("acknowledgment timed out")
        .unwrap();
    timeout(TEST_TIMEOUT, second.ack.wait())
        .await
        .expect("acknowledgment timed out")
        .unwrap();

    handle.shutdown();
    timeout(TEST_TIMEOUT, join)
        .await
        .expect("coordinator did not stop")
        .unwrap();

    assert_eq!(first.recorder.count(EngineCall::Destroy), 1);
    assert_eq!(second.recorder.count(EngineCall::Destroy), 1);
    assert!(handle.start(first.identity).is_err());
}
