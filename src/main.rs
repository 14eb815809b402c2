use std::time::Duration;

use embedded_workers::config::{ControllerConfig, WorkerConfig};
use embedded_workers::coordinator::Coordinator;
use embedded_workers::host::HostEvent;
use embedded_workers::testing::{FakeEngineFactory, FakeProbe, RecordingHostLifecycle};
use embedded_workers::worker::{
    acknowledgment, ControllerDeps, Package, WorkerIdentity, WorkerLifecycleController,
};

/// Simulated host: the worker is started before the host context exists, then
/// the context appears, the worker comes up, exchanges a message and stops.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let entry_module = std::env::var("WORKER_ENTRY_MODULE").unwrap_or_else(|_| "index".to_string());
    let bundle = std::env::var("WORKER_BUNDLE").unwrap_or_else(|_| "worker".to_string());
    let context_delay_ms: u64 = std::env::var("WORKER_CONTEXT_DELAY_MS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(200);

    eprintln!("⚙️  Embedded Workers v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Entry module: {}", entry_module);
    eprintln!("   Bundle: {}.bundle", bundle);
    eprintln!("   Host context appears after {}ms\n", context_delay_ms);

    let (coordinator, join) = Coordinator::spawn();
    let probe = FakeProbe::absent();
    let host = RecordingHostLifecycle::new();
    let (factory, recorder) = FakeEngineFactory::auto_ready();

    let identity = WorkerIdentity(1);
    let (pending, ack) = acknowledgment(identity);
    let deps = ControllerDeps {
        probe: probe.clone(),
        scheduler: coordinator.scheduler(),
        host_lifecycle: host.clone(),
        engine_factory: factory,
        config: ControllerConfig::from_env(),
    };
    let controller = WorkerLifecycleController::new(
        identity,
        WorkerConfig::new(entry_module).with_bundle_resource(bundle),
        &[Package::new("storage")],
        pending,
        deps,
    )?;
    coordinator.register(controller).await?;

    // Start before the host has a context; the controller keeps retrying.
    coordinator.start(identity)?;

    tokio::spawn({
        let probe = probe.clone();
        async move {
            tokio::time::sleep(Duration::from_millis(context_delay_ms)).await;
            tracing::info!("Host context attached");
            probe.attach();
        }
    });

    let started = tokio::time::timeout(Duration::from_secs(5), ack.wait()).await??;
    eprintln!("   Worker {} acknowledged start", started);

    coordinator.post_message(identity, "hello from the host").await?;
    for (event, body) in recorder.receiver().emitted() {
        eprintln!("   Worker received {}: {}", event, body);
    }

    host.emit(HostEvent::Pause);
    host.emit(HostEvent::Resume);

    coordinator.stop(identity)?;
    if let Err(e) = coordinator.post_message(identity, "after stop").await {
        eprintln!("   Post after stop rejected: {}", e);
    }

    coordinator.shutdown();
    join.await?;
    eprintln!("   Engine calls: {:?}", recorder.calls());

    Ok(())
}
