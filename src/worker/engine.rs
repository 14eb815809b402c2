//! Engine collaborator interface.
//!
//! The script engine is external to this crate. These traits are the surface
//! the lifecycle controller drives; hosts provide the implementations.

use std::sync::Arc;

use crate::config::BundleSource;
use crate::coordinator::ControllerListener;
use crate::error::EngineError;
use crate::host::HostContextHandle;
use crate::worker::ack::PendingAcknowledgment;
use crate::worker::WorkerIdentity;

/// Package with the engine's built-in modules.
pub const CORE_PACKAGE: &str = "core";

/// Package registering the message receiver inside the worker.
pub const WORKER_BRIDGE_PACKAGE: &str = "worker-bridge";

/// Name the message receiver is registered under.
pub const MESSAGE_RECEIVER: &str = "worker-messages";

/// Event name used for host → worker messages.
pub const MESSAGE_EVENT: &str = "message";

/// A named bundle of native modules handed to the engine.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Package {
    name: String,
}

impl Package {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Base packages first, then the caller's, in the caller's order.
///
/// Engines that register modules in package order therefore let the base
/// packages win on name clashes.
pub fn package_list(caller: &[Package]) -> Vec<Package> {
    let mut packages = Vec::with_capacity(caller.len() + 2);
    packages.push(Package::new(CORE_PACKAGE));
    packages.push(Package::new(WORKER_BRIDGE_PACKAGE));
    packages.extend(caller.iter().cloned());
    packages
}

/// Everything the engine needs to construct an instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineOptions {
    pub entry_module: String,
    pub bundle: BundleSource,
    pub developer_support: bool,
}

/// Builds engine instances.
pub trait EngineFactory: Send + Sync {
    fn build(
        &self,
        options: &EngineOptions,
        packages: &[Package],
    ) -> Result<Box<dyn EngineInstance>, EngineError>;
}

/// One engine instance, exclusively owned by a controller.
pub trait EngineInstance: Send {
    /// True once context creation has begun (or finished).
    fn has_started_context(&self) -> bool;

    /// Begin creating the worker context off the coordination thread.
    /// Completion is reported through the ready listeners.
    fn create_context_in_background(&mut self);

    fn add_ready_listener(&mut self, listener: ControllerListener);

    fn resume(&mut self, host: Option<&HostContextHandle>);

    fn pause(&mut self, host: Option<&HostContextHandle>);

    /// Tear down the worker context completely.
    fn destroy(&mut self);

    fn current_worker_context(&self) -> Option<Arc<dyn WorkerContext>>;
}

/// The engine's live worker context.
pub trait WorkerContext: Send + Sync {
    fn receiver(&self, name: &str) -> Option<Arc<dyn MessageReceiver>>;
}

/// Module inside the worker that accepts host messages.
pub trait MessageReceiver: Send + Sync {
    /// Bind the receiver to its worker. The receiver resolves `ack` once it
    /// can accept messages.
    fn initialize(
        &self,
        identity: WorkerIdentity,
        host: Option<HostContextHandle>,
        ack: PendingAcknowledgment,
    );

    /// Fire-and-forget event delivery.
    fn emit(&self, event: &str, body: serde_json::Value);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_packages_come_first() {
        let caller = vec![Package::new("maps"), Package::new(CORE_PACKAGE)];
        let names: Vec<_> = package_list(&caller)
            .iter()
            .map(|p| p.name().to_string())
            .collect();
        assert_eq!(names, vec!["core", "worker-bridge", "maps", "core"]);
    }

    #[test]
    fn empty_caller_list() {
        assert_eq!(package_list(&[]).len(), 2);
    }
}
