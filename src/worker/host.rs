//! WorkerHost — worker configuration and the lazily built engine.

use std::sync::Arc;

use tracing::info;

use crate::config::WorkerConfig;
use crate::error::Result;
use crate::host::HostContextHandle;
use crate::worker::engine::{EngineFactory, EngineInstance, EngineOptions, Package};

/// Owns the worker's configuration and builds its engine exactly once.
pub struct WorkerHost {
    config: WorkerConfig,
    packages: Vec<Package>,
    factory: Arc<dyn EngineFactory>,
    /// Context the host was built against.
    host: HostContextHandle,
    engine: Option<Box<dyn EngineInstance>>,
}

impl WorkerHost {
    /// `packages` is the full ordered list, base packages included.
    pub fn new(
        config: WorkerConfig,
        packages: Vec<Package>,
        factory: Arc<dyn EngineFactory>,
        host: HostContextHandle,
    ) -> Self {
        Self {
            config,
            packages,
            factory,
            host,
            engine: None,
        }
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub fn packages(&self) -> &[Package] {
        &self.packages
    }

    pub fn host_context(&self) -> &HostContextHandle {
        &self.host
    }

    pub fn options(&self) -> Result<EngineOptions> {
        Ok(EngineOptions {
            entry_module: self.config.entry_module.clone(),
            bundle: self.config.bundle_source()?,
            developer_support: self.config.use_developer_support(),
        })
    }

    /// The engine, building it on first use.
    pub fn engine(&mut self) -> Result<&mut Box<dyn EngineInstance>> {
        let engine = match self.engine.take() {
            Some(engine) => engine,
            None => {
                let options = self.options()?;
                let engine = self.factory.build(&options, &self.packages)?;
                info!(
                    entry_module = %options.entry_module,
                    packages = self.packages.len(),
                    "Engine built"
                );
                engine
            }
        };
        Ok(self.engine.insert(engine))
    }

    /// The engine if it has been built, without building it.
    pub fn built_engine(&mut self) -> Option<&mut Box<dyn EngineInstance>> {
        self.engine.as_mut()
    }

    pub fn engine_ref(&self) -> Option<&dyn EngineInstance> {
        self.engine.as_deref()
    }

    pub fn has_engine(&self) -> bool {
        self.engine.is_some()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::BundleSource;
    use crate::host::HostContext;
    use crate::testing::FakeEngineFactory;
    use crate::worker::engine::package_list;

    fn worker_host(factory: Arc<FakeEngineFactory>, context: &Arc<HostContext>) -> WorkerHost {
        WorkerHost::new(
            WorkerConfig::new("index").with_bundle_resource("worker"),
            package_list(&[Package::new("sqlite")]),
            factory,
            HostContextHandle::from(context),
        )
    }

    #[test]
    fn engine_built_lazily_once() {
        let (factory, recorder) = FakeEngineFactory::new();
        let context = Arc::new(HostContext::new(1, "main"));
        let mut host = worker_host(factory, &context);

        assert!(!host.has_engine());
        assert!(host.built_engine().is_none());
        assert_eq!(recorder.builds(), 0);

        host.engine().unwrap();
        host.engine().unwrap();
        assert!(host.has_engine());
        assert_eq!(recorder.builds(), 1);
        assert_eq!(recorder.packages(), vec!["core", "worker-bridge", "sqlite"]);
    }

    #[test]
    fn options_follow_config() {
        let (factory, recorder) = FakeEngineFactory::new();
        let context = Arc::new(HostContext::new(1, "main"));
        let mut host = worker_host(factory, &context);
        host.engine().unwrap();

        let options = recorder.options().unwrap();
        assert_eq!(options.entry_module, "index");
        assert_eq!(
            options.bundle,
            BundleSource::Asset {
                name: "worker.bundle".to_string()
            }
        );
        assert!(!options.developer_support);
    }

    #[test]
    fn build_failure_surfaces() {
        let (factory, recorder) = FakeEngineFactory::new();
        recorder.fail_builds("bundle missing");
        let context = Arc::new(HostContext::new(1, "main"));
        let mut host = worker_host(factory, &context);

        assert!(matches!(host.engine(), Err(crate::error::Error::Engine(_))));
        assert!(!host.has_engine());
    }
}
