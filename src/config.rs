//! Configuration types.

use std::time::Duration;

use crate::error::ConfigError;

/// Delay between attempts while waiting for a host context.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(75);

/// Per-worker configuration supplied by the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerConfig {
    /// Module the engine evaluates first.
    pub entry_module: String,
    /// Packaged bundle name, without the `.bundle` suffix.
    pub bundle_resource: Option<String>,
    /// Port of a local development server serving the bundle.
    pub dev_server_port: Option<u16>,
}

/// Where the engine loads its bundle from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BundleSource {
    /// Packaged asset shipped with the host.
    Asset { name: String },
    /// Bundle served by a development server.
    DevServer { url: String },
}

impl WorkerConfig {
    /// Create a config for the given entry module.
    pub fn new(entry_module: impl Into<String>) -> Self {
        Self {
            entry_module: entry_module.into(),
            bundle_resource: None,
            dev_server_port: None,
        }
    }

    pub fn with_bundle_resource(mut self, resource: impl Into<String>) -> Self {
        self.bundle_resource = Some(resource.into());
        self
    }

    pub fn with_dev_server_port(mut self, port: u16) -> Self {
        self.dev_server_port = Some(port);
        self
    }

    /// Check that the engine will be able to locate a bundle.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.entry_module.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "entry_module".to_string(),
                message: "must not be empty".to_string(),
            });
        }
        if self.bundle_resource.is_none() && self.dev_server_port.is_none() {
            return Err(ConfigError::MissingRequired {
                key: "bundle_resource".to_string(),
                hint: "Set a bundle resource or a dev server port.".to_string(),
            });
        }
        Ok(())
    }

    /// The asset file name for the packaged bundle.
    pub fn bundle_asset_name(&self) -> Option<String> {
        self.bundle_resource
            .as_ref()
            .map(|resource| format!("{resource}.bundle"))
    }

    /// Resolve the bundle source. The dev server wins when both are set.
    pub fn bundle_source(&self) -> Result<BundleSource, ConfigError> {
        self.validate()?;
        if let Some(port) = self.dev_server_port {
            return Ok(BundleSource::DevServer {
                url: format!("http://localhost:{}/{}.bundle", port, self.entry_module),
            });
        }
        match self.bundle_asset_name() {
            Some(name) => Ok(BundleSource::Asset { name }),
            None => Err(ConfigError::MissingRequired {
                key: "bundle_resource".to_string(),
                hint: "Set a bundle resource or a dev server port.".to_string(),
            }),
        }
    }

    /// Developer tooling is only enabled against a dev server.
    pub fn use_developer_support(&self) -> bool {
        self.dev_server_port.is_some()
    }
}

/// Lifecycle controller settings.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Fixed delay between initialization/start retries.
    pub retry_delay: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }
}

impl ControllerConfig {
    /// Read settings from the environment, falling back to defaults.
    pub fn from_env() -> Self {
        let retry_delay = parse_millis(std::env::var("WORKERS_RETRY_DELAY_MS").ok().as_deref())
            .unwrap_or(DEFAULT_RETRY_DELAY);

        Self { retry_delay }
    }
}

fn parse_millis(raw: Option<&str>) -> Option<Duration> {
    raw.and_then(|s| s.trim().parse::<u64>().ok())
        .filter(|ms| *ms > 0)
        .map(Duration::from_millis)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn asset_bundle_name_has_suffix() {
        let config = WorkerConfig::new("index").with_bundle_resource("worker");
        assert_eq!(config.bundle_asset_name().as_deref(), Some("worker.bundle"));
        assert_eq!(
            config.bundle_source().unwrap(),
            BundleSource::Asset {
                name: "worker.bundle".to_string()
            }
        );
        assert!(!config.use_developer_support());
    }

    #[test]
    fn dev_server_takes_precedence() {
        let config = WorkerConfig::new("worker")
            .with_bundle_resource("worker")
            .with_dev_server_port(8081);
        assert_eq!(
            config.bundle_source().unwrap(),
            BundleSource::DevServer {
                url: "http://localhost:8081/worker.bundle".to_string()
            }
        );
        assert!(config.use_developer_support());
    }

    #[test]
    fn config_without_bundle_is_rejected() {
        let err = WorkerConfig::new("index").validate().unwrap_err();
        assert!(matches!(err, ConfigError::MissingRequired { .. }));
    }

    #[test]
    fn empty_entry_module_is_rejected() {
        let err = WorkerConfig::new("  ")
            .with_bundle_resource("worker")
            .validate()
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn retry_delay_parsing() {
        assert_eq!(parse_millis(Some("20")), Some(Duration::from_millis(20)));
        assert_eq!(parse_millis(Some(" 5 ")), Some(Duration::from_millis(5)));
        assert_eq!(parse_millis(Some("0")), None);
        assert_eq!(parse_millis(Some("soon")), None);
        assert_eq!(parse_millis(None), None);
        assert_eq!(ControllerConfig::default().retry_delay, Duration::from_millis(75));
    }
}
