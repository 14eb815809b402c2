//! Host execution context lookup.

use std::sync::{Arc, Weak};

/// A live host execution context (the foreground screen of the host app).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostContext {
    /// Host-assigned identifier.
    pub id: u64,
    /// Human readable name, used in logs.
    pub label: String,
}

impl HostContext {
    pub fn new(id: u64, label: impl Into<String>) -> Self {
        Self {
            id,
            label: label.into(),
        }
    }
}

/// Non-owning reference to a host context.
///
/// The host may tear the context down at any time; `get` then returns `None`.
#[derive(Debug, Clone)]
pub struct HostContextHandle {
    inner: Weak<HostContext>,
}

impl HostContextHandle {
    pub fn new(context: &Arc<HostContext>) -> Self {
        Self {
            inner: Arc::downgrade(context),
        }
    }

    /// Upgrade to the live context, if it still exists.
    pub fn get(&self) -> Option<Arc<HostContext>> {
        self.inner.upgrade()
    }

    pub fn is_attached(&self) -> bool {
        self.inner.strong_count() > 0
    }
}

impl From<&Arc<HostContext>> for HostContextHandle {
    fn from(context: &Arc<HostContext>) -> Self {
        Self::new(context)
    }
}

/// Queries the host for its current execution context. Must not have side effects.
pub trait ExecutionContextProbe: Send + Sync {
    fn current_context(&self) -> Option<HostContextHandle>;
}
