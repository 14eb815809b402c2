//! Host → worker message delivery.

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::error::{ChannelError, LifecycleError, Result};
use crate::worker::engine::{EngineInstance, MESSAGE_EVENT, MESSAGE_RECEIVER};
use crate::worker::WorkerIdentity;

/// Wire shape of a message as seen by the worker's receiver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageEnvelope {
    pub key: WorkerIdentity,
    pub message: String,
}

/// Delivers envelopes for one worker.
#[derive(Debug, Clone, Copy)]
pub struct MessageChannel {
    identity: WorkerIdentity,
}

impl MessageChannel {
    pub fn new(identity: WorkerIdentity) -> Self {
        Self { identity }
    }

    /// Hand `payload` to the worker's registered receiver. No receipt is awaited.
    pub fn deliver(&self, engine: &dyn EngineInstance, payload: &str) -> Result<()> {
        let context = engine
            .current_worker_context()
            .ok_or_else(|| self.not_ready("engine has no worker context"))?;
        let receiver = context
            .receiver(MESSAGE_RECEIVER)
            .ok_or_else(|| self.not_ready("no message receiver registered"))?;

        let envelope = MessageEnvelope {
            key: self.identity,
            message: payload.to_string(),
        };
        let body = serde_json::to_value(&envelope).map_err(ChannelError::from)?;
        receiver.emit(MESSAGE_EVENT, body);

        trace!(worker = %self.identity, bytes = payload.len(), "Message delivered");
        Ok(())
    }

    fn not_ready(&self, reason: &str) -> LifecycleError {
        LifecycleError::NotReady {
            identity: self.identity,
            reason: reason.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::config::BundleSource;
    use crate::testing::FakeEngineFactory;
    use crate::worker::engine::{EngineFactory, EngineOptions};

    fn options() -> EngineOptions {
        EngineOptions {
            entry_module: "index".to_string(),
            bundle: BundleSource::Asset {
                name: "worker.bundle".to_string(),
            },
            developer_support: false,
        }
    }

    #[test]
    fn envelope_shape() {
        let envelope = MessageEnvelope {
            key: WorkerIdentity(42),
            message: "hello".to_string(),
        };
        assert_eq!(
            serde_json::to_value(&envelope).unwrap(),
            json!({"key": 42, "message": "hello"})
        );
    }

    #[test]
    fn delivers_to_registered_receiver() {
        let (factory, recorder) = FakeEngineFactory::new();
        let mut engine = factory.build(&options(), &[]).unwrap();
        engine.create_context_in_background();

        MessageChannel::new(WorkerIdentity(9))
            .deliver(&*engine, "ping")
            .unwrap();

        assert_eq!(
            recorder.receiver().emitted(),
            vec![("message".to_string(), json!({"key": 9, "message": "ping"}))]
        );
    }

    #[test]
    fn no_context_is_not_ready() {
        let (factory, _recorder) = FakeEngineFactory::new();
        let engine = factory.build(&options(), &[]).unwrap();

        let err = MessageChannel::new(WorkerIdentity(9))
            .deliver(&*engine, "ping")
            .unwrap_err();
        assert!(err.is_not_ready());
    }

    #[test]
    fn missing_receiver_is_not_ready() {
        let (factory, recorder) = FakeEngineFactory::new();
        recorder.without_receiver();
        let mut engine = factory.build(&options(), &[]).unwrap();
        engine.create_context_in_background();

        let err = MessageChannel::new(WorkerIdentity(9))
            .deliver(&*engine, "ping")
            .unwrap_err();
        assert!(err.is_not_ready());
        assert!(recorder.receiver().emitted().is_empty());
    }
}
