//! Resolve-once acknowledgment that a worker can receive messages.

use tokio::sync::oneshot;

use crate::error::LifecycleError;
use crate::worker::WorkerIdentity;

/// Sending half. Resolving consumes it, so it can only ever resolve once.
#[derive(Debug)]
pub struct PendingAcknowledgment {
    tx: oneshot::Sender<WorkerIdentity>,
}

/// Waiting half, held by whoever created the worker.
#[derive(Debug)]
pub struct AcknowledgmentReceiver {
    identity: WorkerIdentity,
    rx: oneshot::Receiver<WorkerIdentity>,
}

/// Create a linked acknowledgment pair for `identity`.
pub fn acknowledgment(identity: WorkerIdentity) -> (PendingAcknowledgment, AcknowledgmentReceiver) {
    let (tx, rx) = oneshot::channel();
    (
        PendingAcknowledgment { tx },
        AcknowledgmentReceiver { identity, rx },
    )
}

impl PendingAcknowledgment {
    /// Resolve with the identity of the started worker.
    /// Returns false if nobody is waiting anymore.
    pub fn resolve(self, identity: WorkerIdentity) -> bool {
        self.tx.send(identity).is_ok()
    }

    pub fn is_abandoned(&self) -> bool {
        self.tx.is_closed()
    }
}

impl AcknowledgmentReceiver {
    pub fn identity(&self) -> WorkerIdentity {
        self.identity
    }

    /// Wait until the worker is ready to receive messages.
    pub async fn wait(self) -> Result<WorkerIdentity, LifecycleError> {
        let identity = self.identity;
        self.rx
            .await
            .map_err(|_| LifecycleError::AcknowledgmentDropped { identity })
    }

    /// Non-blocking check. `Ok(None)` while still pending.
    pub fn try_resolved(&mut self) -> Result<Option<WorkerIdentity>, LifecycleError> {
        match self.rx.try_recv() {
            Ok(identity) => Ok(Some(identity)),
            Err(oneshot::error::TryRecvError::Empty) => Ok(None),
            Err(oneshot::error::TryRecvError::Closed) => Err(LifecycleError::AcknowledgmentDropped {
                identity: self.identity,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn resolves_with_identity() {
        let (pending, receiver) = acknowledgment(WorkerIdentity(7));
        assert!(pending.resolve(WorkerIdentity(7)));
        assert_eq!(receiver.wait().await.unwrap(), WorkerIdentity(7));
    }

    #[tokio::test]
    async fn dropped_pending_reports_error() {
        let (pending, receiver) = acknowledgment(WorkerIdentity(3));
        drop(pending);
        let err = receiver.wait().await.unwrap_err();
        assert!(matches!(
            err,
            LifecycleError::AcknowledgmentDropped {
                identity: WorkerIdentity(3)
            }
        ));
    }

    #[test]
    fn try_resolved_is_pending_until_sent() {
        let (pending, mut receiver) = acknowledgment(WorkerIdentity(1));
        assert_eq!(receiver.try_resolved().unwrap(), None);
        pending.resolve(WorkerIdentity(1));
        assert_eq!(receiver.try_resolved().unwrap(), Some(WorkerIdentity(1)));
    }

    #[test]
    fn abandoned_when_receiver_dropped() {
        let (pending, receiver) = acknowledgment(WorkerIdentity(2));
        assert!(!pending.is_abandoned());
        drop(receiver);
        assert!(pending.is_abandoned());
        assert!(!pending.resolve(WorkerIdentity(2)));
    }
}
