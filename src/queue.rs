//! Offline request queue
//!
//! Holds request descriptors issued while offline and drains them in strict
//! submission order once connectivity returns. Draining is serialized by a
//! guard flag so flapping connectivity cannot start overlapping drains, and
//! entries are dispatched one at a time to preserve ordering dependencies
//! between queued mutations.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{oneshot, Mutex};
use tracing::{debug, warn};

use crate::error::ClientError;
use crate::http::RequestDescriptor;

/// Dispatch seam used while draining, so tests can drain without a network
#[async_trait]
pub trait QueueDispatcher: Send + Sync {
    /// Dispatch one queued request through the full request pipeline
    async fn dispatch_queued(&self, descriptor: &RequestDescriptor) -> Result<Value, ClientError>;
}

struct QueuedRequest {
    descriptor: RequestDescriptor,
    responder: oneshot::Sender<Result<Value, ClientError>>,
}

/// Awaitable handle for a queued request's eventual outcome
pub struct PendingRequest {
    receiver: oneshot::Receiver<Result<Value, ClientError>>,
}

impl PendingRequest {
    /// Await the queued request's outcome
    ///
    /// Resolves with [`ClientError::Cancelled`] if the queue was cleared
    /// before the entry was dispatched.
    pub async fn wait(self) -> Result<Value, ClientError> {
        self.receiver.await.unwrap_or(Err(ClientError::Cancelled))
    }
}

/// FIFO queue of requests awaiting connectivity
pub struct RequestQueue {
    entries: Mutex<VecDeque<QueuedRequest>>,
    draining: AtomicBool,
}

impl RequestQueue {
    /// Create an empty queue
    pub fn new() -> Self {
        Self { entries: Mutex::new(VecDeque::new()), draining: AtomicBool::new(false) }
    }

    /// Append a request, returning a handle for its eventual outcome
    pub async fn enqueue(&self, descriptor: RequestDescriptor) -> PendingRequest {
        let (responder, receiver) = oneshot::channel();
        let mut entries = self.entries.lock().await;
        entries.push_back(QueuedRequest { descriptor, responder });
        debug!(depth = entries.len(), "request queued for reconnect");
        PendingRequest { receiver }
    }

    /// Number of requests currently waiting
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    /// Whether the queue is empty
    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    /// Dispatch all queued requests in FIFO order, one at a time
    ///
    /// Idempotent and re-entrant safe: if a drain is already running, this
    /// call returns immediately. A failed entry resolves its own handle and
    /// does not stop the drain.
    pub async fn drain<D: QueueDispatcher + ?Sized>(&self, dispatcher: &D) {
        if self.draining.swap(true, Ordering::SeqCst) {
            debug!("queue drain already in progress");
            return;
        }

        loop {
            let next = self.entries.lock().await.pop_front();
            let Some(entry) = next else { break };

            let outcome = dispatcher.dispatch_queued(&entry.descriptor).await;
            if let Err(err) = &outcome {
                warn!(path = %entry.descriptor.path, error = %err, "queued request failed");
            }
            // Caller may have dropped its handle; nothing to deliver then.
            let _ = entry.responder.send(outcome);
        }

        self.draining.store(false, Ordering::SeqCst);
    }

    /// Discard all pending entries, rejecting their handles with `Cancelled`
    pub async fn clear(&self) {
        let mut entries = self.entries.lock().await;
        let discarded = entries.len();
        while let Some(entry) = entries.pop_front() {
            let _ = entry.responder.send(Err(ClientError::Cancelled));
        }
        if discarded > 0 {
            debug!(discarded, "request queue cleared");
        }
    }
}

impl Default for RequestQueue {
    fn default() -> Self {
        Self::new()
    }
}
