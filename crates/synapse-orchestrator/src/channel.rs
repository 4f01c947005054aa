//! Live progress channel: at most one observer per session.
//!
//! Binding hands the observer the receiving half of a bounded queue. Publishing never
//! waits on the observer: an unbound session or a full queue discards the event, and
//! nothing is buffered for observers that attach later.

use crate::error::{OrchestrationError, Result};
use crate::events::ProgressEvent;
use crate::session::SessionId;
use std::collections::HashMap;
use std::fmt;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{RwLock, mpsc};
use tracing::{debug, warn};

/// Receiving end held by the attached observer.
#[derive(Debug)]
pub struct Observer {
    session_id: SessionId,
    receiver: mpsc::Receiver<ProgressEvent>,
}

impl Observer {
    #[must_use]
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// Next event in production order, or `None` once the binding is released.
    pub async fn recv(&mut self) -> Option<ProgressEvent> {
        self.receiver.recv().await
    }
}

pub struct ProgressChannel {
    bindings: RwLock<HashMap<SessionId, mpsc::Sender<ProgressEvent>>>,
    buffer: usize,
}

impl fmt::Debug for ProgressChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressChannel")
            .field("bound", &self.bindings.try_read().map(|b| b.len()).unwrap_or(0))
            .field("buffer", &self.buffer)
            .finish()
    }
}

impl ProgressChannel {
    #[must_use]
    pub fn new(buffer: usize) -> Self {
        Self { bindings: RwLock::new(HashMap::new()), buffer: buffer.max(1) }
    }

    /// Binds an observer to `session_id`.
    ///
    /// A binding whose observer has already dropped its receiver counts as released.
    pub async fn bind(&self, session_id: &SessionId) -> Result<Observer> {
        let mut bindings = self.bindings.write().await;
        if let Some(existing) = bindings.get(session_id) {
            if !existing.is_closed() {
                return Err(OrchestrationError::SessionBusy(session_id.clone()));
            }
        }
        let (sender, receiver) = mpsc::channel(self.buffer);
        bindings.insert(session_id.clone(), sender);
        debug!(session_id = %session_id, "Observer bound");
        Ok(Observer { session_id: session_id.clone(), receiver })
    }

    /// Delivers `event` to the bound observer. Returns whether it was queued.
    ///
    /// An observer that stops reading loses events once its queue is full.
    pub async fn publish(&self, session_id: &SessionId, event: ProgressEvent) -> bool {
        let sender = self.bindings.read().await.get(session_id).cloned();
        let Some(sender) = sender else {
            debug!(session_id = %session_id, "No observer bound, discarding event");
            return false;
        };
        match sender.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!(
                    session_id = %session_id,
                    buffer = self.buffer,
                    "Observer queue full, dropping event"
                );
                false
            }
            Err(TrySendError::Closed(_)) => {
                debug!(session_id = %session_id, "Observer went away, releasing binding");
                self.release_if_closed(session_id).await;
                false
            }
        }
    }

    /// Releases the binding. Unbinding an unbound session is a no-op.
    pub async fn unbind(&self, session_id: &SessionId) {
        if self.bindings.write().await.remove(session_id).is_some() {
            debug!(session_id = %session_id, "Observer unbound");
        }
    }

    pub async fn is_bound(&self, session_id: &SessionId) -> bool {
        self.bindings.read().await.get(session_id).is_some_and(|s| !s.is_closed())
    }

    async fn release_if_closed(&self, session_id: &SessionId) {
        let mut bindings = self.bindings.write().await;
        if bindings.get(session_id).is_some_and(mpsc::Sender::is_closed) {
            bindings.remove(session_id);
        }
    }
}
