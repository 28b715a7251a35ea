//! Correlation of relayed requests with their responses.
//!
//! Every waiting request owns a oneshot slot keyed by `reqId`. The slot is
//! removed exactly once, either by the response dispatcher or by the
//! waiter's deadline, and the removal happens under the map lock together
//! with the send. Whoever loses the race sees a no-op. A waiter that is
//! cancelled (its HTTP client went away) still removes its slot on drop.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::oneshot;
use tracing::debug;

use super::types::RelayedResponse;
use crate::error::TunnelError;
use crate::Result;

/// Receiving half of a registered request.
#[derive(Debug)]
pub struct PendingResponse {
    req_id: String,
    rx: oneshot::Receiver<RelayedResponse>,
}

impl PendingResponse {
    pub fn req_id(&self) -> &str {
        &self.req_id
    }
}

/// Removes a slot when its waiter finishes or is dropped mid-wait.
struct SlotGuard<'a> {
    slots: &'a Mutex<HashMap<String, oneshot::Sender<RelayedResponse>>>,
    req_id: String,
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        if let Ok(mut slots) = self.slots.lock() {
            slots.remove(&self.req_id);
        }
    }
}

/// Set of requests waiting for a relayed response.
#[derive(Debug, Default)]
pub struct PendingRequests {
    slots: Mutex<HashMap<String, oneshot::Sender<RelayedResponse>>>,
}

impl PendingRequests {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `req_id` before its request is relayed.
    pub fn register(&self, req_id: impl Into<String>) -> Result<PendingResponse> {
        let req_id = req_id.into();
        let mut slots = self.slots.lock().map_err(|_| TunnelError::LockPoisoned)?;
        if slots.contains_key(&req_id) {
            return Err(TunnelError::DuplicateRequest(req_id));
        }
        let (tx, rx) = oneshot::channel();
        slots.insert(req_id.clone(), tx);
        Ok(PendingResponse { req_id, rx })
    }

    /// Hand `response` to its waiter.
    ///
    /// Returns `false` when no request with that id is waiting any more.
    pub fn complete(&self, response: RelayedResponse) -> bool {
        let Ok(mut slots) = self.slots.lock() else {
            return false;
        };
        match slots.remove(&response.req_id) {
            Some(tx) => tx.send(response).is_ok(),
            None => false,
        }
    }

    /// Wait for the response of `pending`, or synthesize a 504 once
    /// `timeout` elapses.
    pub async fn wait(&self, pending: PendingResponse, timeout: Duration) -> RelayedResponse {
        let PendingResponse { req_id, mut rx } = pending;
        let _guard = SlotGuard {
            slots: &self.slots,
            req_id: req_id.clone(),
        };

        match tokio::time::timeout(timeout, &mut rx).await {
            Ok(Ok(response)) => return response,
            Ok(Err(_)) => debug!(req_id = %req_id, "pending slot dropped"),
            Err(_) => debug!(req_id = %req_id, "relayed request timed out"),
        }

        let still_waiting = self
            .slots
            .lock()
            .map(|mut slots| slots.remove(&req_id).is_some())
            .unwrap_or(true);
        if !still_waiting {
            // The dispatcher won the race and already sent under the lock.
            if let Ok(response) = rx.try_recv() {
                return response;
            }
        }
        RelayedResponse::timeout(req_id)
    }

    /// Number of requests still waiting.
    pub fn len(&self) -> usize {
        self.slots.lock().map(|slots| slots.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
