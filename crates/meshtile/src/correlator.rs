//! Correlates worker replies with waiting callers.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::oneshot;

use crate::error::{Error, Result};
use crate::mesh::DecodedTile;
use crate::message::{DecodeOutcome, DecodeResponse, RequestKey};

/// Requests submitted to a worker and not yet answered.
///
/// Each entry is a single-assignment reply slot; the first reply for a key
/// wins and any later one finds nothing to resolve.
#[derive(Debug, Default)]
pub(crate) struct PendingRequests {
    slots: Mutex<HashMap<RequestKey, oneshot::Sender<DecodeOutcome>>>,
}

impl PendingRequests {
    fn slots(&self) -> MutexGuard<'_, HashMap<RequestKey, oneshot::Sender<DecodeOutcome>>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Open a reply slot for `key`.
    pub(crate) fn register(self: &Arc<Self>, key: RequestKey) -> Result<PendingReply> {
        let mut slots = self.slots();
        if slots.contains_key(&key) {
            return Err(Error::DuplicateRequest {
                client_id: key.client_id.0,
                request_id: key.request_id,
            });
        }
        let (tx, rx) = oneshot::channel();
        slots.insert(key, tx);
        Ok(PendingReply {
            key,
            rx,
            pending: Arc::clone(self),
            settled: false,
        })
    }

    /// Deliver a reply. Returns `false` if nobody is waiting for it.
    pub(crate) fn resolve(&self, response: DecodeResponse) -> bool {
        let Some(tx) = self.slots().remove(&response.key()) else {
            return false;
        };
        // The receiver may have been dropped between removal and send.
        tx.send(response.outcome).is_ok()
    }

    pub(crate) fn forget(&self, key: RequestKey) {
        self.slots().remove(&key);
    }

    /// Drop every open slot. Waiting callers observe termination.
    pub(crate) fn clear(&self) -> usize {
        let mut slots = self.slots();
        let count = slots.len();
        slots.clear();
        count
    }

    pub(crate) fn len(&self) -> usize {
        self.slots().len()
    }
}

/// Caller side of one pending request.
///
/// Dropping it before the reply arrives removes the slot, so the late reply
/// is discarded as unmatched.
#[derive(Debug)]
pub(crate) struct PendingReply {
    key: RequestKey,
    rx: oneshot::Receiver<DecodeOutcome>,
    pending: Arc<PendingRequests>,
    settled: bool,
}

impl PendingReply {
    pub(crate) async fn wait(mut self) -> Result<DecodedTile> {
        let outcome = (&mut self.rx).await;
        self.settled = true;
        match outcome {
            Ok(DecodeOutcome::Success(tile)) => Ok(tile),
            Ok(DecodeOutcome::Failure(message)) => Err(Error::Remote(message)),
            Err(_) => Err(Error::PoolTerminated),
        }
    }
}

impl Drop for PendingReply {
    fn drop(&mut self) {
        if !self.settled {
            self.pending.forget(self.key);
        }
    }
}
