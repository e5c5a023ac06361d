//! Logical loaders sharing one pool.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::Result;
use crate::mesh::DecodedTile;
use crate::message::{ClientId, DecodeRequest, RequestId};
use crate::pool::WorkerPool;

/// One logical loader on a shared [`WorkerPool`].
///
/// Request ids are unique and increasing per client, so replies from a
/// worker serving several clients are routed to the right caller.
#[derive(Debug)]
pub struct PoolClient {
    pool: WorkerPool,
    id: ClientId,
    next_request: AtomicU64,
}

impl PoolClient {
    pub(crate) fn new(pool: WorkerPool, id: ClientId) -> Self {
        Self {
            pool,
            id,
            next_request: AtomicU64::new(0),
        }
    }

    #[must_use]
    pub fn id(&self) -> ClientId {
        self.id
    }

    #[must_use]
    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    /// Allocate the next request id.
    pub fn next_request_id(&self) -> RequestId {
        self.next_request.fetch_add(1, Ordering::Relaxed)
    }

    /// Decode one raw tile on the next worker in rotation.
    pub async fn decode(
        &self,
        buffer: Vec<u8>,
        source_path: impl Into<String>,
    ) -> Result<DecodedTile> {
        let worker = self.pool.acquire_worker()?;
        let request = DecodeRequest {
            request_id: self.next_request_id(),
            client_id: self.id,
            buffer,
            source_path: source_path.into(),
        };
        self.pool.submit(worker, request).await
    }
}
