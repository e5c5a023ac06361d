//! Messages exchanged between the pool and its workers.
//!
//! Requests and replies are moved through channels, so the raw tile bytes
//! and decoded buffers change owner without being copied.

use std::fmt;

use crate::mesh::DecodedTile;

/// Identifies the logical loader that issued a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(pub u64);

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Caller-assigned correlation id, echoed verbatim by the worker.
pub type RequestId = u64;

/// Key under which a pending request waits for its reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestKey {
    pub client_id: ClientId,
    pub request_id: RequestId,
}

/// One tile to decode.
#[derive(Debug)]
pub struct DecodeRequest {
    pub request_id: RequestId,
    pub client_id: ClientId,
    /// Raw tile bytes. Ownership moves to the worker.
    pub buffer: Vec<u8>,
    /// Base path handed to the parser for relative references.
    pub source_path: String,
}

impl DecodeRequest {
    #[must_use]
    pub fn key(&self) -> RequestKey {
        RequestKey {
            client_id: self.client_id,
            request_id: self.request_id,
        }
    }
}

/// Pool to worker.
#[derive(Debug)]
pub enum WorkerRequest {
    /// Parse and decode one tile.
    DecodeTile(DecodeRequest),
}

/// Result of one request.
#[derive(Debug)]
pub enum DecodeOutcome {
    Success(DecodedTile),
    Failure(String),
}

/// Worker reply to a [`WorkerRequest::DecodeTile`].
#[derive(Debug)]
pub struct DecodeResponse {
    pub request_id: RequestId,
    pub client_id: ClientId,
    pub outcome: DecodeOutcome,
}

impl DecodeResponse {
    #[must_use]
    pub fn key(&self) -> RequestKey {
        RequestKey {
            client_id: self.client_id,
            request_id: self.request_id,
        }
    }
}

/// Worker to pool.
#[derive(Debug)]
pub enum WorkerMessage {
    /// Sent once, after the worker's parser has booted.
    Ready,
    /// Sent instead of `Ready` when booting failed. The worker then exits.
    BootFailed { error: String },
    Response(DecodeResponse),
}

/// A [`WorkerMessage`] tagged with the slot that sent it.
#[derive(Debug)]
pub struct WorkerEvent {
    pub slot: usize,
    pub message: WorkerMessage,
}
