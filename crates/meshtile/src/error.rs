//! Error types for tile decoding and worker dispatch.

use meshtile_decode::DecodeError;
use thiserror::Error;

/// Result alias for this crate.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// An attribute stream could not be decoded.
    #[error("attribute {name}: {source}")]
    Attribute {
        name: String,
        #[source]
        source: DecodeError,
    },

    /// Decoding failed outside a named attribute (e.g. normal synthesis).
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// The external mesh-format parser rejected the tile.
    #[error("parse error: {0}")]
    Parse(String),

    /// A primitive carries attributes but no positions.
    #[error("primitive {primitive} of mesh {mesh} has no POSITION attribute")]
    MissingPosition { mesh: usize, primitive: usize },

    /// A worker could not load its decode dependencies.
    #[error("worker {slot} failed to boot: {message}")]
    WorkerBoot { slot: usize, message: String },

    /// Every worker in the pool failed to boot or was terminated.
    #[error("no usable workers in the pool")]
    NoUsableWorkers,

    /// The handle does not name a worker of this pool.
    #[error("unknown worker slot {0}")]
    UnknownWorker(usize),

    /// A request with the same client and request id is still pending.
    #[error("request {request_id} from client {client_id} is already in flight")]
    DuplicateRequest { client_id: u64, request_id: u64 },

    /// The worker replied with a failure.
    #[error("decode failed in worker: {0}")]
    Remote(String),

    /// The worker's inbound queue is closed.
    #[error("worker {0} is no longer accepting requests")]
    ChannelClosed(usize),

    /// The pool was released before the request completed.
    #[error("worker pool terminated")]
    PoolTerminated,

    /// A worker thread could not be started.
    #[error("failed to spawn thread: {0}")]
    Spawn(#[from] std::io::Error),
}
