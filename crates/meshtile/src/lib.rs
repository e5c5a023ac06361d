//! Decode compressed mesh tiles on a pool of worker threads.
//!
//! A host hands raw tile bytes to a [`PoolClient`]; a worker parses them
//! with an external [`TileParser`], runs the attribute [`pipeline`] and
//! replies with a [`DecodedTile`] whose buffers are ready for upload. The
//! host never blocks on decompression.
//!
//! # Example
//!
//! ```no_run
//! use meshtile::{ParsedTile, PoolConfig, Result, WorkerPool};
//!
//! # async fn run() -> Result<()> {
//! let pool = WorkerPool::new(PoolConfig::default().size(4), || -> Result<_> {
//!     Ok(|_buffer: Vec<u8>, _path: &str| -> Result<ParsedTile> {
//!         Ok(ParsedTile::default())
//!     })
//! })?;
//! pool.wait_ready().await?;
//!
//! let loader = pool.client();
//! let tile = loader.decode(vec![0u8; 16], "tiles/").await?;
//! println!("{} buffers to upload", tile.transferables.len());
//! # Ok(())
//! # }
//! ```

mod client;
mod correlator;
mod error;
mod worker;

pub mod mesh;
pub mod message;
pub mod parser;
pub mod pipeline;
pub mod pool;
pub mod transfer;

pub use client::PoolClient;
pub use error::{Error, Result};
pub use mesh::{
    AttributeBuffer, DecodeStats, DecodedTile, MeshRecord, ParsedTile, PrimitiveRecord,
};
pub use message::{ClientId, DecodeRequest, RequestId};
pub use parser::{ParserFactory, TileParser};
pub use pipeline::decode_tile;
pub use pool::{PoolConfig, WorkerHandle, WorkerPool, WorkerState, clamp_pool_size};
pub use transfer::TransferList;

pub use meshtile_decode as decode;
