//! Seam to the external mesh-format parser.
//!
//! Container parsing (glTF JSON, binary chunks, the Draco bitstream) lives
//! outside this crate. A parser turns raw tile bytes into a [`ParsedTile`]
//! whose attributes still carry their quantization descriptors.

use crate::error::Result;
use crate::mesh::ParsedTile;

/// Parses one raw tile buffer.
///
/// A parser is created inside its worker thread and never leaves it, so it
/// does not need to be `Send`.
pub trait TileParser {
    /// Parse `buffer`. `source_path` is the base for resolving relative
    /// references inside the tile.
    fn parse(&mut self, buffer: Vec<u8>, source_path: &str) -> Result<ParsedTile>;
}

impl<F> TileParser for F
where
    F: FnMut(Vec<u8>, &str) -> Result<ParsedTile>,
{
    fn parse(&mut self, buffer: Vec<u8>, source_path: &str) -> Result<ParsedTile> {
        self(buffer, source_path)
    }
}

/// Loads a worker's decode dependencies.
///
/// `boot` runs once per worker, on the worker's own thread. An error marks
/// that worker as permanently unusable.
pub trait ParserFactory: Send + Sync + 'static {
    fn boot(&self) -> Result<Box<dyn TileParser>>;
}

impl<F, P> ParserFactory for F
where
    F: Fn() -> Result<P> + Send + Sync + 'static,
    P: TileParser + 'static,
{
    fn boot(&self) -> Result<Box<dyn TileParser>> {
        Ok(Box::new(self()?))
    }
}
