//! Protocol constants and runtime configuration for the armor container.
//!
//! The constants fix the wire layout; [`ArmorConfig`] carries the knobs a
//! caller may choose per stream (shard counts and telomere length) and is
//! passed explicitly into the assembler and the reconstructor.

use crate::error::ArmorError;

/// Application name used in user interfaces.
pub const APP_NAME: &str = "sane-armor";

/// File extension appended to armored output.
pub const FILE_EXTENSION: &str = ".armor";

/// Output template used when the caller names a directory or nothing at all.
pub const DEFAULT_OUTPUT_TEMPLATE: &str = "{year}-{month}-{day}-{hash}.armor";

// === Block layer ===

/// Payload capacity of a single block in bytes.
pub const BLOCK_CAPACITY: usize = 512;

/// Size of every checksum written to the stream (CRC-32, big-endian).
pub const CHECKSUM_SIZE: usize = 4;

/// Size of a sealed, full block: payload followed by its checksum.
pub const SEALED_BLOCK_SIZE: usize = BLOCK_CAPACITY + CHECKSUM_SIZE;

// === Group layer ===

/// Encoded size of a `ReedSolomonMeta` header.
pub const META_SIZE: usize = 5;

/// Encoded size of a `ShardTag`.
pub const TAG_SIZE: usize = 10;

/// Capacity of a decode-side `Slice`.
pub const SLICE_CAPACITY: usize = BLOCK_CAPACITY + META_SIZE + CHECKSUM_SIZE;

/// Meta frame on the wire: tag, meta header, checksum over both.
pub const META_FRAME_SIZE: usize = TAG_SIZE + META_SIZE + CHECKSUM_SIZE;

/// Fragment frame carrying one full-size sealed block worth of body.
pub const FULL_FRAME_SIZE: usize = TAG_SIZE + SEALED_BLOCK_SIZE + CHECKSUM_SIZE;

/// Smallest fragment frame: fragment bodies are at least two bytes.
pub const MIN_FRAME_SIZE: usize = TAG_SIZE + 2 + CHECKSUM_SIZE;

/// Current framing protocol version, stamped into every tag.
pub const PROTOCOL_VERSION: u8 = 1;

/// A fragment index is a single byte.
pub const SHARD_LIMIT: usize = 256;

/// Largest jump in group numbers whose missing groups are reported one by one.
pub const MAX_SEQUENCE_GAP: u64 = SHARD_LIMIT as u64;

/// Default number of data fragments per group.
pub const DEFAULT_REQUIRED_SHARDS: u8 = 4;

/// Default number of parity fragments per group.
pub const DEFAULT_REDUNDANT_SHARDS: u8 = 2;

// === Telomere layer ===

/// Byte repeated to form a group boundary.
pub const TELOMERE_MARKER: u8 = b':';

/// Byte that protects in-band marker and escape bytes.
pub const TELOMERE_ESCAPE: u8 = b'\\';

/// Default number of marker bytes in a boundary.
pub const DEFAULT_TELOMERE_LENGTH: usize = 8;

/// A short run is a damaged boundary once it holds more markers than this.
pub const BOUNDARY_MARKER_THRESHOLD: usize = 6;

/// Shortest telomere the boundary classifier can still recognise.
pub const MIN_TELOMERE_LENGTH: usize = BOUNDARY_MARKER_THRESHOLD + 1;

/// Longest telomere for which a sealed meta frame still passes `Slice` validation.
pub const MAX_TELOMERE_LENGTH: usize = META_FRAME_SIZE - 2 * CHECKSUM_SIZE;

// === Streaming ===

/// Number of in-flight chunks between a producer and the assembler.
pub const PIPE_CAPACITY: usize = 8;

/// Size of each chunk a producer pushes through the pipe.
pub const PIPE_CHUNK_SIZE: usize = 64 * 1024;

/// Per-stream framing parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArmorConfig {
    /// Data fragments per group.
    pub required_shards: u8,

    /// Parity fragments per group.
    pub redundant_shards: u8,

    /// Marker bytes per boundary.
    pub telomere_length: usize,
}

impl ArmorConfig {
    pub fn new(required_shards: u8, redundant_shards: u8, telomere_length: usize) -> Result<Self, ArmorError> {
        let config = Self { required_shards, redundant_shards, telomere_length };
        config.validate()?;
        Ok(config)
    }

    #[inline]
    pub fn total_shards(&self) -> usize {
        usize::from(self.required_shards) + usize::from(self.redundant_shards)
    }

    /// Bytes of input consumed by one full group.
    #[inline]
    pub fn group_capacity(&self) -> usize {
        usize::from(self.required_shards) * BLOCK_CAPACITY
    }

    pub fn validate(&self) -> Result<(), ArmorError> {
        if self.required_shards == 0 {
            return Err(ArmorError::InvalidConfig("required shards must be at least 1".into()));
        }

        if self.total_shards() > SHARD_LIMIT {
            return Err(ArmorError::InvalidConfig(format!("total shards {} exceeds limit {SHARD_LIMIT}", self.total_shards())));
        }

        if !(MIN_TELOMERE_LENGTH..=MAX_TELOMERE_LENGTH).contains(&self.telomere_length) {
            return Err(ArmorError::InvalidConfig(format!("telomere length {} outside {MIN_TELOMERE_LENGTH}..={MAX_TELOMERE_LENGTH}", self.telomere_length)));
        }

        Ok(())
    }
}

impl Default for ArmorConfig {
    fn default() -> Self {
        Self { required_shards: DEFAULT_REQUIRED_SHARDS, redundant_shards: DEFAULT_REDUNDANT_SHARDS, telomere_length: DEFAULT_TELOMERE_LENGTH }
    }
}
