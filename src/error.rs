//! Error kinds raised by the armor codec.

use std::io;

/// Errors that can occur while framing or recovering an armored stream.
#[derive(Debug, thiserror::Error)]
pub enum ArmorError {
    /// The byte source or sink failed. Terminal for the current operation.
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    /// A checksummed unit did not match its trailing checksum.
    #[error("checksum mismatch in {unit}")]
    ChecksumMismatch {
        /// Which kind of unit failed (block, meta, fragment).
        unit: &'static str,
    },

    /// The stream ended while the decoder was still looking for a boundary.
    #[error("stream ended without a terminal boundary")]
    BoundaryNotFound,

    /// A group had fewer valid fragments than it needs.
    #[error("group {sequence} unrecoverable: need {needed} shards, got {got}")]
    InsufficientShards {
        /// Group number.
        sequence: u64,
        /// Data fragments required (k).
        needed: usize,
        /// Valid fragments collected.
        got: usize,
    },

    /// A meta header passed its checksum but described an impossible group.
    #[error("malformed meta header: {0}")]
    MalformedMeta(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The erasure-coding engine rejected its input.
    #[error("reed-solomon error: {0}")]
    Erasure(#[from] reed_solomon_simd::Error),
}

impl ArmorError {
    /// Fatal errors abort the operation; everything else is local to one unit or group.
    #[inline]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Io(_) | Self::InvalidConfig(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatality() {
        assert!(ArmorError::Io(io::Error::other("disk")).is_fatal());
        assert!(ArmorError::InvalidConfig("x".into()).is_fatal());
        assert!(!ArmorError::ChecksumMismatch { unit: "block" }.is_fatal());
        assert!(!ArmorError::InsufficientShards { sequence: 3, needed: 4, got: 3 }.is_fatal());
        assert!(!ArmorError::MalformedMeta("zero shards".into()).is_fatal());
        assert!(!ArmorError::BoundaryNotFound.is_fatal());
    }

    #[test]
    fn test_messages() {
        let err = ArmorError::InsufficientShards { sequence: 7, needed: 4, got: 2 };
        assert_eq!(err.to_string(), "group 7 unrecoverable: need 4 shards, got 2");
        assert_eq!(ArmorError::ChecksumMismatch { unit: "fragment" }.to_string(), "checksum mismatch in fragment");
    }
}
