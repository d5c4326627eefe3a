//! Erasure-coded fragments and their per-fragment framing.
//!
//! A framed fragment on the wire is `[tag][body][checksum(tag ‖ body)]`.

use std::io::{self, Write};

use crc::Crc;

use crate::armor::checksum::{self, Running};
use crate::config::{CHECKSUM_SIZE, PROTOCOL_VERSION, TAG_SIZE};
use crate::error::ArmorError;

/// One erasure-coded fragment of a group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shard {
    pub body: Vec<u8>,

    /// Fragment index within the group: data fragments first, then parity.
    pub sequence_number: u8,
}

impl Shard {
    #[inline]
    pub fn new(sequence_number: u8, body: Vec<u8>) -> Self {
        Self { body, sequence_number }
    }
}

/// Identifies a physical fragment: protocol version, group number, fragment index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ShardTag {
    pub version: u8,
    pub block_sequence: u64,
    pub shard_sequence: u8,
}

impl ShardTag {
    #[inline]
    pub fn new(block_sequence: u64, shard_sequence: u8) -> Self {
        Self { version: PROTOCOL_VERSION, block_sequence, shard_sequence }
    }

    /// Fills in the protocol version when the caller left it unset.
    #[inline]
    #[must_use]
    pub fn versioned(self) -> Self {
        if self.version == 0 { Self { version: PROTOCOL_VERSION, ..self } } else { self }
    }

    pub fn to_bytes(&self) -> [u8; TAG_SIZE] {
        let mut bytes = [0u8; TAG_SIZE];
        bytes[0] = self.version;
        bytes[1..9].copy_from_slice(&self.block_sequence.to_be_bytes());
        bytes[9] = self.shard_sequence;
        bytes
    }

    pub fn from_bytes(bytes: &[u8; TAG_SIZE]) -> Self {
        let mut sequence = [0u8; 8];
        sequence.copy_from_slice(&bytes[1..9]);
        Self { version: bytes[0], block_sequence: u64::from_be_bytes(sequence), shard_sequence: bytes[9] }
    }
}

/// Frames fragments onto a sink with an independent running checksum each.
///
/// Tags are supplied per fragment through [`ShardEncoder::begin`] or
/// [`ShardEncoder::write_shard`]; there is no cursor to advance between calls.
/// Not safe for shared use: one encoder serves one stream.
pub struct ShardEncoder<W: Write> {
    sink: W,
    crc: &'static Crc<u32>,
    digest: Running,
    tag: ShardTag,
}

impl<W: Write> ShardEncoder<W> {
    pub fn new(sink: W, crc: &'static Crc<u32>, prefill: Option<ShardTag>) -> Self {
        Self { sink, crc, digest: crc.digest(), tag: prefill.unwrap_or_default().versioned() }
    }

    /// Tag of the fragment currently being written.
    #[inline]
    pub fn tag(&self) -> ShardTag {
        self.tag
    }

    /// Starts a fragment: resets the checksum and writes the tag through it.
    pub fn begin(&mut self, tag: ShardTag) -> io::Result<()> {
        self.tag = tag.versioned();
        self.digest = self.crc.digest();
        let bytes = self.tag.to_bytes();
        self.write_all(&bytes)
    }

    /// Writes the big-endian running checksum, then resets it.
    pub fn seal(&mut self) -> io::Result<()> {
        let digest = std::mem::replace(&mut self.digest, self.crc.digest());
        self.sink.write_all(&digest.finalize().to_be_bytes())
    }

    /// Writes one complete frame and returns its size on the wire.
    pub fn write_shard(&mut self, tag: ShardTag, body: &[u8]) -> io::Result<usize> {
        self.begin(tag)?;
        self.write_all(body)?;
        self.seal()?;
        Ok(TAG_SIZE + body.len() + CHECKSUM_SIZE)
    }

    #[inline]
    pub fn get_ref(&self) -> &W {
        &self.sink
    }

    #[inline]
    pub fn get_mut(&mut self) -> &mut W {
        &mut self.sink
    }

    #[inline]
    pub fn into_inner(self) -> W {
        self.sink
    }
}

impl<W: Write> Write for ShardEncoder<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let written = self.sink.write(buf)?;
        self.digest.update(&buf[..written]);
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.sink.flush()
    }
}

/// Splits a framed fragment back into its tag and fragment.
pub fn parse_frame(frame: &[u8]) -> Result<(ShardTag, Shard), ArmorError> {
    if frame.len() <= TAG_SIZE + CHECKSUM_SIZE {
        return Err(ArmorError::ChecksumMismatch { unit: "fragment" });
    }

    let (covered, stored) = frame.split_at(frame.len() - CHECKSUM_SIZE);
    if !checksum::matches(covered, stored) {
        return Err(ArmorError::ChecksumMismatch { unit: "fragment" });
    }

    let (head, body) = covered.split_at(TAG_SIZE);
    let mut tag_bytes = [0u8; TAG_SIZE];
    tag_bytes.copy_from_slice(head);
    let tag = ShardTag::from_bytes(&tag_bytes);

    Ok((tag, Shard::new(tag.shard_sequence, body.to_vec())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::armor::checksum::KOOPMAN;

    #[test]
    fn test_tag_layout() {
        let tag = ShardTag::new(0x0102_0304_0506_0708, 9);
        assert_eq!(tag.to_bytes(), [PROTOCOL_VERSION, 1, 2, 3, 4, 5, 6, 7, 8, 9]);
        assert_eq!(ShardTag::from_bytes(&tag.to_bytes()), tag);
    }

    #[test]
    fn test_missing_version_is_defaulted() {
        let encoder = ShardEncoder::new(Vec::new(), &KOOPMAN, None);
        assert_eq!(encoder.tag().version, PROTOCOL_VERSION);

        let explicit = ShardTag { version: 9, block_sequence: 1, shard_sequence: 2 };
        let encoder = ShardEncoder::new(Vec::new(), &KOOPMAN, Some(explicit));
        assert_eq!(encoder.tag().version, 9);
    }

    #[test]
    fn test_wire_layout() {
        let mut encoder = ShardEncoder::new(Vec::new(), &KOOPMAN, None);
        let written = encoder.write_shard(ShardTag::new(5, 2), b"body").unwrap();
        let out = encoder.into_inner();

        assert_eq!(written, out.len());
        assert_eq!(&out[..TAG_SIZE], &ShardTag::new(5, 2).to_bytes());
        assert_eq!(&out[TAG_SIZE..TAG_SIZE + 4], b"body");
        assert_eq!(&out[TAG_SIZE + 4..], &checksum::checksum_bytes(&out[..TAG_SIZE + 4]));
    }

    #[test]
    fn test_seal_resets_checksum() {
        let mut encoder = ShardEncoder::new(Vec::new(), &KOOPMAN, None);
        encoder.write_shard(ShardTag::new(0, 0), b"first").unwrap();
        let first_len = encoder.get_ref().len();
        encoder.write_shard(ShardTag::new(0, 1), b"second").unwrap();
        let out = encoder.into_inner();

        let (tag, shard) = parse_frame(&out[first_len..]).unwrap();
        assert_eq!(tag, ShardTag::new(0, 1));
        assert_eq!(shard.body, b"second");
        assert_eq!(shard.sequence_number, 1);
    }

    #[test]
    fn test_manual_begin_write_seal() {
        let mut encoder = ShardEncoder::new(Vec::new(), &KOOPMAN, None);
        encoder.begin(ShardTag::new(3, 4)).unwrap();
        encoder.write_all(b"par").unwrap();
        encoder.write_all(b"ts").unwrap();
        encoder.seal().unwrap();

        let (tag, shard) = parse_frame(&encoder.into_inner()).unwrap();
        assert_eq!(tag.block_sequence, 3);
        assert_eq!(shard.body, b"parts");
    }

    #[test]
    fn test_corrupt_frame_rejected() {
        let mut encoder = ShardEncoder::new(Vec::new(), &KOOPMAN, None);
        encoder.write_shard(ShardTag::new(1, 1), &[0xaa; 64]).unwrap();
        let mut out = encoder.into_inner();
        out[20] ^= 0x01;
        assert!(matches!(parse_frame(&out), Err(ArmorError::ChecksumMismatch { .. })));
        assert!(parse_frame(&out[..TAG_SIZE + CHECKSUM_SIZE]).is_err());
    }
}
