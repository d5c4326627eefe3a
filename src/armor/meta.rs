//! Group header describing one erasure-coded group.

use tracing::debug;

use crate::armor::shard::ShardTag;
use crate::armor::slice::Slice;
use crate::config::{META_FRAME_SIZE, META_SIZE, PROTOCOL_VERSION, SHARD_LIMIT, TAG_SIZE};
use crate::error::ArmorError;

/// `{sequence, required, redundant, padding}` packed into five bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReedSolomonMeta {
    /// Group number modulo 256.
    pub sequence_number: u8,
    pub required_shards: u8,
    pub redundant_shards: u8,
    /// Zero bytes appended to the group before it was split; dropped after reconstruction.
    pub padding_length: u16,
}

impl ReedSolomonMeta {
    pub fn new(block_sequence: u64, required_shards: u8, redundant_shards: u8, padding_length: u16) -> Self {
        Self { sequence_number: (block_sequence & 0xff) as u8, required_shards, redundant_shards, padding_length }
    }

    #[inline]
    pub fn total_shards(&self) -> usize {
        usize::from(self.required_shards) + usize::from(self.redundant_shards)
    }

    pub fn to_bytes(&self) -> [u8; META_SIZE] {
        let padding = self.padding_length.to_be_bytes();
        [self.sequence_number, self.required_shards, self.redundant_shards, padding[0], padding[1]]
    }

    pub fn from_bytes(bytes: &[u8; META_SIZE]) -> Self {
        Self { sequence_number: bytes[0], required_shards: bytes[1], redundant_shards: bytes[2], padding_length: u16::from_be_bytes([bytes[3], bytes[4]]) }
    }

    pub fn validate(&self) -> Result<(), ArmorError> {
        if self.required_shards == 0 {
            return Err(ArmorError::MalformedMeta("zero required shards".into()));
        }

        if self.total_shards() > SHARD_LIMIT {
            return Err(ArmorError::MalformedMeta(format!("{} shards exceeds limit {SHARD_LIMIT}", self.total_shards())));
        }

        Ok(())
    }

    /// Parses a meta frame `[tag][meta][checksum]` read at stream position `offset`.
    pub fn read_frame(frame: &[u8], offset: u64, telomere_length: usize) -> Result<(ShardTag, Self), ArmorError> {
        let mut slice = Slice::new(offset, telomere_length);
        slice.push(frame);

        if slice.len() != META_FRAME_SIZE {
            debug!(%slice, "meta frame has wrong length");
            return Err(ArmorError::MalformedMeta(format!("frame length {} at offset {offset}", slice.len())));
        }

        if !slice.is_valid() {
            debug!(%slice, "meta frame checksum mismatch");
            return Err(ArmorError::ChecksumMismatch { unit: "meta" });
        }

        let contents = slice.contents();
        let mut tag_bytes = [0u8; TAG_SIZE];
        tag_bytes.copy_from_slice(&contents[..TAG_SIZE]);
        let tag = ShardTag::from_bytes(&tag_bytes);

        let mut meta_bytes = [0u8; META_SIZE];
        meta_bytes.copy_from_slice(&contents[TAG_SIZE..TAG_SIZE + META_SIZE]);
        let meta = Self::from_bytes(&meta_bytes);

        if tag.version != PROTOCOL_VERSION {
            return Err(ArmorError::MalformedMeta(format!("unsupported version {}", tag.version)));
        }

        if meta.sequence_number != (tag.block_sequence & 0xff) as u8 {
            return Err(ArmorError::MalformedMeta(format!("sequence {} does not match group {}", meta.sequence_number, tag.block_sequence)));
        }

        meta.validate()?;
        Ok((tag, meta))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::armor::checksum::KOOPMAN;
    use crate::armor::shard::ShardEncoder;
    use crate::config::DEFAULT_TELOMERE_LENGTH;

    fn frame(tag: ShardTag, meta: ReedSolomonMeta) -> Vec<u8> {
        let mut encoder = ShardEncoder::new(Vec::new(), &KOOPMAN, None);
        encoder.write_shard(tag, &meta.to_bytes()).unwrap();
        encoder.into_inner()
    }

    #[test]
    fn test_layout() {
        let meta = ReedSolomonMeta::new(0x1_02, 4, 2, 0x0304);
        assert_eq!(meta.to_bytes(), [0x02, 4, 2, 0x03, 0x04]);
        assert_eq!(ReedSolomonMeta::from_bytes(&meta.to_bytes()), meta);
        assert_eq!(meta.total_shards(), 6);
    }

    #[test]
    fn test_sequence_wraps() {
        assert_eq!(ReedSolomonMeta::new(256, 4, 2, 0).sequence_number, 0);
        assert_eq!(ReedSolomonMeta::new(511, 4, 2, 0).sequence_number, 255);
    }

    #[test]
    fn test_validate() {
        assert!(ReedSolomonMeta::new(0, 4, 2, 0).validate().is_ok());
        assert!(ReedSolomonMeta::new(0, 0, 2, 0).validate().is_err());
        assert!(ReedSolomonMeta::new(0, 255, 1, 0).validate().is_ok());
        assert!(ReedSolomonMeta::new(0, 255, 2, 0).validate().is_err());
    }

    #[test]
    fn test_read_frame() {
        let meta = ReedSolomonMeta::new(300, 4, 2, 10);
        let bytes = frame(ShardTag::new(300, 0), meta);
        assert_eq!(bytes.len(), META_FRAME_SIZE);

        let (tag, parsed) = ReedSolomonMeta::read_frame(&bytes, 0, DEFAULT_TELOMERE_LENGTH).unwrap();
        assert_eq!(tag.block_sequence, 300);
        assert_eq!(parsed, meta);
    }

    #[test]
    fn test_read_frame_rejects_damage() {
        let mut bytes = frame(ShardTag::new(1, 0), ReedSolomonMeta::new(1, 4, 2, 0));
        bytes[12] ^= 0x40;
        assert!(matches!(ReedSolomonMeta::read_frame(&bytes, 0, DEFAULT_TELOMERE_LENGTH), Err(ArmorError::ChecksumMismatch { .. })));
        assert!(matches!(ReedSolomonMeta::read_frame(&bytes[..10], 0, DEFAULT_TELOMERE_LENGTH), Err(ArmorError::MalformedMeta(_))));
    }

    #[test]
    fn test_read_frame_rejects_inconsistent_sequence() {
        let bytes = frame(ShardTag::new(2, 0), ReedSolomonMeta::new(3, 4, 2, 0));
        assert!(matches!(ReedSolomonMeta::read_frame(&bytes, 0, DEFAULT_TELOMERE_LENGTH), Err(ArmorError::MalformedMeta(_))));
    }

    #[test]
    fn test_read_frame_rejects_zero_shards() {
        let bytes = frame(ShardTag::new(0, 0), ReedSolomonMeta::new(0, 0, 2, 0));
        assert!(matches!(ReedSolomonMeta::read_frame(&bytes, 0, DEFAULT_TELOMERE_LENGTH), Err(ArmorError::MalformedMeta(_))));
    }
}
