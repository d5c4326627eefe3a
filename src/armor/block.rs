//! Fixed-capacity checksummed payload unit.

use std::fmt;
use std::io::{ErrorKind, Read};

use crate::armor::checksum::KOOPMAN;
use crate::config::{BLOCK_CAPACITY, BOUNDARY_MARKER_THRESHOLD, CHECKSUM_SIZE, SEALED_BLOCK_SIZE, TELOMERE_MARKER};
use crate::error::ArmorError;

/// Up to 512 payload bytes followed by a 4-byte checksum.
///
/// The checksum covers the payload together with its own (zeroed) slot, so
/// [`Block::is_valid`] recomputes over `payload ‖ 0000` rather than the
/// payload alone. Wire compatibility depends on this.
#[derive(Clone)]
pub struct Block {
    buffer: [u8; SEALED_BLOCK_SIZE],
    length: usize,
}

impl Block {
    /// Fills a block from `source`, tolerating short reads, then seals it.
    ///
    /// End of data is not an error: an exhausted source yields a block with an
    /// empty payload, which is never valid.
    pub fn read_from<R: Read + ?Sized>(source: &mut R) -> Result<Self, ArmorError> {
        let mut block = Self { buffer: [0u8; SEALED_BLOCK_SIZE], length: 0 };
        let mut filled = 0;

        while filled < BLOCK_CAPACITY {
            match source.read(&mut block.buffer[filled..BLOCK_CAPACITY]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) if e.kind() == ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(ArmorError::Io(e)),
            }
        }

        block.seal(filled);
        Ok(block)
    }

    /// Seals at most the first 512 bytes of `payload`.
    pub fn from_payload(payload: &[u8]) -> Self {
        let filled = payload.len().min(BLOCK_CAPACITY);
        let mut block = Self { buffer: [0u8; SEALED_BLOCK_SIZE], length: 0 };
        block.buffer[..filled].copy_from_slice(&payload[..filled]);
        block.seal(filled);
        block
    }

    /// Wraps bytes that were sealed elsewhere. Input beyond a sealed block is ignored.
    pub fn from_sealed(sealed: &[u8]) -> Self {
        let length = sealed.len().min(SEALED_BLOCK_SIZE);
        let mut block = Self { buffer: [0u8; SEALED_BLOCK_SIZE], length };
        block.buffer[..length].copy_from_slice(&sealed[..length]);
        block
    }

    fn seal(&mut self, filled: usize) {
        let end = filled + CHECKSUM_SIZE;
        self.buffer[filled..end].fill(0);
        let sum = KOOPMAN.checksum(&self.buffer[..end]);
        self.buffer[filled..end].copy_from_slice(&sum.to_be_bytes());
        self.length = end;
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.length
    }

    /// Payload bytes, not counting the checksum.
    #[inline]
    pub fn payload_len(&self) -> usize {
        self.length.saturating_sub(CHECKSUM_SIZE)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.payload_len() == 0
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.length == SEALED_BLOCK_SIZE
    }

    pub fn is_valid(&self) -> bool {
        if self.length <= CHECKSUM_SIZE {
            return false;
        }

        let (payload, stored) = self.buffer[..self.length].split_at(self.length - CHECKSUM_SIZE);
        let mut digest = KOOPMAN.digest();
        digest.update(payload);
        digest.update(&[0u8; CHECKSUM_SIZE]);
        digest.finalize().to_be_bytes() == stored
    }

    /// Payload view. Only meaningful once [`Block::is_valid`] returned true.
    #[inline]
    pub fn bytes(&self) -> &[u8] {
        debug_assert!(self.is_valid(), "payload read from an unvalidated block");
        &self.buffer[..self.payload_len()]
    }

    /// Payload and checksum, as written to the stream.
    #[inline]
    pub fn sealed(&self) -> &[u8] {
        &self.buffer[..self.length]
    }

    /// A run too short to carry data that is dominated by marker bytes.
    pub fn is_boundary(&self, telomere_length: usize) -> bool {
        self.length <= telomere_length + CHECKSUM_SIZE && self.buffer[..self.length].iter().filter(|&&b| b == TELOMERE_MARKER).count() > BOUNDARY_MARKER_THRESHOLD
    }
}

impl fmt::Debug for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Block").field("length", &self.length).field("valid", &self.is_valid()).finish()
    }
}
