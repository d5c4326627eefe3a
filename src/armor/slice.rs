//! Bounded decode-side accumulation buffer.

use std::fmt;
use std::io::{self, Write};

use crate::armor::checksum;
use crate::config::{CHECKSUM_SIZE, SLICE_CAPACITY};

/// Accumulates one unit from the stream before it is validated.
///
/// Writes past capacity are dropped but still counted, so an oversized slice
/// can never pass [`Slice::is_valid`].
#[derive(Clone)]
pub struct Slice {
    body: [u8; SLICE_CAPACITY],
    length: usize,
    offset: u64,
    telomere_length: usize,
}

impl Slice {
    /// `offset` is the stream position of the first byte, used for diagnostics only.
    pub fn new(offset: u64, telomere_length: usize) -> Self {
        Self { body: [0u8; SLICE_CAPACITY], length: 0, offset, telomere_length }
    }

    pub fn push(&mut self, bytes: &[u8]) {
        let stored = self.stored();
        let room = SLICE_CAPACITY - stored;
        let take = bytes.len().min(room);
        self.body[stored..stored + take].copy_from_slice(&bytes[..take]);
        self.length = self.length.saturating_add(bytes.len());
    }

    pub fn write_checksum(&mut self) {
        let sum = checksum::checksum_bytes(&self.body[..self.stored()]);
        self.push(&sum);
    }

    /// Logical length, including anything dropped on overflow.
    #[inline]
    pub fn len(&self) -> usize {
        self.length
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    #[inline]
    pub fn is_overflowed(&self) -> bool {
        self.length > SLICE_CAPACITY
    }

    #[inline]
    pub fn offset(&self) -> u64 {
        self.offset
    }

    #[inline]
    fn stored(&self) -> usize {
        self.length.min(SLICE_CAPACITY)
    }

    pub fn is_valid(&self) -> bool {
        if self.length < self.telomere_length + 2 * CHECKSUM_SIZE || self.length > SLICE_CAPACITY {
            return false;
        }

        let (data, stored) = self.body[..self.length].split_at(self.length - CHECKSUM_SIZE);
        checksum::matches(data, stored)
    }

    /// Bytes preceding the trailing checksum.
    pub fn contents(&self) -> &[u8] {
        &self.body[..self.stored().saturating_sub(CHECKSUM_SIZE)]
    }

    fn trailer(&self) -> &[u8] {
        let stored = self.stored();
        &self.body[stored.saturating_sub(CHECKSUM_SIZE)..stored]
    }
}

impl Write for Slice {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.push(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl fmt::Display for Slice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Slice#{}@{}-{}", hex::encode(self.trailer()), self.offset, self.offset + self.length as u64)
    }
}

impl fmt::Debug for Slice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}
