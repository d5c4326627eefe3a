//! Finds the fragment frames inside one group span.
//!
//! Fragments of a group share one frame length, but a damaged escape byte
//! adds or swallows a byte and shifts every frame after it. Frames are
//! located by position first and by their tag when the position is off; a
//! frame counts only if its checksum holds and its tag names this group.

use crate::armor::shard::{Shard, ShardTag, parse_frame};
use crate::config::{FULL_FRAME_SIZE, MIN_FRAME_SIZE, TAG_SIZE};

/// Distance around the expected offset searched before scanning the rest of the span.
const RESYNC_WINDOW: usize = 32;

pub struct FrameScanner<'a> {
    rest: &'a [u8],
    /// Tag bytes shared by every fragment of the group: version and group number.
    prefix: [u8; TAG_SIZE - 1],
    total: usize,
}

impl<'a> FrameScanner<'a> {
    /// `rest` is the span after the meta frame.
    pub fn new(rest: &'a [u8], sequence: u64, total: usize) -> Self {
        let tag = ShardTag::new(sequence, 0).to_bytes();
        let mut prefix = [0u8; TAG_SIZE - 1];
        prefix.copy_from_slice(&tag[..TAG_SIZE - 1]);
        Self { rest, prefix, total }
    }

    /// Frame length shared by the group's fragments, confirmed by at least one intact frame.
    pub fn frame_length(&self) -> Option<usize> {
        if self.total == 0 || self.rest.is_empty() {
            return None;
        }

        let even = self.rest.len() / self.total;
        if self.rest.len().is_multiple_of(self.total) && (MIN_FRAME_SIZE..=FULL_FRAME_SIZE).contains(&even) && (0..self.total).any(|i| self.frame_at(i * even, even).is_some()) {
            return Some(even);
        }

        self.tag_offsets().find_map(|offset| candidate_lengths().find(|&len| self.frame_at(offset, len).is_some()))
    }

    /// Walks the span in `len`-byte frames, realigning after each damaged one.
    ///
    /// Returns the intact fragments and roughly how many frames were lost to damage.
    pub fn fragments(&self, len: usize) -> (Vec<Shard>, u64) {
        let mut found = Vec::with_capacity(self.total);
        let mut skipped = 0;
        let mut cursor = 0;

        while cursor < self.rest.len() {
            if let Some(shard) = self.frame_at(cursor, len) {
                found.push(shard);
                cursor += len;
                continue;
            }

            match self.resync(cursor, len) {
                Some(next) => {
                    skipped += ((next - cursor + len / 2) / len).max(1) as u64;
                    cursor = next;
                }
                None => {
                    skipped += (self.rest.len() - cursor).div_ceil(len) as u64;
                    break;
                }
            }
        }

        (found, skipped)
    }

    /// Start of the next intact frame after a damaged one at `cursor`.
    fn resync(&self, cursor: usize, len: usize) -> Option<usize> {
        let expected = cursor + len;
        let nearby = (1..=RESYNC_WINDOW).flat_map(|d| [expected.checked_sub(d), Some(expected + d)]).flatten();

        std::iter::once(expected)
            .chain(nearby)
            .filter(|&offset| offset > cursor)
            .find(|&offset| self.frame_at(offset, len).is_some())
            .or_else(|| self.tag_offsets().filter(|&offset| offset > cursor).find(|&offset| self.frame_at(offset, len).is_some()))
    }

    /// The fragment framed at `offset`, if `len` bytes there form an intact frame of this group.
    fn frame_at(&self, offset: usize, len: usize) -> Option<Shard> {
        let frame = self.rest.get(offset..offset.checked_add(len)?)?;
        if !frame.starts_with(&self.prefix) {
            return None;
        }

        match parse_frame(frame) {
            Ok((tag, shard)) if usize::from(tag.shard_sequence) < self.total => Some(shard),
            _ => None,
        }
    }

    fn tag_offsets(&self) -> impl Iterator<Item = usize> + '_ {
        self.rest.windows(self.prefix.len()).enumerate().filter(|(_, window)| *window == self.prefix).map(|(offset, _)| offset)
    }
}

/// Every possible frame length, longest first. Fragment bodies are even-sized.
fn candidate_lengths() -> impl Iterator<Item = usize> {
    (MIN_FRAME_SIZE..=FULL_FRAME_SIZE).rev().step_by(2)
}
