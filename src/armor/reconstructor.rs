//! Decode half of the container: boundaries → fragments → groups.
//!
//! The reconstructor walks an explicit [`DecodeState`] machine. Damage is
//! contained to the smallest unit that carries it: a bad fragment is dropped,
//! a group without enough fragments is reported and skipped, and only I/O
//! failures on the source end decoding early.

use std::collections::VecDeque;
use std::io::{Read, Write};

use hashbrown::HashMap;
use tracing::{debug, info, warn};

use crate::armor::block::Block;
use crate::armor::meta::ReedSolomonMeta;
use crate::armor::scanner::FrameScanner;
use crate::armor::shard::Shard;
use crate::armor::telomere::{Span, TelomereDecoder, Terminator};
use crate::config::{ArmorConfig, FULL_FRAME_SIZE, MAX_SEQUENCE_GAP, META_FRAME_SIZE, SEALED_BLOCK_SIZE, SHARD_LIMIT};
use crate::encoding::{ErasureCoder, ReedSolomon};
use crate::error::ArmorError;
use crate::types::{DecodeReport, DecodeState, FailedGroup, GroupOutcome};

/// Largest group span worth keeping: one meta frame plus the maximum fragment count.
const SPAN_LIMIT: usize = META_FRAME_SIZE + SHARD_LIMIT * FULL_FRAME_SIZE;

/// Group currently being decoded.
struct Pending {
    sequence: u64,
    meta: ReedSolomonMeta,
    fragments: HashMap<u8, Shard>,
    data: Option<Result<Vec<u8>, ArmorError>>,
}

pub struct Reconstructor<R: Read, C: ErasureCoder = ReedSolomon> {
    coder: C,
    decoder: TelomereDecoder<R>,
    telomere_length: usize,
    state: DecodeState,
    span: Option<Span>,
    pending: Option<Pending>,
    ready: VecDeque<GroupOutcome>,
    /// Damaged headers not yet matched to a missing group number.
    anonymous: VecDeque<ArmorError>,
    expected: Option<u64>,
    at_boundary: bool,
    boundary_seen: bool,
    clean_end: bool,
    discarded: u64,
}

impl<R: Read> Reconstructor<R> {
    pub fn new(source: R, config: ArmorConfig) -> Result<Self, ArmorError> {
        Self::with_coder(source, config, ReedSolomon)
    }
}

impl<R: Read, C: ErasureCoder> Reconstructor<R, C> {
    /// Only `telomere_length` is taken from `config`; shard counts come from each group's header.
    pub fn with_coder(source: R, config: ArmorConfig, coder: C) -> Result<Self, ArmorError> {
        config.validate()?;
        Ok(Self {
            coder,
            decoder: TelomereDecoder::new(source, config.telomere_length),
            telomere_length: config.telomere_length,
            state: DecodeState::SeekingBoundary,
            span: None,
            pending: None,
            ready: VecDeque::new(),
            anonymous: VecDeque::new(),
            expected: None,
            at_boundary: false,
            boundary_seen: false,
            clean_end: false,
            discarded: 0,
        })
    }

    #[inline]
    pub fn state(&self) -> DecodeState {
        self.state
    }

    /// Fragments dropped so far.
    #[inline]
    pub fn fragments_discarded(&self) -> u64 {
        self.discarded
    }

    #[inline]
    pub fn boundary_seen(&self) -> bool {
        self.boundary_seen
    }

    /// The stream ended right after a boundary.
    #[inline]
    pub fn clean_end(&self) -> bool {
        self.clean_end
    }

    /// Raw bytes consumed from the source.
    #[inline]
    pub fn position(&self) -> u64 {
        self.decoder.position()
    }

    /// Runs the state machine until the next group outcome. `None` once the stream is exhausted.
    pub fn next_group(&mut self) -> Result<Option<GroupOutcome>, ArmorError> {
        loop {
            if let Some(outcome) = self.ready.pop_front() {
                return Ok(Some(outcome));
            }

            let next = match self.state {
                DecodeState::SeekingBoundary => self.seek_boundary()?,
                DecodeState::ReadingMeta => self.read_meta()?,
                DecodeState::ReadingShards => self.read_shards(),
                DecodeState::Reconstructing => self.reconstruct(),
                DecodeState::Emitting => self.emit(),
                DecodeState::Terminal => {
                    if self.anonymous.is_empty() {
                        return Ok(None);
                    }
                    self.flush_anonymous();
                    DecodeState::Terminal
                }
            };

            if next != self.state {
                debug!(from = %self.state, to = %next, position = self.decoder.position(), "decoder state");
            }
            self.state = next;
        }
    }

    /// Decodes the whole stream into `sink`, writing recovered groups in order.
    pub fn decode_to<W: Write + ?Sized>(&mut self, sink: &mut W) -> Result<DecodeReport, ArmorError> {
        let report = self.decode_with(|outcome| {
            if let GroupOutcome::Recovered { data, .. } = outcome {
                sink.write_all(data)?;
            }
            Ok(())
        })?;

        sink.flush()?;
        Ok(report)
    }

    /// Decodes the whole stream, handing each outcome to `on_group` before it is tallied.
    pub fn decode_with<F>(&mut self, mut on_group: F) -> Result<DecodeReport, ArmorError>
    where
        F: FnMut(&GroupOutcome) -> Result<(), ArmorError>,
    {
        let mut report = DecodeReport::default();

        while let Some(outcome) = self.next_group()? {
            on_group(&outcome)?;
            match outcome {
                GroupOutcome::Recovered { data, .. } => {
                    report.groups_recovered += 1;
                    report.bytes_recovered += data.len() as u64;
                }
                GroupOutcome::Unrecoverable { sequence, reason } => report.failed.push(FailedGroup { sequence, reason }),
            }
        }

        report.fragments_discarded = self.discarded;
        report.boundary_seen = self.boundary_seen;
        report.clean_end = self.clean_end;

        info!(recovered = report.groups_recovered, failed = report.failed.len(), bytes = report.bytes_recovered, clean = report.clean_end, "decode finished");
        Ok(report)
    }

    fn seek_boundary(&mut self) -> Result<DecodeState, ArmorError> {
        if self.at_boundary {
            return Ok(DecodeState::ReadingMeta);
        }

        let skipped = self.decoder.read_span(0)?;
        match skipped.terminator {
            Terminator::Boundary => {
                if self.boundary_seen {
                    warn!(offset = skipped.offset, "resynchronised after damaged span");
                }
                self.at_boundary = true;
                self.boundary_seen = true;
                Ok(DecodeState::ReadingMeta)
            }
            Terminator::Eof => Ok(DecodeState::Terminal),
        }
    }

    fn read_meta(&mut self) -> Result<DecodeState, ArmorError> {
        let span = self.decoder.read_span(SPAN_LIMIT)?;
        self.at_boundary = span.terminator == Terminator::Boundary;

        if span.bytes.is_empty() {
            return Ok(match span.terminator {
                Terminator::Boundary => DecodeState::ReadingMeta,
                Terminator::Eof => {
                    self.clean_end = true;
                    DecodeState::Terminal
                }
            });
        }

        if span.terminator == Terminator::Eof {
            warn!(offset = span.offset, len = span.bytes.len(), "stream ends inside a group");
        }

        if span.overflowed {
            debug!(offset = span.offset, "span exceeds largest possible group, excess dropped");
        }

        let frame = &span.bytes[..span.bytes.len().min(META_FRAME_SIZE)];
        match ReedSolomonMeta::read_frame(frame, span.offset, self.telomere_length) {
            Ok((tag, meta)) => {
                self.pending = Some(Pending { sequence: tag.block_sequence, meta, fragments: HashMap::new(), data: None });
                self.span = Some(span);
                Ok(DecodeState::ReadingShards)
            }
            Err(reason) => {
                warn!(offset = span.offset, %reason, "discarding group with unreadable header");
                self.anonymous.push_back(reason);
                Ok(DecodeState::SeekingBoundary)
            }
        }
    }

    fn read_shards(&mut self) -> DecodeState {
        let (Some(span), Some(pending)) = (self.span.take(), self.pending.as_mut()) else {
            return DecodeState::SeekingBoundary;
        };

        let rest = &span.bytes[META_FRAME_SIZE.min(span.bytes.len())..];
        let scanner = FrameScanner::new(rest, pending.sequence, pending.meta.total_shards());

        let Some(frame_len) = scanner.frame_length() else {
            debug!(group = pending.sequence, len = rest.len(), "no intact fragment in group");
            self.discarded += rest.len().div_ceil(FULL_FRAME_SIZE) as u64;
            return DecodeState::Reconstructing;
        };

        let (shards, skipped) = scanner.fragments(frame_len);
        if skipped > 0 {
            debug!(group = pending.sequence, skipped, frame_len, "fragments dropped");
            self.discarded += skipped;
        }

        for shard in shards {
            pending.fragments.entry(shard.sequence_number).or_insert(shard);
        }

        DecodeState::Reconstructing
    }

    fn reconstruct(&mut self) -> DecodeState {
        let Some(pending) = self.pending.as_mut() else {
            return DecodeState::SeekingBoundary;
        };

        let shards: Vec<Shard> = pending.fragments.drain().map(|(_, shard)| shard).collect();
        let result = match self.coder.reconstruct(&shards, &pending.meta) {
            Ok(group) => unseal_blocks(&group),
            Err(ArmorError::InsufficientShards { needed, got, .. }) => Err(ArmorError::InsufficientShards { sequence: pending.sequence, needed, got }),
            Err(reason) => Err(reason),
        };

        pending.data = Some(result);
        DecodeState::Emitting
    }

    fn emit(&mut self) -> DecodeState {
        let Some(pending) = self.pending.take() else {
            return DecodeState::SeekingBoundary;
        };

        let sequence = pending.sequence;
        let expected = self.expected.unwrap_or(0);

        // Group numbers skipped since the last header are groups whose header was lost.
        let gap = sequence.saturating_sub(expected);
        if gap > MAX_SEQUENCE_GAP {
            warn!(group = sequence, expected, gap, "group number jumps ahead, missing groups reported once");
            self.flush_anonymous();
            let reason = ArmorError::MalformedMeta(format!("groups {expected} to {} missing", sequence - 1));
            self.ready.push_back(GroupOutcome::Unrecoverable { sequence: None, reason });
        } else {
            for missing in expected..sequence {
                let reason = self.anonymous.pop_front().unwrap_or(ArmorError::InsufficientShards { sequence: missing, needed: usize::from(pending.meta.required_shards), got: 0 });
                warn!(group = missing, %reason, "group missing from stream");
                self.ready.push_back(GroupOutcome::Unrecoverable { sequence: Some(missing), reason });
            }
        }
        self.anonymous.clear();
        let next = sequence.saturating_add(1);
        self.expected = Some(self.expected.map_or(next, |e| e.max(next)));

        match pending.data {
            Some(Ok(data)) => {
                debug!(group = sequence, bytes = data.len(), "group recovered");
                self.ready.push_back(GroupOutcome::Recovered { sequence, data });
            }
            Some(Err(reason)) => {
                warn!(group = sequence, %reason, "group unrecoverable");
                self.ready.push_back(GroupOutcome::Unrecoverable { sequence: Some(sequence), reason });
            }
            None => {}
        }

        DecodeState::SeekingBoundary
    }

    fn flush_anonymous(&mut self) {
        for reason in self.anonymous.drain(..) {
            warn!(%reason, "unidentified group unrecoverable");
            self.ready.push_back(GroupOutcome::Unrecoverable { sequence: None, reason });
        }
    }
}

/// Verifies every sealed block of a reconstructed group and joins their payloads.
fn unseal_blocks(group: &[u8]) -> Result<Vec<u8>, ArmorError> {
    let mut data = Vec::with_capacity(group.len());

    for sealed in group.chunks(SEALED_BLOCK_SIZE) {
        let block = Block::from_sealed(sealed);
        if !block.is_valid() {
            return Err(ArmorError::ChecksumMismatch { unit: "block" });
        }
        data.extend_from_slice(block.bytes());
    }

    Ok(data)
}
