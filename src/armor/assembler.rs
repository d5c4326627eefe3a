//! Encode half of the container: blocks → groups → framed fragments.
//!
//! Stream layout produced here:
//!
//! ```text
//! TELOMERE [meta frame][fragment 0]..[fragment n-1] TELOMERE [meta frame]... TELOMERE
//! ```
//!
//! Each group holds up to `required_shards` sealed blocks. The last group may
//! be short; its zero padding is recorded in the meta header.

use std::io::{Read, Write};

use tracing::{debug, info};

use crate::armor::block::Block;
use crate::armor::checksum::KOOPMAN;
use crate::armor::meta::ReedSolomonMeta;
use crate::armor::shard::{ShardEncoder, ShardTag};
use crate::armor::telomere::TelomereEncoder;
use crate::config::{ArmorConfig, SEALED_BLOCK_SIZE};
use crate::encoding::{ErasureCoder, ReedSolomon};
use crate::error::ArmorError;
use crate::types::EncodeReport;

pub struct GroupAssembler<W: Write, C: ErasureCoder = ReedSolomon> {
    config: ArmorConfig,
    coder: C,
    encoder: ShardEncoder<TelomereEncoder<W>>,
    next_sequence: u64,
    started: bool,
    report: EncodeReport,
}

impl<W: Write> GroupAssembler<W> {
    pub fn new(sink: W, config: ArmorConfig) -> Result<Self, ArmorError> {
        Self::with_coder(sink, config, ReedSolomon)
    }
}

impl<W: Write, C: ErasureCoder> GroupAssembler<W, C> {
    pub fn with_coder(sink: W, config: ArmorConfig, coder: C) -> Result<Self, ArmorError> {
        config.validate()?;
        let encoder = ShardEncoder::new(TelomereEncoder::new(sink, config.telomere_length), &KOOPMAN, None);
        Ok(Self { config, coder, encoder, next_sequence: 0, started: false, report: EncodeReport::default() })
    }

    /// Frames everything `source` yields. An empty source produces a lone telomere.
    pub fn encode<R: Read + ?Sized>(&mut self, source: &mut R) -> Result<EncodeReport, ArmorError> {
        if !self.started {
            self.encoder.get_mut().write_telomere()?;
            self.started = true;
        }

        loop {
            let (group, exhausted) = self.read_group(source)?;
            if !group.is_empty() {
                self.emit_group(&group)?;
            }
            if exhausted {
                break;
            }
        }

        self.encoder.flush()?;
        self.report.output_bytes = self.encoder.get_ref().bytes_written();
        info!(groups = self.report.groups, blocks = self.report.blocks, input = self.report.input_bytes, output = self.report.output_bytes, "encode finished");

        Ok(self.report)
    }

    /// Collects up to `required_shards` sealed blocks.
    fn read_group<R: Read + ?Sized>(&mut self, source: &mut R) -> Result<(Vec<u8>, bool), ArmorError> {
        let required = usize::from(self.config.required_shards);
        let mut group = Vec::with_capacity(required * SEALED_BLOCK_SIZE);

        for _ in 0..required {
            let block = Block::read_from(source)?;
            if block.is_empty() {
                return Ok((group, true));
            }

            group.extend_from_slice(block.sealed());
            self.report.blocks += 1;
            self.report.input_bytes += block.payload_len() as u64;

            if !block.is_full() {
                return Ok((group, true));
            }
        }

        Ok((group, false))
    }

    fn emit_group(&mut self, group: &[u8]) -> Result<(), ArmorError> {
        let ArmorConfig { required_shards, redundant_shards, .. } = self.config;
        let shards = self.coder.encode(required_shards, redundant_shards, group)?;
        let shard_size = shards.first().map_or(0, |s| s.body.len());

        let padding = (usize::from(required_shards) * shard_size).checked_sub(group.len()).and_then(|p| u16::try_from(p).ok()).ok_or_else(|| ArmorError::MalformedMeta(format!("shard size {shard_size} cannot hold {} bytes", group.len())))?;

        let sequence = self.next_sequence;
        let meta = ReedSolomonMeta::new(sequence, required_shards, redundant_shards, padding);

        self.encoder.write_shard(ShardTag::new(sequence, 0), &meta.to_bytes())?;
        for shard in &shards {
            self.encoder.write_shard(ShardTag::new(sequence, shard.sequence_number), &shard.body)?;
        }
        self.encoder.get_mut().write_telomere()?;

        debug!(sequence, shards = shards.len(), shard_size, padding, "emitted group");

        self.next_sequence += 1;
        self.report.groups += 1;
        Ok(())
    }

    #[inline]
    pub fn report(&self) -> EncodeReport {
        self.report
    }

    /// Flushes and hands back the sink. Writes the leading telomere if nothing was encoded.
    pub fn finish(mut self) -> Result<W, ArmorError> {
        if !self.started {
            self.encoder.get_mut().write_telomere()?;
        }
        self.encoder.flush()?;
        Ok(self.encoder.into_inner().into_inner())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::config::{DEFAULT_TELOMERE_LENGTH, FULL_FRAME_SIZE, META_FRAME_SIZE, TELOMERE_MARKER};

    fn armor(data: &[u8], config: ArmorConfig) -> (Vec<u8>, EncodeReport) {
        let mut assembler = GroupAssembler::new(Vec::new(), config).unwrap();
        let report = assembler.encode(&mut Cursor::new(data)).unwrap();
        (assembler.finish().unwrap(), report)
    }

    #[test]
    fn test_empty_input_is_one_telomere() {
        let (wire, report) = armor(b"", ArmorConfig::default());
        assert_eq!(wire, vec![TELOMERE_MARKER; DEFAULT_TELOMERE_LENGTH]);
        assert_eq!(report.groups, 0);
        assert_eq!(report.output_bytes, DEFAULT_TELOMERE_LENGTH as u64);
    }

    #[test]
    fn test_finish_without_encode() {
        let assembler = GroupAssembler::new(Vec::new(), ArmorConfig::default()).unwrap();
        assert_eq!(assembler.finish().unwrap(), vec![TELOMERE_MARKER; DEFAULT_TELOMERE_LENGTH]);
    }

    #[test]
    fn test_group_and_block_counts() {
        let data = vec![0x41u8; 10_000];
        let (_, report) = armor(&data, ArmorConfig::default());
        assert_eq!(report.blocks, 20);
        assert_eq!(report.groups, 5);
        assert_eq!(report.input_bytes, 10_000);
    }

    #[test]
    fn test_exact_group_multiple() {
        let data = vec![0x41u8; 2048];
        let (_, report) = armor(&data, ArmorConfig::default());
        assert_eq!(report.groups, 1);
        assert_eq!(report.blocks, 4);
    }

    #[test]
    fn test_full_group_size_without_escapes() {
        let data = vec![0x41u8; 2048];
        let (wire, report) = armor(&data, ArmorConfig::default());
        let expected = 2 * DEFAULT_TELOMERE_LENGTH + META_FRAME_SIZE + 6 * FULL_FRAME_SIZE;
        // Checksums and parity may contain marker or escape bytes, each adding one.
        assert!(wire.len() >= expected);
        assert_eq!(report.output_bytes, wire.len() as u64);
        assert_eq!(&wire[..DEFAULT_TELOMERE_LENGTH], &[TELOMERE_MARKER; DEFAULT_TELOMERE_LENGTH]);
        assert_eq!(&wire[wire.len() - DEFAULT_TELOMERE_LENGTH..], &[TELOMERE_MARKER; DEFAULT_TELOMERE_LENGTH]);
    }

    #[test]
    fn test_rejects_invalid_config() {
        let config = ArmorConfig { required_shards: 0, ..ArmorConfig::default() };
        assert!(matches!(GroupAssembler::new(Vec::new(), config), Err(ArmorError::InvalidConfig(_))));
    }
}
