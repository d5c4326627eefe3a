use std::collections::BTreeMap;

use tracing::debug;

use crate::armor::meta::ReedSolomonMeta;
use crate::armor::shard::Shard;
use crate::config::SHARD_LIMIT;
use crate::encoding::shards::Shards;
use crate::error::ArmorError;

mod shards;

/// The erasure-coding capability a group is framed around.
pub trait ErasureCoder {
    /// Produces `required + redundant` equally sized fragments, data fragments first.
    fn encode(&self, required: u8, redundant: u8, data: &[u8]) -> Result<Vec<Shard>, ArmorError>;

    /// Rebuilds group data from any `required` distinct fragments, minus `meta.padding_length`.
    fn reconstruct(&self, shards: &[Shard], meta: &ReedSolomonMeta) -> Result<Vec<u8>, ArmorError>;
}

/// SIMD Reed-Solomon over GF(2^16).
#[derive(Debug, Clone, Copy, Default)]
pub struct ReedSolomon;

impl ErasureCoder for ReedSolomon {
    #[allow(clippy::cast_possible_truncation)]
    fn encode(&self, required: u8, redundant: u8, data: &[u8]) -> Result<Vec<Shard>, ArmorError> {
        if required == 0 {
            return Err(ArmorError::InvalidConfig("required shards must be at least 1".into()));
        }

        let (k, m) = (usize::from(required), usize::from(redundant));
        if k + m > SHARD_LIMIT {
            return Err(ArmorError::InvalidConfig(format!("total shards {} exceeds limit {SHARD_LIMIT}", k + m)));
        }

        let layout = Shards::new(k, m);
        let originals = layout.split(data);
        let recovery = if m == 0 { Vec::new() } else { reed_solomon_simd::encode(k, m, &originals)? };

        debug!(k, m, len = data.len(), shard_size = originals[0].len(), "encoded group");

        Ok(originals.into_iter().chain(recovery).enumerate().map(|(index, body)| Shard::new(index as u8, body)).collect())
    }

    fn reconstruct(&self, shards: &[Shard], meta: &ReedSolomonMeta) -> Result<Vec<u8>, ArmorError> {
        let (k, m) = (usize::from(meta.required_shards), usize::from(meta.redundant_shards));
        let layout = Shards::new(k, m);
        let (shard_size, present) = layout.collect(shards);

        if k == 0 || present.len() < k {
            return Err(ArmorError::InsufficientShards { sequence: u64::from(meta.sequence_number), needed: k, got: present.len() });
        }

        let padding = usize::from(meta.padding_length);
        if padding > k * shard_size {
            return Err(ArmorError::MalformedMeta(format!("padding {padding} exceeds group size {}", k * shard_size)));
        }

        let originals: Vec<(usize, &[u8])> = present.iter().filter(|(i, _)| **i < k).map(|(i, body)| (*i, *body)).collect();
        let restored = if originals.len() == k {
            BTreeMap::new()
        } else {
            let recovery: Vec<(usize, &[u8])> = present.iter().filter(|(i, _)| **i >= k).map(|(i, body)| (*i - k, *body)).collect();
            debug!(k, m, originals = originals.len(), recovery = recovery.len(), "restoring missing data shards");
            reed_solomon_simd::decode(k, m, originals, recovery)?
        };

        let mut data = layout.combine(&present, &restored, shard_size).ok_or(ArmorError::InsufficientShards { sequence: u64::from(meta.sequence_number), needed: k, got: present.len() })?;
        data.truncate(k * shard_size - padding);
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn group(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 31 % 253) as u8).collect()
    }

    fn meta_for(shards: &[Shard], k: u8, m: u8, len: usize) -> ReedSolomonMeta {
        let padding = usize::from(k) * shards[0].body.len() - len;
        ReedSolomonMeta::new(0, k, m, u16::try_from(padding).unwrap())
    }

    #[test]
    fn test_encode_layout() {
        let shards = ReedSolomon.encode(4, 2, &group(2064)).unwrap();
        assert_eq!(shards.len(), 6);
        for (i, shard) in shards.iter().enumerate() {
            assert_eq!(usize::from(shard.sequence_number), i);
            assert_eq!(shard.body.len(), 516);
        }
    }

    #[test]
    fn test_any_four_of_six() {
        let data = group(2064);
        let shards = ReedSolomon.encode(4, 2, &data).unwrap();
        let meta = meta_for(&shards, 4, 2, data.len());

        for skip_a in 0..6 {
            for skip_b in skip_a + 1..6 {
                let subset: Vec<Shard> = shards.iter().filter(|s| ![skip_a, skip_b].contains(&usize::from(s.sequence_number))).cloned().collect();
                assert_eq!(ReedSolomon.reconstruct(&subset, &meta).unwrap(), data, "missing {skip_a} and {skip_b}");
            }
        }
    }

    #[test]
    fn test_three_of_six_fails() {
        let data = group(2064);
        let shards = ReedSolomon.encode(4, 2, &data).unwrap();
        let meta = meta_for(&shards, 4, 2, data.len());
        let subset = vec![shards[0].clone(), shards[3].clone(), shards[5].clone()];

        assert!(matches!(ReedSolomon.reconstruct(&subset, &meta), Err(ArmorError::InsufficientShards { needed: 4, got: 3, .. })));
    }

    #[test]
    fn test_duplicates_do_not_count() {
        let data = group(100);
        let shards = ReedSolomon.encode(4, 2, &data).unwrap();
        let meta = meta_for(&shards, 4, 2, data.len());
        let subset = vec![shards[0].clone(), shards[0].clone(), shards[1].clone(), shards[1].clone()];

        assert!(matches!(ReedSolomon.reconstruct(&subset, &meta), Err(ArmorError::InsufficientShards { got: 2, .. })));
    }

    #[test]
    fn test_padding_trimmed() {
        let data = group(1037);
        let shards = ReedSolomon.encode(4, 2, &data).unwrap();
        let meta = meta_for(&shards, 4, 2, data.len());
        assert!(meta.padding_length > 0);
        assert_eq!(ReedSolomon.reconstruct(&shards[2..], &meta).unwrap(), data);
    }

    #[test]
    fn test_no_parity() {
        let data = group(700);
        let shards = ReedSolomon.encode(3, 0, &data).unwrap();
        assert_eq!(shards.len(), 3);
        let meta = meta_for(&shards, 3, 0, data.len());
        assert_eq!(ReedSolomon.reconstruct(&shards, &meta).unwrap(), data);
        assert!(ReedSolomon.reconstruct(&shards[1..], &meta).is_err());
    }

    #[test]
    fn test_oversized_padding_rejected() {
        let shards = ReedSolomon.encode(2, 1, &group(10)).unwrap();
        let meta = ReedSolomonMeta::new(0, 2, 1, 1000);
        assert!(matches!(ReedSolomon.reconstruct(&shards, &meta), Err(ArmorError::MalformedMeta(_))));
    }
}
