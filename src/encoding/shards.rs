use std::collections::BTreeMap;

use hashbrown::HashMap;

use crate::armor::shard::Shard;

/// Splits group data into equal data fragments and joins them back.
pub struct Shards {
    data_shards: usize,
    total_shards: usize,
}

impl Shards {
    pub fn new(data_shards: usize, parity_shards: usize) -> Self {
        Self { data_shards, total_shards: data_shards + parity_shards }
    }

    /// Fragment body size for `len` bytes of group data. Always even and non-zero.
    pub fn shard_size(&self, len: usize) -> usize {
        round_up_even(len.div_ceil(self.data_shards)).max(2)
    }

    /// Zero-pads `data` to a whole number of fragments and splits it.
    pub fn split(&self, data: &[u8]) -> Vec<Vec<u8>> {
        let shard_size = self.shard_size(data.len());
        let mut padded = Vec::with_capacity(shard_size * self.data_shards);
        padded.extend_from_slice(data);
        padded.resize(shard_size * self.data_shards, 0);

        padded.chunks_exact(shard_size).map(<[u8]>::to_vec).collect()
    }

    /// Keeps the first copy of each in-range fragment whose size matches the majority.
    pub fn collect<'a>(&self, shards: &'a [Shard]) -> (usize, HashMap<usize, &'a [u8]>) {
        let in_range = || shards.iter().filter(|s| usize::from(s.sequence_number) < self.total_shards);

        let mut votes: HashMap<usize, usize> = HashMap::new();
        for shard in in_range() {
            *votes.entry(shard.body.len()).or_default() += 1;
        }
        // Ties go to the size seen first.
        let shard_size = in_range().map(|s| s.body.len()).max_by(|a, b| votes[a].cmp(&votes[b]).then(std::cmp::Ordering::Greater)).unwrap_or(0);

        let mut present = HashMap::new();
        for shard in in_range().filter(|s| s.body.len() == shard_size) {
            present.entry(usize::from(shard.sequence_number)).or_insert(shard.body.as_slice());
        }

        (shard_size, present)
    }

    /// Concatenates data fragments `0..k` in order.
    pub fn combine(&self, originals: &HashMap<usize, &[u8]>, restored: &BTreeMap<usize, Vec<u8>>, shard_size: usize) -> Option<Vec<u8>> {
        let mut combined = Vec::with_capacity(shard_size * self.data_shards);

        for index in 0..self.data_shards {
            let piece = originals.get(&index).copied().or_else(|| restored.get(&index).map(Vec::as_slice))?;
            combined.extend_from_slice(piece);
        }

        Some(combined)
    }
}

fn round_up_even(n: usize) -> usize {
    if n.is_multiple_of(2) { n } else { n + 1 }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_pads_evenly() {
        let shards = Shards::new(4, 2);
        let pieces = shards.split(&[9u8; 29]);
        assert_eq!(pieces.len(), 4);
        for piece in &pieces {
            assert_eq!(piece.len(), 8);
        }
        assert_eq!(&pieces[3][..5], &[9u8; 5]);
        assert_eq!(&pieces[3][5..], &[0u8; 3]);
    }

    #[test]
    fn test_shard_size() {
        let shards = Shards::new(4, 2);
        assert_eq!(shards.shard_size(2064), 516);
        assert_eq!(shards.shard_size(1), 2);
        assert_eq!(shards.shard_size(0), 2);
        assert_eq!(shards.shard_size(13), 4);
    }

    #[test]
    fn test_collect_filters() {
        let shards = Shards::new(2, 1);
        let input = vec![Shard::new(0, vec![1, 2]), Shard::new(0, vec![9, 9]), Shard::new(1, vec![3]), Shard::new(7, vec![5, 6]), Shard::new(2, vec![7, 8])];
        let (size, present) = shards.collect(&input);
        assert_eq!(size, 2);
        assert_eq!(present.len(), 2);
        assert_eq!(present[&0], &[1, 2]);
        assert_eq!(present[&2], &[7, 8]);
    }

    #[test]
    fn test_collect_prefers_majority_size() {
        let shards = Shards::new(2, 1);
        let input = vec![Shard::new(0, vec![1, 2, 3, 4]), Shard::new(1, vec![3, 4]), Shard::new(2, vec![7, 8])];
        let (size, present) = shards.collect(&input);
        assert_eq!(size, 2);
        assert!(!present.contains_key(&0));
        assert_eq!(present.len(), 2);
    }

    #[test]
    fn test_combine_uses_restored() {
        let shards = Shards::new(2, 1);
        let mut originals = HashMap::new();
        originals.insert(1usize, &[3u8, 4][..]);
        let mut restored = BTreeMap::new();
        restored.insert(0usize, vec![1u8, 2]);
        assert_eq!(shards.combine(&originals, &restored, 2).unwrap(), vec![1, 2, 3, 4]);
        assert!(shards.combine(&originals, &BTreeMap::new(), 2).is_none());
    }
}
