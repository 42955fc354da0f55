//! A block-sampled rank/select bitmap over [`bv::BitVec`] storage (§4.3).
//!
//! `bv` gives us packed bit storage; everything beyond raw get/set (rank,
//! select) is hand-rolled here since no pack crate offers integer-alphabet
//! agnostic rank/select with the exact semantics this index needs.

use bv::{BitVec, Bits, BitsMut};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Bits per sampled rank checkpoint. Smaller blocks cost more memory for
/// faster rank/select; this is a fixed build-time constant, not tuned.
const BLOCK: u64 = 512;

#[derive(Debug, Clone)]
pub struct RankSelectBitVec {
    bits: BitVec<u8>,
    /// `samples[k]` = popcount of `bits[0 .. k*BLOCK)`.
    samples: Vec<u64>,
}

impl RankSelectBitVec {
    pub fn from_bits(bits: BitVec<u8>) -> Self {
        let len = bits.bit_len();
        let mut samples = Vec::with_capacity((len / BLOCK + 2) as usize);
        samples.push(0);
        let mut acc = 0u64;
        let mut i = 0u64;
        while i < len {
            if bits.get_bit(i) {
                acc += 1;
            }
            i += 1;
            if i % BLOCK == 0 {
                samples.push(acc);
            }
        }
        Self { bits, samples }
    }

    pub fn from_flags(flags: &[bool]) -> Self {
        let mut bits = BitVec::new_fill(false, flags.len() as u64);
        for (i, &b) in flags.iter().enumerate() {
            if b {
                bits.set_bit(i as u64, true);
            }
        }
        Self::from_bits(bits)
    }

    pub fn bit_len(&self) -> u64 {
        self.bits.bit_len()
    }

    pub fn get(&self, i: u64) -> bool {
        self.bits.get_bit(i)
    }

    /// Number of set bits in `[0, i)`.
    pub fn rank1(&self, i: u64) -> u64 {
        if i == 0 {
            return 0;
        }
        let block = i / BLOCK;
        let mut acc = self.samples[block as usize];
        let mut pos = block * BLOCK;
        while pos < i {
            if self.bits.get_bit(pos) {
                acc += 1;
            }
            pos += 1;
        }
        acc
    }

    /// Number of unset bits in `[0, i)`.
    pub fn rank0(&self, i: u64) -> u64 {
        i - self.rank1(i)
    }

    pub fn count_ones(&self) -> u64 {
        self.rank1(self.bit_len())
    }

    /// The position of the `k`-th (0-indexed) set bit, if it exists.
    pub fn select1(&self, k: u64) -> Option<u64> {
        if k >= self.count_ones() {
            return None;
        }
        let mut lo = 0usize;
        let mut hi = self.samples.len() - 1;
        while lo < hi {
            let mid = lo + (hi - lo + 1) / 2;
            if self.samples[mid] <= k {
                lo = mid;
            } else {
                hi = mid - 1;
            }
        }
        let mut acc = self.samples[lo];
        let mut pos = lo as u64 * BLOCK;
        loop {
            if self.bits.get_bit(pos) {
                if acc == k {
                    return Some(pos);
                }
                acc += 1;
            }
            pos += 1;
        }
    }
}

impl PartialEq for RankSelectBitVec {
    fn eq(&self, other: &Self) -> bool {
        self.bit_len() == other.bit_len() && (0..self.bit_len()).all(|i| self.get(i) == other.get(i))
    }
}
impl Eq for RankSelectBitVec {}

impl Serialize for RankSelectBitVec {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let flags: Vec<bool> = (0..self.bit_len()).map(|i| self.get(i)).collect();
        flags.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for RankSelectBitVec {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let flags = Vec::<bool>::deserialize(deserializer)?;
        Ok(Self::from_flags(&flags))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rank_matches_naive_popcount() {
        let flags = vec![true, false, true, true, false, false, true, false, true];
        let rs = RankSelectBitVec::from_flags(&flags);
        for i in 0..=flags.len() {
            let expected = flags[..i].iter().filter(|&&b| b).count() as u64;
            assert_eq!(rs.rank1(i as u64), expected, "rank1({i}) mismatch");
        }
    }

    #[test]
    fn select_inverts_rank() {
        let flags = vec![false, true, false, true, true, false, true];
        let rs = RankSelectBitVec::from_flags(&flags);
        let ones: Vec<u64> = flags
            .iter()
            .enumerate()
            .filter(|(_, &b)| b)
            .map(|(i, _)| i as u64)
            .collect();
        for (k, &pos) in ones.iter().enumerate() {
            assert_eq!(rs.select1(k as u64), Some(pos));
        }
        assert_eq!(rs.select1(ones.len() as u64), None);
    }

    #[test]
    fn spans_multiple_blocks() {
        let n = 5000usize;
        let flags: Vec<bool> = (0..n).map(|i| i % 7 == 0).collect();
        let rs = RankSelectBitVec::from_flags(&flags);
        assert_eq!(rs.rank1(n as u64), flags.iter().filter(|&&b| b).count() as u64);
        assert_eq!(rs.select1(3), Some(21)); // 4th multiple of 7 is 21
    }

    #[test]
    fn serde_roundtrip() {
        let flags = vec![true, true, false, true, false, false, true];
        let rs = RankSelectBitVec::from_flags(&flags);
        let bytes = bincode::serialize(&rs).unwrap();
        let back: RankSelectBitVec = bincode::deserialize(&bytes).unwrap();
        assert_eq!(rs, back);
    }
}
