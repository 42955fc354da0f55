//! The FM-index itself: suffix array, BWT, C-table, and rank/select bitmaps (§4.3).

use prg::{alphabet, LinearPrg, Marker};
use serde::{Deserialize, Serialize};

use crate::error::IndexError;
use crate::rankselect::RankSelectBitVec;
use crate::sa::{bwt_from_sa, suffix_array};

/// End-of-text sentinel appended before suffix-array construction. Marker
/// `0` never appears inside a normalised [`LinearPrg`], so this use never
/// collides with its role as the "unknown allele" sentinel elsewhere.
pub const SENTINEL: Marker = 0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FmIndex {
    /// Length of the encoded text, sentinel included.
    size: u64,
    sa: Vec<u64>,
    bwt: Vec<u32>,
    /// One bitmap per DNA base (index 0=A .. 3=T), over BWT positions.
    dna_bwt: [RankSelectBitVec; 4],
    /// Any `m >= 5`, over BWT positions.
    marker_bwt: RankSelectBitVec,
    /// Any `m >= 5`, over the original (pre-sentinel) linear PRG positions.
    marker_prg: RankSelectBitVec,
    /// Distinct symbols present in the text, sorted ascending, with their
    /// occurrence count: `(symbol, count)`.
    symbols: Vec<(u32, u64)>,
    /// `prefix[k]` = number of text symbols strictly less than `symbols[k].0`.
    prefix: Vec<u64>,
}

impl FmIndex {
    /// Build the index from a validated, normalised linear PRG.
    pub fn build(prg: &LinearPrg) -> Self {
        let mut text: Vec<u32> = prg.markers().to_vec();
        text.push(SENTINEL);

        let sa = suffix_array(&text);
        let bwt = bwt_from_sa(&text, &sa);

        let mut dna_flags: [Vec<bool>; 4] = Default::default();
        for flags in &mut dna_flags {
            *flags = Vec::with_capacity(bwt.len());
        }
        let mut marker_flags = Vec::with_capacity(bwt.len());
        for &c in &bwt {
            for (base_idx, flags) in dna_flags.iter_mut().enumerate() {
                flags.push(alphabet::is_base(c) && c == (base_idx as u32 + 1));
            }
            marker_flags.push(alphabet::is_variant_marker(c));
        }
        let dna_bwt = [
            RankSelectBitVec::from_flags(&dna_flags[0]),
            RankSelectBitVec::from_flags(&dna_flags[1]),
            RankSelectBitVec::from_flags(&dna_flags[2]),
            RankSelectBitVec::from_flags(&dna_flags[3]),
        ];
        let marker_bwt = RankSelectBitVec::from_flags(&marker_flags);

        let marker_prg_flags: Vec<bool> = prg.markers().iter().map(|&m| alphabet::is_variant_marker(m)).collect();
        let marker_prg = RankSelectBitVec::from_flags(&marker_prg_flags);

        let mut counts: std::collections::BTreeMap<u32, u64> = std::collections::BTreeMap::new();
        for &c in &text {
            *counts.entry(c).or_insert(0) += 1;
        }
        let symbols: Vec<(u32, u64)> = counts.into_iter().collect();
        let mut prefix = Vec::with_capacity(symbols.len());
        let mut acc = 0u64;
        for &(_, count) in &symbols {
            prefix.push(acc);
            acc += count;
        }

        Self {
            size: text.len() as u64,
            sa,
            bwt,
            dna_bwt,
            marker_bwt,
            marker_prg,
            symbols,
            prefix,
        }
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn sa(&self, i: u64) -> u64 {
        self.sa[i as usize]
    }

    pub fn bwt(&self, i: u64) -> u32 {
        self.bwt[i as usize]
    }

    /// `C[c]`: number of text symbols strictly less than `symbol`.
    pub fn c(&self, symbol: u32) -> u64 {
        match self.symbols.binary_search_by_key(&symbol, |&(s, _)| s) {
            Ok(idx) => self.prefix[idx],
            Err(idx) => self.prefix.get(idx).copied().unwrap_or(self.size),
        }
    }

    /// The inclusive SA range occupied by all occurrences of `symbol`, if any.
    pub fn sa_range(&self, symbol: u32) -> Option<(u64, u64)> {
        let idx = self.symbols.binary_search_by_key(&symbol, |&(s, _)| s).ok()?;
        let (_, count) = self.symbols[idx];
        let lo = self.prefix[idx];
        Some((lo, lo + count - 1))
    }

    /// Count of `base` (`1..=4`) in `bwt[0, i)`.
    pub fn dna_bwt_rank(&self, i: u64, base: u32) -> u64 {
        debug_assert!((1..=4).contains(&base));
        self.dna_bwt[(base - 1) as usize].rank1(i)
    }

    pub fn marker_bwt_rank(&self, i: u64) -> u64 {
        self.marker_bwt.rank1(i)
    }

    pub fn marker_bwt_select(&self, k: u64) -> Option<u64> {
        self.marker_bwt.select1(k)
    }

    pub fn marker_bwt_is_marker(&self, i: u64) -> bool {
        self.marker_bwt.get(i)
    }

    pub fn marker_prg_rank(&self, i: u64) -> u64 {
        self.marker_prg.rank1(i)
    }

    pub fn marker_prg_select(&self, k: u64) -> Option<u64> {
        self.marker_prg.select1(k)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, IndexError> {
        bincode::serialize(self).map_err(|e| IndexError::IndexCorrupt(e.to_string()))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, IndexError> {
        let index: Self = bincode::deserialize(bytes).map_err(|e| IndexError::IndexCorrupt(e.to_string()))?;
        if index.sa.len() as u64 != index.size || index.bwt.len() as u64 != index.size {
            return Err(IndexError::IndexCorrupt(format!(
                "declared size {} disagrees with sa/bwt lengths {}/{}",
                index.size,
                index.sa.len(),
                index.bwt.len()
            )));
        }
        Ok(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prg::grammar::string_to_ints;

    fn index_of(s: &str) -> FmIndex {
        let ints = string_to_ints(s).unwrap();
        let prg = LinearPrg::from_markers(ints).unwrap();
        FmIndex::build(&prg)
    }

    #[test]
    fn rank_sum_invariant_holds() {
        // For every BWT index i, sum of per-base ranks + marker rank + the
        // (single) end-of-text sentinel occurrence == i: bases, markers and
        // the sentinel exhaustively partition the BWT alphabet.
        let fm = index_of("AC[C,T]GT");
        let sentinel_count = |i: u64| (0..i).filter(|&k| fm.bwt(k) == SENTINEL).count() as u64;
        for i in 0..=fm.size() {
            let base_sum: u64 = (1..=4u32).map(|b| fm.dna_bwt_rank(i, b)).sum();
            let marker_sum = fm.marker_bwt_rank(i);
            assert_eq!(base_sum + marker_sum + sentinel_count(i), i);
        }
    }

    #[test]
    fn sa_range_recovers_symbol_count() {
        let fm = index_of("ACGT");
        let (lo, hi) = fm.sa_range(1).unwrap(); // 'A' occurs once
        assert_eq!(hi - lo + 1, 1);
    }

    #[test]
    fn bincode_roundtrip_preserves_all_fields() {
        let fm = index_of("A[C,T[A,G]]C");
        let bytes = fm.to_bytes().unwrap();
        let reloaded = FmIndex::from_bytes(&bytes).unwrap();
        assert_eq!(reloaded, fm);
    }

    #[test]
    fn from_bytes_rejects_size_mismatch() {
        let fm = index_of("ACGT");
        let mut bytes = fm.to_bytes().unwrap();
        // Corrupt the leading `size` field's encoding by truncating the
        // buffer: bincode decoding should fail, not silently desync.
        bytes.truncate(bytes.len() / 2);
        assert!(FmIndex::from_bytes(&bytes).is_err());
    }
}
