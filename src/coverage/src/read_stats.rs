//! Phred-derived error rate and post-mapping depth summary (§1A, supplemented
//! from `original_source/libgramtools/include/common/read_stats.hpp`).

use crate::recorder::Coverage;

/// Only the first this-many reads contribute to the Phred-derived fields, as
/// in the original.
const NUM_READS_USED: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ReadStats {
    pub mean_pb_error: f64,
    pub max_read_length: u32,
    pub num_bases_processed: u64,
    pub mean_cov_depth: f64,
    pub variance_cov_depth: f64,
    pub num_sites_no_coverage: u64,
    pub num_sites_total: u64,
}

/// Phred+33 quality byte to per-base error probability.
pub fn phred_to_error_prob(qual_byte: u8) -> f64 {
    let q = f64::from(qual_byte.saturating_sub(33));
    10f64.powf(-q / 10.0)
}

impl ReadStats {
    /// Derive the pre-mapping fields from each read's quality string,
    /// capped at the first [`NUM_READS_USED`] reads.
    pub fn from_qualities<'a, I: IntoIterator<Item = &'a [u8]>>(qualities: I) -> Self {
        let mut sum_error = 0.0f64;
        let mut num_bases_processed = 0u64;
        let mut max_read_length = 0u32;

        for quals in qualities.into_iter().take(NUM_READS_USED) {
            max_read_length = max_read_length.max(quals.len() as u32);
            for &q in quals {
                sum_error += phred_to_error_prob(q);
                num_bases_processed += 1;
            }
        }

        let mean_pb_error = if num_bases_processed > 0 { sum_error / num_bases_processed as f64 } else { 0.0 };

        Self { mean_pb_error, max_read_length, num_bases_processed, ..Self::default() }
    }

    /// Fold in the post-`quasimap` per-site depth statistics.
    pub fn with_depth_stats(mut self, coverage: &Coverage) -> Self {
        let (mean, variance, zero, total) = coverage.depth_stats();
        self.mean_cov_depth = mean;
        self.variance_cov_depth = variance;
        self.num_sites_no_coverage = zero;
        self.num_sites_total = total;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn perfect_quality_yields_near_zero_error() {
        // Phred 40 ('I' in ASCII) => error prob ~1e-4.
        let stats = ReadStats::from_qualities(vec![&b"IIII"[..]]);
        assert!(stats.mean_pb_error < 1e-3);
        assert_eq!(stats.num_bases_processed, 4);
        assert_eq!(stats.max_read_length, 4);
    }

    #[test]
    fn empty_input_has_zeroed_fields() {
        let stats = ReadStats::from_qualities(std::iter::empty());
        assert_eq!(stats.mean_pb_error, 0.0);
        assert_eq!(stats.num_bases_processed, 0);
        assert_eq!(stats.max_read_length, 0);
    }

    #[test]
    fn caps_at_num_reads_used() {
        let reads = vec![&b"II"[..]; NUM_READS_USED + 50];
        let stats = ReadStats::from_qualities(reads);
        assert_eq!(stats.num_bases_processed, (NUM_READS_USED * 2) as u64);
    }
}
