use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KmerIndexError {
    #[error("kmer size at map time ({map_k}) differs from build time ({build_k})")]
    SizeMismatch { build_k: usize, map_k: usize },

    #[error("kmer index entry references SA range [{lo}, {hi}] outside the loaded FM-index of size {fm_size}")]
    OutOfRange { lo: u64, hi: u64, fm_size: u64 },

    #[error("kmer index text record is malformed: {0}")]
    Malformed(String),
}
