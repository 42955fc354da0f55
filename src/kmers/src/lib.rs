//! Precomputed search-state cache keyed by length-k right context (§4.5).

pub mod error;
pub mod index;
pub mod packing;

pub use error::KmerIndexError;
pub use index::{KmerIndex, KmerState, KMERS_FILE, KMER_INDEX_FILE};
