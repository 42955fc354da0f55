//! Per-allele and per-base coverage recording, plus the supplemented
//! read-statistics module (§4.6, §1A).

pub mod error;
pub mod read_source;
pub mod read_stats;
pub mod recorder;

pub use error::ReadInputError;
pub use read_source::{ChainedReadSource, EncodedRead, FastqReadSource, ReadSource};
#[cfg(any(test, feature = "mock"))]
pub use read_source::MockReadSource;
pub use read_stats::{phred_to_error_prob, ReadStats};
pub use recorder::{commit_read, site_ordinal, Coverage};
