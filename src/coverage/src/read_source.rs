//! Read ingestion boundary (§4.7): a narrow trait isolating the rest of the
//! pipeline from the concrete file format reads arrive in.

use std::fs::File;
use std::path::Path;

use bio::io::fastq;
use located_error::LocatedError;

use crate::error::ReadInputError;

/// One read, already separated into its bases and Phred+33 quality string.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EncodedRead {
    pub bases: Vec<u8>,
    pub qualities: Vec<u8>,
}

/// Source of reads to map, one at a time. Implemented by [`FastqReadSource`]
/// for real input and mocked (via `mockall`) in read-ingestion tests.
#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
pub trait ReadSource {
    /// The next read, or `None` once the source is exhausted. `index` is the
    /// 0-based ordinal of this call, used in [`ReadInputError`] messages and
    /// to seed the per-read PRNG (§5).
    fn next_read(&mut self, index: u64) -> Result<Option<EncodedRead>, ReadInputError>;
}

/// A [`ReadSource`] backed by a single FASTQ file.
pub struct FastqReadSource {
    records: fastq::Records<File>,
}

impl FastqReadSource {
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        let reader = fastq::Reader::from_file(path)
            .with_loc(|| format!("opening read file {}", path.display()))?;
        Ok(Self { records: reader.records() })
    }
}

impl ReadSource for FastqReadSource {
    fn next_read(&mut self, index: u64) -> Result<Option<EncodedRead>, ReadInputError> {
        match self.records.next() {
            None => Ok(None),
            Some(Err(_)) => Err(ReadInputError::MalformedRecord(index)),
            Some(Ok(record)) => Ok(Some(EncodedRead {
                bases: record.seq().to_vec(),
                qualities: record.qual().to_vec(),
            })),
        }
    }
}

/// Chain several [`ReadSource`]s (one per `--reads` file) into one, in order.
pub struct ChainedReadSource {
    sources: Vec<FastqReadSource>,
    current: usize,
}

impl ChainedReadSource {
    pub fn open(paths: &[std::path::PathBuf]) -> anyhow::Result<Self> {
        let sources = paths.iter().map(|p| FastqReadSource::open(p)).collect::<anyhow::Result<Vec<_>>>()?;
        Ok(Self { sources, current: 0 })
    }
}

impl ReadSource for ChainedReadSource {
    fn next_read(&mut self, index: u64) -> Result<Option<EncodedRead>, ReadInputError> {
        while self.current < self.sources.len() {
            if let Some(read) = self.sources[self.current].next_read(index)? {
                return Ok(Some(read));
            }
            self.current += 1;
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_source_yields_configured_reads_then_ends() {
        let mut mock = MockReadSource::new();
        let mut calls = 0;
        mock.expect_next_read().returning(move |_| {
            calls += 1;
            if calls == 1 {
                Ok(Some(EncodedRead { bases: b"ACGT".to_vec(), qualities: b"IIII".to_vec() }))
            } else {
                Ok(None)
            }
        });

        assert_eq!(mock.next_read(0).unwrap().unwrap().bases, b"ACGT");
        assert_eq!(mock.next_read(1).unwrap(), None);
    }
}
