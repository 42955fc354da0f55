use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReadInputError {
    #[error("read source could not be opened: {0}")]
    Open(String),

    #[error("read record at index {0} is malformed")]
    MalformedRecord(u64),

    #[error("read {0} contains a non-ACGT base and was skipped")]
    NonAcgtBase(u64),
}
