use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IndexError {
    #[error("FM-index artefact is corrupt: {0}")]
    IndexCorrupt(String),
}
