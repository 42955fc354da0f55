use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum MalformedPrgError {
    #[error("Marker stream byte length {0} is not a multiple of the integer width (4 bytes)")]
    TruncatedStream(usize),

    #[error("Marker value 0 encountered: reserved, never valid in an encoded PRG")]
    ZeroMarker,

    #[error("Invalid DNA base character '{0}'")]
    InvalidBase(char),

    #[error("Site marker {0} closes before it opens")]
    UnopenedSite(u32),

    #[error("Site marker {0} never closes")]
    UnclosedSite(u32),
}
