use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphBuildError {
    #[error("Site {0} contributes no bases across any of its alleles")]
    EmptyAllele(u32),

    #[error("Site {0} declares only a single allele")]
    SingleAlleleSite(u32),

    #[error("Marker {0} has no valid successor in the linear PRG")]
    DanglingMarker(u32),
}
