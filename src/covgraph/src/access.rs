//! Random-access and target-map tables derived from the graph (§4.2, §4.4).

use prg::Marker;
use serde::{Deserialize, Serialize};

use crate::node::NodeId;

/// For a single linear PRG position: the node holding it, the offset into
/// that node's own sequence/coverage array, and (for marker positions only)
/// the marker this position is entering or leaving.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RandomAccessEntry {
    pub node: NodeId,
    pub offset: usize,
    pub target_locus: Option<Marker>,
}

/// The kind of zero-consumption hop recorded by [`crate::graph::CovGraph::target_map`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TargetKind {
    /// Two site entries are adjacent: entering the second costs no base.
    DoubleEntry,
    /// Two site exits are adjacent.
    DoubleExit,
    /// An exit is immediately followed by another site's entry.
    EntryFromExit,
    /// A zero-base allele: jumping straight from entry/separator to the
    /// site's exit without traversing any sequence node. Carries the id of
    /// the allele being skipped.
    DirectDeletion { allele_id: u32 },
}

/// One edge of the marker adjacency graph used by the search engine's
/// marker-jump stage to chain through zero-length hops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetEntry {
    pub marker: Marker,
    pub kind: TargetKind,
}
