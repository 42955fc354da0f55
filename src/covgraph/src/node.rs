//! Graph node types (Component Design §4.2, data model §3).

use prg::Marker;
use serde::{Deserialize, Serialize};

slotmap::new_key_type! {
    /// Arena key for a [`Node`] inside a [`crate::graph::CovGraph`].
    pub struct NodeId;
}

/// The payload of a single DAG node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeKind {
    /// A run of nucleotides. `site_id == 0` means the run sits outside any
    /// bubble; otherwise it is allele `allele_id` (1-based) of site `site_id`.
    Sequence { bases: Vec<u8>, site_id: Marker, allele_id: u32 },
    /// Zero-length boundary entering site `site_id`. `allele_id` is always
    /// `None`: boundaries never resolve to a single allele.
    SiteEntry { site_id: Marker, allele_id: Option<u32> },
    /// Zero-length boundary leaving site `site_id`.
    SiteExit { site_id: Marker, allele_id: Option<u32> },
}

/// A single DAG node: its content, its MSA column, and its outgoing edges.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub kind: NodeKind,
    /// The MSA column of this node's first base (or, for boundary nodes, of
    /// the site's first allele).
    pub position: u64,
    /// Per-base hit counters, zero-initialised. Only ever non-empty for a
    /// `Sequence` node whose `site_id != 0` (Testable Properties §8).
    pub coverage: Vec<u64>,
    pub out_edges: Vec<NodeId>,
}

impl Node {
    pub fn sequence(&self) -> Option<&[u8]> {
        match &self.kind {
            NodeKind::Sequence { bases, .. } => Some(bases),
            _ => None,
        }
    }

    pub fn site_id(&self) -> Marker {
        match self.kind {
            NodeKind::Sequence { site_id, .. }
            | NodeKind::SiteEntry { site_id, .. }
            | NodeKind::SiteExit { site_id, .. } => site_id,
        }
    }

    /// The 1-based allele index this node belongs to, if it is a `Sequence`
    /// node inside a bubble (`site_id != 0`).
    pub fn allele_id(&self) -> Option<u32> {
        match self.kind {
            NodeKind::Sequence { site_id, allele_id, .. } if site_id != 0 => Some(allele_id),
            _ => None,
        }
    }

    pub fn is_boundary(&self) -> bool {
        !matches!(self.kind, NodeKind::Sequence { .. })
    }
}
