//! The coverage graph itself: a DAG plus the derived lookup tables (§3, §4.2).

use std::collections::HashMap;

use prg::Marker;
use serde::{Deserialize, Serialize};
use slotmap::SlotMap;

use crate::access::{RandomAccessEntry, TargetEntry};
use crate::node::{Node, NodeId};

/// A built, validated coverage graph: a DAG of [`Node`]s over `{A,C,G,T}`
/// plus the derived tables the search engine and coverage recorder need.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CovGraph {
    pub(crate) nodes: SlotMap<NodeId, Node>,
    pub(crate) root: NodeId,
    /// Site-entry node -> site-exit node, ordered deepest-nested-first
    /// (greater MSA position, greater site id).
    pub(crate) bubble_map: Vec<(NodeId, NodeId)>,
    /// Inner site odd id -> parent `(site_id, allele_id_1based)`.
    pub(crate) par_map: HashMap<Marker, (Marker, u32)>,
    /// Indexed by linear PRG position.
    pub(crate) random_access: Vec<RandomAccessEntry>,
    /// Marker -> markers reachable from it without consuming a base.
    pub(crate) target_map: HashMap<Marker, Vec<TargetEntry>>,
    /// Even marker -> index of its *closing* occurrence in the linear PRG
    /// (copied from [`prg::LinearPrg::end_positions`] at build time), used to
    /// tell an interior allele separator from the final occurrence that
    /// actually leaves the site (§4.4).
    pub(crate) end_positions: HashMap<Marker, usize>,
}

impl CovGraph {
    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.nodes.iter()
    }

    pub fn bubble_map(&self) -> &[(NodeId, NodeId)] {
        &self.bubble_map
    }

    pub fn parent_of(&self, inner_site_id: Marker) -> Option<(Marker, u32)> {
        self.par_map.get(&inner_site_id).copied()
    }

    pub fn random_access(&self, position: usize) -> Option<&RandomAccessEntry> {
        self.random_access.get(position)
    }

    pub fn random_access_len(&self) -> usize {
        self.random_access.len()
    }

    pub fn target_map(&self, marker: Marker) -> &[TargetEntry] {
        self.target_map
            .get(&marker)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Whether `text_pos` is the closing (final) occurrence of even marker
    /// `marker`, as opposed to one of its interior allele separators.
    pub fn is_closing_occurrence(&self, marker: Marker, text_pos: usize) -> bool {
        self.end_positions.get(&marker) == Some(&text_pos)
    }

    /// Index of `site_id`'s bubble within [`Self::bubble_map`], i.e. its rank
    /// in the deepest-nested-first ordering the marker-jump chain resolution
    /// consults (§4.4). `usize::MAX` if `site_id` has no bubble (unknown site).
    pub fn bubble_rank(&self, site_id: Marker) -> usize {
        self.bubble_map
            .iter()
            .position(|&(entry, _)| self.nodes[entry].site_id() == site_id)
            .unwrap_or(usize::MAX)
    }
}
