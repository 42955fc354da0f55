//! Single-pass DAG construction plus inline target-map derivation (§4.2).
//!
//! The spec describes this as two passes (build the DAG, then walk it again
//! for `target_map`); both are folded into one traversal here since every
//! piece of state the second pass needs (the currently open site and its
//! in-progress allele index) is already on the builder's stack during the
//! first.

use std::collections::HashMap;

use prg::{alphabet, LinearPrg, Marker};
use slotmap::SlotMap;

use crate::access::{RandomAccessEntry, TargetEntry, TargetKind};
use crate::error::GraphBuildError;
use crate::graph::CovGraph;
use crate::node::{Node, NodeId, NodeKind};

struct OpenSite {
    entry: NodeId,
    exit: NodeId,
    site_id: Marker,
    allele_id: u32,
    any_nonempty: bool,
}

/// The adjacency kind of a marker position, used purely to classify hops
/// between consecutive markers for `target_map`.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Kind {
    Base,
    SiteEntry,
    SiteEnd,
    AlleleEnd,
}

/// Build a [`CovGraph`] from a validated, normalised linear PRG.
pub fn build(prg: &LinearPrg) -> Result<CovGraph, GraphBuildError> {
    let markers = prg.markers();

    let mut nodes: SlotMap<NodeId, Node> = SlotMap::with_key();
    let root = nodes.insert(Node {
        kind: NodeKind::Sequence { bases: Vec::new(), site_id: 0, allele_id: 0 },
        position: 0,
        coverage: Vec::new(),
        out_edges: Vec::new(),
    });

    let mut current = root;
    let mut stack: Vec<OpenSite> = Vec::new();
    let mut bubble_map: Vec<(NodeId, NodeId)> = Vec::new();
    let mut par_map: HashMap<Marker, (Marker, u32)> = HashMap::new();
    let mut random_access: Vec<RandomAccessEntry> = Vec::with_capacity(markers.len());
    let mut target_map: HashMap<Marker, Vec<TargetEntry>> = HashMap::new();
    let mut position: u64 = 0;

    // (marker, kind, allele-being-closed) of the previous position, reset to
    // `None` whenever a base intervenes.
    let mut prev: Option<(Marker, Kind, u32)> = None;

    for (i, &m) in markers.iter().enumerate() {
        if alphabet::is_base(m) {
            match &mut nodes[current].kind {
                NodeKind::Sequence { bases, site_id, .. } => {
                    bases.push(alphabet::decode_dna_base(m));
                    if *site_id != 0 {
                        if let Some(top) = stack.last_mut() {
                            top.any_nonempty = true;
                        }
                    }
                }
                _ => unreachable!("active node is always a Sequence node"),
            }
            let offset = nodes[current].sequence().unwrap().len() - 1;
            random_access.push(RandomAccessEntry { node: current, offset, target_locus: None });
            position += 1;
            prev = None;
            continue;
        }

        if alphabet::is_site_marker(m) {
            let site_id = m;
            let entry = nodes.insert(Node {
                kind: NodeKind::SiteEntry { site_id, allele_id: None },
                position,
                coverage: Vec::new(),
                out_edges: Vec::new(),
            });
            nodes[current].out_edges.push(entry);

            let exit = nodes.insert(Node {
                kind: NodeKind::SiteExit { site_id, allele_id: None },
                position,
                coverage: Vec::new(),
                out_edges: Vec::new(),
            });
            bubble_map.push((entry, exit));

            if let Some(outer) = stack.last() {
                par_map.insert(site_id, (outer.site_id, outer.allele_id));
            }

            let allele = nodes.insert(Node {
                kind: NodeKind::Sequence { bases: Vec::new(), site_id, allele_id: 1 },
                position,
                coverage: Vec::new(),
                out_edges: Vec::new(),
            });
            nodes[entry].out_edges.push(allele);

            record_adjacency(&mut target_map, prev, (m, Kind::SiteEntry, 1));

            stack.push(OpenSite { entry, exit, site_id, allele_id: 1, any_nonempty: false });
            current = allele;
            random_access.push(RandomAccessEntry { node: entry, offset: 0, target_locus: Some(m) });
            prev = Some((m, Kind::SiteEntry, 1));
            continue;
        }

        // Allele marker: either an interior separator or the site's closing occurrence.
        let is_closing = prg.end_positions().get(&m) == Some(&i);
        let top = stack
            .last_mut()
            .ok_or(GraphBuildError::DanglingMarker(m))?;
        let closing_allele_id = top.allele_id;
        let exit = top.exit;

        nodes[current].out_edges.push(exit);

        if is_closing {
            let closed = stack.pop().expect("checked above");
            if closed.allele_id < 2 {
                return Err(GraphBuildError::SingleAlleleSite(closed.site_id));
            }
            if !closed.any_nonempty {
                return Err(GraphBuildError::EmptyAllele(closed.site_id));
            }

            random_access.push(RandomAccessEntry { node: exit, offset: 0, target_locus: Some(m) });
            record_adjacency(&mut target_map, prev, (m, Kind::SiteEnd, closing_allele_id));

            let continuation_site = stack.last().map_or(0, |s| s.site_id);
            let continuation_allele = stack.last().map_or(0, |s| s.allele_id);
            let continuation = nodes.insert(Node {
                kind: NodeKind::Sequence { bases: Vec::new(), site_id: continuation_site, allele_id: continuation_allele },
                position,
                coverage: Vec::new(),
                out_edges: Vec::new(),
            });
            nodes[exit].out_edges.push(continuation);
            current = continuation;
            prev = Some((m, Kind::SiteEnd, closing_allele_id));
        } else {
            top.allele_id += 1;
            let entry = top.entry;
            let new_allele_id = top.allele_id;
            let new_allele = nodes.insert(Node {
                kind: NodeKind::Sequence { bases: Vec::new(), site_id: top.site_id, allele_id: new_allele_id },
                position,
                coverage: Vec::new(),
                out_edges: Vec::new(),
            });
            nodes[entry].out_edges.push(new_allele);

            random_access.push(RandomAccessEntry { node: exit, offset: 0, target_locus: Some(m) });
            record_adjacency(&mut target_map, prev, (m, Kind::AlleleEnd, closing_allele_id));

            current = new_allele;
            prev = Some((m, Kind::AlleleEnd, new_allele_id));
        }
    }

    if let Some(open) = stack.first() {
        return Err(GraphBuildError::DanglingMarker(open.site_id));
    }

    // Deepest-nested bubbles first: sort by descending start position, then
    // descending site id, matching the ordering `bubble_map` is consulted in
    // during marker-jump chain resolution (§4.4).
    bubble_map.sort_by(|a, b| {
        let pos_a = nodes[a.0].position;
        let pos_b = nodes[b.0].position;
        pos_b.cmp(&pos_a).then_with(|| nodes[b.0].site_id().cmp(&nodes[a.0].site_id()))
    });

    for node in nodes.values_mut() {
        if let NodeKind::Sequence { bases, site_id, .. } = &node.kind {
            if *site_id != 0 {
                node.coverage = vec![0u64; bases.len()];
            }
        }
    }

    let end_positions = prg.end_positions().clone();

    Ok(CovGraph { nodes, root, bubble_map, par_map, random_access, target_map, end_positions })
}

/// Classify the hop from `prev` (if any) to `(marker, kind, allele_id)` and
/// record it in `target_map` per the adjacency rules of §4.2/§4.4.
///
/// Entries are keyed by the marker that backward search resolves *first*
/// (the later one in text order), mapping to its immediate zero-base-gap
/// predecessor — this is the direction the marker-jump chain-resolution
/// loop walks in (§4.4), for all four adjacency kinds alike.
fn record_adjacency(
    target_map: &mut HashMap<Marker, Vec<TargetEntry>>,
    prev: Option<(Marker, Kind, u32)>,
    (marker, kind, allele_id): (Marker, Kind, u32),
) {
    let Some((prev_marker, prev_kind, _prev_allele_id)) = prev else { return };

    match (prev_kind, kind) {
        (Kind::SiteEntry, Kind::SiteEntry) | (Kind::AlleleEnd, Kind::SiteEntry) => {
            target_map.entry(marker).or_default().push(TargetEntry {
                marker: prev_marker,
                kind: TargetKind::DoubleEntry,
            });
        }
        (Kind::SiteEntry, Kind::SiteEnd) | (Kind::AlleleEnd, Kind::SiteEnd) => {
            // Nothing but the closing marker follows the entry/separator: the
            // allele that was about to start is a zero-base deletion.
            target_map.entry(marker).or_default().push(TargetEntry {
                marker: prev_marker,
                kind: TargetKind::DirectDeletion { allele_id },
            });
        }
        (Kind::SiteEnd, Kind::SiteEntry) => {
            target_map.entry(marker).or_default().push(TargetEntry {
                marker: prev_marker,
                kind: TargetKind::EntryFromExit,
            });
        }
        (Kind::SiteEnd, Kind::SiteEnd) => {
            target_map.entry(marker).or_default().push(TargetEntry {
                marker: prev_marker,
                kind: TargetKind::DoubleExit,
            });
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prg::grammar::string_to_ints;

    fn build_str(s: &str) -> Result<CovGraph, GraphBuildError> {
        let ints = string_to_ints(s).unwrap();
        let prg = LinearPrg::from_markers(ints).unwrap();
        build(&prg)
    }

    #[test]
    fn single_bubble_has_two_alleles() {
        let graph = build_str("A[C,T]G").unwrap();
        assert_eq!(graph.bubble_map().len(), 1);
        let (entry, exit) = graph.bubble_map()[0];
        assert!(graph.node(entry).out_edges.len() == 1 || graph.node(entry).out_edges.len() == 2);
        // entry should fan out to exactly 2 allele sequence nodes (C, T)
        let allele_nodes: Vec<_> = graph.node(entry).out_edges.clone();
        assert_eq!(allele_nodes.len(), 2);
        for id in allele_nodes {
            let node = graph.node(id);
            assert_eq!(node.sequence().unwrap().len(), 1);
            assert_eq!(node.coverage.len(), 1);
        }
        let _ = exit;
    }

    #[test]
    fn top_level_sequence_has_no_coverage_array() {
        let graph = build_str("AAA[C,T]GGG").unwrap();
        let root = graph.node(graph.root());
        assert!(root.coverage.is_empty());
        assert_eq!(root.sequence().unwrap(), b"AAA");
    }

    #[test]
    fn nested_site_records_parent() {
        let graph = build_str("A[C,T[A,G]]C").unwrap();
        assert_eq!(graph.bubble_map().len(), 2);
        // one of the two sites' parent must be the other
        let parented = graph.bubble_map().iter().find_map(|(entry, _)| {
            let site = graph.node(*entry).site_id();
            graph.parent_of(site)
        });
        assert!(parented.is_some());
    }

    #[test]
    fn single_allele_site_is_rejected() {
        // Hand-build a degenerate single-allele site bypassing the grammar helper.
        let prg = LinearPrg::from_markers(vec![1, 5, 2, 6, 3]).unwrap();
        let err = build(&prg).unwrap_err();
        assert_eq!(err, GraphBuildError::SingleAlleleSite(5));
    }

    #[test]
    fn all_empty_alleles_is_rejected() {
        // [,] : entry directly followed by separator directly followed by close.
        let prg = LinearPrg::from_markers(vec![5, 6, 6]).unwrap();
        let err = build(&prg).unwrap_err();
        assert_eq!(err, GraphBuildError::EmptyAllele(5));
    }

    #[test]
    fn direct_deletion_allele_is_accepted_when_sibling_is_nonempty() {
        // [T,] : first allele is "T", second (against the closing marker) is
        // a zero-base deletion.
        let prg = LinearPrg::from_markers(vec![5, 4, 6, 6]).unwrap();
        let graph = build(&prg).unwrap();
        let (entry, _exit) = graph.bubble_map()[0];
        assert_eq!(graph.node(entry).out_edges.len(), 2);
        let targets = graph.target_map(6);
        assert!(targets
            .iter()
            .any(|t| matches!(t.kind, TargetKind::DirectDeletion { allele_id: 2 })));
    }

    #[test]
    fn random_access_covers_every_position() {
        let ints = string_to_ints("AA[C,T]GG").unwrap();
        let prg = LinearPrg::from_markers(ints).unwrap();
        let graph = build(&prg).unwrap();
        assert_eq!(graph.random_access_len(), prg.len());
    }

    #[test]
    fn bincode_roundtrip_preserves_every_table() {
        let graph = build_str("A[C,T[A,G]]C").unwrap();
        let bytes = bincode::serialize(&graph).unwrap();
        let reloaded: CovGraph = bincode::deserialize(&bytes).unwrap();
        assert_eq!(reloaded, graph);
    }
}
