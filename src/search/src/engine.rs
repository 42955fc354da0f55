//! The vBWT backward-search engine: marker jumps then base extension (§4.4).

use std::collections::HashSet;

use covgraph::{CovGraph, TargetKind};
use fmindex::FmIndex;
use prg::{alphabet, Marker};

use crate::state::{Locus, SearchState, VariantSiteState};

/// Sentinel allele id meaning "entered/exited a site without the traversing
/// read ever resolving which specific allele it took" (§3's `unknown`).
pub const UNKNOWN_ALLELE: u32 = 0;

/// Extend every state in `states` by one more base of the read, marker-jump
/// stage first (unless `do_marker_jump` is false, used only for the
/// rightmost base of a read whose marker cost was already paid by the kmer
/// index seed).
pub fn extend_one_base(base: Marker, states: &[SearchState], fm: &FmIndex, graph: &CovGraph, do_marker_jump: bool) -> Vec<SearchState> {
    let mut live: Vec<SearchState> = states.to_vec();
    if do_marker_jump {
        for state in states {
            live.extend(process_markers(state, fm, graph));
        }
    }

    live.into_iter().filter_map(|s| extend_base(&s, base, fm)).collect()
}

fn extend_base(state: &SearchState, base: Marker, fm: &FmIndex) -> Option<SearchState> {
    if !state.is_live() {
        return None;
    }
    let new_lo = fm.c(base) + fm.dna_bwt_rank(state.sa_lo, base);
    let new_hi_excl = fm.c(base) + fm.dna_bwt_rank(state.sa_hi + 1, base);
    if new_hi_excl <= new_lo {
        return None;
    }
    let mut next = state.clone();
    next.sa_lo = new_lo;
    next.sa_hi = new_hi_excl - 1;
    Some(next)
}

/// Marker-jump stage: enumerate every marker-preceded position within
/// `state`'s SA interval and dispatch to [`exit_site`] or [`enter_site`].
/// Does not include `state` itself — the caller keeps the un-jumped state
/// alive separately.
fn process_markers(state: &SearchState, fm: &FmIndex, graph: &CovGraph) -> Vec<SearchState> {
    if !state.is_live() {
        return Vec::new();
    }
    let mut out = Vec::new();
    let rank_lo = fm.marker_bwt_rank(state.sa_lo);
    let rank_hi = fm.marker_bwt_rank(state.sa_hi + 1);
    for k in rank_lo..rank_hi {
        let Some(p) = fm.marker_bwt_select(k) else { continue };
        let marker = fm.bwt(p);
        if alphabet::is_site_marker(marker) {
            out.extend(exit_site(state, marker, fm, graph));
            continue;
        }
        // `marker` is an allele separator shared by every allele of its site.
        // Only its *closing* occurrence (the text position recorded as the
        // site's end) actually leaves the site; every other occurrence is an
        // interior separator between two alleles, i.e. an entry.
        let text_pos = fm.sa(p) as usize;
        if graph.is_closing_occurrence(marker, text_pos) {
            let site_id = alphabet::site_of_allele_marker(marker);
            out.extend(exit_site(state, site_id, fm, graph));
        } else {
            out.extend(enter_site(state, marker, fm, graph));
        }
    }
    out
}

/// The read is leaving a site through its entry marker: only allele 1's
/// leading boundary is the (odd) site marker itself, so this always
/// resolves the exited allele to `1` when the site had in fact been
/// entered within this state.
fn exit_site(state: &SearchState, site_marker: Marker, fm: &FmIndex, graph: &CovGraph) -> Vec<SearchState> {
    let mut next = state.clone();
    match fm.sa_range(site_marker) {
        Some((lo, hi)) => {
            next.sa_lo = lo;
            next.sa_hi = hi;
        }
        None => {
            next.invalid = true;
            return vec![next];
        }
    }

    match next.traversing_path.last().copied() {
        Some((top_site, _)) if top_site == site_marker => {
            next.traversing_path.pop();
            next.traversed_path.push((site_marker, 1));
        }
        _ => next.traversed_path.push((site_marker, UNKNOWN_ALLELE)),
    }
    next.variant_site_state = VariantSiteState::OutsideVariantSite;

    follow_chain(next, site_marker, fm, graph)
}

/// The read is entering a site through one of its allele separators
/// (alleles `2..=n`, all sharing the marker value `site_id + 1`): the new SA
/// interval is the union of every occurrence of that marker.
fn enter_site(state: &SearchState, allele_marker: Marker, fm: &FmIndex, graph: &CovGraph) -> Vec<SearchState> {
    let site_id = alphabet::site_of_allele_marker(allele_marker);
    let mut next = state.clone();
    match fm.sa_range(allele_marker) {
        Some((lo, hi)) => {
            next.sa_lo = lo;
            next.sa_hi = hi;
        }
        None => {
            next.invalid = true;
            return vec![next];
        }
    }
    next.traversing_path.push((site_id, None));
    next.variant_site_state = VariantSiteState::WithinVariantSite;

    follow_chain(next, allele_marker, fm, graph)
}

/// Resolve zero-base-consumption hops recorded in `target_map` for `marker`,
/// recursively chaining through further adjacent markers.
///
/// When a marker has more than one hop (a site boundary adjacent to several
/// others at once), they are walked deepest-nested-bubble-first, the same
/// order `bubble_map` is sorted in (§4.4), so a chain into a more deeply
/// nested site is always resolved before its enclosing one.
fn follow_chain(base_state: SearchState, marker: Marker, fm: &FmIndex, graph: &CovGraph) -> Vec<SearchState> {
    let mut out = vec![base_state.clone()];
    let mut hops: Vec<_> = graph.target_map(marker).to_vec();
    hops.sort_by_key(|hop| graph.bubble_rank(hop_site_id(hop.marker)));
    for hop in &hops {
        match hop.kind {
            TargetKind::DoubleEntry => {
                // `hop.marker` is itself a site (odd) marker: entering it
                // costs no base since its entry boundary is adjacent.
                let mut s = base_state.clone();
                s.traversing_path.push((hop.marker, None));
                s.variant_site_state = VariantSiteState::WithinVariantSite;
                out.extend(follow_chain(s, hop.marker, fm, graph));
            }
            TargetKind::DoubleExit | TargetKind::EntryFromExit => {
                if alphabet::is_site_marker(hop.marker) {
                    out.extend(exit_site(&base_state, hop.marker, fm, graph));
                } else {
                    out.extend(enter_site(&base_state, hop.marker, fm, graph));
                }
            }
            TargetKind::DirectDeletion { allele_id } => {
                let mut s = base_state.clone();
                match s.traversing_path.last().copied() {
                    Some((top_site, _)) => {
                        s.traversing_path.pop();
                        s.traversed_path.push((top_site, allele_id));
                    }
                    None => {
                        s.traversed_path.push((alphabet::site_of_allele_marker(marker), allele_id));
                    }
                }
                out.extend(exit_site(&s, hop.marker, fm, graph));
            }
        }
    }
    out
}

/// The site id a `target_map` hop's marker belongs to, whether that marker is
/// itself a site (odd) marker or one of its allele (even) separators.
fn hop_site_id(marker: Marker) -> Marker {
    if alphabet::is_site_marker(marker) {
        marker
    } else {
        alphabet::site_of_allele_marker(marker)
    }
}

/// Explode a terminal state whose read never crossed a marker (lies wholly
/// inside a single allele) into one state per distinct `(site, allele)` its
/// SA interval's positions actually belong to, recovered via the graph's
/// random-access table (§4.4).
pub fn handle_allele_encapsulated(state: &SearchState, fm: &FmIndex, graph: &CovGraph) -> Vec<SearchState> {
    if !state.traversed_path.is_empty() || !state.traversing_path.is_empty() || !state.is_live() {
        return vec![state.clone()];
    }

    let mut seen: HashSet<Locus> = HashSet::new();
    let mut out = Vec::new();
    for sa_idx in state.sa_lo..=state.sa_hi {
        let text_pos = fm.sa(sa_idx) as usize;
        let Some(access) = graph.random_access(text_pos) else { continue };
        let node = graph.node(access.node);
        let Some(allele_id) = node.allele_id() else { continue };
        let locus = (node.site_id(), allele_id);
        if seen.insert(locus) {
            let mut s = state.clone();
            s.sa_lo = sa_idx;
            s.sa_hi = sa_idx;
            s.traversed_path.push(locus);
            out.push(s);
        }
    }
    if out.is_empty() {
        vec![state.clone()]
    } else {
        out
    }
}
