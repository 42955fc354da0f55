//! Per-allele and per-base coverage accumulation from mapped read states (§4.6).

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use ahash::AHashMap;
use covgraph::{CovGraph, NodeId};
use fmindex::FmIndex;
use parking_lot::Mutex;
use prg::Marker;
use search::{handle_allele_encapsulated, SearchState};

/// `(site_id - 5) / 2`: a dense, zero-based index for a site's odd marker id.
pub fn site_ordinal(site_id: Marker) -> usize {
    ((site_id - 5) / 2) as usize
}

/// The three coverage tables of §3/§4.6, sized once from the built graph and
/// shared read-only (behind an `Arc`) across the mapping worker pool.
pub struct Coverage {
    /// `[site_ordinal][allele_id - 1]`.
    allele_sum: Vec<Vec<AtomicU64>>,
    /// `[site_ordinal]`: the set of alleles a read was simultaneously
    /// compatible with at that site, counted once per read.
    grouped_allele_counts: Vec<Mutex<AHashMap<Vec<u32>, u64>>>,
    /// Per sequence-node, per-base hit counters, mirroring that node's own
    /// (non-atomic) `coverage` array one-for-one.
    allele_base_coverage: HashMap<NodeId, Vec<AtomicU64>>,
}

impl Coverage {
    pub fn new(graph: &CovGraph) -> Self {
        let mut alleles_per_site: HashMap<usize, u32> = HashMap::new();
        for &(entry, _exit) in graph.bubble_map() {
            let site_id = graph.node(entry).site_id();
            let n_alleles = graph.node(entry).out_edges.len() as u32;
            alleles_per_site.insert(site_ordinal(site_id), n_alleles);
        }
        let n_sites = alleles_per_site.keys().max().map_or(0, |&m| m + 1);

        let allele_sum = (0..n_sites)
            .map(|ord| {
                let n = alleles_per_site.get(&ord).copied().unwrap_or(0);
                (0..n).map(|_| AtomicU64::new(0)).collect()
            })
            .collect();
        let grouped_allele_counts = (0..n_sites).map(|_| Mutex::new(AHashMap::new())).collect();

        let mut allele_base_coverage = HashMap::new();
        for (id, node) in graph.nodes() {
            if !node.coverage.is_empty() {
                allele_base_coverage.insert(id, (0..node.coverage.len()).map(|_| AtomicU64::new(0)).collect());
            }
        }

        Self { allele_sum, grouped_allele_counts, allele_base_coverage }
    }

    pub fn record_sum(&self, site_id: Marker, allele_id: u32) {
        if allele_id == 0 {
            return;
        }
        let ord = site_ordinal(site_id);
        if let Some(alleles) = self.allele_sum.get(ord) {
            if let Some(counter) = alleles.get((allele_id - 1) as usize) {
                counter.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub fn record_grouped(&self, site_id: Marker, alleles: &[u32]) {
        let ord = site_ordinal(site_id);
        let Some(lock) = self.grouped_allele_counts.get(ord) else { return };
        let mut sorted: Vec<u32> = alleles.to_vec();
        sorted.sort_unstable();
        sorted.dedup();
        *lock.lock().entry(sorted).or_insert(0) += 1;
    }

    pub fn record_base_hit(&self, node: NodeId, offset: usize) {
        if let Some(counters) = self.allele_base_coverage.get(&node) {
            if let Some(counter) = counters.get(offset) {
                counter.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub fn allele_sum_coverage(&self, site_id: Marker, allele_id: u32) -> u64 {
        self.allele_sum
            .get(site_ordinal(site_id))
            .and_then(|a| a.get((allele_id.saturating_sub(1)) as usize))
            .map_or(0, |c| c.load(Ordering::Relaxed))
    }

    pub fn grouped_allele_counts(&self, site_id: Marker) -> AHashMap<Vec<u32>, u64> {
        self.grouped_allele_counts
            .get(site_ordinal(site_id))
            .map(|lock| lock.lock().clone())
            .unwrap_or_default()
    }

    pub fn base_coverage(&self, node: NodeId) -> Option<Vec<u64>> {
        self.allele_base_coverage.get(&node).map(|c| c.iter().map(|a| a.load(Ordering::Relaxed)).collect())
    }

    /// `(mean, variance, sites_with_zero_coverage, total_sites)` over the
    /// per-site total depth (sum of every allele's sum-coverage), for
    /// `read_stats`'s post-mapping fields.
    pub fn depth_stats(&self) -> (f64, f64, u64, u64) {
        let depths: Vec<u64> = self
            .allele_sum
            .iter()
            .map(|alleles| alleles.iter().map(|a| a.load(Ordering::Relaxed)).sum())
            .collect();
        let total = depths.len() as u64;
        if total == 0 {
            return (0.0, 0.0, 0, 0);
        }
        let zero = depths.iter().filter(|&&d| d == 0).count() as u64;
        let mean = depths.iter().sum::<u64>() as f64 / total as f64;
        let variance = depths.iter().map(|&d| (d as f64 - mean).powi(2)).sum::<f64>() / total as f64;
        (mean, variance, zero, total)
    }
}

/// Reduce one read's terminal search states into coverage updates (§4.6).
///
/// `states` must be the *raw* output of the marker-jump/base-extension loop
/// (as returned by [`search::search_read`]), not pre-exploded: a read that
/// never crosses a marker is only ever given a per-base bump here, never an
/// `allele_sum` contribution, exactly because its raw terminal state carries
/// an empty `traversed_path` (scenario 6 of the data model).
///
/// `user_seed`/`read_index` mix into the per-read PRNG used to break
/// multi-mapping ties when choosing which occurrence's per-base counters to
/// bump (§5).
pub fn commit_read(coverage: &Coverage, graph: &CovGraph, fm: &FmIndex, states: &[SearchState], read_len: usize, user_seed: u64, read_index: u64) {
    let live: Vec<&SearchState> = states.iter().filter(|s| s.is_live()).collect();

    let mut per_site: AHashMap<Marker, Vec<u32>> = AHashMap::new();
    for &s in &live {
        for &(site, allele) in &s.traversed_path {
            per_site.entry(site).or_default().push(allele);
        }
    }
    for (&site, alleles) in &per_site {
        for &allele in alleles {
            coverage.record_sum(site, allele);
        }
        coverage.record_grouped(site, alleles);
    }

    // Every occurrence position this read could have come from, each pinned
    // to a single SA index. A state that crossed at least one marker is
    // already pinned this way (`exit_site` narrows to the site marker's own,
    // size-1, C-table entry); an allele-encapsulated state's raw SA interval
    // can still span several occurrences, so it is exploded one-per-locus
    // first via `handle_allele_encapsulated`.
    let mut occurrences: Vec<SearchState> = Vec::new();
    for &s in &live {
        if s.traversed_path.is_empty() && s.traversing_path.is_empty() {
            occurrences.extend(handle_allele_encapsulated(s, fm, graph));
        } else {
            occurrences.push(s.clone());
        }
    }
    if occurrences.is_empty() {
        return;
    }

    let mix = user_seed ^ read_index.wrapping_mul(0x9E37_79B9_7F4A_7C15);
    let rng = fastrand::Rng::with_seed(mix);
    let chosen = &occurrences[rng.usize(0..occurrences.len())];

    // Walk the read's own span forward from its matched occurrence, one
    // linear PRG position at a time, bumping a node's counter for every
    // *base* position (zero-length marker positions the path crosses are
    // skipped, not counted against `read_len`). A read that crosses into
    // another node this way — whether by overflowing past its starting
    // node's end, or by crossing a site boundary entirely — spreads its
    // per-base hits across every node it actually touches, proportionally to
    // how many of its bases fall in each (§9 open question). A read that
    // never leaves one node is the degenerate case where every position
    // resolves to that same node.
    let mut pos = fm.sa(chosen.sa_lo) as usize;
    let mut consumed = 0;
    while consumed < read_len {
        let Some(access) = graph.random_access(pos) else { break };
        if graph.node(access.node).sequence().is_some() {
            coverage.record_base_hit(access.node, access.offset);
            consumed += 1;
        }
        pos += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use covgraph::build as build_graph;
    use prg::{grammar::string_to_ints, LinearPrg};
    use search::search_read;

    fn build_fixture(s: &str) -> (FmIndex, CovGraph) {
        let ints = string_to_ints(s).unwrap();
        let prg = LinearPrg::from_markers(ints).unwrap();
        let fm = FmIndex::build(&prg);
        let graph = build_graph(&prg).unwrap();
        (fm, graph)
    }

    #[test]
    fn allele_sum_bumps_on_exact_allele_match() {
        let (fm, graph) = build_fixture("AC[C,T]GT");
        let coverage = Coverage::new(&graph);
        let states = search_read(b"ACCGT", &fm, &graph).unwrap();
        commit_read(&coverage, &graph, &fm, &states, 5, 0, 0);
        assert_eq!(coverage.allele_sum_coverage(5, 1), 1);
        assert_eq!(coverage.allele_sum_coverage(5, 2), 0);
    }

    #[test]
    fn allele_encapsulated_read_bumps_only_base_coverage() {
        let (fm, graph) = build_fixture("A[CCC,TTT]G");
        let coverage = Coverage::new(&graph);
        let states = search_read(b"CCC", &fm, &graph).unwrap();
        commit_read(&coverage, &graph, &fm, &states, 3, 0, 0);
        assert_eq!(coverage.allele_sum_coverage(5, 1), 0);

        let (entry, _) = graph.bubble_map()[0];
        let allele_node = graph.node(entry).out_edges[0];
        assert_eq!(coverage.base_coverage(allele_node), Some(vec![1, 1, 1]));
    }

    #[test]
    fn crossing_read_spreads_coverage_across_every_node_it_touches() {
        let (fm, graph) = build_fixture("A[CC[G,T]TT,AA]GG");
        let coverage = Coverage::new(&graph);
        let states = search_read(b"CCGTT", &fm, &graph).unwrap();
        commit_read(&coverage, &graph, &fm, &states, 5, 0, 0);

        let cc_node = graph.nodes().find(|(_, n)| n.sequence() == Some(&b"CC"[..])).unwrap().0;
        let g_node = graph.nodes().find(|(_, n)| n.sequence() == Some(&b"G"[..])).unwrap().0;
        let tt_node = graph.nodes().find(|(_, n)| n.sequence() == Some(&b"TT"[..])).unwrap().0;

        assert_eq!(coverage.base_coverage(cc_node), Some(vec![1, 1]));
        assert_eq!(coverage.base_coverage(g_node), Some(vec![1]));
        assert_eq!(coverage.base_coverage(tt_node), Some(vec![1, 1]));
    }

    #[test]
    fn depth_stats_report_zero_coverage_sites() {
        let (_fm, graph) = build_fixture("AC[C,T]GT");
        let coverage = Coverage::new(&graph);
        let (mean, variance, zero, total) = coverage.depth_stats();
        assert_eq!(total, 1);
        assert_eq!(zero, 1);
        assert_eq!(mean, 0.0);
        assert_eq!(variance, 0.0);
    }
}
