//! The vBWT backward-search engine (§4.4): given a read and a built
//! [`fmindex::FmIndex`]/[`covgraph::CovGraph`] pair, finds every path the
//! read could take through the population reference graph.

pub mod engine;
pub mod state;

pub use engine::{extend_one_base, handle_allele_encapsulated};
pub use state::{Locus, SearchState, VariantSiteState};

use fmindex::FmIndex;
use prg::alphabet;

/// Backward-search a whole read against `fm`/`graph`, returning every raw
/// terminal state (bases consumed right-to-left, as classic FM-index
/// backward search requires; `read` is given in its natural left-to-right
/// orientation). A read that never crosses a marker surfaces here with an
/// *empty* `traversed_path`, per §4.4 — callers that need its locus (e.g.
/// per-base coverage) must explode it explicitly via
/// [`handle_allele_encapsulated`], which is deliberately not applied here:
/// doing so unconditionally would fabricate an `allele_sum` contribution for
/// fully-encapsulated reads that the data model says should have none.
pub fn search_read(read: &[u8], fm: &FmIndex, graph: &covgraph::CovGraph) -> Result<Vec<SearchState>, prg::MalformedPrgError> {
    let mut states = vec![SearchState::seed(fm.size())];
    for (idx, &base) in read.iter().enumerate().rev() {
        let marker = alphabet::encode_dna_base(base)?;
        let do_marker_jump = idx != read.len() - 1;
        states = extend_one_base(marker, &states, fm, graph, do_marker_jump);
        if states.is_empty() {
            break;
        }
    }
    Ok(states)
}

#[cfg(test)]
mod tests {
    use super::*;
    use covgraph::build as build_graph;
    use prg::{grammar::string_to_ints, LinearPrg};

    fn build(s: &str) -> (FmIndex, covgraph::CovGraph) {
        let ints = string_to_ints(s).unwrap();
        let prg = LinearPrg::from_markers(ints).unwrap();
        let fm = FmIndex::build(&prg);
        let graph = build_graph(&prg).unwrap();
        (fm, graph)
    }

    #[test]
    fn exact_match_outside_any_site_is_found() {
        let (fm, graph) = build("ACGT");
        let hits = search_read(b"ACGT", &fm, &graph).unwrap();
        assert!(hits.iter().any(|s| s.is_live()));
    }

    #[test]
    fn read_matching_one_allele_resolves_its_locus() {
        let (fm, graph) = build("AC[C,T]GT");
        let hits = search_read(b"ACCGT", &fm, &graph).unwrap();
        let live: Vec<_> = hits.into_iter().filter(|s| s.is_live()).collect();
        assert!(!live.is_empty());
        assert!(live.iter().any(|s| s.traversed_path.contains(&(5, 1))));
    }

    #[test]
    fn read_matching_second_allele_resolves_its_locus() {
        let (fm, graph) = build("AC[C,T]GT");
        let hits = search_read(b"ACTGT", &fm, &graph).unwrap();
        let live: Vec<_> = hits.into_iter().filter(|s| s.is_live()).collect();
        assert!(!live.is_empty());
        assert!(live.iter().any(|s| s.traversed_path.iter().any(|&(site, _)| site == 5)));
    }

    #[test]
    fn read_with_no_match_anywhere_yields_no_live_states() {
        let (fm, graph) = build("AC[C,T]GT");
        let hits = search_read(b"GGGGG", &fm, &graph).unwrap();
        assert!(hits.iter().all(|s| !s.is_live()));
    }

    #[test]
    fn read_entirely_inside_one_allele_has_empty_traversed_path_until_exploded() {
        let (fm, graph) = build("A[CCC,TTT]G");
        let hits = search_read(b"CCC", &fm, &graph).unwrap();
        let live: Vec<_> = hits.into_iter().filter(|s| s.is_live()).collect();
        assert!(!live.is_empty());
        assert!(live.iter().all(|s| s.traversed_path.is_empty()));

        let exploded: Vec<_> = live.iter().flat_map(|s| handle_allele_encapsulated(s, &fm, &graph)).collect();
        assert!(exploded.iter().any(|s| s.traversed_path.contains(&(5, 1))));
    }
}
