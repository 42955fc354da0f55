//! Orchestration: ties `prg` -> `covgraph` -> `fmindex` -> `kmers` -> `search`
//! -> `coverage` together behind the `build`/`genotype` CLI surface (§6).

use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use located_error::LocatedError;
use log::{error, info, warn};
use rayon::prelude::*;

use covgraph::CovGraph;
use coverage::{commit_read, ChainedReadSource, Coverage, EncodedRead, ReadSource, ReadStats};
use fmindex::FmIndex;
use kmers::{KmerIndex, KmerIndexError};
use parser::{BuildArgs, Cli, Commands, Common, GenotypeArgs};
use prg::grammar::string_to_ints;
use prg::{Endianness, LinearPrg};
use search::search_read;

const PRG_FILE: &str = "prg";
const GRAPH_FILE: &str = "graph";
const FM_INDEX_FILE: &str = "fm_index";
const KMER_SIZE_FILE: &str = "kmer_size";
const MEMLOG_FILE: &str = "fm_index.memlog";
const DONE_FILE: &str = ".done";

pub fn run(cli: Cli) -> Result<()> {
    match cli.commands {
        Commands::Build {common, build} => run_build(&common, &build),
        Commands::Genotype {common, genotype} => run_genotype(&common, &genotype),
        Commands::FromYaml {yaml} => {
            let cli = Cli::deserialize(yaml).map_err(|e| anyhow!(e.to_string()))?;
            run(cli)
        }
    }
}

/// Normalise the input PRG, build its coverage graph, FM-index and k-mer
/// index, and persist all artefacts under `common.build_dir` (§4.1-4.5).
fn run_build(common: &Common, build: &BuildArgs) -> Result<()> {
    common.check_kmer_size().loc("validating --kmer-size")?;

    let done = common.build_dir.join(DONE_FILE);
    if done.exists() && !build.overwrite {
        bail!("build directory {} already holds a completed build; use --overwrite", common.build_dir.display());
    }

    info!("reading PRG from {}", build.prg.display());
    let bytes = fs::read(&build.prg).with_loc(|| format!("reading {}", build.prg.display()))?;
    let prg = parse_prg(&bytes).loc("parsing PRG")?;

    info!("building coverage graph over {} marker position(s)", prg.len());
    let graph = covgraph::build(&prg).loc("building coverage graph")?;

    info!("building FM-index");
    let fm = FmIndex::build(&prg);

    info!("precomputing {}-mer index", common.kmer_size);
    let kmer_index = KmerIndex::build(&fm, &graph, common.kmer_size, false);

    fs::write(common.build_dir.join(PRG_FILE), prg.to_bytes(Endianness::Little))
        .with_loc(|| "writing normalised PRG")?;
    fs::write(common.build_dir.join(GRAPH_FILE), bincode::serialize(&graph).context("serialising coverage graph")?)
        .with_loc(|| "writing coverage graph")?;
    fs::write(common.build_dir.join(FM_INDEX_FILE), fm.to_bytes().loc("serialising FM-index")?)
        .with_loc(|| "writing FM-index")?;
    fs::write(common.build_dir.join(KMER_SIZE_FILE), common.kmer_size.to_string())
        .with_loc(|| "writing kmer_size")?;
    kmer_index.save(&common.build_dir).loc("writing k-mer index")?;
    write_memlog(&common.build_dir.join(MEMLOG_FILE));

    fs::write(&done, b"").with_loc(|| format!("writing {}", done.display()))?;
    info!("build complete: {} graph node(s), {} kmer(s) indexed", graph.node_count(), kmer_index.len());
    Ok(())
}

/// Load a previously built index, map every read in `genotype.reads` against
/// it, and write a per-site coverage summary plus read statistics (§4.6-4.7).
fn run_genotype(common: &Common, genotype: &GenotypeArgs) -> Result<()> {
    genotype.check_ploidy().loc("validating --ploidy")?;

    if !common.build_dir.join(DONE_FILE).exists() {
        bail!("{} does not hold a completed build", common.build_dir.display());
    }

    let build_k: usize = fs::read_to_string(common.build_dir.join(KMER_SIZE_FILE))
        .with_loc(|| "reading kmer_size")?
        .trim()
        .parse()
        .with_loc(|| "parsing kmer_size")?;
    if build_k != common.kmer_size {
        return Err(KmerIndexError::SizeMismatch { build_k, map_k: common.kmer_size })
            .loc("validating --kmer-size against the built index");
    }

    let prg_bytes = fs::read(common.build_dir.join(PRG_FILE)).with_loc(|| "reading built PRG")?;
    let _prg = LinearPrg::from_bytes(&prg_bytes, Endianness::Little).loc("parsing built PRG")?;

    let graph_bytes = fs::read(common.build_dir.join(GRAPH_FILE)).with_loc(|| "reading coverage graph")?;
    let graph: CovGraph = bincode::deserialize(&graph_bytes).context("deserialising coverage graph")?;

    let fm_bytes = fs::read(common.build_dir.join(FM_INDEX_FILE)).with_loc(|| "reading FM-index")?;
    let fm = FmIndex::from_bytes(&fm_bytes).loc("parsing FM-index")?;

    let kmer_index = KmerIndex::load(&common.build_dir, common.kmer_size, fm.size()).loc("loading k-mer index")?;

    let coverage = Arc::new(Coverage::new(&graph));
    let graph = Arc::new(graph);
    let fm = Arc::new(fm);
    let kmer_index = Arc::new(kmer_index);

    info!("mapping {} read file(s) with {} worker thread(s)", genotype.reads.len(), common.threads);
    let pool = rayon::ThreadPoolBuilder::new().num_threads(common.threads).build().context("building worker pool")?;

    let mut read_source = ChainedReadSource::open(&genotype.reads)?;
    let max_read_size = genotype.max_read_size;
    let (tx, rx) = std::sync::mpsc::sync_channel::<(u64, EncodedRead)>(4 * common.threads.max(1));

    // Shared fatal-error flag (§5): a read source that starts failing every
    // record in a row (rather than the occasional malformed one) almost
    // always means the underlying file handle itself went bad mid-stream,
    // not that one record is corrupt — that's treated as fatal rather than
    // skipped forever.
    const MAX_CONSECUTIVE_READ_ERRORS: u32 = 100;
    let poisoned = Arc::new(AtomicBool::new(false));

    // The read-ingestion thread also collects a capped quality sample for
    // the pre-mapping Phred-derived fields (§1A): collecting it here, single
    // threaded, avoids a second pass or a shared lock over the map phase.
    let producer_poisoned = Arc::clone(&poisoned);
    let producer = std::thread::spawn(move || -> Result<Vec<Vec<u8>>> {
        let mut index = 0u64;
        let mut consecutive_errors = 0u32;
        let mut qualities_sample = Vec::new();
        loop {
            match read_source.next_read(index) {
                Ok(Some(read)) => {
                    consecutive_errors = 0;
                    if read.bases.len() > max_read_size {
                        index += 1;
                        continue;
                    }
                    if qualities_sample.len() < 10_000 {
                        qualities_sample.push(read.qualities.clone());
                    }
                    if tx.send((index, read)).is_err() {
                        break;
                    }
                    index += 1;
                }
                Ok(None) => break,
                Err(e) => {
                    warn!("skipping unreadable read at index {index}: {e}");
                    index += 1;
                    consecutive_errors += 1;
                    if consecutive_errors >= MAX_CONSECUTIVE_READ_ERRORS {
                        error!("{MAX_CONSECUTIVE_READ_ERRORS} consecutive unreadable reads; aborting");
                        producer_poisoned.store(true, Ordering::Relaxed);
                        break;
                    }
                }
            }
        }
        Ok(qualities_sample)
    });

    let user_seed = common.seed;
    pool.install(|| {
        rx.into_iter().par_bridge().for_each(|(index, read)| {
            let states = match search_read(&read.bases, &fm, &graph) {
                Ok(states) => states,
                Err(e) => {
                    warn!("read {index} contains a non-ACGT base and was skipped: {e}");
                    return;
                }
            };
            let seeded = seed_from_kmer_index(&read.bases, &kmer_index, &fm, &graph, states);
            commit_read(&coverage, &graph, &fm, &seeded, read.bases.len(), user_seed, index);
        });
    });

    let qualities_sample = producer.join().expect("read-ingestion thread panicked")?;
    if poisoned.load(Ordering::Relaxed) {
        bail!("read source became unreadable partway through mapping; aborting without writing output");
    }

    let stats = ReadStats::from_qualities(qualities_sample.iter().map(Vec::as_slice)).with_depth_stats(&coverage);
    info!(
        "genotype complete: mean_cov_depth={:.3} num_sites_no_coverage={}/{}",
        stats.mean_cov_depth, stats.num_sites_no_coverage, stats.num_sites_total
    );

    write_coverage_summary(&genotype.output_dir, &coverage, &graph, genotype)?;
    fs::write(genotype.output_dir.join(DONE_FILE), b"").with_loc(|| "writing .done sentinel")?;
    Ok(())
}

/// Try the k-mer index's cached states for this read's trailing `k` bases
/// first, continuing the backward search over the remaining prefix; fall
/// back to a from-scratch search when the read is shorter than `k`, its
/// suffix was never indexed, or every cached state still straddles an
/// unresolved site (§4.5).
fn seed_from_kmer_index(
    bases: &[u8],
    kmer_index: &KmerIndex,
    fm: &FmIndex,
    graph: &CovGraph,
    fallback: Vec<search::SearchState>,
) -> Vec<search::SearchState> {
    let k = kmer_index.k();
    if k == 0 || bases.len() < k {
        return fallback;
    }
    let suffix = &bases[bases.len() - k..];
    let Some(cached) = kmer_index.lookup(suffix) else { return fallback };

    let mut states: Vec<search::SearchState> = cached
        .iter()
        .filter(|c| c.loci.iter().all(|&(_, allele)| allele != 0))
        .map(|cached| search::SearchState {
            sa_lo: cached.sa_lo,
            sa_hi: cached.sa_hi,
            traversed_path: cached.loci.clone(),
            traversing_path: Vec::new(),
            variant_site_state: search::VariantSiteState::Unknown,
            invalid: false,
        })
        .collect();

    if states.is_empty() {
        return fallback;
    }

    for &base in bases[..bases.len() - k].iter().rev() {
        let Ok(marker) = prg::alphabet::encode_dna_base(base) else { return Vec::new() };
        states = search::extend_one_base(marker, &states, fm, graph, true);
        if states.is_empty() {
            break;
        }
    }
    states
}

fn parse_prg(bytes: &[u8]) -> Result<LinearPrg, prg::MalformedPrgError> {
    if let Ok(text) = std::str::from_utf8(bytes) {
        let trimmed = text.trim();
        let looks_like_grammar = !trimmed.is_empty()
            && trimmed.bytes().all(|b| matches!(b, b'A'..=b'Z' | b'a'..=b'z' | b'[' | b']' | b','));
        if looks_like_grammar {
            let markers = string_to_ints(trimmed)?;
            return LinearPrg::from_markers(markers);
        }
    }
    LinearPrg::from_bytes(bytes, Endianness::Little)
}

/// Record peak resident memory observed so far into `path` (ambient §1A
/// timing/memory report). Silently skipped on platforms without `/proc`.
fn write_memlog(path: &Path) {
    let peak_kb = fs::read_to_string("/proc/self/status").ok().and_then(|status| {
        status.lines().find_map(|line| line.strip_prefix("VmHWM:").map(|kb| kb.trim().to_string()))
    });
    let contents = match peak_kb {
        Some(kb) => format!("peak_rss_kb={kb}\n"),
        None => "peak_rss_kb=unknown\n".to_string(),
    };
    if let Err(e) = fs::write(path, contents) {
        warn!("failed to write {}: {e}", path.display());
    }
}

fn write_coverage_summary(output_dir: &Path, coverage: &Coverage, graph: &CovGraph, genotype: &GenotypeArgs) -> Result<()> {
    let path = output_dir.join("coverage_summary.tsv");
    genotype.can_write_file(&path)?;

    let mut out = String::from("site_id\tallele_id\tsum_coverage\n");
    for &(entry, _exit) in graph.bubble_map() {
        let site_id = graph.node(entry).site_id();
        for allele_id in 1..=graph.node(entry).out_edges.len() as u32 {
            let sum = coverage.allele_sum_coverage(site_id, allele_id);
            out.push_str(&format!("{site_id}\t{allele_id}\t{sum}\n"));
        }
    }
    fs::write(&path, out).with_loc(|| format!("writing {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_prg_accepts_bracket_grammar() {
        let prg = parse_prg(b"A[C,T]G").unwrap();
        assert_eq!(prg.markers(), &[1, 5, 2, 6, 4, 6, 3]);
    }

    #[test]
    fn parse_prg_rejects_zero_marker_in_raw_bytes() {
        let bytes = 0u32.to_le_bytes();
        assert!(parse_prg(&bytes).is_err());
    }
}
