//! The search state record threaded through backward search (§3, §4.4).

use prg::Marker;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariantSiteState {
    WithinVariantSite,
    OutsideVariantSite,
    Unknown,
}

/// A fully-resolved locus crossed by the read: `(site_id, allele_id)`.
pub type Locus = (Marker, u32);

/// A single backward-search state.
///
/// `traversed_path` holds loci whose allele is already known;
/// `traversing_path` is a stack of loci entered but not yet resolved (the
/// top entry's allele is `None` — "unknown" — until the site is exited).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchState {
    pub sa_lo: u64,
    pub sa_hi: u64,
    pub traversed_path: Vec<Locus>,
    pub traversing_path: Vec<(Marker, Option<u32>)>,
    pub variant_site_state: VariantSiteState,
    pub invalid: bool,
}

impl SearchState {
    /// A fresh state spanning the whole FM-index, ready to backward-search
    /// the last base of a read (or the first base of a k-mer).
    pub fn seed(fm_size: u64) -> Self {
        Self {
            sa_lo: 0,
            sa_hi: fm_size.saturating_sub(1),
            traversed_path: Vec::new(),
            traversing_path: Vec::new(),
            variant_site_state: VariantSiteState::Unknown,
            invalid: false,
        }
    }

    pub fn interval_len(&self) -> u64 {
        if self.invalid || self.sa_hi < self.sa_lo {
            0
        } else {
            self.sa_hi - self.sa_lo + 1
        }
    }

    pub fn is_live(&self) -> bool {
        !self.invalid && self.interval_len() > 0
    }
}
