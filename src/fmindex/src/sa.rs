//! Suffix array and BWT derivation over an integer-alphabet text (§4.3).
//!
//! `bio`'s suffix-array machinery assumes a `u8` alphabet; marker integers in
//! a large PRG can exceed 255, so the array is built by a plain
//! comparison sort instead. This isn't benchmarked, so naïve `O(n log n · n)`
//! comparison sort is an acceptable trade for not depending on an
//! integer-alphabet suffix-array crate the rest of the ecosystem doesn't use
//! here.

/// `text` must end with a unique minimal sentinel (`0`) not occurring
/// elsewhere, so every suffix compares distinctly.
pub fn suffix_array(text: &[u32]) -> Vec<u64> {
    let mut sa: Vec<u64> = (0..text.len() as u64).collect();
    sa.sort_by(|&a, &b| text[a as usize..].cmp(&text[b as usize..]));
    sa
}

/// `bwt[i] = text[sa[i] - 1]`, wrapping to `text[text.len() - 1]` when
/// `sa[i] == 0`.
pub fn bwt_from_sa(text: &[u32], sa: &[u64]) -> Vec<u32> {
    sa.iter()
        .map(|&i| if i == 0 { text[text.len() - 1] } else { text[(i - 1) as usize] })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sa_of_banana_like_text() {
        // "ACAC$" with A=1,C=2,sentinel=0
        let text = vec![1u32, 2, 1, 2, 0];
        let sa = suffix_array(&text);
        // suffixes sorted: "$"(idx4) < "AC$"... let's just check it's the
        // identity of a valid permutation and sentinel suffix sorts first.
        assert_eq!(sa.len(), text.len());
        assert_eq!(sa[0], 4); // the sentinel-only suffix sorts lexicographically smallest
        let mut sorted = sa.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn bwt_round_trip_length() {
        let text = vec![1u32, 2, 3, 4, 0];
        let sa = suffix_array(&text);
        let bwt = bwt_from_sa(&text, &sa);
        assert_eq!(bwt.len(), text.len());
    }
}
