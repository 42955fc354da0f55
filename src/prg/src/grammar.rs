//! Human-readable PRG bracket grammar, e.g. `[A,C[A,T]]` <-> `5,1,6,2,7,1,8,4,8,6` (§6).
//!
//! `[` opens a site with the next unused odd marker; `,` emits the matching even
//! marker; `]` also emits the matching even marker. The round trip `ints -> string
//! -> ints` is the identity only if the input's site numbering already matches
//! left-to-right opening order; otherwise applying it twice is a fixed point,
//! since the second pass always starts from canonically-ordered ids.

use crate::alphabet::{self, Marker};
use crate::error::MalformedPrgError;

/// Render an encoded marker sequence as a bracket string.
///
/// # Panics
/// Panics if `markers` is not a well-formed, already-paired PRG (callers should
/// construct it via [`crate::linear::LinearPrg`] first).
pub fn ints_to_string(markers: &[Marker]) -> String {
    let mut end_positions = std::collections::HashMap::new();
    for (i, &m) in markers.iter().enumerate() {
        if alphabet::is_allele_marker(m) {
            end_positions.insert(m, i);
        }
    }

    let mut out = String::new();
    let mut stack: Vec<Marker> = Vec::new();
    for (i, &m) in markers.iter().enumerate() {
        if alphabet::is_base(m) {
            out.push(alphabet::decode_dna_base(m) as char);
        } else if alphabet::is_site_marker(m) {
            out.push('[');
            stack.push(m);
        } else {
            // allele marker
            if end_positions[&m] == i {
                let opened = stack.pop().expect("unbalanced site marker");
                assert_eq!(opened + 1, m, "mismatched site/allele marker nesting");
                out.push(']');
            } else {
                out.push(',');
            }
        }
    }
    out
}

/// Parse a bracket string into a fresh, canonically-numbered marker sequence.
/// Marker ids are assigned in left-to-right opening order, starting at 5 and
/// growing by 2 per fresh site.
pub fn string_to_ints(s: &str) -> Result<Vec<Marker>, MalformedPrgError> {
    let mut out = Vec::new();
    let mut stack: Vec<Marker> = Vec::new();
    let mut next_marker = alphabet::FIRST_VARIANT_MARKER;

    for c in s.chars() {
        match c {
            '[' => {
                let site = next_marker;
                next_marker += 2;
                out.push(site);
                stack.push(site);
            }
            ',' => {
                let site = *stack.last().ok_or(MalformedPrgError::UnopenedSite(0))?;
                out.push(site + 1);
            }
            ']' => {
                let site = stack.pop().ok_or(MalformedPrgError::UnopenedSite(0))?;
                out.push(site + 1);
            }
            _ => out.push(alphabet::encode_dna_base(c as u8)?),
        }
    }
    if !stack.is_empty() {
        return Err(MalformedPrgError::UnclosedSite(stack[0]));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_example_both_directions() {
        let ints = string_to_ints("[A,C[A,T]]").unwrap();
        assert_eq!(ints, vec![5, 1, 6, 2, 7, 1, 8, 4, 8, 6]);
        assert_eq!(ints_to_string(&ints), "[A,C[A,T]]");
    }

    #[test]
    fn roundtrip_is_identity_when_opening_order_matches() {
        let original = vec![5, 1, 6, 2, 6, 7, 3, 8, 4, 8];
        let s = ints_to_string(&original);
        let back = string_to_ints(&s).unwrap();
        assert_eq!(back, original);
    }

    #[test]
    fn roundtrip_twice_is_fixed_point_when_ids_out_of_order() {
        // Two sibling (non-nested) sites whose ids are swapped relative to
        // left-to-right opening order: the first opened site uses id 7, the
        // second uses id 5.
        let original = vec![7, 1, 8, 2, 8, 5, 1, 6, 4, 6];
        let once = string_to_ints(&ints_to_string(&original)).unwrap();
        assert_ne!(once, original); // not an identity: ids get renumbered

        let twice = string_to_ints(&ints_to_string(&once)).unwrap();
        assert_eq!(twice, once); // but is now a fixed point
    }

    #[test]
    fn unopened_closing_bracket_errors() {
        assert!(string_to_ints("A]").is_err());
    }

    #[test]
    fn unclosed_site_errors() {
        assert!(string_to_ints("[A,C").is_err());
    }
}
