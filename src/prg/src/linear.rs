//! The linearised PRG normaliser and serialiser (Component Design §4.1).

use std::collections::{HashMap, HashSet};
use std::io::{Cursor, Read, Write};

use byteorder::{BigEndian, LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::alphabet::{self, Marker};
use crate::error::MalformedPrgError;

/// Byte order used when persisting an encoded PRG. The encoded PRG file (§6) is a
/// sequence of 4-byte integers; gramtools historically wrote these little-endian,
/// but both orders round-trip identically so we expose the choice rather than hard-code it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endianness {
    Little,
    Big,
}

/// A validated, normalised linearised PRG (data model §3).
///
/// Invariants upheld once constructed:
/// - every site marker `s` that opens a site is closed by exactly one even marker `s+1`;
/// - every allele separator belonging to that site also reads `s+1` (legacy `s`-closed
///   inputs are rewritten on construction, see [`Self::legacy_rewritten`]);
/// - [`Self::end_positions`] maps each even marker to the index of its *closing* occurrence
///   (the maximum index at which it appears).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinearPrg {
    markers: Vec<Marker>,
    end_positions: HashMap<Marker, usize>,
    legacy_rewritten: bool,
}

impl LinearPrg {
    /// Parse a raw marker stream, rewriting legacy odd-form site closures to the
    /// canonical even form and validating structural invariants.
    ///
    /// # Errors
    /// Returns [`MalformedPrgError`] if the byte stream cannot be parsed as a whole
    /// number of 4-byte integers, contains a `0`, or a site closes without opening.
    pub fn from_bytes(bytes: &[u8], endianness: Endianness) -> Result<Self, MalformedPrgError> {
        if bytes.len() % 4 != 0 {
            return Err(MalformedPrgError::TruncatedStream(bytes.len()));
        }

        let mut raw = Vec::with_capacity(bytes.len() / 4);
        let mut cursor = Cursor::new(bytes);
        loop {
            let read = match endianness {
                Endianness::Little => cursor.read_u32::<LittleEndian>(),
                Endianness::Big => cursor.read_u32::<BigEndian>(),
            };
            match read {
                Ok(m) => raw.push(m),
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
                Err(_) => return Err(MalformedPrgError::TruncatedStream(bytes.len())),
            }
        }

        Self::from_markers(raw)
    }

    /// Build directly from a parsed marker stream, applying the same legacy-rewrite
    /// and validation as [`Self::from_bytes`].
    pub fn from_markers(raw: Vec<Marker>) -> Result<Self, MalformedPrgError> {
        let mut markers = raw;
        let mut opened: HashSet<Marker> = HashSet::new();
        let mut legacy_rewritten = false;

        for m in &mut markers {
            match alphabet::classify(*m)? {
                alphabet::MarkerKind::Base => {}
                alphabet::MarkerKind::SiteMarker => {
                    if opened.contains(m) {
                        // Legacy closing form: rewrite `s` -> `s + 1`.
                        *m += 1;
                        legacy_rewritten = true;
                    } else {
                        opened.insert(*m);
                    }
                }
                alphabet::MarkerKind::AlleleMarker => {
                    let site = alphabet::site_of_allele_marker(*m);
                    if !opened.contains(&site) {
                        return Err(MalformedPrgError::UnopenedSite(site));
                    }
                }
            }
        }

        let mut end_positions: HashMap<Marker, usize> = HashMap::new();
        for (i, &m) in markers.iter().enumerate() {
            if alphabet::is_allele_marker(m) {
                end_positions
                    .entry(m)
                    .and_modify(|last| *last = (*last).max(i))
                    .or_insert(i);
            }
        }

        for site in &opened {
            if !end_positions.contains_key(&(site + 1)) {
                return Err(MalformedPrgError::UnclosedSite(*site));
            }
        }

        Ok(Self { markers, end_positions, legacy_rewritten })
    }

    /// The normalised marker sequence.
    pub fn markers(&self) -> &[Marker] {
        &self.markers
    }

    pub fn len(&self) -> usize {
        self.markers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }

    /// Map from even marker `e` to the index of its closing (maximal-index) occurrence.
    pub fn end_positions(&self) -> &HashMap<Marker, usize> {
        &self.end_positions
    }

    /// Whether construction rewrote at least one legacy odd-form site closure.
    pub fn legacy_rewritten(&self) -> bool {
        self.legacy_rewritten
    }

    /// Serialise back to the 4-byte-per-integer on-disk form.
    ///
    /// `bytes -> PRG -> bytes` is the identity once the legacy-rewrite has already
    /// been applied (Round-trip laws, §8): re-serialising a [`LinearPrg`] never
    /// produces legacy-form closures, so encoding a canonical PRG and decoding it
    /// again reaches a fixed point immediately.
    pub fn to_bytes(&self, endianness: Endianness) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.markers.len() * 4);
        for &m in &self.markers {
            match endianness {
                Endianness::Little => out.write_u32::<LittleEndian>(m).unwrap(),
                Endianness::Big => out.write_u32::<BigEndian>(m).unwrap(),
            }
        }
        out
    }

    /// Write the encoded form to `writer`.
    pub fn write_to<W: Write>(&self, writer: &mut W, endianness: Endianness) -> std::io::Result<()> {
        writer.write_all(&self.to_bytes(endianness))
    }

    /// Read the encoded form from `reader`.
    pub fn read_from<R: Read>(reader: &mut R, endianness: Endianness) -> Result<Self, MalformedPrgError> {
        let mut bytes = Vec::new();
        reader
            .read_to_end(&mut bytes)
            .map_err(|_| MalformedPrgError::TruncatedStream(0))?;
        Self::from_bytes(&bytes, endianness)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_zero_marker() {
        let err = LinearPrg::from_markers(vec![1, 0, 2]).unwrap_err();
        assert_eq!(err, MalformedPrgError::ZeroMarker);
    }

    #[test]
    fn rejects_unopened_site() {
        // allele marker 6 with no preceding 5
        let err = LinearPrg::from_markers(vec![1, 6, 2]).unwrap_err();
        assert_eq!(err, MalformedPrgError::UnopenedSite(5));
    }

    #[test]
    fn rejects_unclosed_site() {
        let err = LinearPrg::from_markers(vec![5, 1]).unwrap_err();
        assert_eq!(err, MalformedPrgError::UnclosedSite(5));
    }

    #[test]
    fn canonical_site_round_trips() {
        // [A,C] -> 5 1 6 2 6
        let prg = LinearPrg::from_markers(vec![5, 1, 6, 2, 6]).unwrap();
        assert!(!prg.legacy_rewritten());
        assert_eq!(prg.end_positions().get(&6), Some(&4));

        let bytes = prg.to_bytes(Endianness::Little);
        let reloaded = LinearPrg::from_bytes(&bytes, Endianness::Little).unwrap();
        assert_eq!(reloaded, prg);
    }

    #[test]
    fn legacy_odd_closure_is_rewritten() {
        // Legacy: site closes with the odd marker itself instead of s+1.
        let prg = LinearPrg::from_markers(vec![5, 1, 6, 2, 5]).unwrap();
        assert!(prg.legacy_rewritten());
        assert_eq!(prg.markers(), &[5, 1, 6, 2, 6]);
        assert_eq!(prg.end_positions().get(&6), Some(&4));
    }

    #[test]
    fn byte_roundtrip_both_endiannesses() {
        let prg = LinearPrg::from_markers(vec![5, 1, 6, 2, 6, 3, 4]).unwrap();
        for endianness in [Endianness::Little, Endianness::Big] {
            let bytes = prg.to_bytes(endianness);
            let reloaded = LinearPrg::from_bytes(&bytes, endianness).unwrap();
            assert_eq!(reloaded, prg);
        }
    }

    #[test]
    fn truncated_stream_is_rejected() {
        let err = LinearPrg::from_bytes(&[1, 2, 3], Endianness::Little).unwrap_err();
        assert_eq!(err, MalformedPrgError::TruncatedStream(3));
    }

    #[test]
    fn nested_sites_are_accepted() {
        // [A,C[A,T]] -> 5 1 6 2 7 1 8 4 8 6
        let prg = LinearPrg::from_markers(vec![5, 1, 6, 2, 7, 1, 8, 4, 8, 6]).unwrap();
        assert_eq!(prg.end_positions().get(&6), Some(&9));
        assert_eq!(prg.end_positions().get(&8), Some(&8));
    }
}
