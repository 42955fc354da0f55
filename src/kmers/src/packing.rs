//! 3-bit packed on-disk representation of the kmer key vector (§4.5, §6).

use bv::{BitVec, Bits, BitsMut};

use prg::alphabet;

const BITS_PER_BASE: u64 = 3;

/// Pack a flat sequence of length-`k` DNA words into a 3-bit-per-base bit
/// stream, byte-aligned at the end.
pub fn pack_kmers(kmers: &[Vec<u8>]) -> Vec<u8> {
    let total_bases: u64 = kmers.iter().map(|k| k.len() as u64).sum();
    let total_bits = (total_bases * BITS_PER_BASE).max(1);
    let mut bits: BitVec<u8> = BitVec::new_fill(false, total_bits);

    let mut pos = 0u64;
    for kmer in kmers {
        for &base in kmer {
            let code = alphabet::encode_dna_base(base).expect("kmer contains a non-ACGT base") - 1;
            for bit in 0..BITS_PER_BASE {
                bits.set_bit(pos + bit, (code >> bit) & 1 == 1);
            }
            pos += BITS_PER_BASE;
        }
    }

    let nbytes = (bits.bit_len() as usize + 7) / 8;
    let mut bytes = vec![0u8; nbytes];
    for i in 0..bits.bit_len() {
        if bits.get_bit(i) {
            bytes[(i / 8) as usize] |= 1 << (i % 8);
        }
    }
    bytes
}

/// Inverse of [`pack_kmers`], given the word length `k` and the number of
/// words `count` that were packed (both persisted alongside, not recovered
/// from the byte stream itself).
pub fn unpack_kmers(bytes: &[u8], k: usize, count: usize) -> Vec<Vec<u8>> {
    let total_bits = (count as u64) * (k as u64) * BITS_PER_BASE;
    let mut bits: BitVec<u8> = BitVec::new_fill(false, total_bits.max(1));
    for i in 0..total_bits {
        let byte = bytes.get((i / 8) as usize).copied().unwrap_or(0);
        if (byte >> (i % 8)) & 1 == 1 {
            bits.set_bit(i, true);
        }
    }

    let mut out = Vec::with_capacity(count);
    let mut pos = 0u64;
    for _ in 0..count {
        let mut kmer = Vec::with_capacity(k);
        for _ in 0..k {
            let mut code = 0u32;
            for bit in 0..BITS_PER_BASE {
                if bits.get_bit(pos + bit) {
                    code |= 1 << bit;
                }
            }
            pos += BITS_PER_BASE;
            kmer.push(alphabet::decode_dna_base(code + 1));
        }
        out.push(kmer);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pack_unpack_roundtrip() {
        let kmers: Vec<Vec<u8>> = vec![b"ACGTA".to_vec(), b"TTTTT".to_vec(), b"GCGCG".to_vec()];
        let packed = pack_kmers(&kmers);
        let unpacked = unpack_kmers(&packed, 5, kmers.len());
        assert_eq!(unpacked, kmers);
    }

    #[test]
    fn pack_unpack_roundtrip_single_base_words() {
        let kmers: Vec<Vec<u8>> = vec![b"A".to_vec(), b"C".to_vec(), b"G".to_vec(), b"T".to_vec()];
        let packed = pack_kmers(&kmers);
        let unpacked = unpack_kmers(&packed, 1, kmers.len());
        assert_eq!(unpacked, kmers);
    }
}
