//! Nucleotide code mapping and 2-bit stream packing.
//!
//! The packed reference encoding stores four bases per byte with the first
//! base in the two most significant bits, forming one continuous bit stream
//! across the rows of a store page. These helpers convert between ASCII
//! nucleotides and that stream; the in-memory backend uses them to serve
//! packed cells and the test suite uses them to check packed output.

use crate::{Result, StoreError};

/// Maps an ASCII nucleotide to its 2-bit code (A=0, C=1, G=2, T=3).
///
/// Returns `None` for anything outside the unambiguous alphabet; the packed
/// encoding has no room for N or IUPAC ambiguity codes.
#[must_use]
pub const fn encode_base(base: u8) -> Option<u8> {
    match base {
        b'A' | b'a' => Some(0),
        b'C' | b'c' => Some(1),
        b'G' | b'g' => Some(2),
        b'T' | b't' => Some(3),
        _ => None,
    }
}

/// Maps a 2-bit code back to its ASCII nucleotide.
///
/// Only the low two bits are inspected.
#[must_use]
pub const fn decode_base(code: u8) -> u8 {
    match code & 0b11 {
        0 => b'A',
        1 => b'C',
        2 => b'G',
        _ => b'T',
    }
}

/// Accumulates a 2-bit packed stream, four bases per byte, first base in the
/// high bits.
#[derive(Default)]
pub struct PackedWriter {
    buf: Vec<u8>,
    len: u64,
}

impl PackedWriter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one base to the stream.
    pub fn push(&mut self, base: u8) -> Result<()> {
        let code = encode_base(base).ok_or(StoreError::InvalidBase(base))?;
        let shift = 6 - 2 * (self.len % 4) as u8;
        if self.len % 4 == 0 {
            self.buf.push(0);
        }
        let last = self
            .buf
            .last_mut()
            .expect("packed buffer populated on push");
        *last |= code << shift;
        self.len += 1;
        Ok(())
    }

    /// Appends a run of ASCII bases to the stream.
    pub fn extend(&mut self, bases: &[u8]) -> Result<()> {
        for &b in bases {
            self.push(b)?;
        }
        Ok(())
    }

    /// Number of bases written so far.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

/// Packs a run of ASCII bases into a fresh byte buffer.
pub fn pack(bases: &[u8]) -> Result<Vec<u8>> {
    let mut w = PackedWriter::new();
    w.extend(bases)?;
    Ok(w.into_bytes())
}

/// Reads the 2-bit code at base position `index` of a packed stream that
/// starts `bit_offset` bits into `data`.
#[must_use]
pub fn code_at(data: &[u8], bit_offset: u64, index: u64) -> u8 {
    let pos = bit_offset + 2 * index;
    let shift = 6 - (pos % 8) as u8;
    (data[(pos / 8) as usize] >> shift) & 0b11
}

/// Unpacks `count` bases from a packed stream into ASCII, appending to `out`.
pub fn unpack_into(data: &[u8], bit_offset: u64, count: u64, out: &mut Vec<u8>) {
    out.reserve(count as usize);
    for i in 0..count {
        out.push(decode_base(code_at(data, bit_offset, i)));
    }
}

/// Unpacks `count` bases from a packed stream into a fresh ASCII buffer.
#[must_use]
pub fn unpack(data: &[u8], bit_offset: u64, count: u64) -> Vec<u8> {
    let mut out = Vec::new();
    unpack_into(data, bit_offset, count, &mut out);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pack_unpack_roundtrip() {
        let bases = b"ACGTACGTTGCA";
        let packed = pack(bases).unwrap();
        assert_eq!(packed.len(), 3);
        assert_eq!(unpack(&packed, 0, bases.len() as u64), bases);
    }

    #[test]
    fn test_pack_layout_first_base_high_bits() {
        // A C G T -> 00 01 10 11 -> 0b00011011
        let packed = pack(b"ACGT").unwrap();
        assert_eq!(packed, vec![0b0001_1011]);
    }

    #[test]
    fn test_pack_partial_byte() {
        let packed = pack(b"ACG").unwrap();
        assert_eq!(packed, vec![0b0001_1000]);
        assert_eq!(unpack(&packed, 0, 3), b"ACG");
    }

    #[test]
    fn test_unpack_with_bit_offset() {
        let packed = pack(b"ACGTAC").unwrap();
        // skip the first two bases
        assert_eq!(unpack(&packed, 4, 4), b"GTAC");
    }

    #[test]
    fn test_invalid_base_rejected() {
        let err = pack(b"ACGNT").unwrap_err();
        assert!(matches!(
            err,
            crate::Error::Store(StoreError::InvalidBase(b'N'))
        ));
    }

    #[test]
    fn test_lowercase_accepted() {
        assert_eq!(pack(b"acgt").unwrap(), pack(b"ACGT").unwrap());
    }
}
