use super::{low_mask, Endian, PackedBits, WordSlice};
use crate::error::{Error, ErrorKind};

/// One native word of the target architecture. A word is split into equally sized
/// segments; the intra-word endianness decides the order those segments are emitted in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Word {
    value: u128,
    bit_size: u32,
    segment_size: u32,
    intra_word_endian: Endian,
}

impl Word {
    pub fn new(value: u128, bit_size: u32, segment_size: u32, intra_word_endian: Endian) -> Result<Self, Error> {
        if bit_size == 0 || bit_size > 128 {
            return Err(Error::new(
                ErrorKind::Config,
                None,
                &format!("word size of {} bits is not supported", bit_size),
            ));
        }
        if segment_size == 0 || bit_size % segment_size != 0 {
            return Err(Error::new(
                ErrorKind::Config,
                None,
                &format!("segment size {} does not evenly divide word size {}", segment_size, bit_size),
            ));
        }
        if value > low_mask(bit_size) {
            return Err(Error::new(
                ErrorKind::Range,
                None,
                &format!("value 0x{:x} does not fit in a {}-bit word", value, bit_size),
            ));
        }
        Ok(Word {
            value,
            bit_size,
            segment_size,
            intra_word_endian,
        })
    }
    /// Concatenate the slices MSB first in the order given, left-packed into the word
    /// and padded on the right with zero bits.
    pub fn from_word_slices(
        slices: &[WordSlice], bit_size: u32, segment_size: u32, intra_word_endian: Endian,
    ) -> Result<Self, Error> {
        let total: u32 = slices.iter().map(|s| s.bit_size()).sum();
        if total > bit_size {
            return Err(Error::new(
                ErrorKind::Range,
                None,
                &format!("{} bits of slices do not fit in a {}-bit word", total, bit_size),
            ));
        }
        let mut value = 0u128;
        let mut remaining = bit_size;
        for s in slices {
            remaining -= s.bit_size();
            if s.bit_size() > 0 {
                value |= s.get_raw_bits() << remaining;
            }
        }
        Word::new(value, bit_size, segment_size, intra_word_endian)
    }
    pub fn value(&self) -> u128 { self.value }
    pub fn bit_size(&self) -> u32 { self.bit_size }
    pub fn segment_size(&self) -> u32 { self.segment_size }
    pub fn intra_word_endian(&self) -> Endian { self.intra_word_endian }

    /// The word's segments in emission order.
    fn ordered_segments(&self) -> Vec<u128> {
        let count = self.bit_size / self.segment_size;
        let mut segments: Vec<u128> = (0..count)
            .map(|i| (self.value >> ((count - 1 - i) * self.segment_size)) & low_mask(self.segment_size))
            .collect();
        if self.intra_word_endian == Endian::Little {
            segments.reverse();
        }
        segments
    }
    /// Append the word's bits to `bits`, segment by segment.
    pub fn append_to(&self, bits: &mut PackedBits, byte_aligned: bool) {
        if byte_aligned {
            bits.pad_to_byte();
        }
        for seg in self.ordered_segments() {
            bits.append_bits(seg, self.segment_size, false);
        }
    }
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bits = PackedBits::new();
        self.append_to(&mut bits, false);
        bits.into_bytes()
    }
}

/// Serialize a run of words. With `compact` the words' bits are packed back to back,
/// otherwise every word starts on a fresh byte.
pub fn words_to_bytes(words: &[Word], compact: bool) -> Vec<u8> {
    let mut bits = PackedBits::new();
    for w in words {
        w.append_to(&mut bits, !compact);
    }
    bits.into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;
    #[test]
    fn packing_slices_is_left_aligned() -> Result<(), Error> {
        let slices = [WordSlice::new(1, 4)?, WordSlice::new(2, 4)?, WordSlice::new(3, 4)?];
        let w1 = Word::from_word_slices(&slices[0..2], 8, 8, Endian::Big)?;
        let w2 = Word::from_word_slices(&slices[2..], 8, 8, Endian::Big)?;
        assert_eq!(words_to_bytes(&[w1, w2], true), vec![0x12, 0x30]);
        // same input, same output
        let again = Word::from_word_slices(&slices[0..2], 8, 8, Endian::Big)?;
        assert_eq!(again, w1);
        assert!(Word::from_word_slices(&slices, 8, 8, Endian::Big).is_err());
        Ok(())
    }
    #[test]
    fn segment_order() -> Result<(), Error> {
        let w = Word::new(0x1234, 16, 8, Endian::Big)?;
        assert_eq!(w.to_bytes(), vec![0x12, 0x34]);
        let w = Word::new(0x1234, 16, 8, Endian::Little)?;
        assert_eq!(w.to_bytes(), vec![0x34, 0x12]);
        let w = Word::new(0x1234, 16, 4, Endian::Little)?;
        assert_eq!(w.to_bytes(), vec![0x43, 0x21]);
        assert!(Word::new(0x100, 8, 8, Endian::Big).is_err());
        assert!(Word::new(0x1, 12, 8, Endian::Big).is_err());
        Ok(())
    }
    #[test]
    fn compact_vs_aligned_words() -> Result<(), Error> {
        let a = Word::new(0xf, 4, 4, Endian::Big)?;
        let b = Word::new(0x1, 4, 4, Endian::Big)?;
        assert_eq!(words_to_bytes(&[a, b], true), vec![0xf1]);
        assert_eq!(words_to_bytes(&[a, b], false), vec![0xf0, 0x10]);
        Ok(())
    }
}
