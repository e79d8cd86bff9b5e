use super::{bit_length, low_mask, Endian, Word};
use crate::error::{Error, ErrorKind};

/// An integer spanning one or more words. Words are held most significant first; the
/// multi-word endianness only matters when they are handed out for emission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Value {
    value: i128,
    word_bit_size: u32,
    multi_word_endian: Endian,
    words: Vec<Word>,
}

impl Value {
    /// Build a value using as many words as its magnitude needs (at least one, with an
    /// extra bit for the sign of negative numbers).
    pub fn new(
        value: i128, word_bit_size: u32, segment_size: u32, intra_word_endian: Endian, multi_word_endian: Endian,
    ) -> Result<Self, Error> {
        let mut bits = bit_length(value);
        if value < 0 {
            bits += 1;
        }
        let word_count = (bits.max(1) + word_bit_size.max(1) - 1) / word_bit_size.max(1);
        Value::with_word_count(
            value,
            word_count.max(1) as usize,
            word_bit_size,
            segment_size,
            intra_word_endian,
            multi_word_endian,
        )
    }
    /// Build a value that occupies exactly `word_count` words. Bits above that width are dropped.
    pub fn with_word_count(
        value: i128, word_count: usize, word_bit_size: u32, segment_size: u32, intra_word_endian: Endian,
        multi_word_endian: Endian,
    ) -> Result<Self, Error> {
        if word_bit_size == 0 {
            return Err(Error::new(ErrorKind::Config, None, "word size must be greater than 0"));
        }
        let segment_size = if segment_size == 0 || word_bit_size % segment_size != 0 {
            word_bit_size
        } else {
            segment_size
        };
        let total_bits = word_count as u32 * word_bit_size;
        if total_bits > 128 {
            return Err(Error::new(
                ErrorKind::Range,
                None,
                &format!("value {} needs {} bits which is more than supported", value, total_bits),
            ));
        }
        let raw = (value as u128) & low_mask(total_bits);
        let words = (0..word_count)
            .map(|i| {
                let shift = (word_count - 1 - i) as u32 * word_bit_size;
                Word::new(
                    (raw >> shift) & low_mask(word_bit_size),
                    word_bit_size,
                    segment_size,
                    intra_word_endian,
                )
            })
            .collect::<Result<Vec<Word>, Error>>()?;
        Ok(Value {
            value,
            word_bit_size,
            multi_word_endian,
            words,
        })
    }
    pub fn value(&self) -> i128 { self.value }
    pub fn word_bit_size(&self) -> u32 { self.word_bit_size }
    pub fn word_count(&self) -> usize { self.words.len() }
    /// Words in most significant first order.
    pub fn words(&self) -> &[Word] { &self.words }
    pub fn get_words_ordered(&self, multi_word_endian: Option<Endian>) -> Vec<Word> {
        let mut words = self.words.clone();
        if multi_word_endian.unwrap_or(self.multi_word_endian) == Endian::Little {
            words.reverse();
        }
        words
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::word::words_to_bytes;
    #[test]
    fn endianness_reverses_word_order() -> Result<(), Error> {
        let v = Value::new(0x12345678, 8, 8, Endian::Big, Endian::Big)?;
        assert_eq!(v.word_count(), 4);
        let big = v.get_words_ordered(Some(Endian::Big));
        let mut little = v.get_words_ordered(Some(Endian::Little));
        assert_eq!(words_to_bytes(&big, true), vec![0x12, 0x34, 0x56, 0x78]);
        little.reverse();
        assert_eq!(little, big);
        Ok(())
    }
    #[test]
    fn word_counts() -> Result<(), Error> {
        assert_eq!(Value::new(0, 8, 8, Endian::Big, Endian::Big)?.word_count(), 1);
        assert_eq!(Value::new(0xff, 8, 8, Endian::Big, Endian::Big)?.word_count(), 1);
        assert_eq!(Value::new(0x100, 8, 8, Endian::Big, Endian::Big)?.word_count(), 2);
        // -1 needs a sign bit, still one word
        let neg = Value::new(-1, 8, 8, Endian::Big, Endian::Big)?;
        assert_eq!(neg.word_count(), 1);
        assert_eq!(neg.words()[0].value(), 0xff);
        // 12-bit words with 8-bit segments fall back to whole-word segments
        let odd = Value::new(0xabc, 12, 8, Endian::Big, Endian::Little)?;
        assert_eq!(odd.words()[0].segment_size(), 12);
        Ok(())
    }
    #[test]
    fn fixed_width_little_endian() -> Result<(), Error> {
        let v = Value::with_word_count(1, 2, 8, 8, Endian::Big, Endian::Little)?;
        assert_eq!(words_to_bytes(&v.get_words_ordered(None), true), vec![0x01, 0x00]);
        Ok(())
    }
}
