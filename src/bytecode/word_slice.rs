use super::low_mask;
use crate::error::{Error, ErrorKind};

/// A signed or unsigned integer tagged with the number of bits it occupies.
/// Valid values satisfy `-2^(bits-1) <= value < 2^bits`. A 0-bit slice is a placeholder
/// that only holds 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WordSlice {
    value: i128,
    bit_size: u32,
}

impl WordSlice {
    pub fn new(value: i128, bit_size: u32) -> Result<Self, Error> {
        if bit_size == 0 {
            if value != 0 {
                return Err(Error::new(
                    ErrorKind::Range,
                    None,
                    &format!("value {} does not fit in a 0-bit slice", value),
                ));
            }
            return Ok(WordSlice { value, bit_size });
        }
        if bit_size > 127 {
            return Err(Error::new(
                ErrorKind::Range,
                None,
                &format!("slice width of {} bits is too large", bit_size),
            ));
        }
        let min = -(1i128 << (bit_size - 1));
        let max = 1i128 << bit_size;
        if value < min || value >= max {
            return Err(Error::new(
                ErrorKind::Range,
                None,
                &format!("value {} does not fit in {} bits", value, bit_size),
            ));
        }
        Ok(WordSlice { value, bit_size })
    }
    pub fn value(&self) -> i128 { self.value }
    pub fn bit_size(&self) -> u32 { self.bit_size }
    /// The two's complement bit pattern of the value, `bit_size` bits wide.
    pub fn get_raw_bits(&self) -> u128 {
        if self.bit_size == 0 {
            return 0;
        }
        if self.value < 0 {
            ((1i128 << self.bit_size) + self.value) as u128
        } else {
            self.value as u128 & low_mask(self.bit_size)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    fn as_signed(raw: u128, bits: u32) -> i128 {
        if raw >> (bits - 1) & 1 == 1 {
            raw as i128 - (1i128 << bits)
        } else {
            raw as i128
        }
    }
    #[test]
    fn raw_bits_round_trip() -> Result<(), Error> {
        for bits in 1..=64u32 {
            let min = -(1i128 << (bits - 1));
            let max_signed = (1i128 << (bits - 1)) - 1;
            for v in [min, -1, 0, 1, max_signed] {
                if v < min || v > max_signed {
                    continue;
                }
                let ws = WordSlice::new(v, bits)?;
                assert_eq!(as_signed(ws.get_raw_bits(), bits), v, "bits={} v={}", bits, v);
            }
        }
        Ok(())
    }
    #[test]
    fn range_limits() {
        assert!(WordSlice::new(15, 4).is_ok());
        assert!(WordSlice::new(16, 4).is_err());
        assert!(WordSlice::new(-8, 4).is_ok());
        assert!(WordSlice::new(-9, 4).is_err());
        assert!(WordSlice::new(0, 0).is_ok());
        assert!(WordSlice::new(1, 0).is_err());
        assert_eq!(WordSlice::new(-1, 4).map(|w| w.get_raw_bits()).ok(), Some(0xf));
    }
}
