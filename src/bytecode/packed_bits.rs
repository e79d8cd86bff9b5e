/// Accumulates fields of arbitrary bit width, MSB first, into a byte buffer.
#[derive(Debug, Default, Clone)]
pub struct PackedBits {
    bytes: Vec<u8>,
    bit_len: usize,
}

impl PackedBits {
    pub fn new() -> Self { PackedBits::default() }
    /// Append the low `bits` bits of `value`. When `byte_aligned` is set the buffer is
    /// first padded with zero bits up to the next byte boundary.
    pub fn append_bits(&mut self, value: u128, bits: u32, byte_aligned: bool) {
        if byte_aligned {
            self.pad_to_byte();
        }
        for i in (0..bits).rev() {
            self.push_bit((value >> i) & 1 == 1);
        }
    }
    fn push_bit(&mut self, set: bool) {
        if self.bit_len % 8 == 0 {
            self.bytes.push(0);
        }
        if set {
            if let Some(last) = self.bytes.last_mut() {
                *last |= 0x80 >> (self.bit_len % 8);
            }
        }
        self.bit_len += 1;
    }
    pub fn pad_to_byte(&mut self) {
        if self.bit_len % 8 != 0 {
            self.bit_len += 8 - self.bit_len % 8;
        }
    }
    pub fn bit_len(&self) -> usize { self.bit_len }
    pub fn is_empty(&self) -> bool { self.bit_len == 0 }
    pub fn get_bytes(&self) -> &[u8] { &self.bytes }
    pub fn into_bytes(self) -> Vec<u8> { self.bytes }
}

#[cfg(test)]
mod tests {
    use super::*;
    #[test]
    fn unaligned_and_aligned_appends() {
        let mut bits = PackedBits::new();
        bits.append_bits(0b101, 3, false);
        bits.append_bits(0b11, 2, false);
        assert_eq!(bits.get_bytes(), &[0b1011_1000]);
        bits.append_bits(0xab, 8, true);
        assert_eq!(bits.get_bytes(), &[0b1011_1000, 0xab]);
        assert_eq!(bits.bit_len(), 16);
        bits.append_bits(0x1, 4, false);
        assert_eq!(bits.into_bytes(), vec![0b1011_1000, 0xab, 0x10]);
    }
}
