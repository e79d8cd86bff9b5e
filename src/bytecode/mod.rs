//! The bit-exact encoding layer. Everything the assembler emits ends up as a list of
//! [Word]s, built either from [WordSlice]s (fields narrower than a word) or from a
//! multi-word [Value].
pub mod assembled;
pub mod packed_bits;
pub mod parts;
pub mod value;
pub mod word;
pub mod word_slice;

pub use assembled::AssembledInstruction;
pub use packed_bits::PackedBits;
pub use parts::{ByteCodePart, PartContext, PartKind, WordLayout};
pub use value::Value;
pub use word::{words_to_bytes, Word};
pub use word_slice::WordSlice;

use serde::Deserialize;
use std::fmt;

/// Byte or segment ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Endian {
    #[default]
    Big,
    Little,
}
impl fmt::Display for Endian {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endian::Big => write!(f, "big"),
            Endian::Little => write!(f, "little"),
        }
    }
}

/// Number of bits needed to hold the magnitude of `value` (0 for 0).
pub fn bit_length(value: i128) -> u32 { 128 - value.unsigned_abs().leading_zeros() }

/// Mask with the low `bits` bits set.
pub fn low_mask(bits: u32) -> u128 {
    if bits >= 128 {
        u128::MAX
    } else {
        (1u128 << bits) - 1
    }
}
