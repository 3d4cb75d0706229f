use crate::{ItqError, Result};
use hamming_bitwise_fast::hamming_bitwise_fast;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
/// A fixed-length binary hash code.
///
/// Bits are packed most-significant first; unused bits of the final byte are always zero.
pub struct HashCode {
    bytes: Vec<u8>,
    len: usize,
}

impl HashCode {
    /// Pack a sequence of bits into a hash code.
    pub fn from_bits(bits: impl IntoIterator<Item = bool>) -> Self {
        let mut bytes = Vec::new();
        let mut len = 0;
        for bit in bits {
            if len % 8 == 0 {
                bytes.push(0);
            }
            if bit {
                if let Some(byte) = bytes.last_mut() {
                    *byte |= 0x80 >> (len % 8);
                }
            }
            len += 1;
        }
        Self { bytes, len }
    }

    /// The number of bits in the code.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether or not the code has no bits.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The bit at `index`, if the code is long enough to have one.
    pub fn bit(&self, index: usize) -> Option<bool> {
        (index < self.len).then(|| self.bytes[index / 8] & (0x80 >> (index % 8)) != 0)
    }

    /// The bits of the code, in order.
    pub fn iter(&self) -> impl Iterator<Item = bool> + '_ {
        (0..self.len).map(|i| self.bytes[i / 8] & (0x80 >> (i % 8)) != 0)
    }

    /// The bits of the code, in order.
    pub fn to_bools(&self) -> Vec<bool> {
        self.iter().collect()
    }

    /// The packed bytes of the code.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// The packed bytes of the code, in lowercase hexadecimal.
    pub fn to_hex(&self) -> String {
        hex::encode(&self.bytes)
    }

    /// Parse a code written by [`HashCode::to_hex`].
    ///
    /// # Arguments
    ///
    /// * `digits` - The hexadecimal bytes of the code.
    ///
    /// * `len` - The number of bits in the code.
    pub fn from_hex(digits: &str, len: usize) -> Result<Self> {
        let byte_count = len.div_ceil(8);
        if digits.len() != byte_count * 2 {
            return Err(ItqError::Validation(format!(
                "a {len}-bit code needs {} hexadecimal digits, got {}",
                byte_count * 2,
                digits.len()
            )));
        }
        let mut bytes = vec![0; byte_count];
        hex::decode_to_slice(digits, &mut bytes)
            .map_err(|e| ItqError::Validation(format!("'{digits}' is not hexadecimal: {e}")))?;
        let code = Self { bytes, len };
        if code.bytes.last().is_some_and(|x| x & code.padding_mask() != 0) {
            return Err(ItqError::Validation(format!(
                "'{digits}' sets bits beyond the end of a {len}-bit code"
            )));
        }
        Ok(code)
    }

    fn padding_mask(&self) -> u8 {
        match self.len % 8 {
            0 => 0,
            used => 0xff >> used,
        }
    }

    /// The code as an integer, with the first bit most significant.
    ///
    /// # Returns
    ///
    /// `None` if the code is longer than 64 bits.
    pub fn to_u64(&self) -> Option<u64> {
        (self.len <= 64).then(|| self.iter().fold(0, |acc, bit| (acc << 1) | bit as u64))
    }

    /// Unpack an integer into a `len`-bit code, with the first bit most significant.
    ///
    /// # Arguments
    ///
    /// * `value` - The integer to unpack.
    ///
    /// * `len` - The number of bits in the code; at most 64.
    pub fn from_u64(value: u64, len: usize) -> Result<Self> {
        if len > 64 || (len < 64 && value >> len != 0) {
            return Err(ItqError::Validation(format!(
                "{value} does not fit in a {len}-bit code"
            )));
        }
        Ok(Self::from_bits(
            (0..len).map(|i| (value >> (len - 1 - i)) & 1 == 1),
        ))
    }

    /// The number of bits which differ between two codes of the same length.
    pub fn hamming_distance(&self, other: &Self) -> Result<u32> {
        if self.len != other.len {
            return Err(ItqError::Validation(format!(
                "cannot compare a {}-bit code with a {}-bit code",
                self.len, other.len
            )));
        }
        Ok(hamming_bitwise_fast(&self.bytes, &other.bytes))
    }
}

impl fmt::Display for HashCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bits_are_packed_most_significant_first() {
        let code = HashCode::from_bits([true, false, true, true, false, false, false, false, true]);
        assert_eq!(code.len(), 9);
        assert_eq!(code.as_bytes(), &[0b1011_0000, 0b1000_0000]);
        assert_eq!(code.to_hex(), "b080");
        assert_eq!(code.bit(0), Some(true));
        assert_eq!(code.bit(1), Some(false));
        assert_eq!(code.bit(8), Some(true));
        assert_eq!(code.bit(9), None);
    }

    #[test]
    fn hexadecimal_round_trips() {
        let code = HashCode::from_bits((0..21).map(|i| i % 3 == 0));
        assert_eq!(HashCode::from_hex(&code.to_hex(), 21).unwrap(), code);
        assert!(HashCode::from_hex("b080", 8).is_err());
        assert!(HashCode::from_hex("zz", 8).is_err());
        assert_eq!(HashCode::from_hex("B080", 9).unwrap().to_hex(), "b080");
        // The ninth bit is the only one in use in the last byte.
        assert!(HashCode::from_hex("b0c0", 9).is_err());
    }

    #[test]
    fn integers_round_trip() {
        let code = HashCode::from_bits([true, false, true, true]);
        assert_eq!(code.to_u64(), Some(0b1011));
        assert_eq!(HashCode::from_u64(0b1011, 4).unwrap(), code);
        assert_eq!(HashCode::from_u64(u64::MAX, 64).unwrap().to_u64(), Some(u64::MAX));
        assert!(HashCode::from_u64(16, 4).is_err());
        assert_eq!(HashCode::from_bits(vec![true; 65]).to_u64(), None);
    }

    #[test]
    fn hamming_distance_counts_differing_bits() {
        let a = HashCode::from_bits([true, true, false, false, true, false, true, true, true, false]);
        let b = HashCode::from_bits([true, false, false, true, true, false, true, true, false, false]);
        assert_eq!(a.hamming_distance(&b).unwrap(), 3);
        assert_eq!(a.hamming_distance(&a).unwrap(), 0);
        assert!(a.hamming_distance(&HashCode::from_bits([true])).is_err());
    }
}
