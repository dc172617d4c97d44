//! 256-bit secp256k1 scalars.
//!
//! A scalar is kept as 32 big-endian bytes so that byte-wise comparison is
//! numeric comparison. Every key source funnels its output through
//! [`Scalar::normalized`], which replaces out-of-range values with the fixed
//! substitute `2` so batches stay rectangular.

use crate::constants::SCALAR_SIZE;
use thiserror::Error;

/// The secp256k1 group order n, big-endian.
pub const CURVE_ORDER: [u8; 32] = [
    0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF,
    0xFE, 0xBA, 0xAE, 0xDC, 0xE6, 0xAF, 0x48, 0xA0, 0x3B, 0xBF, 0xD2, 0x5E, 0x8C, 0xD0, 0x36,
    0x41, 0x41,
];

#[derive(Debug, Error)]
pub enum ScalarError {
    #[error("invalid hex scalar: {0}")]
    InvalidHex(String),

    #[error("invalid decimal scalar: {0}")]
    InvalidDecimal(String),

    #[error("scalar must be {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
}

/// A 256-bit scalar in big-endian byte order.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Scalar(pub [u8; SCALAR_SIZE]);

impl Scalar {
    /// The fixed substitute emitted in place of out-of-range scalars.
    pub const SUBSTITUTE: Scalar = Scalar::from_u64(2);

    pub const ZERO: Scalar = Scalar([0u8; SCALAR_SIZE]);

    /// Build a scalar from a small integer.
    pub const fn from_u64(value: u64) -> Self {
        let mut bytes = [0u8; SCALAR_SIZE];
        let v = value.to_be_bytes();
        let mut i = 0;
        while i < 8 {
            bytes[SCALAR_SIZE - 8 + i] = v[i];
            i += 1;
        }
        Scalar(bytes)
    }

    pub fn from_bytes(bytes: [u8; SCALAR_SIZE]) -> Self {
        Scalar(bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, ScalarError> {
        if bytes.len() != SCALAR_SIZE {
            return Err(ScalarError::InvalidLength {
                expected: SCALAR_SIZE,
                actual: bytes.len(),
            });
        }
        let mut out = [0u8; SCALAR_SIZE];
        out.copy_from_slice(bytes);
        Ok(Scalar(out))
    }

    /// Parse a hex string, with or without `0x` prefix. Shorter strings are
    /// zero-extended on the left.
    pub fn from_hex(s: &str) -> Result<Self, ScalarError> {
        let s = s.trim().trim_start_matches("0x").trim_start_matches("0X");
        if s.is_empty() || s.len() > SCALAR_SIZE * 2 {
            return Err(ScalarError::InvalidHex(s.to_string()));
        }
        let padded = if s.len() % 2 == 1 {
            format!("0{}", s)
        } else {
            s.to_string()
        };
        let raw = hex::decode(&padded).map_err(|_| ScalarError::InvalidHex(s.to_string()))?;
        let mut bytes = [0u8; SCALAR_SIZE];
        bytes[SCALAR_SIZE - raw.len()..].copy_from_slice(&raw);
        Ok(Scalar(bytes))
    }

    /// Parse an unsigned decimal string of arbitrary length up to 2^256.
    pub fn from_decimal(s: &str) -> Result<Self, ScalarError> {
        let s = s.trim();
        if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ScalarError::InvalidDecimal(s.to_string()));
        }
        let mut bytes = [0u8; SCALAR_SIZE];
        for digit in s.bytes() {
            // bytes = bytes * 10 + digit, big-endian schoolbook
            let mut carry = (digit - b'0') as u16;
            for b in bytes.iter_mut().rev() {
                let v = (*b as u16) * 10 + carry;
                *b = (v & 0xFF) as u8;
                carry = v >> 8;
            }
            if carry != 0 {
                return Err(ScalarError::InvalidDecimal(s.to_string()));
            }
        }
        Ok(Scalar(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; SCALAR_SIZE] {
        &self.0
    }

    /// Whether the scalar is a valid secp256k1 secret key: in [1, n-1].
    pub fn is_valid(&self) -> bool {
        self.0 != [0u8; SCALAR_SIZE] && self.0 < CURVE_ORDER
    }

    /// The scalar itself when valid, otherwise the fixed substitute `2`.
    pub fn normalized(self) -> Self {
        if self.is_valid() {
            self
        } else {
            Scalar::SUBSTITUTE
        }
    }

    /// 256-bit addition of a u64 offset. Returns `None` on carry out of the
    /// 256-bit range; such values are invalid scalars by definition.
    pub fn add_u64(&self, offset: u64) -> Option<Self> {
        let mut out = self.0;
        let mut carry = offset as u128;
        for i in (0..SCALAR_SIZE).rev() {
            if carry == 0 {
                break;
            }
            let v = out[i] as u128 + (carry & 0xFF);
            out[i] = (v & 0xFF) as u8;
            carry = (carry >> 8) + (v >> 8);
        }
        if carry != 0 {
            return None;
        }
        Some(Scalar(out))
    }

    /// Zero the top `256 - keep_bits` bits, shrinking the effective key
    /// space to 2^keep_bits. Used for puzzle-range search.
    pub fn masked(mut self, keep_bits: u32) -> Self {
        debug_assert!(keep_bits <= 256);
        let keep_bits = keep_bits.min(256) as usize;
        let full_zero_bytes = SCALAR_SIZE - keep_bits.div_ceil(8);
        for b in self.0.iter_mut().take(full_zero_bytes) {
            *b = 0;
        }
        if keep_bits % 8 != 0 && full_zero_bytes < SCALAR_SIZE {
            self.0[full_zero_bytes] &= (1u8 << (keep_bits % 8)) - 1;
        }
        self
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl std::fmt::Debug for Scalar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Scalar({})", self.to_hex())
    }
}

impl std::fmt::Display for Scalar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_u64() {
        let s = Scalar::from_u64(0xDEADBEEF);
        assert_eq!(s.to_hex(), format!("{:064x}", 0xDEADBEEFu64));
    }

    #[test]
    fn test_validity_bounds() {
        assert!(!Scalar::ZERO.is_valid());
        assert!(Scalar::from_u64(1).is_valid());
        assert!(Scalar::SUBSTITUTE.is_valid());

        let order = Scalar(CURVE_ORDER);
        assert!(!order.is_valid());

        // n - 1 is the largest valid scalar
        let mut below = CURVE_ORDER;
        below[31] -= 1;
        assert!(Scalar(below).is_valid());
    }

    #[test]
    fn test_normalized_substitutes_two() {
        assert_eq!(Scalar::ZERO.normalized(), Scalar::from_u64(2));
        assert_eq!(Scalar(CURVE_ORDER).normalized(), Scalar::from_u64(2));
        let valid = Scalar::from_u64(12345);
        assert_eq!(valid.normalized(), valid);
    }

    #[test]
    fn test_add_u64_carry() {
        let s = Scalar::from_u64(u64::MAX);
        let sum = s.add_u64(1).unwrap();
        let mut expected = [0u8; 32];
        expected[23] = 1;
        assert_eq!(sum, Scalar(expected));

        let max = Scalar([0xFF; 32]);
        assert!(max.add_u64(1).is_none());
        assert_eq!(max.add_u64(0), Some(max));
    }

    #[test]
    fn test_add_crossing_order_is_invalid() {
        let mut near = CURVE_ORDER;
        near[31] -= 2;
        let s = Scalar(near); // n - 2, valid
        assert!(s.is_valid());
        assert!(s.add_u64(1).unwrap().is_valid()); // n - 1
        assert!(!s.add_u64(2).unwrap().is_valid()); // n
        assert!(!s.add_u64(3).unwrap().is_valid()); // n + 1
    }

    #[test]
    fn test_hex_roundtrip() {
        let s = Scalar::from_hex("0xdeadbeef").unwrap();
        assert_eq!(s, Scalar::from_u64(0xDEADBEEF));
        let s = Scalar::from_hex("1").unwrap();
        assert_eq!(s, Scalar::from_u64(1));
        assert!(Scalar::from_hex("").is_err());
        assert!(Scalar::from_hex("zz").is_err());
    }

    #[test]
    fn test_decimal_parse() {
        assert_eq!(Scalar::from_decimal("255").unwrap(), Scalar::from_u64(255));
        assert_eq!(
            Scalar::from_decimal("18446744073709551616").unwrap(),
            Scalar::from_u64(u64::MAX).add_u64(1).unwrap()
        );
        assert!(Scalar::from_decimal("12a").is_err());
        assert!(Scalar::from_decimal("").is_err());
        // 2^256 overflows
        let too_big = "115792089237316195423570985008687907853269984665640564039457584007913129639936";
        assert!(Scalar::from_decimal(too_big).is_err());
    }

    #[test]
    fn test_masked() {
        let s = Scalar([0xFF; 32]);
        let masked = s.masked(8);
        let mut expected = [0u8; 32];
        expected[31] = 0xFF;
        assert_eq!(masked, Scalar(expected));

        let masked = s.masked(12);
        expected[30] = 0x0F;
        assert_eq!(masked, Scalar(expected));

        assert_eq!(s.masked(256), s);
        assert_eq!(s.masked(0), Scalar::ZERO);
    }
}
