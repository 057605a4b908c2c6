// blockchain-core/src/pow.rs

//! Compact difficulty targets and key block designation.
//!
//! Headers carry their target in the usual 32-bit compact form: one byte
//! of base-256 exponent followed by a 23-bit mantissa and a sign bit. A
//! block whose hash, read as a little-endian integer, does not exceed the
//! target of its own `bits` is a key block. Everything else is a micro
//! block.

use blockchain_crypto::Hash;
use num_bigint::{BigInt, Sign};
use num_traits::Zero;

/// Target of 2^256: every hash qualifies, so every block is a key block.
pub const TRIVIAL_TARGET_BITS: u32 = 0x2200_0100;

/// Target of zero: no hash qualifies, so every block is a micro block.
pub const ZERO_TARGET_BITS: u32 = 0x0300_0000;

/// Expand a compact target into a big integer
pub fn compact_to_big(compact: u32) -> BigInt {
    let mantissa = compact & 0x007f_ffff;
    let is_negative = compact & 0x0080_0000 != 0;
    let exponent = compact >> 24;

    let mut value = if exponent <= 3 {
        BigInt::from(mantissa >> (8 * (3 - exponent)))
    } else {
        BigInt::from(mantissa) << (8 * (exponent as usize - 3))
    };

    if is_negative {
        value = -value;
    }
    value
}

/// Compact encoding of a non-negative target
pub fn big_to_compact(value: &BigInt) -> u32 {
    if value.is_zero() {
        return 0;
    }

    let (sign, bytes) = value.to_bytes_be();
    let mut exponent = bytes.len() as u32;
    let mut mantissa = if exponent <= 3 {
        let mut m = 0u32;
        for b in &bytes {
            m = (m << 8) | *b as u32;
        }
        m << (8 * (3 - exponent))
    } else {
        ((bytes[0] as u32) << 16) | ((bytes[1] as u32) << 8) | bytes[2] as u32
    };

    // The sign bit lives in the mantissa, so shift into the exponent
    // rather than let a high mantissa bit read as negative.
    if mantissa & 0x0080_0000 != 0 {
        mantissa >>= 8;
        exponent += 1;
    }

    let mut compact = (exponent << 24) | mantissa;
    if sign == Sign::Minus {
        compact |= 0x0080_0000;
    }
    compact
}

/// Interpret a block hash as a little-endian unsigned integer
pub fn hash_to_big(hash: &Hash) -> BigInt {
    BigInt::from_bytes_le(Sign::Plus, hash.as_bytes())
}

/// Whether `hash` meets the target encoded by `bits`
pub fn meets_target(hash: &Hash, bits: u32) -> bool {
    hash_to_big(hash) <= compact_to_big(bits)
}
