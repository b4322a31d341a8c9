//! Blaze variable-length integer codec.
//!
//! Not a generic base-128 varint: the first byte carries a 6-bit
//! magnitude chunk, a sign flag (0x40) and a continuation flag (0x80);
//! every following byte carries a 7-bit chunk with a continuation flag.
//! The continuation flag is cleared on the final byte only. This exact
//! layout is required for wire compatibility.

use crate::error::ProtocolError;
use bytes::{Buf, BufMut, BytesMut};

/// Longest possible encoding: 6 bits in the first byte, then nine
/// 7-bit chunks to cover the remaining 57 bits of a u64 magnitude.
const MAX_ENCODED_LEN: usize = 10;

/// Encodes `n` into `buf` using the Blaze integer layout.
pub fn encode_integer(n: i64, buf: &mut BytesMut) {
    let negative = n < 0;
    let mut magnitude = n.unsigned_abs();

    let mut tmp = [0u8; MAX_ENCODED_LEN];
    tmp[0] = (magnitude % 64) as u8 | 0x80;
    magnitude /= 64;

    let mut len = 1;
    while magnitude > 0 {
        tmp[len] = (magnitude % 128) as u8 | 0x80;
        magnitude /= 128;
        len += 1;
    }

    if negative {
        tmp[0] += 0x40;
    }
    tmp[len - 1] &= 0x7F;

    buf.put_slice(&tmp[..len]);
}

/// Decodes one integer from the front of `buf`, advancing it.
pub fn decode_integer(buf: &mut &[u8]) -> Result<i64, ProtocolError> {
    if buf.is_empty() {
        return Err(ProtocolError::Truncated { needed: 1 });
    }

    let b0 = buf.get_u8();
    let negative = b0 & 0x40 != 0;
    let mut magnitude = (b0 & 0x3F) as u64;

    if b0 & 0x80 != 0 {
        let mut shift = 6u32;
        loop {
            if buf.is_empty() {
                return Err(ProtocolError::Truncated { needed: 1 });
            }
            let b = buf.get_u8();
            let chunk = (b & 0x7F) as u64;
            if chunk != 0 {
                if shift >= 64 {
                    return Err(ProtocolError::IntegerOverflow);
                }
                let shifted = chunk
                    .checked_mul(1u64 << shift)
                    .ok_or(ProtocolError::IntegerOverflow)?;
                magnitude = magnitude
                    .checked_add(shifted)
                    .ok_or(ProtocolError::IntegerOverflow)?;
            }
            if b & 0x80 == 0 {
                break;
            }
            shift += 7;
        }
    }

    if negative {
        if magnitude > (i64::MAX as u64) + 1 {
            return Err(ProtocolError::IntegerOverflow);
        }
        Ok((magnitude as i128).wrapping_neg() as i64)
    } else {
        if magnitude > i64::MAX as u64 {
            return Err(ProtocolError::IntegerOverflow);
        }
        Ok(magnitude as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(n: i64) -> i64 {
        let mut buf = BytesMut::new();
        encode_integer(n, &mut buf);
        let mut cursor = &buf[..];
        let decoded = decode_integer(&mut cursor).unwrap();
        assert!(cursor.is_empty(), "trailing bytes after decoding {n}");
        decoded
    }

    fn encoded(n: i64) -> Vec<u8> {
        let mut buf = BytesMut::new();
        encode_integer(n, &mut buf);
        buf.to_vec()
    }

    #[test]
    fn test_boundary_values() {
        for n in [0, 1, 63, 64, 127, 128, 8191, 8192, 1_000_000_007] {
            assert_eq!(roundtrip(n), n);
        }
    }

    #[test]
    fn test_negative_values() {
        for n in [-1, -63, -64, -100, -8191, -8192, -1_000_000_007] {
            assert_eq!(roundtrip(n), n);
        }
    }

    #[test]
    fn test_extremes() {
        assert_eq!(roundtrip(i64::MAX), i64::MAX);
        assert_eq!(roundtrip(i64::MIN), i64::MIN);
    }

    #[test]
    fn test_single_byte_layout() {
        // Magnitudes below 64 fit in one byte with the continuation
        // flag clear and the sign flag at 0x40.
        assert_eq!(encoded(0), vec![0x00]);
        assert_eq!(encoded(63), vec![0x3F]);
        assert_eq!(encoded(-1), vec![0x41]);
        assert_eq!(encoded(-63), vec![0x7F]);
    }

    #[test]
    fn test_continuation_boundary() {
        // 64 spills into a second byte: first byte keeps the low six
        // bits (zero) with continuation set.
        assert_eq!(encoded(64), vec![0x80, 0x01]);
        assert_eq!(encoded(-64), vec![0xC0, 0x01]);
        assert_eq!(encoded(8191), vec![0xBF, 0x7F]);
        assert_eq!(encoded(8192), vec![0x80, 0x80, 0x01]);
    }

    #[test]
    fn test_sign_preserved_across_continuation() {
        assert_eq!(roundtrip(-64), -64);
        assert_eq!(roundtrip(-65), -65);
        assert_eq!(roundtrip(-8192), -8192);
    }

    #[test]
    fn test_truncated_input() {
        // Continuation flag set but no further bytes.
        let mut cursor: &[u8] = &[0x80];
        assert!(matches!(
            decode_integer(&mut cursor),
            Err(ProtocolError::Truncated { .. })
        ));

        let mut cursor: &[u8] = &[];
        assert!(matches!(
            decode_integer(&mut cursor),
            Err(ProtocolError::Truncated { .. })
        ));
    }

    #[test]
    fn test_overflow_rejected() {
        // Eleven continuation bytes push the value past 64 bits.
        let mut bytes = vec![0xFFu8; 11];
        bytes.push(0x7F);
        let mut cursor = &bytes[..];
        assert!(matches!(
            decode_integer(&mut cursor),
            Err(ProtocolError::IntegerOverflow)
        ));
    }
}
