//! Variable-length integers.
//!
//! Values below 240 fit in the first byte. Larger values set the high nibble
//! of the first byte and carry the remainder in 7-bit groups, each byte with
//! its high bit set except the last:
//!
//! ```text
//!        0  <= X < 240        : 1 byte  (7.875 bits)  [ XXXX XXXX ]
//!      240  <= X < 2288       : 2 bytes (11 bits)     [ 1111 XXXX ] [ 0XXX XXXX ]
//!     2288  <= X < 264432     : 3 bytes (18 bits)     [ 1111 XXXX ] [ 1XXX XXXX ]   [ 0XXX XXXX ]
//!   264432  <= X < 33818864   : 4 bytes (25 bits)     [ 1111 XXXX ] [ 1XXX XXXX ]*2 [ 0XXX XXXX ]
//! ```

use bytes::BufMut;

use crate::error::{ProtocolError, Result};

/// Longest valid encoding of a `u64`.
pub const MAX_VARINT_LEN: usize = 10;

/// Append the encoding of `value` to `buf`.
pub fn encode(mut value: u64, buf: &mut impl BufMut) {
    if value < 240 {
        buf.put_u8(value as u8);
        return;
    }

    buf.put_u8((value as u8) | 240);
    value = (value - 240) >> 4;
    while value >= 128 {
        buf.put_u8((value as u8) | 128);
        value = (value - 128) >> 7;
    }
    buf.put_u8(value as u8);
}

/// Number of bytes [`encode`] writes for `value`.
pub fn encoded_len(mut value: u64) -> usize {
    if value < 240 {
        return 1;
    }
    let mut len = 2;
    value = (value - 240) >> 4;
    while value >= 128 {
        len += 1;
        value = (value - 128) >> 7;
    }
    len
}

/// Decode a varint from the front of `buf`.
///
/// Returns the value and the number of bytes consumed. Truncated input and
/// encodings that do not fit in 64 bits are rejected.
pub fn decode(buf: &[u8]) -> Result<(u64, usize)> {
    let first = *buf
        .first()
        .ok_or_else(|| ProtocolError::malformed("truncated varint"))?;
    if first < 240 {
        return Ok((u64::from(first), 1));
    }

    let mut value = u128::from(first);
    let mut shift = 4u32;
    let mut idx = 1;
    loop {
        if idx >= MAX_VARINT_LEN {
            return Err(ProtocolError::malformed("varint wider than 64 bits"));
        }
        let byte = *buf
            .get(idx)
            .ok_or_else(|| ProtocolError::malformed("truncated varint"))?;
        idx += 1;
        value += u128::from(byte) << shift;
        shift += 7;
        if byte < 128 {
            break;
        }
    }

    let value = u64::try_from(value)
        .map_err(|_| ProtocolError::malformed("varint wider than 64 bits"))?;
    Ok((value, idx))
}
