// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! LEB128 variable-length integers.
//!
//! Unsigned values are written 7 bits at a time, least significant group
//! first, with the high bit of each byte flagging continuation. Signed
//! values are zigzag-mapped first so that small magnitudes of either sign
//! stay short: `0 -> 0x00`, `-1 -> 0x01`, `1 -> 0x02`.

/// Longest encoding of a 32-bit value.
pub const MAX_VARINT32_LEN: usize = 5;
/// Longest encoding of a 64-bit value.
pub const MAX_VARINT64_LEN: usize = 10;
/// Longest encoding of a 128-bit value.
pub const MAX_VARINT128_LEN: usize = 19;

#[inline]
pub fn zigzag_encode(value: i64) -> u64 {
    ((value << 1) ^ (value >> 63)) as u64
}

#[inline]
pub fn zigzag_decode(value: u64) -> i64 {
    ((value >> 1) as i64) ^ -((value & 1) as i64)
}

/// Append the LEB128 encoding of `value`.
pub fn encode_u64(buf: &mut Vec<u8>, mut value: u64) {
    while value >= 0x80 {
        buf.push((value as u8) | 0x80);
        value >>= 7;
    }
    buf.push(value as u8);
}

/// Append the LEB128 encoding of a 128-bit `value`.
pub fn encode_u128(buf: &mut Vec<u8>, mut value: u128) {
    while value >= 0x80 {
        buf.push((value as u8) | 0x80);
        value >>= 7;
    }
    buf.push(value as u8);
}

/// Append the zigzag LEB128 encoding of `value`.
pub fn encode_i64(buf: &mut Vec<u8>, value: i64) {
    encode_u64(buf, zigzag_encode(value));
}

/// Number of bytes [`encode_u64`] emits for `value`.
pub fn encoded_len_u64(value: u64) -> usize {
    let bits = 64 - (value | 1).leading_zeros() as usize;
    bits.div_ceil(7)
}

pub fn encoded_len_i64(value: i64) -> usize {
    encoded_len_u64(zigzag_encode(value))
}

/// Decode an unsigned varint at the start of `buf`.
///
/// Returns the value and the number of bytes consumed, or `None` when the
/// input is truncated or longer than `max_len` bytes.
pub fn decode_u128(buf: &[u8], max_len: usize) -> Option<(u128, usize)> {
    let mut value: u128 = 0;
    for (i, &byte) in buf.iter().take(max_len).enumerate() {
        value |= u128::from(byte & 0x7F) << (7 * i);
        if byte & 0x80 == 0 {
            return Some((value, i + 1));
        }
    }
    None
}

/// Decode an unsigned 64-bit varint. Overlong or overflowing input yields `None`.
pub fn decode_u64(buf: &[u8]) -> Option<(u64, usize)> {
    let (value, used) = decode_u128(buf, MAX_VARINT64_LEN)?;
    u64::try_from(value).ok().map(|v| (v, used))
}
