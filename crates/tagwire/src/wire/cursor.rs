// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Bounds-checked reader and growable writer for the tagged wire format.

use super::varint::{self, MAX_VARINT128_LEN};
use super::WireType;
use crate::error::{SerError, SerResult};

/// Generate little-endian write methods for fixed-size values.
macro_rules! impl_write_le {
    ($name:ident, $type:ty) => {
        pub fn $name(&mut self, value: $type) {
            self.buffer.extend_from_slice(&value.to_le_bytes());
        }
    };
}

/// Generate little-endian read methods for fixed-size values.
///
/// Each generated method checks bounds first and reports the offset of the
/// failed read without advancing.
macro_rules! impl_read_le {
    ($name:ident, $type:ty, $size:expr) => {
        pub fn $name(&mut self) -> SerResult<$type> {
            let mut bytes = [0u8; $size];
            bytes.copy_from_slice(self.read_bytes($size)?);
            Ok(<$type>::from_le_bytes(bytes))
        }
    };
}

/// Append-only writer.
#[derive(Debug, Default)]
pub struct WireWriter {
    buffer: Vec<u8>,
}

impl WireWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(capacity),
        }
    }

    pub fn offset(&self) -> usize {
        self.buffer.len()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buffer
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buffer
    }

    pub fn write_u8(&mut self, value: u8) {
        self.buffer.push(value);
    }

    impl_write_le!(write_f32, f32);
    impl_write_le!(write_f64, f64);
    impl_write_le!(write_u128_le, u128);

    pub fn write_wire_type(&mut self, wire: WireType) {
        self.buffer.push(wire.as_u8());
    }

    pub fn write_var_uint(&mut self, value: u64) {
        varint::encode_u64(&mut self.buffer, value);
    }

    pub fn write_var_int(&mut self, value: i64) {
        varint::encode_i64(&mut self.buffer, value);
    }

    pub fn write_var_uint128(&mut self, value: u128) {
        varint::encode_u128(&mut self.buffer, value);
    }

    /// Length-prefixed UTF-8, `None` encoded as length -1.
    pub fn write_string(&mut self, value: Option<&str>) {
        self.write_byte_string(value.map(str::as_bytes));
    }

    pub fn write_byte_string(&mut self, value: Option<&[u8]>) {
        match value {
            Some(bytes) => {
                self.write_var_int(bytes.len() as i64);
                self.buffer.extend_from_slice(bytes);
            }
            None => self.write_var_int(-1),
        }
    }

    pub fn write_raw(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }
}

/// Bounds-checked reader over a borrowed buffer.
#[derive(Debug, Clone)]
pub struct WireReader<'a> {
    buffer: &'a [u8],
    offset: usize,
}

impl<'a> WireReader<'a> {
    pub fn new(buffer: &'a [u8]) -> Self {
        Self { buffer, offset: 0 }
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn remaining(&self) -> usize {
        self.buffer.len().saturating_sub(self.offset)
    }

    pub fn is_eof(&self) -> bool {
        self.offset >= self.buffer.len()
    }

    /// Reposition the reader. Seeking past the end is an error.
    pub fn seek(&mut self, offset: usize) -> SerResult<()> {
        if offset > self.buffer.len() {
            return Err(SerError::ReadFailed {
                offset,
                reason: "seek past end of buffer",
            });
        }
        self.offset = offset;
        Ok(())
    }

    /// Bytes between two previously observed offsets.
    pub fn slice(&self, start: usize, end: usize) -> SerResult<&'a [u8]> {
        self.buffer.get(start..end).ok_or(SerError::ReadFailed {
            offset: start,
            reason: "slice out of bounds",
        })
    }

    pub fn read_bytes(&mut self, len: usize) -> SerResult<&'a [u8]> {
        if len > self.remaining() {
            return Err(SerError::ReadFailed {
                offset: self.offset,
                reason: "unexpected end of buffer",
            });
        }
        let slice = &self.buffer[self.offset..self.offset + len];
        self.offset += len;
        Ok(slice)
    }

    impl_read_le!(read_u8, u8, 1);
    impl_read_le!(read_f32, f32, 4);
    impl_read_le!(read_f64, f64, 8);
    impl_read_le!(read_u128_le, u128, 16);

    pub fn read_wire_type(&mut self) -> SerResult<WireType> {
        let offset = self.offset;
        let byte = self.read_u8()?;
        WireType::from_u8(byte).ok_or(SerError::InvalidWireType { offset, byte })
    }

    pub fn read_var_uint(&mut self) -> SerResult<u64> {
        let (value, used) =
            varint::decode_u64(&self.buffer[self.offset..]).ok_or(SerError::ReadFailed {
                offset: self.offset,
                reason: "malformed varint",
            })?;
        self.offset += used;
        Ok(value)
    }

    pub fn read_var_int(&mut self) -> SerResult<i64> {
        self.read_var_uint().map(varint::zigzag_decode)
    }

    /// Nullable and class presence flag: 0 is absent, 1 is present.
    pub fn read_presence(&mut self) -> SerResult<bool> {
        let offset = self.offset;
        match self.read_var_int()? {
            0 => Ok(false),
            1 => Ok(true),
            _ => Err(SerError::ReadFailed {
                offset,
                reason: "presence flag must be 0 or 1",
            }),
        }
    }

    /// Signed varint that must fit in 32 bits (counts, flags, typecodes).
    pub fn read_var_int32(&mut self) -> SerResult<i32> {
        let offset = self.offset;
        let value = self.read_var_int()?;
        i32::try_from(value).map_err(|_| SerError::ReadFailed {
            offset,
            reason: "varint out of 32-bit range",
        })
    }

    pub fn read_var_uint32(&mut self) -> SerResult<u32> {
        let offset = self.offset;
        let value = self.read_var_uint()?;
        u32::try_from(value).map_err(|_| SerError::ReadFailed {
            offset,
            reason: "varint out of 32-bit range",
        })
    }

    pub fn read_var_uint128(&mut self) -> SerResult<u128> {
        let (value, used) = varint::decode_u128(&self.buffer[self.offset..], MAX_VARINT128_LEN)
            .ok_or(SerError::ReadFailed {
                offset: self.offset,
                reason: "malformed varint",
            })?;
        self.offset += used;
        Ok(value)
    }

    /// Length-prefixed byte string, `None` for length -1.
    pub fn read_byte_string(&mut self, max_len: usize) -> SerResult<Option<&'a [u8]>> {
        let offset = self.offset;
        let len = self.read_var_int()?;
        if len == -1 {
            return Ok(None);
        }
        if len < -1 || len as u64 > max_len as u64 {
            return Err(SerError::PayloadTooLarge {
                what: "byte string",
                offset,
                len,
                max: max_len,
            });
        }
        self.read_bytes(len as usize).map(Some)
    }

    pub fn read_string(&mut self, max_len: usize) -> SerResult<Option<String>> {
        let offset = self.offset;
        match self.read_byte_string(max_len) {
            Ok(Some(bytes)) => std::str::from_utf8(bytes)
                .map(|s| Some(s.to_owned()))
                .map_err(|_| SerError::ReadFailed {
                    offset,
                    reason: "string is not valid UTF-8",
                }),
            Ok(None) => Ok(None),
            Err(SerError::PayloadTooLarge {
                offset, len, max, ..
            }) => Err(SerError::PayloadTooLarge {
                what: "string",
                offset,
                len,
                max,
            }),
            Err(err) => Err(err),
        }
    }

    /// Skip a varint without decoding it.
    pub fn skip_var_int(&mut self) -> SerResult<()> {
        self.read_var_uint128().map(|_| ())
    }
}
