// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! One-byte wire type markers.

use std::fmt;

/// Shape of the value that follows on the wire.
///
/// Every wire type is self-describing: a reader that does not know the
/// declared type of a value can still skip over it (see [`super::skip_wire_type`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum WireType {
    /// LEB128 varint (zigzag for signed integers).
    VarInt = 1,
    /// LEB128 varint of up to 128 bits.
    VarInt128 = 2,
    /// 4 raw little-endian bytes.
    Bits32 = 3,
    /// 8 raw little-endian bytes.
    Bits64 = 4,
    /// 16 raw little-endian bytes.
    Bits128 = 5,
    /// Varint length (-1 = null) followed by UTF-8 bytes.
    String = 6,
    /// Varint length (-1 = null) followed by raw bytes.
    Bytes = 7,
    NullableVarInt = 8,
    NullableVarInt128 = 9,
    NullableBits32 = 10,
    NullableBits64 = 11,
    NullableBits128 = 12,
    /// Member sequence terminated by [`WireType::EndStruct`].
    Struct = 20,
    /// Presence flag, then a member sequence if present.
    NullableStruct = 21,
    /// Derived typecode (0 = null), then a member sequence if non-null.
    AbstractStruct = 22,
    /// Count (-1 = null), element wire type, elements.
    ValueCollection = 30,
    /// Count (-1 = null), key wire type, value wire type, pairs.
    KeyValueCollection = 31,
    /// Count (-1 = null), then one member sequence per item.
    ObjectTable = 32,
    /// Terminates a member sequence.
    EndStruct = 40,
}

impl WireType {
    /// Decode a wire type byte.
    pub fn from_u8(byte: u8) -> Option<Self> {
        let wire = match byte {
            1 => Self::VarInt,
            2 => Self::VarInt128,
            3 => Self::Bits32,
            4 => Self::Bits64,
            5 => Self::Bits128,
            6 => Self::String,
            7 => Self::Bytes,
            8 => Self::NullableVarInt,
            9 => Self::NullableVarInt128,
            10 => Self::NullableBits32,
            11 => Self::NullableBits64,
            12 => Self::NullableBits128,
            20 => Self::Struct,
            21 => Self::NullableStruct,
            22 => Self::AbstractStruct,
            30 => Self::ValueCollection,
            31 => Self::KeyValueCollection,
            32 => Self::ObjectTable,
            40 => Self::EndStruct,
            _ => return None,
        };
        Some(wire)
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Wire type used when a value of this wire type is wrapped as nullable.
    ///
    /// Strings, byte strings and already-nullable shapes carry their own null
    /// encoding and have no nullable counterpart.
    pub fn nullable(self) -> Option<Self> {
        match self {
            Self::VarInt => Some(Self::NullableVarInt),
            Self::VarInt128 => Some(Self::NullableVarInt128),
            Self::Bits32 => Some(Self::NullableBits32),
            Self::Bits64 => Some(Self::NullableBits64),
            Self::Bits128 => Some(Self::NullableBits128),
            Self::Struct => Some(Self::NullableStruct),
            _ => None,
        }
    }

    /// Inverse of [`WireType::nullable`].
    pub fn non_nullable(self) -> Option<Self> {
        match self {
            Self::NullableVarInt => Some(Self::VarInt),
            Self::NullableVarInt128 => Some(Self::VarInt128),
            Self::NullableBits32 => Some(Self::Bits32),
            Self::NullableBits64 => Some(Self::Bits64),
            Self::NullableBits128 => Some(Self::Bits128),
            Self::NullableStruct => Some(Self::Struct),
            _ => None,
        }
    }

    /// True when the wire encoding itself can express null.
    pub fn can_encode_null(self) -> bool {
        matches!(
            self,
            Self::String
                | Self::Bytes
                | Self::NullableVarInt
                | Self::NullableVarInt128
                | Self::NullableBits32
                | Self::NullableBits64
                | Self::NullableBits128
                | Self::NullableStruct
                | Self::AbstractStruct
                | Self::ValueCollection
                | Self::KeyValueCollection
                | Self::ObjectTable
        )
    }
}

impl fmt::Display for WireType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}
