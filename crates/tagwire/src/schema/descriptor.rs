// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Immutable per-type metadata.

use crate::context::SerializationContext;
use crate::error::{SerError, SerResult};
use crate::value::{StructValue, Value};
use crate::wire::WireType;
use crate::{ReferenceResolver, Schema};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::ops::{BitOr, BitOrAssign};
use std::sync::Arc;

/// Index of a type in its [`Schema`]'s type table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TypeId(pub(crate) u32);

impl TypeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Primitive type kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveKind {
    Bool,
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    U128,
    F32,
    F64,
    String,
    Bytes,
    Guid,
    /// Signed tick count.
    TimeSpan,
}

impl PrimitiveKind {
    pub const ALL: [PrimitiveKind; 16] = [
        Self::Bool,
        Self::I8,
        Self::I16,
        Self::I32,
        Self::I64,
        Self::U8,
        Self::U16,
        Self::U32,
        Self::U64,
        Self::U128,
        Self::F32,
        Self::F64,
        Self::String,
        Self::Bytes,
        Self::Guid,
        Self::TimeSpan,
    ];

    /// Name under which the builder pre-registers this primitive.
    pub fn name(self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::I8 => "i8",
            Self::I16 => "i16",
            Self::I32 => "i32",
            Self::I64 => "i64",
            Self::U8 => "u8",
            Self::U16 => "u16",
            Self::U32 => "u32",
            Self::U64 => "u64",
            Self::U128 => "u128",
            Self::F32 => "f32",
            Self::F64 => "f64",
            Self::String => "string",
            Self::Bytes => "bytes",
            Self::Guid => "guid",
            Self::TimeSpan => "timespan",
        }
    }

    pub fn wire_type(self) -> WireType {
        match self {
            Self::Bool
            | Self::I8
            | Self::I16
            | Self::I32
            | Self::I64
            | Self::U8
            | Self::U16
            | Self::U32
            | Self::U64
            | Self::TimeSpan => WireType::VarInt,
            Self::U128 => WireType::VarInt128,
            Self::F32 => WireType::Bits32,
            Self::F64 => WireType::Bits64,
            Self::Guid => WireType::Bits128,
            Self::String => WireType::String,
            Self::Bytes => WireType::Bytes,
        }
    }

    /// Upper bound on the encoded payload size (None for strings and bytes).
    pub fn max_encoded_size(self) -> Option<usize> {
        use crate::wire::varint::{MAX_VARINT128_LEN, MAX_VARINT32_LEN, MAX_VARINT64_LEN};
        match self {
            Self::Bool => Some(1),
            Self::I8 | Self::U8 => Some(2),
            Self::I16 | Self::U16 => Some(3),
            Self::I32 | Self::U32 => Some(MAX_VARINT32_LEN),
            Self::I64 | Self::U64 | Self::TimeSpan => Some(MAX_VARINT64_LEN),
            Self::U128 => Some(MAX_VARINT128_LEN),
            Self::F32 => Some(4),
            Self::F64 => Some(8),
            Self::Guid => Some(16),
            Self::String | Self::Bytes => None,
        }
    }

    /// True for integer kinds usable as an enum's underlying type.
    pub fn is_integer(self) -> bool {
        matches!(
            self,
            Self::I8
                | Self::I16
                | Self::I32
                | Self::I64
                | Self::U8
                | Self::U16
                | Self::U32
                | Self::U64
        )
    }

    /// Range check for enum values carried as `i64`.
    pub(crate) fn fits_i64(self, value: i64) -> bool {
        match self {
            Self::I8 => i8::try_from(value).is_ok(),
            Self::I16 => i16::try_from(value).is_ok(),
            Self::I32 => i32::try_from(value).is_ok(),
            Self::U8 => u8::try_from(value).is_ok(),
            Self::U16 => u16::try_from(value).is_ok(),
            Self::U32 => u32::try_from(value).is_ok(),
            Self::U64 => value >= 0,
            _ => true,
        }
    }
}

/// Per-member exclusion flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MemberFlags(u32);

impl MemberFlags {
    pub const NONE: Self = Self(0);
    /// Not sent over the network.
    pub const HIDDEN: Self = Self(1 << 0);
    /// Ignored by checksum computation.
    pub const NO_CHECKSUM: Self = Self(1 << 1);
    /// Not persisted.
    pub const TRANSIENT: Self = Self(1 << 2);
    pub const EXCLUDE_FROM_EVENT_LOG: Self = Self(1 << 3);

    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Parse a flag by its settings-file name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "hidden" => Some(Self::HIDDEN),
            "no_checksum" => Some(Self::NO_CHECKSUM),
            "transient" => Some(Self::TRANSIENT),
            "exclude_from_event_log" => Some(Self::EXCLUDE_FROM_EVENT_LOG),
            _ => None,
        }
    }
}

impl BitOr for MemberFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for MemberFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// Called when a member fails to decode: `(payload, error, context)`.
///
/// The payload excludes the member's wire-type byte and tag id.
#[derive(Clone)]
pub struct FailureHook(pub(crate) Arc<FailureFn>);

type FailureFn =
    dyn Fn(&[u8], &SerError, &SerializationContext<'_>) -> SerResult<Value> + Send + Sync;

impl FailureHook {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&[u8], &SerError, &SerializationContext<'_>) -> SerResult<Value>
            + Send
            + Sync
            + 'static,
    {
        Self(Arc::new(f))
    }
}

impl fmt::Debug for FailureHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FailureHook")
    }
}

/// Parameters passed to post-decode hooks.
pub struct OnDeserializedParams<'a> {
    pub resolver: Option<&'a dyn ReferenceResolver>,
    pub schema_version: Option<u32>,
    pub schema: &'a Schema,
}

/// Runs after a struct's members have been decoded.
#[derive(Clone)]
pub struct OnDeserializedHook(pub(crate) Arc<OnDeserializedFn>);

type OnDeserializedFn =
    dyn Fn(&mut StructValue, &OnDeserializedParams<'_>) -> SerResult<()> + Send + Sync;

impl OnDeserializedHook {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&mut StructValue, &OnDeserializedParams<'_>) -> SerResult<()> + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }
}

impl fmt::Debug for OnDeserializedHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("OnDeserializedHook")
    }
}

/// How a converter's staging value is read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceDeserialization {
    /// Decode the source type as it would be decoded anywhere else.
    Normal,
    /// Decode only the source struct's member sequence (no presence flag).
    Members,
}

/// Accepts a non-canonical wire type on decode and converts a staging value.
#[derive(Clone)]
pub struct DecodeConverter {
    pub accepted: WireType,
    pub source: TypeId,
    pub mode: SourceDeserialization,
    pub(crate) convert: Arc<dyn Fn(Value) -> SerResult<Value> + Send + Sync>,
}

impl DecodeConverter {
    pub fn convert(&self, source: Value) -> SerResult<Value> {
        (self.convert)(source)
    }
}

impl fmt::Debug for DecodeConverter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecodeConverter")
            .field("accepted", &self.accepted)
            .field("source", &self.source)
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}

/// A member of a struct or class.
#[derive(Debug, Clone)]
pub struct MemberDescriptor {
    pub tag: u32,
    pub name: String,
    pub ty: TypeId,
    /// First schema version that carries this member.
    pub added_in: Option<u32>,
    /// First schema version that no longer carries it.
    pub removed_in: Option<u32>,
    pub flags: MemberFlags,
    pub max_collection_size: Option<usize>,
    pub on_failure: Option<FailureHook>,
}

/// Marks a struct as a keyed config item. Used anywhere else it encodes
/// as a reference (just the key); in tables it encodes by members.
#[derive(Debug, Clone)]
pub struct ConfigKey {
    pub member: String,
    pub key_ty: TypeId,
    /// Encoded in place of null when the key type cannot itself be null.
    pub null_sentinel: Option<Value>,
}

impl ConfigKey {
    /// True if a decoded key denotes a null reference.
    pub fn is_null_key(&self, key: &Value) -> bool {
        key.is_null() || self.null_sentinel.as_ref() == Some(key)
    }
}

#[derive(Debug, Clone)]
pub struct StructShape {
    pub members: Vec<MemberDescriptor>,
    /// Classes are nullable and carry a presence flag.
    pub is_class: bool,
    pub config_key: Option<ConfigKey>,
    pub(crate) by_tag: HashMap<u32, usize>,
}

impl StructShape {
    pub fn member_by_tag(&self, tag: u32) -> Option<&MemberDescriptor> {
        self.by_tag.get(&tag).map(|&i| &self.members[i])
    }

    pub fn member(&self, name: &str) -> Option<&MemberDescriptor> {
        self.members.iter().find(|m| m.name == name)
    }
}

/// Which of the two reference flavors a [`TypeShape::ConfigRef`] is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefKind {
    /// Resolved on decode when a resolver is available.
    Ref,
    /// Never resolved; only the key is kept.
    ConfigId,
}

#[derive(Debug, Clone)]
pub enum TypeShape {
    Primitive(PrimitiveKind),
    /// Encoded as its underlying integer.
    Enum { underlying: PrimitiveKind },
    Nullable(TypeId),
    Struct(StructShape),
    /// Polymorphic base; typecode -> concrete derived struct.
    Abstract { derived: BTreeMap<i32, TypeId> },
    ValueCollection(TypeId),
    KeyValueCollection { key: TypeId, value: TypeId },
    /// Reference by key to a config item type.
    ConfigRef { target: TypeId, kind: RefKind },
}

/// A complete, resolved type descriptor.
#[derive(Debug, Clone)]
pub struct TypeDescriptor {
    pub id: TypeId,
    pub name: String,
    pub shape: TypeShape,
    pub added_in: Option<u32>,
    pub converters: Vec<DecodeConverter>,
    pub on_deserialized: Vec<OnDeserializedHook>,
}

impl TypeDescriptor {
    pub fn struct_shape(&self) -> Option<&StructShape> {
        match &self.shape {
            TypeShape::Struct(shape) => Some(shape),
            _ => None,
        }
    }

    pub fn is_config_item(&self) -> bool {
        self.struct_shape()
            .is_some_and(|shape| shape.config_key.is_some())
    }

    pub fn converter_for(&self, wire: WireType) -> Option<&DecodeConverter> {
        self.converters.iter().find(|c| c.accepted == wire)
    }
}
