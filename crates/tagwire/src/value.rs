// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Dynamic values driven through the engine.

use crate::context::ReferenceResolver;
use crate::error::{SerError, SerResult};
use crate::schema::TypeId;
use std::collections::BTreeMap;
use std::sync::Arc;

/// A runtime value of any schema type.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Null class, nullable, collection, string, polymorphic or reference.
    Null,
    Bool(bool),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    U128(u128),
    F32(f32),
    F64(f64),
    String(String),
    Bytes(Vec<u8>),
    Guid(u128),
    TimeSpan(i64),
    Enum(i64),
    Struct(StructValue),
    List(Vec<Value>),
    /// Key-value collection in insertion order.
    Map(Vec<(Value, Value)>),
    /// Reference that may or may not be resolved yet.
    Ref(RefValue),
    /// A resolved config item, shared with the resolver that produced it.
    ConfigData(Arc<Value>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Short kind name for error messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::I8(_) => "i8",
            Self::I16(_) => "i16",
            Self::I32(_) => "i32",
            Self::I64(_) => "i64",
            Self::U8(_) => "u8",
            Self::U16(_) => "u16",
            Self::U32(_) => "u32",
            Self::U64(_) => "u64",
            Self::U128(_) => "u128",
            Self::F32(_) => "f32",
            Self::F64(_) => "f64",
            Self::String(_) => "string",
            Self::Bytes(_) => "bytes",
            Self::Guid(_) => "guid",
            Self::TimeSpan(_) => "timespan",
            Self::Enum(_) => "enum",
            Self::Struct(_) => "struct",
            Self::List(_) => "list",
            Self::Map(_) => "map",
            Self::Ref(_) => "ref",
            Self::ConfigData(_) => "config data",
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// Any signed or unsigned integer that fits in `i64`.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::I8(v) => Some(i64::from(*v)),
            Self::I16(v) => Some(i64::from(*v)),
            Self::I32(v) => Some(i64::from(*v)),
            Self::I64(v) | Self::Enum(v) | Self::TimeSpan(v) => Some(*v),
            Self::U8(v) => Some(i64::from(*v)),
            Self::U16(v) => Some(i64::from(*v)),
            Self::U32(v) => Some(i64::from(*v)),
            Self::U64(v) => i64::try_from(*v).ok(),
            _ => None,
        }
    }

    /// Any non-negative integer that fits in `u64`.
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Self::U8(v) => Some(u64::from(*v)),
            Self::U16(v) => Some(u64::from(*v)),
            Self::U32(v) => Some(u64::from(*v)),
            Self::U64(v) => Some(*v),
            Self::U128(v) => u64::try_from(*v).ok(),
            other => other.as_i64().and_then(|v| u64::try_from(v).ok()),
        }
    }

    pub fn as_u128(&self) -> Option<u128> {
        match self {
            Self::U128(v) | Self::Guid(v) => Some(*v),
            other => other.as_u64().map(u128::from),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::F32(v) => Some(f64::from(*v)),
            Self::F64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&[(Value, Value)]> {
        match self {
            Self::Map(pairs) => Some(pairs),
            _ => None,
        }
    }

    pub fn as_ref_value(&self) -> Option<&RefValue> {
        match self {
            Self::Ref(r) => Some(r),
            _ => None,
        }
    }

    /// Struct payload, looking through a resolved config item.
    pub fn as_struct(&self) -> Option<&StructValue> {
        match self {
            Self::Struct(s) => Some(s),
            Self::ConfigData(item) => item.as_struct(),
            _ => None,
        }
    }

    pub fn as_struct_mut(&mut self) -> Option<&mut StructValue> {
        match self {
            Self::Struct(s) => Some(s),
            _ => None,
        }
    }

    pub fn get_field(&self, name: &str) -> Option<&Value> {
        self.as_struct()?.get(name)
    }
}

/// Field values of one struct instance, keyed by member name.
///
/// Absent fields are not written on encode.
#[derive(Debug, Clone, PartialEq)]
pub struct StructValue {
    ty: TypeId,
    fields: BTreeMap<String, Value>,
}

impl StructValue {
    pub fn new(ty: TypeId) -> Self {
        Self {
            ty,
            fields: BTreeMap::new(),
        }
    }

    /// Builder-style field assignment.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn type_id(&self) -> TypeId {
        self.ty
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Value> {
        self.fields.get_mut(name)
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.fields.insert(name.into(), value.into())
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.fields.remove(name)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// A reference by key, optionally resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct RefValue {
    pub key: Box<Value>,
    pub resolved: Option<Arc<Value>>,
}

impl RefValue {
    pub fn from_key(key: impl Into<Value>) -> Self {
        Self {
            key: Box::new(key.into()),
            resolved: None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.resolved.is_some()
    }

    /// Resolve through `resolver` unless already resolved.
    pub fn resolve_in_place(
        &mut self,
        target: &str,
        resolver: Option<&dyn ReferenceResolver>,
    ) -> SerResult<()> {
        if self.resolved.is_some() {
            return Ok(());
        }
        let resolver = resolver.ok_or_else(|| SerError::UnresolvedReference {
            target: target.to_string(),
            key: format!("{:?}", self.key),
            reason: "no reference resolver",
        })?;
        let item = resolver
            .resolve(target, &self.key)
            .ok_or_else(|| SerError::UnresolvedReference {
                target: target.to_string(),
                key: format!("{:?}", self.key),
                reason: "key not found",
            })?;
        self.resolved = Some(item);
        Ok(())
    }
}

impl From<StructValue> for Value {
    fn from(v: StructValue) -> Self {
        Self::Struct(v)
    }
}

impl From<RefValue> for Value {
    fn from(v: RefValue) -> Self {
        Self::Ref(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Self::Bytes(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Self::List(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

macro_rules! impl_from_primitive {
    ($($type:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$type> for Value {
                fn from(v: $type) -> Self {
                    Self::$variant(v)
                }
            }
        )*
    };
}

impl_from_primitive!(
    bool => Bool,
    i8 => I8,
    i16 => I16,
    i32 => I32,
    i64 => I64,
    u8 => U8,
    u16 => U16,
    u32 => U32,
    u64 => U64,
    u128 => U128,
    f32 => F32,
    f64 => F64,
);
