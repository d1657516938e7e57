// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Type descriptor model and the compiled, immutable [`Schema`].
//!
//! A schema is built once with [`SchemaBuilder`] and then shared read-only
//! (typically as `Arc<Schema>`) by every encode, decode and traversal call.

mod builder;
mod descriptor;

pub use builder::{AbstractBuilder, MemberDef, SchemaBuilder, StructBuilder};
pub use descriptor::{
    ConfigKey, DecodeConverter, FailureHook, MemberDescriptor, MemberFlags, OnDeserializedHook,
    OnDeserializedParams, PrimitiveKind, RefKind, SourceDeserialization, StructShape,
    TypeDescriptor, TypeId, TypeShape,
};

use crate::error::{SerError, SerResult};
use crate::value::StructValue;
use crate::wire::WireType;
use std::collections::HashMap;

/// Compiled type table plus the results of graph analysis.
#[derive(Debug)]
pub struct Schema {
    pub(crate) types: Vec<TypeDescriptor>,
    pub(crate) by_name: HashMap<String, TypeId>,
    pub(crate) wire: Vec<WireType>,
    pub(crate) in_cycle: Vec<bool>,
    pub(crate) ref_containing: Vec<bool>,
    pub(crate) ref_by_members: Vec<bool>,
    pub(crate) max_size: Vec<Option<usize>>,
    pub(crate) max_condensed_depth: usize,
}

impl Schema {
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::new()
    }

    pub fn type_id(&self, name: &str) -> Option<TypeId> {
        self.by_name.get(name).copied()
    }

    pub fn descriptor(&self, id: TypeId) -> SerResult<&TypeDescriptor> {
        self.types.get(id.index()).ok_or(SerError::UnknownTypeId(id.0))
    }

    /// Descriptor by name.
    pub fn get(&self, name: &str) -> Option<&TypeDescriptor> {
        self.type_id(name).map(|id| &self.types[id.index()])
    }

    pub fn types(&self) -> impl Iterator<Item = &TypeDescriptor> {
        self.types.iter()
    }

    /// Canonical wire type.
    pub fn wire_type(&self, id: TypeId) -> SerResult<WireType> {
        self.wire
            .get(id.index())
            .copied()
            .ok_or(SerError::UnknownTypeId(id.0))
    }

    /// True if the type takes part in a cycle and needs the runtime depth guard.
    pub fn is_in_cycle(&self, id: TypeId) -> bool {
        self.in_cycle.get(id.index()).copied().unwrap_or(false)
    }

    /// True if values of this type can contain config references.
    pub fn contains_references(&self, id: TypeId) -> bool {
        self.ref_containing.get(id.index()).copied().unwrap_or(false)
    }

    /// Like [`Schema::contains_references`], also counting config items
    /// whose own members contain references (table and by-members traversal).
    pub fn contains_references_by_members(&self, id: TypeId) -> bool {
        self.ref_by_members.get(id.index()).copied().unwrap_or(false)
    }

    /// Upper bound on the encoded payload (without the top-level wire byte).
    pub fn max_serialized_size(&self, id: TypeId) -> Option<usize> {
        self.max_size.get(id.index()).copied().flatten()
    }

    /// Longest path in the condensed type graph.
    pub fn max_condensed_depth(&self) -> usize {
        self.max_condensed_depth
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Empty value of a struct type.
    pub fn new_struct(&self, name: &str) -> SerResult<StructValue> {
        let id = self.type_id(name).ok_or_else(|| SerError::InvalidValue {
            type_name: name.to_string(),
            reason: "no such type".into(),
        })?;
        match self.types[id.index()].shape {
            TypeShape::Struct(_) => Ok(StructValue::new(id)),
            _ => Err(SerError::InvalidValue {
                type_name: name.to_string(),
                reason: "not a struct type".into(),
            }),
        }
    }

    /// Typecode under which `derived` is registered in `base`.
    pub fn typecode_of(&self, base: TypeId, derived: TypeId) -> Option<i32> {
        match &self.types.get(base.index())?.shape {
            TypeShape::Abstract { derived: table } => table
                .iter()
                .find(|(_, ty)| **ty == derived)
                .map(|(code, _)| *code),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn test_schema_is_send_sync() {
        assert_send_sync::<Schema>();
    }

    #[test]
    fn test_lookup_and_new_struct() {
        let schema = Schema::builder()
            .add_struct(StructBuilder::new("Player").member(1, "name", "string"))
            .add_struct(StructBuilder::new("Circle").member(1, "r", "f32"))
            .add_abstract(AbstractBuilder::new("Shape").derived(7, "Circle"))
            .build()
            .expect("build");

        let player = schema.new_struct("Player").expect("struct");
        assert_eq!(Some(player.type_id()), schema.type_id("Player"));
        assert!(schema.new_struct("i32").is_err());
        assert!(schema.new_struct("Nope").is_err());
        assert_eq!(schema.get("Player").map(|d| d.name.as_str()), Some("Player"));

        let shape = schema.type_id("Shape").expect("Shape");
        let circle = schema.type_id("Circle").expect("Circle");
        assert_eq!(schema.typecode_of(shape, circle), Some(7));
        assert!(matches!(
            schema.descriptor(TypeId(10_000)),
            Err(SerError::UnknownTypeId(10_000))
        ));
    }
}
