// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Fluent builder API for [`Schema`].
//!
//! Types are declared by name and may refer to each other in any order;
//! [`SchemaBuilder::build`] resolves names, validates every descriptor, runs
//! the type graph analysis and freezes the result.

use super::descriptor::{
    ConfigKey, DecodeConverter, FailureHook, MemberDescriptor, MemberFlags, OnDeserializedHook,
    PrimitiveKind, RefKind, SourceDeserialization, StructShape, TypeDescriptor, TypeId, TypeShape,
};
use super::Schema;
use crate::error::{SchemaError, SerResult};
use crate::graph::{reachable_from, GraphAnalysis, TypeGraph, MAX_STATIC_DEPTH};
use crate::value::Value;
use crate::wire::{varint, WireType};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

/// A member declaration.
#[derive(Debug, Clone)]
pub struct MemberDef {
    tag: u32,
    name: String,
    ty: String,
    added_in: Option<u32>,
    removed_in: Option<u32>,
    flags: MemberFlags,
    max_collection_size: Option<usize>,
    on_failure: Option<FailureHook>,
}

impl MemberDef {
    pub fn new(tag: u32, name: impl Into<String>, ty: impl Into<String>) -> Self {
        Self {
            tag,
            name: name.into(),
            ty: ty.into(),
            added_in: None,
            removed_in: None,
            flags: MemberFlags::NONE,
            max_collection_size: None,
            on_failure: None,
        }
    }

    pub fn added_in(mut self, version: u32) -> Self {
        self.added_in = Some(version);
        self
    }

    pub fn removed_in(mut self, version: u32) -> Self {
        self.removed_in = Some(version);
        self
    }

    pub fn flags(mut self, flags: MemberFlags) -> Self {
        self.flags |= flags;
        self
    }

    /// Override the context's collection limit for this member.
    pub fn max_collection_size(mut self, max: usize) -> Self {
        self.max_collection_size = Some(max);
        self
    }

    /// Substitute a value when this member fails to decode.
    pub fn on_failure(mut self, hook: FailureHook) -> Self {
        self.on_failure = Some(hook);
        self
    }
}

/// Builder for struct and class types.
#[derive(Debug)]
pub struct StructBuilder {
    name: String,
    members: Vec<MemberDef>,
    is_class: bool,
    config_key: Option<(String, Option<Value>)>,
    added_in: Option<u32>,
    on_deserialized: Vec<OnDeserializedHook>,
}

impl StructBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            members: Vec::new(),
            is_class: false,
            config_key: None,
            added_in: None,
            on_deserialized: Vec::new(),
        }
    }

    /// Add a member with default options.
    pub fn member(self, tag: u32, name: impl Into<String>, ty: impl Into<String>) -> Self {
        self.field(MemberDef::new(tag, name, ty))
    }

    pub fn field(mut self, member: MemberDef) -> Self {
        self.members.push(member);
        self
    }

    /// Mark as a class: nullable, written with a presence flag.
    pub fn class(mut self) -> Self {
        self.is_class = true;
        self
    }

    /// Make this a keyed config item. `null_sentinel` is written for null
    /// references when the key type itself cannot encode null.
    pub fn config_key(mut self, member: impl Into<String>, null_sentinel: Option<Value>) -> Self {
        self.config_key = Some((member.into(), null_sentinel));
        self
    }

    pub fn added_in(mut self, version: u32) -> Self {
        self.added_in = Some(version);
        self
    }

    pub fn on_deserialized(mut self, hook: OnDeserializedHook) -> Self {
        self.on_deserialized.push(hook);
        self
    }
}

/// Builder for polymorphic base types.
#[derive(Debug)]
pub struct AbstractBuilder {
    name: String,
    derived: Vec<(i32, String)>,
    added_in: Option<u32>,
}

impl AbstractBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            derived: Vec::new(),
            added_in: None,
        }
    }

    /// Register a concrete struct under a positive typecode.
    pub fn derived(mut self, typecode: i32, ty: impl Into<String>) -> Self {
        self.derived.push((typecode, ty.into()));
        self
    }

    pub fn added_in(mut self, version: u32) -> Self {
        self.added_in = Some(version);
        self
    }
}

#[derive(Debug)]
enum TypeDef {
    Primitive(PrimitiveKind),
    Enum(String),
    Nullable(String),
    Struct(StructBuilder),
    Abstract(AbstractBuilder),
    List(String),
    Map(String, String),
    Ref(String, RefKind),
}

struct PendingConverter {
    target: String,
    accepted: WireType,
    source: String,
    mode: SourceDeserialization,
    convert: Arc<dyn Fn(Value) -> SerResult<Value> + Send + Sync>,
}

/// Collects type declarations and compiles them into a [`Schema`].
pub struct SchemaBuilder {
    defs: Vec<(String, TypeDef)>,
    converters: Vec<PendingConverter>,
    max_static_depth: usize,
}

impl Default for SchemaBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SchemaBuilder {
    /// New builder with every primitive pre-registered under its
    /// [`PrimitiveKind::name`].
    pub fn new() -> Self {
        let defs = PrimitiveKind::ALL
            .iter()
            .map(|kind| (kind.name().to_string(), TypeDef::Primitive(*kind)))
            .collect();
        Self {
            defs,
            converters: Vec::new(),
            max_static_depth: MAX_STATIC_DEPTH,
        }
    }

    /// Override the static nesting bound (default 256).
    pub fn with_max_static_depth(mut self, max: usize) -> Self {
        self.max_static_depth = max;
        self
    }

    pub fn enumeration(mut self, name: impl Into<String>, underlying: impl Into<String>) -> Self {
        self.defs.push((name.into(), TypeDef::Enum(underlying.into())));
        self
    }

    pub fn nullable(mut self, name: impl Into<String>, inner: impl Into<String>) -> Self {
        self.defs.push((name.into(), TypeDef::Nullable(inner.into())));
        self
    }

    pub fn list(mut self, name: impl Into<String>, element: impl Into<String>) -> Self {
        self.defs.push((name.into(), TypeDef::List(element.into())));
        self
    }

    pub fn map(
        mut self,
        name: impl Into<String>,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.defs
            .push((name.into(), TypeDef::Map(key.into(), value.into())));
        self
    }

    /// Reference to a config item, resolved on decode when a resolver exists.
    pub fn reference(mut self, name: impl Into<String>, target: impl Into<String>) -> Self {
        self.defs
            .push((name.into(), TypeDef::Ref(target.into(), RefKind::Ref)));
        self
    }

    /// Key-only reference to a config item; never resolved.
    pub fn config_id(mut self, name: impl Into<String>, target: impl Into<String>) -> Self {
        self.defs
            .push((name.into(), TypeDef::Ref(target.into(), RefKind::ConfigId)));
        self
    }

    pub fn add_struct(mut self, def: StructBuilder) -> Self {
        self.defs.push((def.name.clone(), TypeDef::Struct(def)));
        self
    }

    pub fn add_abstract(mut self, def: AbstractBuilder) -> Self {
        self.defs.push((def.name.clone(), TypeDef::Abstract(def)));
        self
    }

    /// Accept `accepted` on decode of `target`: decode a staging value of
    /// type `source`, then convert it.
    pub fn converter<F>(
        mut self,
        target: impl Into<String>,
        accepted: WireType,
        source: impl Into<String>,
        mode: SourceDeserialization,
        convert: F,
    ) -> Self
    where
        F: Fn(Value) -> SerResult<Value> + Send + Sync + 'static,
    {
        self.converters.push(PendingConverter {
            target: target.into(),
            accepted,
            source: source.into(),
            mode,
            convert: Arc::new(convert),
        });
        self
    }

    /// Validate and compile.
    pub fn build(self) -> Result<Schema, SchemaError> {
        let mut by_name: HashMap<String, TypeId> = HashMap::with_capacity(self.defs.len());
        for (index, (name, _)) in self.defs.iter().enumerate() {
            if by_name.insert(name.clone(), TypeId(index as u32)).is_some() {
                return Err(SchemaError::DuplicateType(name.clone()));
            }
        }

        let lookup = |referrer: &str, name: &str| -> Result<TypeId, SchemaError> {
            by_name
                .get(name)
                .copied()
                .ok_or_else(|| SchemaError::UnknownType {
                    referrer: referrer.to_string(),
                    name: name.to_string(),
                })
        };

        let mut types = Vec::with_capacity(self.defs.len());
        for (index, (name, def)) in self.defs.into_iter().enumerate() {
            let (shape, added_in, on_deserialized) = match def {
                TypeDef::Primitive(kind) => (TypeShape::Primitive(kind), None, Vec::new()),
                TypeDef::Enum(underlying) => {
                    let id = lookup(&name, &underlying)?;
                    match built_primitive(&types, id, index) {
                        Some(kind) if kind.is_integer() => {
                            (TypeShape::Enum { underlying: kind }, None, Vec::new())
                        }
                        _ => {
                            return Err(SchemaError::InvalidEnum {
                                type_name: name,
                                underlying,
                            })
                        }
                    }
                }
                TypeDef::Nullable(inner) => {
                    (TypeShape::Nullable(lookup(&name, &inner)?), None, Vec::new())
                }
                TypeDef::List(element) => (
                    TypeShape::ValueCollection(lookup(&name, &element)?),
                    None,
                    Vec::new(),
                ),
                TypeDef::Map(key, value) => (
                    TypeShape::KeyValueCollection {
                        key: lookup(&name, &key)?,
                        value: lookup(&name, &value)?,
                    },
                    None,
                    Vec::new(),
                ),
                TypeDef::Ref(target, kind) => (
                    TypeShape::ConfigRef {
                        target: lookup(&name, &target)?,
                        kind,
                    },
                    None,
                    Vec::new(),
                ),
                TypeDef::Abstract(def) => {
                    let mut derived = BTreeMap::new();
                    for (typecode, ty) in &def.derived {
                        if *typecode <= 0 {
                            return Err(SchemaError::InvalidTypecode {
                                type_name: name,
                                typecode: *typecode,
                            });
                        }
                        if derived.insert(*typecode, lookup(&name, ty)?).is_some() {
                            return Err(SchemaError::DuplicateTypecode {
                                type_name: name,
                                typecode: *typecode,
                            });
                        }
                    }
                    (TypeShape::Abstract { derived }, def.added_in, Vec::new())
                }
                TypeDef::Struct(def) => {
                    let shape = build_struct_shape(&name, &def, &lookup)?;
                    (TypeShape::Struct(shape), def.added_in, def.on_deserialized)
                }
            };
            types.push(TypeDescriptor {
                id: TypeId(index as u32),
                name,
                shape,
                added_in,
                converters: Vec::new(),
                on_deserialized,
            });
        }

        validate_shapes(&types)?;
        let wire = compute_wire_types(&types)?;

        // Containment edges, before converter sources are added.
        let mut graph = TypeGraph::new(types.len());
        for ty in &types {
            for to in contained_types(&types, ty) {
                graph.add_edge(ty.id.index(), to.index());
            }
        }
        let (ref_containing, ref_by_members) = reference_sets(&types, &graph);

        for pending in self.converters {
            let target = lookup("<converter>", &pending.target)?;
            let source = lookup(&pending.target, &pending.source)?;
            let descriptor = &types[target.index()];
            let invalid = |reason: &str| SchemaError::InvalidConverter {
                type_name: descriptor.name.clone(),
                reason: reason.to_string(),
            };
            if pending.accepted == wire[target.index()] {
                return Err(invalid("accepted wire type is the canonical one"));
            }
            if pending.accepted == WireType::EndStruct {
                return Err(invalid("end-of-struct marker cannot be accepted"));
            }
            if descriptor.converter_for(pending.accepted).is_some() {
                return Err(invalid("wire type accepted twice"));
            }
            if pending.mode == SourceDeserialization::Members
                && types[source.index()].struct_shape().is_none()
            {
                return Err(invalid("member-sequence source must be a struct"));
            }
            let source_ok = match pending.mode {
                SourceDeserialization::Normal => wire[source.index()] == pending.accepted,
                SourceDeserialization::Members => pending.accepted == WireType::Struct,
            };
            if !source_ok {
                return Err(invalid("source type does not read the accepted wire type"));
            }
            graph.add_edge(target.index(), source.index());
            types[target.index()].converters.push(DecodeConverter {
                accepted: pending.accepted,
                source,
                mode: pending.mode,
                convert: pending.convert,
            });
        }

        let analysis = GraphAnalysis::analyze(&graph)?;
        analysis.check_depth(self.max_static_depth)?;
        let max_size = compute_max_sizes(&types, &analysis);

        log::debug!(
            "[schema] built {} types ({} in cycles, {} reference-bearing), condensed depth {}",
            types.len(),
            analysis.cycle_member_count(),
            ref_containing.iter().filter(|r| **r).count(),
            analysis.max_condensed_depth
        );

        Ok(Schema {
            types,
            by_name,
            wire,
            in_cycle: analysis.in_cycle,
            ref_containing,
            ref_by_members,
            max_size,
            max_condensed_depth: analysis.max_condensed_depth,
        })
    }
}

/// Primitive kind of an already-built type, or of a primitive declared later.
fn built_primitive(types: &[TypeDescriptor], id: TypeId, current: usize) -> Option<PrimitiveKind> {
    if id.index() >= current {
        // Primitives are registered first; anything declared later is not one.
        return None;
    }
    match types.get(id.index())?.shape {
        TypeShape::Primitive(kind) => Some(kind),
        _ => None,
    }
}

fn build_struct_shape(
    type_name: &str,
    def: &StructBuilder,
    lookup: &impl Fn(&str, &str) -> Result<TypeId, SchemaError>,
) -> Result<StructShape, SchemaError> {
    let mut members = Vec::with_capacity(def.members.len());
    let mut by_tag = HashMap::with_capacity(def.members.len());
    let mut names = HashSet::with_capacity(def.members.len());

    for (index, member) in def.members.iter().enumerate() {
        if member.tag == 0 {
            return Err(SchemaError::InvalidTag {
                type_name: type_name.to_string(),
                tag: member.tag,
            });
        }
        if by_tag.insert(member.tag, index).is_some() {
            return Err(SchemaError::DuplicateTag {
                type_name: type_name.to_string(),
                tag: member.tag,
            });
        }
        if !names.insert(member.name.as_str()) {
            return Err(SchemaError::DuplicateMember {
                type_name: type_name.to_string(),
                member: member.name.clone(),
            });
        }
        if let (Some(added), Some(removed)) = (member.added_in, member.removed_in) {
            if removed <= added {
                return Err(SchemaError::InvalidMember {
                    type_name: type_name.to_string(),
                    member: member.name.clone(),
                    reason: format!("removed in {} but added in {}", removed, added),
                });
            }
        }
        members.push(MemberDescriptor {
            tag: member.tag,
            name: member.name.clone(),
            ty: lookup(type_name, &member.ty)?,
            added_in: member.added_in,
            removed_in: member.removed_in,
            flags: member.flags,
            max_collection_size: member.max_collection_size,
            on_failure: member.on_failure.clone(),
        });
    }

    let config_key = match &def.config_key {
        Some((member_name, sentinel)) => {
            let member = members.iter().find(|m| &m.name == member_name).ok_or_else(|| {
                SchemaError::InvalidReference {
                    type_name: type_name.to_string(),
                    reason: format!("config key member '{}' does not exist", member_name),
                }
            })?;
            Some(ConfigKey {
                member: member_name.clone(),
                key_ty: member.ty,
                null_sentinel: sentinel.clone(),
            })
        }
        None => None,
    };

    Ok(StructShape {
        members,
        is_class: def.is_class,
        config_key,
        by_tag,
    })
}

fn is_scalar(types: &[TypeDescriptor], id: TypeId) -> bool {
    matches!(
        types[id.index()].shape,
        TypeShape::Primitive(_) | TypeShape::Enum { .. }
    )
}

/// Checks that need every type resolved.
fn validate_shapes(types: &[TypeDescriptor]) -> Result<(), SchemaError> {
    for ty in types {
        match &ty.shape {
            TypeShape::Nullable(inner) => {
                let target = &types[inner.index()];
                let ok = match &target.shape {
                    TypeShape::Primitive(kind) => {
                        !matches!(kind, PrimitiveKind::String | PrimitiveKind::Bytes)
                    }
                    TypeShape::Enum { .. } => true,
                    TypeShape::Struct(shape) => !shape.is_class && shape.config_key.is_none(),
                    _ => false,
                };
                if !ok {
                    return Err(SchemaError::InvalidNullable {
                        type_name: ty.name.clone(),
                        inner: target.name.clone(),
                    });
                }
            }
            TypeShape::Abstract { derived } => {
                for derived_ty in derived.values() {
                    let target = &types[derived_ty.index()];
                    let concrete = target
                        .struct_shape()
                        .is_some_and(|shape| shape.config_key.is_none());
                    if !concrete {
                        return Err(SchemaError::InvalidDerivedType {
                            base: ty.name.clone(),
                            derived: target.name.clone(),
                        });
                    }
                }
            }
            TypeShape::ConfigRef { target, .. } => {
                if !types[target.index()].is_config_item() {
                    return Err(SchemaError::InvalidReference {
                        type_name: ty.name.clone(),
                        reason: format!(
                            "'{}' is not a config item type",
                            types[target.index()].name
                        ),
                    });
                }
            }
            TypeShape::Struct(shape) => {
                if let Some(key) = &shape.config_key {
                    let key_ok = is_scalar(types, key.key_ty)
                        || matches!(types[key.key_ty.index()].shape,
                            TypeShape::Nullable(inner) if is_scalar(types, inner));
                    if !key_ok {
                        return Err(SchemaError::InvalidReference {
                            type_name: ty.name.clone(),
                            reason: format!(
                                "config key type '{}' must be a primitive, enum or nullable scalar",
                                types[key.key_ty.index()].name
                            ),
                        });
                    }
                }
            }
            _ => {}
        }
    }
    Ok(())
}

/// Canonical wire type of every type. Config items and references use their
/// key's wire type.
fn compute_wire_types(types: &[TypeDescriptor]) -> Result<Vec<WireType>, SchemaError> {
    fn wire_of(types: &[TypeDescriptor], id: TypeId) -> WireType {
        match &types[id.index()].shape {
            TypeShape::Primitive(kind) => kind.wire_type(),
            TypeShape::Enum { .. } => WireType::VarInt,
            TypeShape::Nullable(inner) => {
                let inner = wire_of(types, *inner);
                inner.nullable().unwrap_or(inner)
            }
            TypeShape::Struct(shape) => match &shape.config_key {
                Some(key) => wire_of(types, key.key_ty),
                None if shape.is_class => WireType::NullableStruct,
                None => WireType::Struct,
            },
            TypeShape::Abstract { .. } => WireType::AbstractStruct,
            TypeShape::ValueCollection(_) => WireType::ValueCollection,
            TypeShape::KeyValueCollection { .. } => WireType::KeyValueCollection,
            TypeShape::ConfigRef { target, .. } => wire_of(types, *target),
        }
    }

    let wire: Vec<WireType> = types.iter().map(|ty| wire_of(types, ty.id)).collect();
    for ty in types {
        if let TypeShape::Nullable(inner) = ty.shape {
            if wire[inner.index()].nullable().is_none() {
                return Err(SchemaError::InvalidNullable {
                    type_name: ty.name.clone(),
                    inner: types[inner.index()].name.clone(),
                });
            }
        }
    }
    Ok(wire)
}

/// Types directly contained in `ty`'s encoding.
fn contained_types(types: &[TypeDescriptor], ty: &TypeDescriptor) -> Vec<TypeId> {
    match &ty.shape {
        TypeShape::Primitive(_) | TypeShape::Enum { .. } => Vec::new(),
        TypeShape::Nullable(inner) | TypeShape::ValueCollection(inner) => vec![*inner],
        TypeShape::KeyValueCollection { key, value } => vec![*key, *value],
        TypeShape::Abstract { derived } => derived.values().copied().collect(),
        TypeShape::Struct(shape) => match &shape.config_key {
            Some(key) => vec![key.key_ty],
            None => shape.members.iter().map(|m| m.ty).collect(),
        },
        TypeShape::ConfigRef { target, .. } => types[target.index()]
            .struct_shape()
            .and_then(|shape| shape.config_key.as_ref())
            .map(|key| vec![key.key_ty])
            .unwrap_or_default(),
    }
}

/// Types whose values can contain config references, and the wider set that
/// also counts config items whose own members contain them.
fn reference_sets(types: &[TypeDescriptor], graph: &TypeGraph) -> (Vec<bool>, Vec<bool>) {
    let refs = types
        .iter()
        .filter(|ty| matches!(ty.shape, TypeShape::ConfigRef { .. }))
        .map(|ty| ty.id.index());
    let ref_containing = reachable_from(&graph.reversed(), refs);

    let ref_by_members = types
        .iter()
        .map(|ty| {
            ref_containing[ty.id.index()]
                || ty.struct_shape().is_some_and(|shape| {
                    shape.config_key.is_some()
                        && shape.members.iter().any(|m| ref_containing[m.ty.index()])
                })
        })
        .collect();

    (ref_containing, ref_by_members)
}

/// Struct member sequence bound, including the end marker. `None` if a
/// member is unbounded or the sum overflows.
fn members_size(shape: &StructShape, max_size: &[Option<usize>]) -> Option<usize> {
    let mut total = 1usize;
    for member in &shape.members {
        let header = 1 + varint::encoded_len_u64(u64::from(member.tag));
        total = total
            .checked_add(header)?
            .checked_add(max_size[member.ty.index()]?)?;
    }
    Some(total)
}

/// Upper bound on each type's payload size. Computed leaves first; types in
/// cycles, unbounded types and bounds that overflow `usize` have none.
fn compute_max_sizes(types: &[TypeDescriptor], analysis: &GraphAnalysis) -> Vec<Option<usize>> {
    let mut max_size: Vec<Option<usize>> = vec![None; types.len()];

    for component in analysis.condensed.components.iter().rev() {
        for &index in component {
            if analysis.in_cycle[index] {
                continue;
            }
            let ty = &types[index];
            max_size[index] = match &ty.shape {
                TypeShape::Primitive(kind) => kind.max_encoded_size(),
                TypeShape::Enum { underlying } => underlying.max_encoded_size(),
                TypeShape::Nullable(inner) => {
                    max_size[inner.index()].and_then(|size| size.checked_add(1))
                }
                TypeShape::Struct(shape) => match &shape.config_key {
                    Some(key) => max_size[key.key_ty.index()],
                    None => members_size(shape, &max_size)
                        .and_then(|size| size.checked_add(usize::from(shape.is_class))),
                },
                TypeShape::Abstract { derived } => {
                    let mut best = Some(1usize);
                    for (typecode, derived_ty) in derived {
                        let derived_size = types[derived_ty.index()]
                            .struct_shape()
                            .and_then(|shape| members_size(shape, &max_size))
                            .and_then(|size| {
                                size.checked_add(varint::encoded_len_i64(i64::from(*typecode)))
                            });
                        best = match (best, derived_size) {
                            (Some(a), Some(b)) => Some(a.max(b)),
                            _ => None,
                        };
                    }
                    best
                }
                TypeShape::ConfigRef { target, .. } => types[target.index()]
                    .struct_shape()
                    .and_then(|shape| shape.config_key.as_ref())
                    .and_then(|key| max_size[key.key_ty.index()]),
                TypeShape::ValueCollection(_) | TypeShape::KeyValueCollection { .. } => None,
            };
        }
    }
    max_size
}
