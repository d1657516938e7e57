// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Tagged encode/decode entry points.
//!
//! Every call owns its [`SerializationContext`]; the [`Schema`] is only read.
//!
//! | Operation | Top-level layout |
//! |-----------|------------------|
//! | [`serialize`] | wire type, payload |
//! | [`serialize_table`] | `ObjectTable`, count, member sequence per item |
//! | [`peek_typecode`] | reads `AbstractStruct` + typecode only |

mod decode;
mod encode;

use crate::context::{ReferenceResolver, SerializationContext, SerializationFlags};
use crate::error::{SerError, SerResult};
use crate::schema::{Schema, StructShape, TypeDescriptor, TypeId, TypeShape};
use crate::value::Value;
use crate::wire::{WireReader, WireType};
use decode::Decoder;
use encode::Encoder;

pub(crate) use encode::check_type_version;
use log::trace;

/// Encode `value` as type `ty`: wire type, then payload.
pub fn serialize(
    schema: &Schema,
    ty: TypeId,
    value: &Value,
    ctx: &mut SerializationContext<'_>,
) -> SerResult<Vec<u8>> {
    let wire = schema.wire_type(ty)?;
    let mut encoder = Encoder::new(schema, ctx, ty);
    encoder.write_wire_type(wire);
    encoder.write_value(ty, value)?;
    Ok(encoder.finish())
}

/// Decode a value of type `ty`. A non-canonical top-level wire type is
/// accepted through the type's decode converters.
pub fn deserialize(
    schema: &Schema,
    ty: TypeId,
    bytes: &[u8],
    ctx: &mut SerializationContext<'_>,
) -> SerResult<Value> {
    let mut decoder = Decoder::new(schema, ctx, bytes);
    let wire = decoder.read_wire_type()?;
    decoder.read_typed(ty, wire)
}

fn table_item(schema: &Schema, item_ty: TypeId) -> SerResult<(&TypeDescriptor, &StructShape)> {
    let desc = schema.descriptor(item_ty)?;
    let shape = desc.struct_shape().ok_or_else(|| SerError::InvalidValue {
        type_name: desc.name.clone(),
        reason: "table items must be a struct type".into(),
    })?;
    Ok((desc, shape))
}

/// Encode many items of one struct type, each as its full member sequence.
///
/// Config items are written by members here, not by key. `max_items`
/// overrides the context's collection limit.
pub fn serialize_table(
    schema: &Schema,
    item_ty: TypeId,
    items: &[Value],
    max_items: Option<usize>,
    ctx: &mut SerializationContext<'_>,
) -> SerResult<Vec<u8>> {
    let (desc, shape) = table_item(schema, item_ty)?;
    check_type_version(ctx, desc)?;

    let max = max_items.unwrap_or(ctx.limits().max_collection_size);
    if items.len() > max {
        return Err(SerError::CollectionTooLarge {
            member: format!("<table {}>", desc.name),
            count: items.len() as i64,
            max,
        });
    }

    let mut encoder = Encoder::new(schema, ctx, item_ty);
    encoder.write_wire_type(WireType::ObjectTable);
    encoder.write_count(items.len());
    for item in items {
        let sv = item.as_struct().ok_or_else(|| SerError::InvalidValue {
            type_name: desc.name.clone(),
            reason: format!("table item is a {} value", item.kind_name()),
        })?;
        encoder.write_members(desc, shape, sv)?;
    }
    let bytes = encoder.finish();
    trace!(
        "[encode] table of {} '{}' items ({} bytes)",
        items.len(),
        desc.name,
        bytes.len()
    );
    Ok(bytes)
}

/// Mirror of [`serialize_table`]. A null table decodes as empty.
pub fn deserialize_table(
    schema: &Schema,
    item_ty: TypeId,
    bytes: &[u8],
    max_items: Option<usize>,
    ctx: &mut SerializationContext<'_>,
) -> SerResult<Vec<Value>> {
    let (desc, shape) = table_item(schema, item_ty)?;
    check_type_version(ctx, desc)?;
    let max = max_items.unwrap_or(ctx.limits().max_collection_size);

    let mut decoder = Decoder::new(schema, ctx, bytes);
    let wire = decoder.read_wire_type()?;
    if wire != WireType::ObjectTable {
        return Err(SerError::ProtocolMismatch {
            member: format!("<table {}>", desc.name),
            type_name: desc.name.clone(),
            expected: WireType::ObjectTable,
            found: wire,
        });
    }
    let Some(count) = decoder.read_count(max)? else {
        return Ok(Vec::new());
    };
    let mut items = Vec::with_capacity(count.min(bytes.len()));
    for _ in 0..count {
        items.push(Value::Struct(decoder.read_members(desc, shape)?));
    }
    trace!(
        "[decode] table of {} '{}' items ({} bytes)",
        items.len(),
        desc.name,
        decoder.offset()
    );
    Ok(items)
}

/// Deep copy through an encode/decode pass with every member included.
pub fn clone_value(
    schema: &Schema,
    ty: TypeId,
    value: &Value,
    resolver: Option<&dyn ReferenceResolver>,
) -> SerResult<Value> {
    let mut ctx = SerializationContext::default().with_flags(SerializationFlags::IncludeAll);
    if let Some(resolver) = resolver {
        ctx = ctx.with_resolver(resolver);
    }
    let bytes = serialize(schema, ty, value, &mut ctx)?;
    deserialize(schema, ty, &bytes, &mut ctx)
}

/// Leading typecode of a top-level polymorphic encoding; `None` for null.
pub fn peek_typecode(bytes: &[u8]) -> SerResult<Option<i64>> {
    let mut reader = WireReader::new(bytes);
    let wire = reader.read_wire_type()?;
    if wire != WireType::AbstractStruct {
        return Err(SerError::ProtocolMismatch {
            member: "<root>".into(),
            type_name: "<polymorphic>".into(),
            expected: WireType::AbstractStruct,
            found: wire,
        });
    }
    let typecode = reader.read_var_int()?;
    Ok((typecode != 0).then_some(typecode))
}

/// Concrete type of a top-level polymorphic encoding of `base`.
pub fn peek_derived_type(schema: &Schema, base: TypeId, bytes: &[u8]) -> SerResult<Option<TypeId>> {
    let Some(typecode) = peek_typecode(bytes)? else {
        return Ok(None);
    };
    let desc = schema.descriptor(base)?;
    if let TypeShape::Abstract { derived } = &desc.shape {
        if let Some(ty) = i32::try_from(typecode).ok().and_then(|code| derived.get(&code)) {
            return Ok(Some(*ty));
        }
    }
    Err(SerError::UnknownDerivedType {
        type_name: desc.name.clone(),
        typecode,
    })
}

/// Outcome of [`is_compatible_with_version`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionCompatibility {
    Compatible,
    /// The first incompatible type needs at least this version.
    RequiresAtLeast(u32),
}

/// Check whether `value` can be encoded under schema `version`.
pub fn is_compatible_with_version(
    schema: &Schema,
    ty: TypeId,
    value: &Value,
    version: u32,
    flags: SerializationFlags,
) -> SerResult<VersionCompatibility> {
    let mut ctx = SerializationContext::default()
        .with_flags(flags)
        .with_schema_version(Some(version));
    match serialize(schema, ty, value, &mut ctx) {
        Ok(_) => Ok(VersionCompatibility::Compatible),
        Err(SerError::SchemaVersionMismatch { minimum, .. }) => {
            Ok(VersionCompatibility::RequiresAtLeast(minimum))
        }
        Err(err) => Err(err),
    }
}

/// Encode at `initial`, raising the version to each reported minimum until
/// encoding succeeds. Returns the bytes and the version used.
pub fn serialize_with_first_compatible_version(
    schema: &Schema,
    ty: TypeId,
    value: &Value,
    initial: u32,
    ctx: &mut SerializationContext<'_>,
) -> SerResult<(Vec<u8>, u32)> {
    let mut version = initial;
    loop {
        ctx.set_schema_version(Some(version));
        ctx.set_depth(0);
        match serialize(schema, ty, value, ctx) {
            Ok(bytes) => return Ok((bytes, version)),
            Err(SerError::SchemaVersionMismatch { minimum, .. }) if minimum > version => {
                trace!("[encode] version {} too old, retrying at {}", version, minimum);
                version = minimum;
            }
            Err(err) => return Err(err),
        }
    }
}
