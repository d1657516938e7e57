// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Descriptor-driven encoder.

use crate::context::SerializationContext;
use crate::error::{SerError, SerResult};
use crate::schema::{
    ConfigKey, PrimitiveKind, Schema, StructShape, TypeDescriptor, TypeId, TypeShape,
};
use crate::value::{StructValue, Value};
use crate::wire::{WireType, WireWriter};

/// Upper bound on the initial output buffer. The static size is a worst case
/// over every member and can be far larger than any real value.
const MAX_PREALLOC: usize = 4096;

pub(crate) struct Encoder<'s, 'c, 'r> {
    schema: &'s Schema,
    ctx: &'c mut SerializationContext<'r>,
    out: WireWriter,
}

impl<'s, 'c, 'r> Encoder<'s, 'c, 'r> {
    pub(crate) fn new(
        schema: &'s Schema,
        ctx: &'c mut SerializationContext<'r>,
        ty: TypeId,
    ) -> Self {
        let capacity = schema
            .max_serialized_size(ty)
            .map_or(64, |size| size.saturating_add(1).min(MAX_PREALLOC));
        Self {
            schema,
            ctx,
            out: WireWriter::with_capacity(capacity),
        }
    }

    pub(crate) fn finish(self) -> Vec<u8> {
        self.out.into_inner()
    }

    pub(crate) fn write_wire_type(&mut self, wire: WireType) {
        self.out.write_wire_type(wire);
    }

    pub(crate) fn write_count(&mut self, count: usize) {
        self.out.write_var_int(count as i64);
    }

    /// Payload of `value` as type `ty` (the caller writes the wire type).
    pub(crate) fn write_value(&mut self, ty: TypeId, value: &Value) -> SerResult<()> {
        let schema = self.schema;
        let desc = schema.descriptor(ty)?;
        check_type_version(self.ctx, desc)?;

        let offset = self.out.offset();
        self.ctx
            .debug(|| format!("@{} write {} ({})", offset, desc.name, value.kind_name()));

        let guarded = schema.is_in_cycle(ty);
        if guarded {
            self.ctx.increment_depth()?;
        }
        let result = self.write_shape(desc, value);
        if guarded {
            self.ctx.decrement_depth();
        }
        result
    }

    fn write_shape(&mut self, desc: &'s TypeDescriptor, value: &Value) -> SerResult<()> {
        let schema = self.schema;
        match &desc.shape {
            TypeShape::Primitive(kind) => self.write_primitive(desc, *kind, value),
            TypeShape::Enum { underlying } => {
                let v = value
                    .as_i64()
                    .filter(|v| underlying.fits_i64(*v))
                    .ok_or_else(|| mismatch(desc, value))?;
                // Zigzag for every underlying type, signed or not.
                self.out.write_var_int(v);
                Ok(())
            }
            TypeShape::Nullable(inner) => {
                if value.is_null() {
                    self.out.write_var_int(0);
                    Ok(())
                } else {
                    self.out.write_var_int(1);
                    self.write_value(*inner, value)
                }
            }
            TypeShape::Struct(shape) => {
                if let Some(key) = &shape.config_key {
                    let key_value = config_item_key(desc, key, value)?;
                    return self.write_config_key(desc, key, key_value);
                }
                match value {
                    Value::Null if shape.is_class => {
                        self.out.write_var_int(0);
                        Ok(())
                    }
                    Value::Struct(sv) => {
                        if shape.is_class {
                            self.out.write_var_int(1);
                        }
                        self.write_members(desc, shape, sv)
                    }
                    other => Err(mismatch(desc, other)),
                }
            }
            TypeShape::Abstract { .. } => match value {
                Value::Null => {
                    self.out.write_var_int(0);
                    Ok(())
                }
                Value::Struct(sv) => {
                    let typecode = schema
                        .typecode_of(desc.id, sv.type_id())
                        .ok_or_else(|| SerError::InvalidValue {
                            type_name: desc.name.clone(),
                            reason: format!(
                                "type {} is not a registered derived type",
                                sv.type_id()
                            ),
                        })?;
                    let derived = schema.descriptor(sv.type_id())?;
                    check_type_version(self.ctx, derived)?;
                    let shape = derived.struct_shape().ok_or_else(|| mismatch(derived, value))?;
                    self.out.write_var_int(i64::from(typecode));
                    self.write_members(derived, shape, sv)
                }
                other => Err(mismatch(desc, other)),
            },
            TypeShape::ValueCollection(element) => match value {
                Value::Null => {
                    self.out.write_var_int(-1);
                    Ok(())
                }
                Value::List(items) => {
                    self.check_collection_size(items.len())?;
                    self.write_count(items.len());
                    self.out.write_wire_type(schema.wire_type(*element)?);
                    for item in items {
                        self.write_value(*element, item)?;
                    }
                    Ok(())
                }
                other => Err(mismatch(desc, other)),
            },
            TypeShape::KeyValueCollection { key, value: val } => match value {
                Value::Null => {
                    self.out.write_var_int(-1);
                    Ok(())
                }
                Value::Map(pairs) => {
                    self.check_collection_size(pairs.len())?;
                    self.write_count(pairs.len());
                    self.out.write_wire_type(schema.wire_type(*key)?);
                    self.out.write_wire_type(schema.wire_type(*val)?);
                    for (k, v) in pairs {
                        self.write_value(*key, k)?;
                        self.write_value(*val, v)?;
                    }
                    Ok(())
                }
                other => Err(mismatch(desc, other)),
            },
            TypeShape::ConfigRef { target, .. } => {
                let target = schema.descriptor(*target)?;
                let key = target
                    .struct_shape()
                    .and_then(|shape| shape.config_key.as_ref())
                    .ok_or_else(|| mismatch(target, value))?;
                let key_value = match value {
                    Value::Ref(r) => Some(r.key.as_ref()),
                    Value::ConfigData(_) | Value::Struct(_) => config_item_key(target, key, value)?,
                    Value::Null => None,
                    raw_key => Some(raw_key),
                };
                self.write_config_key(target, key, key_value)
            }
        }
    }

    /// Writes a config reference as its key. A null reference uses the key
    /// type's own null encoding, else the sentinel.
    fn write_config_key(
        &mut self,
        item: &TypeDescriptor,
        key: &ConfigKey,
        key_value: Option<&Value>,
    ) -> SerResult<()> {
        match key_value {
            Some(v) if !v.is_null() => self.write_value(key.key_ty, v),
            _ => {
                if self.schema.wire_type(key.key_ty)?.can_encode_null() {
                    self.write_value(key.key_ty, &Value::Null)
                } else if let Some(sentinel) = &key.null_sentinel {
                    self.write_value(key.key_ty, sentinel)
                } else {
                    Err(SerError::InvalidValue {
                        type_name: item.name.clone(),
                        reason: "null reference needs a nullable key type or a null sentinel"
                            .into(),
                    })
                }
            }
        }
    }

    /// Member sequence terminated by EndStruct. Absent fields, excluded
    /// members and members outside the active version are not written.
    pub(crate) fn write_members(
        &mut self,
        desc: &'s TypeDescriptor,
        shape: &'s StructShape,
        sv: &StructValue,
    ) -> SerResult<()> {
        if sv.type_id() != desc.id {
            return Err(SerError::InvalidValue {
                type_name: desc.name.clone(),
                reason: format!("struct value is of type {}", sv.type_id()),
            });
        }
        let schema = self.schema;
        for (index, member) in shape.members.iter().enumerate() {
            if !self.ctx.includes(member.flags)
                || !self.ctx.is_version_in_range(member.added_in, member.removed_in)
            {
                continue;
            }
            let Some(value) = sv.get(&member.name) else {
                continue;
            };
            self.out.write_wire_type(schema.wire_type(member.ty)?);
            self.out.write_var_uint(u64::from(member.tag));

            let saved = self.ctx.enter_member(desc.id, index, member.max_collection_size);
            let result = self.write_value(member.ty, value);
            self.ctx.restore_member(saved);
            result?;
        }
        self.out.write_wire_type(WireType::EndStruct);
        Ok(())
    }

    fn check_collection_size(&self, count: usize) -> SerResult<()> {
        let max = self.ctx.member_max_collection_size();
        if count > max {
            return Err(SerError::CollectionTooLarge {
                member: self.ctx.member_name(self.schema),
                count: count as i64,
                max,
            });
        }
        Ok(())
    }

    fn write_primitive(
        &mut self,
        desc: &TypeDescriptor,
        kind: PrimitiveKind,
        value: &Value,
    ) -> SerResult<()> {
        let bad = || mismatch(desc, value);
        match kind {
            PrimitiveKind::Bool => {
                let v = value.as_bool().ok_or_else(bad)?;
                self.out.write_var_uint(u64::from(v));
            }
            PrimitiveKind::I8
            | PrimitiveKind::I16
            | PrimitiveKind::I32
            | PrimitiveKind::I64
            | PrimitiveKind::TimeSpan => {
                let v = value
                    .as_i64()
                    .filter(|v| kind.fits_i64(*v))
                    .ok_or_else(bad)?;
                self.out.write_var_int(v);
            }
            PrimitiveKind::U8 | PrimitiveKind::U16 | PrimitiveKind::U32 | PrimitiveKind::U64 => {
                let v = value.as_u64().ok_or_else(bad)?;
                let fits = match kind {
                    PrimitiveKind::U8 => v <= u64::from(u8::MAX),
                    PrimitiveKind::U16 => v <= u64::from(u16::MAX),
                    PrimitiveKind::U32 => v <= u64::from(u32::MAX),
                    _ => true,
                };
                if !fits {
                    return Err(bad());
                }
                self.out.write_var_uint(v);
            }
            PrimitiveKind::U128 => {
                let v = value.as_u128().ok_or_else(bad)?;
                self.out.write_var_uint128(v);
            }
            PrimitiveKind::F32 => match value {
                Value::F32(v) => self.out.write_f32(*v),
                _ => return Err(bad()),
            },
            PrimitiveKind::F64 => {
                let v = value.as_f64().ok_or_else(bad)?;
                self.out.write_f64(v);
            }
            PrimitiveKind::Guid => match value {
                Value::Guid(v) => self.out.write_u128_le(*v),
                _ => return Err(bad()),
            },
            PrimitiveKind::String => match value {
                Value::String(s) => {
                    self.check_payload("string", s.len(), self.ctx.limits().max_string_size)?;
                    self.out.write_string(Some(s));
                }
                Value::Null => self.out.write_string(None),
                _ => return Err(bad()),
            },
            PrimitiveKind::Bytes => match value {
                Value::Bytes(b) => {
                    let max = self.ctx.limits().max_byte_array_size;
                    self.check_payload("byte string", b.len(), max)?;
                    self.out.write_byte_string(Some(b));
                }
                Value::Null => self.out.write_byte_string(None),
                _ => return Err(bad()),
            },
        }
        Ok(())
    }

    fn check_payload(&self, what: &'static str, len: usize, max: usize) -> SerResult<()> {
        if len > max {
            return Err(SerError::PayloadTooLarge {
                what,
                offset: self.out.offset(),
                len: len as i64,
                max,
            });
        }
        Ok(())
    }
}

/// Fails when `desc` is newer than the active schema version.
pub(crate) fn check_type_version(
    ctx: &SerializationContext<'_>,
    desc: &TypeDescriptor,
) -> SerResult<()> {
    match desc.added_in {
        Some(minimum) if !ctx.is_version_in_range(Some(minimum), None) => {
            Err(SerError::SchemaVersionMismatch {
                type_name: desc.name.clone(),
                current: ctx.schema_version(),
                minimum,
            })
        }
        _ => Ok(()),
    }
}

/// Key of a config item value; `None` for a null reference.
fn config_item_key<'v>(
    desc: &TypeDescriptor,
    key: &ConfigKey,
    value: &'v Value,
) -> SerResult<Option<&'v Value>> {
    let item = match value {
        Value::Null => return Ok(None),
        Value::Ref(r) => return Ok(Some(r.key.as_ref())),
        Value::ConfigData(item) => item.as_ref(),
        other => other,
    };
    let sv = item.as_struct().ok_or_else(|| mismatch(desc, value))?;
    sv.get(&key.member)
        .map(Some)
        .ok_or_else(|| SerError::InvalidValue {
            type_name: desc.name.clone(),
            reason: format!("config item has no '{}' key", key.member),
        })
}

fn mismatch(desc: &TypeDescriptor, value: &Value) -> SerError {
    SerError::InvalidValue {
        type_name: desc.name.clone(),
        reason: format!("cannot encode a {} value", value.kind_name()),
    }
}
