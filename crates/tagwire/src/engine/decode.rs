// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Descriptor-driven decoder.

use super::encode::check_type_version;
use crate::context::SerializationContext;
use crate::error::{SerError, SerResult};
use crate::schema::{
    ConfigKey, FailureHook, MemberDescriptor, OnDeserializedParams, PrimitiveKind, RefKind, Schema,
    SourceDeserialization, StructShape, TypeDescriptor, TypeId, TypeShape,
};
use crate::value::{RefValue, StructValue, Value};
use crate::wire::{skip_wire_type, WireReader, WireType};
use log::{trace, warn};

pub(crate) struct Decoder<'s, 'c, 'r, 'b> {
    schema: &'s Schema,
    ctx: &'c mut SerializationContext<'r>,
    reader: WireReader<'b>,
}

impl<'s, 'c, 'r, 'b> Decoder<'s, 'c, 'r, 'b> {
    pub(crate) fn new(
        schema: &'s Schema,
        ctx: &'c mut SerializationContext<'r>,
        bytes: &'b [u8],
    ) -> Self {
        Self {
            schema,
            ctx,
            reader: WireReader::new(bytes),
        }
    }

    pub(crate) fn offset(&self) -> usize {
        self.reader.offset()
    }

    pub(crate) fn read_wire_type(&mut self) -> SerResult<WireType> {
        self.reader.read_wire_type()
    }

    /// Collection or table count: `None` for null, bounded by `max`.
    pub(crate) fn read_count(&mut self, max: usize) -> SerResult<Option<usize>> {
        let offset = self.reader.offset();
        let count = self.reader.read_var_int32()?;
        if count == -1 {
            return Ok(None);
        }
        if count < -1 {
            return Err(SerError::ReadFailed {
                offset,
                reason: "negative collection count",
            });
        }
        let count = count as usize;
        if count > max {
            return Err(SerError::CollectionTooLarge {
                member: self.ctx.member_name(self.schema),
                count: count as i64,
                max,
            });
        }
        Ok(Some(count))
    }

    /// Payload announced as `found` for a value of type `ty`. A non-canonical
    /// wire type goes through the type's matching decode converter.
    pub(crate) fn read_typed(&mut self, ty: TypeId, found: WireType) -> SerResult<Value> {
        let expected = self.schema.wire_type(ty)?;
        if found == expected {
            return self.read_value(ty);
        }
        let schema = self.schema;
        let desc = schema.descriptor(ty)?;
        let Some(converter) = desc.converter_for(found) else {
            return Err(SerError::ProtocolMismatch {
                member: self.ctx.member_name(schema),
                type_name: desc.name.clone(),
                expected,
                found,
            });
        };
        let staged = match converter.mode {
            SourceDeserialization::Normal => self.read_value(converter.source)?,
            SourceDeserialization::Members => {
                let source = schema.descriptor(converter.source)?;
                let shape = source
                    .struct_shape()
                    .ok_or(SerError::UnknownTypeId(converter.source.0))?;
                Value::Struct(self.read_members(source, shape)?)
            }
        };
        trace!(
            "[decode] converting {} payload into '{}' via '{}'",
            found,
            desc.name,
            schema.descriptor(converter.source)?.name
        );
        converter.convert(staged)
    }

    /// Payload of a value of type `ty` in its canonical encoding.
    pub(crate) fn read_value(&mut self, ty: TypeId) -> SerResult<Value> {
        let schema = self.schema;
        let desc = schema.descriptor(ty)?;
        check_type_version(self.ctx, desc)?;

        let offset = self.reader.offset();
        self.ctx.debug(|| format!("@{} read {}", offset, desc.name));

        let guarded = schema.is_in_cycle(ty);
        if guarded {
            self.ctx.increment_depth()?;
        }
        let result = self.read_shape(desc);
        if guarded {
            self.ctx.decrement_depth();
        }
        result
    }

    fn read_shape(&mut self, desc: &'s TypeDescriptor) -> SerResult<Value> {
        let schema = self.schema;
        match &desc.shape {
            TypeShape::Primitive(kind) => self.read_primitive(*kind),
            TypeShape::Enum { underlying } => {
                let v = self.reader.read_var_int()?;
                if !underlying.fits_i64(v) {
                    return Err(self.value_fault(format!(
                        "enum value {} out of range for '{}'",
                        v, desc.name
                    )));
                }
                Ok(Value::Enum(v))
            }
            TypeShape::Nullable(inner) => {
                if !self.reader.read_presence()? {
                    Ok(Value::Null)
                } else {
                    self.read_value(*inner)
                }
            }
            TypeShape::Struct(shape) => {
                if let Some(key) = &shape.config_key {
                    return self.read_config_data(desc, key);
                }
                if shape.is_class && !self.reader.read_presence()? {
                    return Ok(Value::Null);
                }
                self.read_members(desc, shape).map(Value::Struct)
            }
            TypeShape::Abstract { derived } => {
                let typecode = self.reader.read_var_int()?;
                if typecode == 0 {
                    return Ok(Value::Null);
                }
                let derived_ty = i32::try_from(typecode)
                    .ok()
                    .and_then(|code| derived.get(&code))
                    .ok_or_else(|| SerError::UnknownDerivedType {
                        type_name: desc.name.clone(),
                        typecode,
                    })?;
                let derived = schema.descriptor(*derived_ty)?;
                check_type_version(self.ctx, derived)?;
                let shape = derived
                    .struct_shape()
                    .ok_or(SerError::UnknownTypeId(derived_ty.0))?;
                self.read_members(derived, shape).map(Value::Struct)
            }
            TypeShape::ValueCollection(element) => {
                let max = self.ctx.member_max_collection_size();
                let Some(count) = self.read_count(max)? else {
                    return Ok(Value::Null);
                };
                let wire = self.reader.read_wire_type()?;
                let mut items = Vec::with_capacity(count.min(self.reader.remaining()));
                for _ in 0..count {
                    items.push(self.read_typed(*element, wire)?);
                }
                Ok(Value::List(items))
            }
            TypeShape::KeyValueCollection { key, value } => {
                let max = self.ctx.member_max_collection_size();
                let Some(count) = self.read_count(max)? else {
                    return Ok(Value::Null);
                };
                let key_wire = self.reader.read_wire_type()?;
                let value_wire = self.reader.read_wire_type()?;
                let mut pairs = Vec::with_capacity(count.min(self.reader.remaining()));
                for _ in 0..count {
                    let k = self.read_typed(*key, key_wire)?;
                    let v = self.read_typed(*value, value_wire)?;
                    pairs.push((k, v));
                }
                Ok(Value::Map(pairs))
            }
            TypeShape::ConfigRef { target, kind } => {
                let target = schema.descriptor(*target)?;
                let key = config_key_of(target)?;
                let key_value = self.read_value(key.key_ty)?;
                if key.is_null_key(&key_value) {
                    return Ok(Value::Null);
                }
                let mut reference = RefValue::from_key(key_value);
                if *kind == RefKind::Ref && self.ctx.resolver().is_some() {
                    reference.resolve_in_place(&target.name, self.ctx.resolver())?;
                }
                Ok(Value::Ref(reference))
            }
        }
    }

    /// A config-data reference must resolve unless it is null.
    fn read_config_data(&mut self, desc: &TypeDescriptor, key: &ConfigKey) -> SerResult<Value> {
        let key_value = self.read_value(key.key_ty)?;
        if key.is_null_key(&key_value) {
            return Ok(Value::Null);
        }
        let resolver = self.ctx.resolver().ok_or_else(|| SerError::UnresolvedReference {
            target: desc.name.clone(),
            key: format!("{:?}", key_value),
            reason: "no reference resolver",
        })?;
        resolver
            .resolve(&desc.name, &key_value)
            .map(Value::ConfigData)
            .ok_or_else(|| SerError::UnresolvedReference {
                target: desc.name.clone(),
                key: format!("{:?}", key_value),
                reason: "key not found",
            })
    }

    /// Member sequence up to EndStruct, then on-deserialized hooks.
    pub(crate) fn read_members(
        &mut self,
        desc: &'s TypeDescriptor,
        shape: &'s StructShape,
    ) -> SerResult<StructValue> {
        let mut sv = StructValue::new(desc.id);
        loop {
            let wire = self.reader.read_wire_type()?;
            if wire == WireType::EndStruct {
                break;
            }
            let tag = self.reader.read_var_uint32()?;
            let Some(&index) = shape.by_tag.get(&tag) else {
                trace!("[decode] skipping unknown tag {} ({}) in '{}'", tag, wire, desc.name);
                skip_wire_type(&mut self.reader, wire)?;
                continue;
            };
            let member = &shape.members[index];
            if !self.ctx.includes(member.flags)
                || !self.ctx.is_version_in_range(member.added_in, member.removed_in)
            {
                skip_wire_type(&mut self.reader, wire)?;
                continue;
            }

            let saved = self.ctx.enter_member(desc.id, index, member.max_collection_size);
            let result = match &member.on_failure {
                Some(hook) => self.read_member_with_recovery(desc, member, wire, hook),
                None => self.read_typed(member.ty, wire),
            };
            self.ctx.restore_member(saved);
            sv.set(member.name.clone(), result?);
        }

        if !desc.on_deserialized.is_empty() {
            let params = OnDeserializedParams {
                resolver: self.ctx.resolver(),
                schema_version: self.ctx.schema_version(),
                schema: self.schema,
            };
            for hook in &desc.on_deserialized {
                (hook.0)(&mut sv, &params)?;
            }
        }
        Ok(sv)
    }

    /// Decode one member; on failure restore the depth counter, capture the
    /// member's raw payload and let the hook supply a substitute.
    fn read_member_with_recovery(
        &mut self,
        owner: &TypeDescriptor,
        member: &MemberDescriptor,
        wire: WireType,
        hook: &FailureHook,
    ) -> SerResult<Value> {
        let depth = self.ctx.depth();
        let start = self.reader.offset();
        let err = match self.read_typed(member.ty, wire) {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        self.ctx.set_depth(depth);
        self.reader.seek(start)?;
        skip_wire_type(&mut self.reader, wire)?;
        let payload = self.reader.slice(start, self.reader.offset())?;
        let value = (hook.0)(payload, &err, &*self.ctx)?;
        warn!(
            "[decode] member '{}' of '{}' failed to decode ({}), substituted {}",
            member.name,
            owner.name,
            err,
            value.kind_name()
        );
        Ok(value)
    }

    fn read_primitive(&mut self, kind: PrimitiveKind) -> SerResult<Value> {
        let value = match kind {
            PrimitiveKind::Bool => match self.reader.read_var_uint()? {
                0 => Value::Bool(false),
                1 => Value::Bool(true),
                other => return Err(self.value_fault(format!("invalid bool value {}", other))),
            },
            PrimitiveKind::I8 => {
                let v = self.reader.read_var_int()?;
                Value::I8(self.narrow(v, kind)?)
            }
            PrimitiveKind::I16 => {
                let v = self.reader.read_var_int()?;
                Value::I16(self.narrow(v, kind)?)
            }
            PrimitiveKind::I32 => {
                let v = self.reader.read_var_int()?;
                Value::I32(self.narrow(v, kind)?)
            }
            PrimitiveKind::I64 => Value::I64(self.reader.read_var_int()?),
            PrimitiveKind::TimeSpan => Value::TimeSpan(self.reader.read_var_int()?),
            PrimitiveKind::U8 => {
                let v = self.reader.read_var_uint()?;
                Value::U8(self.narrow(v, kind)?)
            }
            PrimitiveKind::U16 => {
                let v = self.reader.read_var_uint()?;
                Value::U16(self.narrow(v, kind)?)
            }
            PrimitiveKind::U32 => {
                let v = self.reader.read_var_uint()?;
                Value::U32(self.narrow(v, kind)?)
            }
            PrimitiveKind::U64 => Value::U64(self.reader.read_var_uint()?),
            PrimitiveKind::U128 => Value::U128(self.reader.read_var_uint128()?),
            PrimitiveKind::F32 => Value::F32(self.reader.read_f32()?),
            PrimitiveKind::F64 => Value::F64(self.reader.read_f64()?),
            PrimitiveKind::Guid => Value::Guid(self.reader.read_u128_le()?),
            PrimitiveKind::String => {
                let max = self.ctx.limits().max_string_size;
                self.reader.read_string(max)?.map_or(Value::Null, Value::String)
            }
            PrimitiveKind::Bytes => {
                let max = self.ctx.limits().max_byte_array_size;
                self.reader
                    .read_byte_string(max)?
                    .map_or(Value::Null, |bytes| Value::Bytes(bytes.to_vec()))
            }
        };
        Ok(value)
    }

    fn narrow<T, U>(&self, value: U, kind: PrimitiveKind) -> SerResult<T>
    where
        T: TryFrom<U>,
        U: Copy + std::fmt::Display,
    {
        T::try_from(value).map_err(|_| {
            self.value_fault(format!("value {} out of range for {}", value, kind.name()))
        })
    }

    /// Value-level fault attributed to the current member.
    fn value_fault(&self, reason: String) -> SerError {
        SerError::MemberDecodeFailure {
            member: self.ctx.member_name(self.schema),
            reason,
        }
    }
}

pub(crate) fn config_key_of(desc: &TypeDescriptor) -> SerResult<&ConfigKey> {
    desc.struct_shape()
        .and_then(|shape| shape.config_key.as_ref())
        .ok_or_else(|| SerError::InvalidValue {
            type_name: desc.name.clone(),
            reason: "not a config item type".into(),
        })
}
