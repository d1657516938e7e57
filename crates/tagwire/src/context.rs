// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Per-call serialization state and reference resolution.

use crate::config::{ConfigError, SerializationSettings};
use crate::error::{SerError, SerResult};
use crate::schema::{MemberFlags, Schema, TypeId};
use crate::value::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Looks up config items by key.
///
/// `target` is the name of the config item type being referenced.
pub trait ReferenceResolver {
    fn resolve(&self, target: &str, key: &Value) -> Option<Arc<Value>>;
}

impl<F> ReferenceResolver for F
where
    F: Fn(&str, &Value) -> Option<Arc<Value>>,
{
    fn resolve(&self, target: &str, key: &Value) -> Option<Arc<Value>> {
        self(target, key)
    }
}

/// Hashable form of a scalar config key.
///
/// Integers of every width compare by value, floats by bit pattern.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum ItemKey {
    Null,
    Bool(bool),
    Int(i128),
    Wide(u128),
    Float(u64),
    Text(String),
    Bytes(Vec<u8>),
}

impl ItemKey {
    fn from_value(value: &Value) -> Option<Self> {
        Some(match value {
            Value::Null => Self::Null,
            Value::Bool(v) => Self::Bool(*v),
            Value::I8(_)
            | Value::I16(_)
            | Value::I32(_)
            | Value::I64(_)
            | Value::U8(_)
            | Value::U16(_)
            | Value::U32(_)
            | Value::Enum(_)
            | Value::TimeSpan(_) => Self::Int(i128::from(value.as_i64()?)),
            Value::U64(v) => Self::Int(i128::from(*v)),
            Value::U128(v) | Value::Guid(v) => Self::Wide(*v),
            Value::F32(v) => Self::Float(f64::from(*v).to_bits()),
            Value::F64(v) => Self::Float(v.to_bits()),
            Value::String(v) => Self::Text(v.clone()),
            Value::Bytes(v) => Self::Bytes(v.clone()),
            _ => return None,
        })
    }
}

/// In-memory resolver keyed by (type name, key value).
#[derive(Debug, Default, Clone)]
pub struct ConfigResolver {
    items: HashMap<String, HashMap<ItemKey, Arc<Value>>>,
}

impl ConfigResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `item` under `key`, replacing any previous item.
    ///
    /// Keys must be scalars, as config key members are.
    pub fn insert(&mut self, target: impl Into<String>, key: Value, item: Value) -> SerResult<()> {
        let target = target.into();
        let key = ItemKey::from_value(&key).ok_or_else(|| SerError::InvalidValue {
            type_name: target.clone(),
            reason: format!("{} is not a valid config key", key.kind_name()),
        })?;
        self.items.entry(target).or_default().insert(key, Arc::new(item));
        Ok(())
    }

    /// Register every item of a decoded table, keyed by its config key member.
    pub fn insert_table(
        &mut self,
        schema: &Schema,
        item_ty: TypeId,
        items: &[Value],
    ) -> SerResult<()> {
        let descriptor = schema.descriptor(item_ty)?;
        let key_member = descriptor
            .struct_shape()
            .and_then(|shape| shape.config_key.as_ref())
            .map(|key| key.member.clone())
            .ok_or_else(|| SerError::InvalidValue {
                type_name: descriptor.name.clone(),
                reason: "not a config item type".into(),
            })?;
        let entries = self.items.entry(descriptor.name.clone()).or_default();
        entries.reserve(items.len());
        for item in items {
            let key = item
                .get_field(&key_member)
                .and_then(ItemKey::from_value)
                .ok_or_else(|| SerError::InvalidValue {
                    type_name: descriptor.name.clone(),
                    reason: format!("item has no scalar '{}' key", key_member),
                })?;
            entries.insert(key, Arc::new(item.clone()));
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.items.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ReferenceResolver for ConfigResolver {
    fn resolve(&self, target: &str, key: &Value) -> Option<Arc<Value>> {
        self.items
            .get(target)?
            .get(&ItemKey::from_value(key)?)
            .map(Arc::clone)
    }
}

/// Preset exclusion masks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SerializationFlags {
    IncludeAll,
    SendOverNetwork,
    ComputeChecksum,
    Persisted,
    EntityEventLog,
}

impl SerializationFlags {
    /// Member flags that are excluded under this preset.
    pub fn excluded(self) -> MemberFlags {
        match self {
            Self::IncludeAll => MemberFlags::NONE,
            Self::SendOverNetwork => MemberFlags::HIDDEN,
            Self::ComputeChecksum => MemberFlags::NO_CHECKSUM,
            Self::Persisted => MemberFlags::TRANSIENT,
            Self::EntityEventLog => MemberFlags::EXCLUDE_FROM_EVENT_LOG,
        }
    }
}

/// Size limits copied from [`SerializationSettings`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    pub max_collection_size: usize,
    pub max_string_size: usize,
    pub max_byte_array_size: usize,
}

/// The member currently being encoded or decoded.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct MemberScope {
    pub(crate) owner: Option<(TypeId, usize)>,
    pub(crate) max_collection_size: Option<usize>,
}

/// Ambient state of one encode, decode or traversal call.
///
/// Owned by the call that created it; never shared between calls.
pub struct SerializationContext<'r> {
    limits: Limits,
    exclude: MemberFlags,
    schema_version: Option<u32>,
    resolver: Option<&'r dyn ReferenceResolver>,
    depth: u32,
    max_depth: u32,
    member: MemberScope,
    debug: Option<Vec<String>>,
}

impl<'r> SerializationContext<'r> {
    /// Build a context from settings.
    ///
    /// Fails if the settings do not validate, e.g. on an unknown exclusion
    /// flag name.
    pub fn new(settings: &SerializationSettings) -> Result<Self, ConfigError> {
        settings.validate()?;
        Ok(Self::from_parts(settings, settings.exclusion()?))
    }

    fn from_parts(settings: &SerializationSettings, exclude: MemberFlags) -> Self {
        Self {
            limits: Limits {
                max_collection_size: settings.max_collection_size,
                max_string_size: settings.max_string_size,
                max_byte_array_size: settings.max_byte_array_size,
            },
            exclude,
            schema_version: settings.schema_version,
            resolver: None,
            depth: 0,
            max_depth: settings.max_depth,
            member: MemberScope::default(),
            debug: None,
        }
    }

    #[must_use]
    pub fn with_flags(mut self, flags: SerializationFlags) -> Self {
        self.exclude = flags.excluded();
        self
    }

    #[must_use]
    pub fn with_exclude(mut self, exclude: MemberFlags) -> Self {
        self.exclude = exclude;
        self
    }

    #[must_use]
    pub fn with_schema_version(mut self, version: Option<u32>) -> Self {
        self.schema_version = version;
        self
    }

    #[must_use]
    pub fn with_resolver(mut self, resolver: &'r dyn ReferenceResolver) -> Self {
        self.resolver = Some(resolver);
        self
    }

    #[must_use]
    pub fn with_max_depth(mut self, max_depth: u32) -> Self {
        self.max_depth = max_depth;
        self
    }

    #[must_use]
    pub fn with_max_collection_size(mut self, max: usize) -> Self {
        self.limits.max_collection_size = max;
        self
    }

    /// Record one `@offset` line per value written or read.
    #[must_use]
    pub fn with_debug_stream(mut self) -> Self {
        self.debug = Some(Vec::new());
        self
    }

    pub fn limits(&self) -> Limits {
        self.limits
    }

    pub fn exclude(&self) -> MemberFlags {
        self.exclude
    }

    pub fn schema_version(&self) -> Option<u32> {
        self.schema_version
    }

    pub fn resolver(&self) -> Option<&'r dyn ReferenceResolver> {
        self.resolver
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    pub fn max_depth(&self) -> u32 {
        self.max_depth
    }

    pub fn increment_depth(&mut self) -> SerResult<()> {
        if self.depth >= self.max_depth {
            return Err(SerError::DepthExceeded {
                max_depth: self.max_depth,
            });
        }
        self.depth += 1;
        Ok(())
    }

    pub fn decrement_depth(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    pub fn set_schema_version(&mut self, version: Option<u32>) {
        self.schema_version = version;
    }

    pub(crate) fn set_depth(&mut self, depth: u32) {
        self.depth = depth;
    }

    /// `None` (no active version) accepts everything.
    pub fn is_version_in_range(&self, added_in: Option<u32>, removed_in: Option<u32>) -> bool {
        match self.schema_version {
            None => true,
            Some(v) => {
                added_in.map_or(true, |min| v >= min) && removed_in.map_or(true, |max| v < max)
            }
        }
    }

    /// True if a member carrying `flags` is written under this context.
    pub fn includes(&self, flags: MemberFlags) -> bool {
        !self.exclude.intersects(flags)
    }

    pub(crate) fn enter_member(
        &mut self,
        owner: TypeId,
        index: usize,
        max_collection_size: Option<usize>,
    ) -> MemberScope {
        std::mem::replace(
            &mut self.member,
            MemberScope {
                owner: Some((owner, index)),
                max_collection_size,
            },
        )
    }

    pub(crate) fn restore_member(&mut self, previous: MemberScope) {
        self.member = previous;
    }

    /// Member override if any, else the context default.
    pub fn member_max_collection_size(&self) -> usize {
        self.member
            .max_collection_size
            .unwrap_or(self.limits.max_collection_size)
    }

    /// Name of the member being processed, for error messages.
    pub(crate) fn member_name(&self, schema: &Schema) -> String {
        self.member
            .owner
            .and_then(|(ty, index)| {
                let shape = schema.descriptor(ty).ok()?.struct_shape()?;
                shape.members.get(index).map(|m| m.name.clone())
            })
            .unwrap_or_else(|| "<root>".to_string())
    }

    pub(crate) fn debug<F: FnOnce() -> String>(&mut self, line: F) {
        if let Some(lines) = &mut self.debug {
            lines.push(line());
        }
    }

    /// Lines recorded by the debug stream, if enabled.
    pub fn debug_lines(&self) -> Option<&[String]> {
        self.debug.as_deref()
    }

    pub fn take_debug_lines(&mut self) -> Option<Vec<String>> {
        self.debug.as_mut().map(std::mem::take)
    }
}

impl Default for SerializationContext<'_> {
    fn default() -> Self {
        Self::from_parts(&SerializationSettings::default(), MemberFlags::NONE)
    }
}

impl std::fmt::Debug for SerializationContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerializationContext")
            .field("limits", &self.limits)
            .field("exclude", &self.exclude)
            .field("schema_version", &self.schema_version)
            .field("has_resolver", &self.resolver.is_some())
            .field("depth", &self.depth)
            .field("max_depth", &self.max_depth)
            .finish_non_exhaustive()
    }
}
