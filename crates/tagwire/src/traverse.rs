// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Reference traversal.
//!
//! Walks a value and calls a [`ReferenceVisitor`] at every config reference,
//! pruning subtrees whose type cannot contain one. Resolved config items
//! (`Value::ConfigData`) are shared data and are not entered.

use crate::context::SerializationContext;
use crate::engine::check_type_version;
use crate::error::{SerError, SerResult};
use crate::schema::{RefKind, Schema, StructShape, TypeDescriptor, TypeId, TypeShape};
use crate::value::{RefValue, StructValue, Value};
use std::sync::Arc;

/// Callbacks invoked during traversal.
pub trait ReferenceVisitor {
    /// A resolvable reference. Resolves it in place by default.
    fn visit_config_ref(
        &mut self,
        ctx: &SerializationContext<'_>,
        target: &TypeDescriptor,
        reference: &mut RefValue,
    ) -> SerResult<()> {
        reference.resolve_in_place(&target.name, ctx.resolver())
    }

    /// A key-only reference.
    fn visit_config_id(
        &mut self,
        _ctx: &SerializationContext<'_>,
        _target: &TypeDescriptor,
        _reference: &RefValue,
    ) -> SerResult<()> {
        Ok(())
    }

    /// Called before each table item's members are walked.
    fn visit_table_item(
        &mut self,
        _ctx: &SerializationContext<'_>,
        _item: &mut Value,
    ) -> SerResult<()> {
        Ok(())
    }
}

/// Resolves every reachable reference through the context's resolver.
#[derive(Debug, Default, Clone, Copy)]
pub struct ResolveVisitor;

impl ReferenceVisitor for ResolveVisitor {}

struct Walker<'s, 'c, 'r, 'v, V: ?Sized> {
    schema: &'s Schema,
    ctx: &'c mut SerializationContext<'r>,
    visitor: &'v mut V,
}

impl<'s, V: ReferenceVisitor + ?Sized> Walker<'s, '_, '_, '_, V> {
    fn walk(&mut self, ty: TypeId, value: &mut Value) -> SerResult<()> {
        let schema = self.schema;
        if !schema.contains_references(ty) || value.is_null() {
            return Ok(());
        }
        let desc = schema.descriptor(ty)?;
        check_type_version(self.ctx, desc)?;

        let guarded = schema.is_in_cycle(ty);
        if guarded {
            self.ctx.increment_depth()?;
        }
        let result = self.walk_shape(desc, value);
        if guarded {
            self.ctx.decrement_depth();
        }
        result
    }

    fn walk_shape(&mut self, desc: &'s TypeDescriptor, value: &mut Value) -> SerResult<()> {
        let schema = self.schema;
        match &desc.shape {
            TypeShape::Primitive(_) | TypeShape::Enum { .. } => Ok(()),
            TypeShape::Nullable(inner) => self.walk(*inner, value),
            TypeShape::Struct(shape) => {
                if shape.config_key.is_some() {
                    return Ok(());
                }
                match value.as_struct_mut() {
                    Some(sv) => self.walk_members(desc, shape, sv),
                    None => Ok(()),
                }
            }
            TypeShape::Abstract { .. } => {
                let Some(sv) = value.as_struct_mut() else {
                    return Ok(());
                };
                if schema.typecode_of(desc.id, sv.type_id()).is_none() {
                    return Err(SerError::InvalidValue {
                        type_name: desc.name.clone(),
                        reason: format!("type {} is not a registered derived type", sv.type_id()),
                    });
                }
                let derived = schema.descriptor(sv.type_id())?;
                check_type_version(self.ctx, derived)?;
                match derived.struct_shape() {
                    Some(shape) => self.walk_members(derived, shape, sv),
                    None => Ok(()),
                }
            }
            TypeShape::ValueCollection(element) => {
                if let Value::List(items) = value {
                    for item in items {
                        self.walk(*element, item)?;
                    }
                }
                Ok(())
            }
            TypeShape::KeyValueCollection { key, value: val } => {
                if let Value::Map(pairs) = value {
                    for (k, v) in pairs {
                        self.walk(*key, k)?;
                        self.walk(*val, v)?;
                    }
                }
                Ok(())
            }
            TypeShape::ConfigRef { target, kind } => {
                let Value::Ref(reference) = value else {
                    return Ok(());
                };
                let target = schema.descriptor(*target)?;
                match kind {
                    RefKind::Ref => self.visitor.visit_config_ref(self.ctx, target, reference),
                    RefKind::ConfigId => self.visitor.visit_config_id(self.ctx, target, reference),
                }
            }
        }
    }

    fn walk_members(
        &mut self,
        desc: &'s TypeDescriptor,
        shape: &'s StructShape,
        sv: &mut StructValue,
    ) -> SerResult<()> {
        let schema = self.schema;
        for (index, member) in shape.members.iter().enumerate() {
            if !schema.contains_references(member.ty)
                || !self.ctx.is_version_in_range(member.added_in, member.removed_in)
            {
                continue;
            }
            let Some(value) = sv.get_mut(&member.name) else {
                continue;
            };
            let saved = self.ctx.enter_member(desc.id, index, member.max_collection_size);
            let result = self.walk(member.ty, value);
            self.ctx.restore_member(saved);
            result?;
        }
        Ok(())
    }
}

/// Visit every reference reachable from `value`.
pub fn traverse_refs<V: ReferenceVisitor + ?Sized>(
    schema: &Schema,
    ty: TypeId,
    value: &mut Value,
    ctx: &mut SerializationContext<'_>,
    visitor: &mut V,
) -> SerResult<()> {
    let mut walker = Walker {
        schema,
        ctx,
        visitor,
    };
    walker.walk(ty, value)
}

/// Resolve every reference reachable from `value` in place.
pub fn resolve_refs(
    schema: &Schema,
    ty: TypeId,
    value: &mut Value,
    ctx: &mut SerializationContext<'_>,
) -> SerResult<()> {
    traverse_refs(schema, ty, value, ctx, &mut ResolveVisitor)
}

/// Visit the references held by the members of each table item.
///
/// Items are config items walked by members, so references inside them are
/// reached even though the item type itself is encoded by key elsewhere.
pub fn traverse_refs_in_table<V: ReferenceVisitor + ?Sized>(
    schema: &Schema,
    item_ty: TypeId,
    items: &mut [Value],
    ctx: &mut SerializationContext<'_>,
    visitor: &mut V,
) -> SerResult<()> {
    let desc = schema.descriptor(item_ty)?;
    let Some(shape) = desc.struct_shape() else {
        return Err(SerError::InvalidValue {
            type_name: desc.name.clone(),
            reason: "table items must be a struct type".into(),
        });
    };
    if !schema.contains_references_by_members(item_ty) {
        return Ok(());
    }
    check_type_version(ctx, desc)?;

    let mut walker = Walker {
        schema,
        ctx,
        visitor,
    };
    for item in items.iter_mut() {
        walker.visitor.visit_table_item(walker.ctx, item)?;
        let target = match item {
            Value::ConfigData(shared) => Arc::make_mut(shared),
            other => other,
        };
        if let Some(sv) = target.as_struct_mut() {
            walker.walk_members(desc, shape, sv)?;
        }
    }
    Ok(())
}

/// Resolve the references held by the members of each table item.
pub fn resolve_refs_in_table(
    schema: &Schema,
    item_ty: TypeId,
    items: &mut [Value],
    ctx: &mut SerializationContext<'_>,
) -> SerResult<()> {
    traverse_refs_in_table(schema, item_ty, items, ctx, &mut ResolveVisitor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ConfigResolver;
    use crate::schema::{SchemaBuilder, StructBuilder};

    #[derive(Default)]
    struct Collect {
        refs: Vec<String>,
        ids: Vec<String>,
    }

    impl ReferenceVisitor for Collect {
        fn visit_config_ref(
            &mut self,
            _ctx: &SerializationContext<'_>,
            target: &TypeDescriptor,
            reference: &mut RefValue,
        ) -> SerResult<()> {
            self.refs.push(format!("{}:{:?}", target.name, reference.key));
            Ok(())
        }

        fn visit_config_id(
            &mut self,
            _ctx: &SerializationContext<'_>,
            target: &TypeDescriptor,
            reference: &RefValue,
        ) -> SerResult<()> {
            self.ids.push(format!("{}:{:?}", target.name, reference.key));
            Ok(())
        }
    }

    fn schema() -> Schema {
        SchemaBuilder::new()
            .add_struct(
                StructBuilder::new("Item")
                    .member(1, "id", "string")
                    .member(2, "price", "i32")
                    .config_key("id", None),
            )
            .reference("ItemRef", "Item")
            .config_id("ItemId", "Item")
            .list("ItemRefs", "ItemRef")
            .add_struct(
                StructBuilder::new("Bag")
                    .member(1, "items", "ItemRefs")
                    .member(2, "favorite", "ItemId")
                    .member(3, "gold", "i32"),
            )
            .build()
            .expect("build")
    }

    #[test]
    fn test_visitor_sees_refs_and_ids() {
        let schema = schema();
        let bag = schema.type_id("Bag").expect("Bag");
        let mut value = Value::Struct(
            StructValue::new(bag)
                .with(
                    "items",
                    vec![
                        Value::Ref(RefValue::from_key("sword")),
                        Value::Null,
                        Value::Ref(RefValue::from_key("shield")),
                    ],
                )
                .with("favorite", RefValue::from_key("sword"))
                .with("gold", 10i32),
        );
        let mut visitor = Collect::default();
        traverse_refs(&schema, bag, &mut value, &mut SerializationContext::default(), &mut visitor)
            .expect("traverse");
        assert_eq!(
            visitor.refs,
            vec!["Item:String(\"sword\")", "Item:String(\"shield\")"]
        );
        assert_eq!(visitor.ids, vec!["Item:String(\"sword\")"]);
    }

    #[test]
    fn test_resolve_refs_in_place() {
        let schema = schema();
        let bag = schema.type_id("Bag").expect("Bag");
        let item = schema.type_id("Item").expect("Item");
        let sword = Value::Struct(StructValue::new(item).with("id", "sword").with("price", 30i32));
        let mut resolver = ConfigResolver::new();
        resolver
            .insert("Item", Value::from("sword"), sword.clone())
            .expect("insert");

        let mut value = Value::Struct(
            StructValue::new(bag).with("items", vec![Value::Ref(RefValue::from_key("sword"))]),
        );
        let mut ctx = SerializationContext::default().with_resolver(&resolver);
        resolve_refs(&schema, bag, &mut value, &mut ctx).expect("resolve");

        let items = value.get_field("items").and_then(Value::as_list).expect("items");
        let resolved = items[0].as_ref_value().and_then(|r| r.resolved.as_deref());
        assert_eq!(resolved, Some(&sword));

        let mut missing = Value::Struct(
            StructValue::new(bag).with("items", vec![Value::Ref(RefValue::from_key("axe"))]),
        );
        let err = resolve_refs(&schema, bag, &mut missing, &mut ctx).expect_err("missing");
        assert!(matches!(err, SerError::UnresolvedReference { reason: "key not found", .. }));
    }
}
