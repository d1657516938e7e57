// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Config items, tables and reference resolution.

use std::sync::Arc;
use tagwire::{
    deserialize, deserialize_table, resolve_refs_in_table, serialize, serialize_table,
    traverse_refs_in_table, ConfigResolver, RefValue, ReferenceVisitor, Schema, SchemaBuilder,
    SchemaError, SerError, SerResult, SerializationContext, StructBuilder, StructValue, Value,
    WireType,
};

fn game_schema() -> Schema {
    SchemaBuilder::new()
        .add_struct(
            StructBuilder::new("Item")
                .member(1, "id", "string")
                .member(2, "price", "i32")
                .config_key("id", None),
        )
        .add_struct(
            StructBuilder::new("Weapon")
                .member(1, "code", "i32")
                .member(2, "damage", "u16")
                .config_key("code", Some(Value::I32(-1))),
        )
        .add_struct(
            StructBuilder::new("Recipe")
                .member(1, "name", "string")
                .member(2, "output", "ItemRef")
                .config_key("name", None),
        )
        .reference("ItemRef", "Item")
        .config_id("ItemId", "Item")
        .list("ItemRefs", "ItemRef")
        .add_struct(
            StructBuilder::new("Shop")
                .member(1, "featured", "Item")
                .member(2, "weapon", "Weapon")
                .member(3, "stock", "ItemRefs")
                .member(4, "sku", "ItemId"),
        )
        .build()
        .expect("build")
}

fn item(schema: &Schema, id: &str, price: i32) -> StructValue {
    schema
        .new_struct("Item")
        .expect("Item")
        .with("id", id)
        .with("price", price)
}

fn catalog(schema: &Schema) -> Vec<Value> {
    vec![
        Value::Struct(item(schema, "sword", 30)),
        Value::Struct(item(schema, "shield", 12)),
    ]
}

#[test]
fn test_reference_sets() {
    let schema = game_schema();
    let id = |name: &str| schema.type_id(name).expect("type");
    assert!(schema.contains_references(id("Shop")));
    assert!(schema.contains_references(id("ItemRefs")));
    assert!(!schema.contains_references(id("Item")));
    assert!(schema.contains_references_by_members(id("Recipe")));
    assert!(!schema.contains_references_by_members(id("Item")));
    assert_eq!(schema.wire_type(id("Item")).expect("wire"), WireType::String);
    assert_eq!(schema.wire_type(id("Weapon")).expect("wire"), WireType::VarInt);
}

#[test]
fn test_table_roundtrip_and_resolution() {
    let schema = game_schema();
    let item_ty = schema.type_id("Item").expect("Item");
    let shop = schema.type_id("Shop").expect("Shop");
    let items = catalog(&schema);

    let mut ctx = SerializationContext::default();
    let table = serialize_table(&schema, item_ty, &items, None, &mut ctx).expect("table");
    assert_eq!(&table[..2], &[WireType::ObjectTable as u8, 0x04]);
    let loaded = deserialize_table(&schema, item_ty, &table, None, &mut ctx).expect("load");
    assert_eq!(loaded, items);

    let mut resolver = ConfigResolver::new();
    resolver
        .insert_table(&schema, item_ty, &loaded)
        .expect("register");
    assert_eq!(resolver.len(), 2);

    let value = Value::Struct(
        schema
            .new_struct("Shop")
            .expect("Shop")
            .with("featured", item(&schema, "sword", 30))
            .with(
                "stock",
                vec![
                    Value::Ref(RefValue::from_key("sword")),
                    Value::Ref(RefValue::from_key("shield")),
                ],
            )
            .with("sku", RefValue::from_key("shield")),
    );
    let bytes = serialize(&schema, shop, &value, &mut ctx).expect("encode");

    let mut ctx = SerializationContext::default().with_resolver(&resolver);
    let decoded = deserialize(&schema, shop, &bytes, &mut ctx).expect("decode");

    match decoded.get_field("featured") {
        Some(Value::ConfigData(shared)) => assert_eq!(**shared, items[0]),
        other => panic!("unexpected featured value: {other:?}"),
    }
    let price = decoded
        .get_field("featured")
        .and_then(|f| f.get_field("price"))
        .cloned();
    assert_eq!(price, Some(Value::I32(30)));

    let stock = decoded.get_field("stock").and_then(Value::as_list).expect("stock");
    let shield = stock[1].as_ref_value().expect("ref");
    assert_eq!(shield.resolved.as_deref(), Some(&items[1]));

    let sku = decoded.get_field("sku").and_then(Value::as_ref_value).expect("sku");
    assert_eq!(*sku.key, Value::from("shield"));
    assert!(!sku.is_resolved(), "key-only references are never resolved");
}

#[test]
fn test_config_data_requires_resolver() {
    let schema = game_schema();
    let shop = schema.type_id("Shop").expect("Shop");
    let value = Value::Struct(
        schema
            .new_struct("Shop")
            .expect("Shop")
            .with("featured", RefValue::from_key("sword")),
    );
    let mut ctx = SerializationContext::default();
    let bytes = serialize(&schema, shop, &value, &mut ctx).expect("encode");

    match deserialize(&schema, shop, &bytes, &mut ctx).expect_err("no resolver") {
        SerError::UnresolvedReference { target, reason, .. } => {
            assert_eq!(target, "Item");
            assert_eq!(reason, "no reference resolver");
        }
        other => panic!("unexpected error: {other:?}"),
    }

    let empty = ConfigResolver::new();
    let mut ctx = SerializationContext::default().with_resolver(&empty);
    let err = deserialize(&schema, shop, &bytes, &mut ctx).expect_err("unknown key");
    assert!(
        matches!(err, SerError::UnresolvedReference { reason: "key not found", .. }),
        "got {err:?}"
    );
}

#[test]
fn test_refs_stay_unresolved_without_resolver() {
    let schema = game_schema();
    let shop = schema.type_id("Shop").expect("Shop");
    let value = Value::Struct(
        schema
            .new_struct("Shop")
            .expect("Shop")
            .with("stock", vec![Value::Ref(RefValue::from_key("sword")), Value::Null]),
    );
    let mut ctx = SerializationContext::default();
    let bytes = serialize(&schema, shop, &value, &mut ctx).expect("encode");
    let decoded = deserialize(&schema, shop, &bytes, &mut ctx).expect("decode");
    assert_eq!(decoded, value);

    let mut resolver = ConfigResolver::new();
    resolver
        .insert("Item", Value::from("shield"), Value::Struct(item(&schema, "shield", 12)))
        .expect("insert");
    let mut ctx = SerializationContext::default().with_resolver(&resolver);
    let err = deserialize(&schema, shop, &bytes, &mut ctx).expect_err("sword is missing");
    assert!(matches!(err, SerError::UnresolvedReference { .. }), "got {err:?}");
}

#[test]
fn test_null_sentinel_key() {
    let schema = game_schema();
    let shop = schema.type_id("Shop").expect("Shop");
    let value = Value::Struct(
        schema
            .new_struct("Shop")
            .expect("Shop")
            .with("weapon", Value::Null)
            .with("featured", Value::Null),
    );
    let mut ctx = SerializationContext::default();
    let bytes = serialize(&schema, shop, &value, &mut ctx).expect("encode");
    assert_eq!(
        bytes,
        vec![
            WireType::Struct as u8,
            WireType::String as u8,
            1,
            0x01, // null string key
            WireType::VarInt as u8,
            2,
            0x01, // sentinel -1
            WireType::EndStruct as u8,
        ]
    );
    assert_eq!(deserialize(&schema, shop, &bytes, &mut ctx).expect("decode"), value);
}

#[test]
fn test_null_without_sentinel_is_rejected() {
    let schema = SchemaBuilder::new()
        .add_struct(
            StructBuilder::new("Zone")
                .member(1, "id", "u32")
                .config_key("id", None),
        )
        .add_struct(StructBuilder::new("Spawn").member(1, "zone", "Zone"))
        .build()
        .expect("build");
    let spawn = schema.type_id("Spawn").expect("Spawn");
    let value = Value::Struct(schema.new_struct("Spawn").expect("Spawn").with("zone", Value::Null));
    let err = serialize(&schema, spawn, &value, &mut SerializationContext::default())
        .expect_err("u32 key cannot encode null");
    assert!(matches!(err, SerError::InvalidValue { .. }), "got {err:?}");
}

#[test]
fn test_reference_target_must_be_config_item() {
    let err = SchemaBuilder::new()
        .add_struct(StructBuilder::new("Plain").member(1, "v", "i32"))
        .reference("PlainRef", "Plain")
        .build()
        .expect_err("Plain has no key");
    assert!(matches!(err, SchemaError::InvalidReference { .. }), "got {err:?}");
}

#[test]
fn test_table_limits_and_null_table() {
    let schema = game_schema();
    let item_ty = schema.type_id("Item").expect("Item");
    let items = catalog(&schema);
    let mut ctx = SerializationContext::default();

    let err = serialize_table(&schema, item_ty, &items, Some(1), &mut ctx).expect_err("limit");
    assert!(matches!(err, SerError::CollectionTooLarge { count: 2, max: 1, .. }), "got {err:?}");

    let table = serialize_table(&schema, item_ty, &items, None, &mut ctx).expect("table");
    let err = deserialize_table(&schema, item_ty, &table, Some(1), &mut ctx).expect_err("limit");
    assert!(matches!(err, SerError::CollectionTooLarge { .. }), "got {err:?}");

    let null_table = [WireType::ObjectTable as u8, 0x01];
    assert!(deserialize_table(&schema, item_ty, &null_table, None, &mut ctx)
        .expect("null table")
        .is_empty());
}

#[derive(Default)]
struct CountItems {
    items: usize,
    refs: usize,
}

impl ReferenceVisitor for CountItems {
    fn visit_config_ref(
        &mut self,
        _ctx: &SerializationContext<'_>,
        _target: &tagwire::schema::TypeDescriptor,
        _reference: &mut RefValue,
    ) -> SerResult<()> {
        self.refs += 1;
        Ok(())
    }

    fn visit_table_item(
        &mut self,
        _ctx: &SerializationContext<'_>,
        _item: &mut Value,
    ) -> SerResult<()> {
        self.items += 1;
        Ok(())
    }
}

#[test]
fn test_traversal_in_tables() {
    let schema = game_schema();
    let item_ty = schema.type_id("Item").expect("Item");
    let recipe_ty = schema.type_id("Recipe").expect("Recipe");
    let recipes = vec![
        Value::Struct(
            schema
                .new_struct("Recipe")
                .expect("Recipe")
                .with("name", "forge")
                .with("output", RefValue::from_key("sword")),
        ),
        Value::Struct(
            schema
                .new_struct("Recipe")
                .expect("Recipe")
                .with("name", "nothing")
                .with("output", Value::Null),
        ),
    ];
    let mut ctx = SerializationContext::default();
    let table = serialize_table(&schema, recipe_ty, &recipes, None, &mut ctx).expect("table");
    let mut loaded = deserialize_table(&schema, recipe_ty, &table, None, &mut ctx).expect("load");
    assert_eq!(loaded, recipes);

    let mut counter = CountItems::default();
    traverse_refs_in_table(&schema, recipe_ty, &mut loaded, &mut ctx, &mut counter)
        .expect("traverse");
    assert_eq!(counter.items, 2);
    assert_eq!(counter.refs, 1, "null references are not visited");

    let mut resolver = ConfigResolver::new();
    resolver
        .insert_table(&schema, item_ty, &catalog(&schema))
        .expect("register");
    let mut ctx = SerializationContext::default().with_resolver(&resolver);
    resolve_refs_in_table(&schema, recipe_ty, &mut loaded, &mut ctx).expect("resolve");
    let output = loaded[0]
        .get_field("output")
        .and_then(Value::as_ref_value)
        .and_then(|r| r.resolved.clone());
    assert_eq!(output, Some(Arc::new(catalog(&schema)[0].clone())));

    // Items without references are not walked at all.
    let mut items = catalog(&schema);
    let mut counter = CountItems::default();
    traverse_refs_in_table(&schema, item_ty, &mut items, &mut ctx, &mut counter).expect("traverse");
    assert_eq!(counter.items, 0);
}
