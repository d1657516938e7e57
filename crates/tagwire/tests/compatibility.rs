// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Schema evolution: unknown tags, versioned members and types, decode
//! converters and member recovery hooks.

#![allow(clippy::unreadable_literal)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tagwire::{
    deserialize, is_compatible_with_version, serialize, serialize_with_first_compatible_version,
    FailureHook, MemberDef, OnDeserializedHook, Schema, SchemaBuilder, SerError,
    SerializationContext, SerializationFlags, SourceDeserialization, StructBuilder, Value,
    VersionCompatibility, WireType,
};

fn encode(schema: &Schema, name: &str, value: &Value) -> Vec<u8> {
    let ty = schema.type_id(name).expect("type");
    serialize(schema, ty, value, &mut SerializationContext::default()).expect("encode")
}

fn decode(schema: &Schema, name: &str, bytes: &[u8]) -> Result<Value, SerError> {
    let ty = schema.type_id(name).expect("type");
    deserialize(schema, ty, bytes, &mut SerializationContext::default())
}

#[test]
fn test_unknown_tags_are_skipped() {
    let newer = SchemaBuilder::new()
        .list("Names", "string")
        .add_struct(StructBuilder::new("Tiny").member(1, "v", "u8"))
        .add_struct(
            StructBuilder::new("Player")
                .member(1, "name", "string")
                .member(7, "friends", "Names")
                .member(8, "pet", "Tiny")
                .member(2, "level", "i32"),
        )
        .build()
        .expect("newer");
    let older = SchemaBuilder::new()
        .add_struct(
            StructBuilder::new("Player")
                .member(1, "name", "string")
                .member(2, "level", "i32"),
        )
        .build()
        .expect("older");

    let tiny = newer.type_id("Tiny").expect("Tiny");
    let value = Value::Struct(
        newer
            .new_struct("Player")
            .expect("Player")
            .with("name", "Bo")
            .with("friends", vec![Value::from("Al"), Value::from("Cy")])
            .with("pet", tagwire::StructValue::new(tiny).with("v", 3u8))
            .with("level", 12i32),
    );
    let bytes = encode(&newer, "Player", &value);

    let decoded = decode(&older, "Player", &bytes).expect("older reader");
    let expected = Value::Struct(
        older
            .new_struct("Player")
            .expect("Player")
            .with("name", "Bo")
            .with("level", 12i32),
    );
    assert_eq!(decoded, expected);
}

fn versioned_schema() -> Schema {
    SchemaBuilder::new()
        .add_struct(StructBuilder::new("Badge").member(1, "label", "string").added_in(5))
        .add_struct(
            StructBuilder::new("Player")
                .member(1, "name", "string")
                .field(MemberDef::new(2, "title", "string").added_in(3))
                .field(MemberDef::new(3, "legacy", "i32").removed_in(4))
                .member(4, "badge", "Badge"),
        )
        .build()
        .expect("build")
}

#[test]
fn test_members_outside_version_are_omitted() {
    let schema = versioned_schema();
    let ty = schema.type_id("Player").expect("Player");
    let value = Value::Struct(
        schema
            .new_struct("Player")
            .expect("Player")
            .with("name", "Di")
            .with("title", "Sir")
            .with("legacy", 1i32),
    );

    let mut v2 = SerializationContext::default().with_schema_version(Some(2));
    let bytes = serialize(&schema, ty, &value, &mut v2).expect("encode v2");
    let decoded = deserialize(&schema, ty, &bytes, &mut v2).expect("decode v2");
    assert_eq!(decoded.get_field("title"), None);
    assert_eq!(decoded.get_field("legacy"), Some(&Value::I32(1)));

    let mut v4 = SerializationContext::default().with_schema_version(Some(4));
    let bytes = serialize(&schema, ty, &value, &mut v4).expect("encode v4");
    let decoded = deserialize(&schema, ty, &bytes, &mut v4).expect("decode v4");
    assert_eq!(decoded.get_field("title"), Some(&Value::from("Sir")));
    assert_eq!(decoded.get_field("legacy"), None);

    // A v2 reader skips a member it does not know at that version.
    let full =
        serialize(&schema, ty, &value, &mut SerializationContext::default()).expect("encode");
    let decoded = deserialize(&schema, ty, &full, &mut v2).expect("decode at v2");
    assert_eq!(decoded.get_field("title"), None);
    assert_eq!(decoded.get_field("name"), Some(&Value::from("Di")));
}

#[test]
fn test_type_version_mismatch_and_retry() {
    let schema = versioned_schema();
    let ty = schema.type_id("Player").expect("Player");
    let badge = schema.type_id("Badge").expect("Badge");
    let value = Value::Struct(
        schema
            .new_struct("Player")
            .expect("Player")
            .with("name", "Ed")
            .with("badge", tagwire::StructValue::new(badge).with("label", "gold")),
    );

    let mut v4 = SerializationContext::default().with_schema_version(Some(4));
    let err = serialize(&schema, ty, &value, &mut v4).expect_err("Badge needs v5");
    match err {
        SerError::SchemaVersionMismatch {
            type_name,
            current,
            minimum,
        } => {
            assert_eq!(type_name, "Badge");
            assert_eq!(current, Some(4));
            assert_eq!(minimum, 5);
        }
        other => panic!("unexpected error: {other:?}"),
    }

    assert_eq!(
        is_compatible_with_version(&schema, ty, &value, 4, SerializationFlags::IncludeAll)
            .expect("check"),
        VersionCompatibility::RequiresAtLeast(5)
    );
    assert_eq!(
        is_compatible_with_version(&schema, ty, &value, 5, SerializationFlags::IncludeAll)
            .expect("check"),
        VersionCompatibility::Compatible
    );

    let mut ctx = SerializationContext::default();
    let (bytes, version) =
        serialize_with_first_compatible_version(&schema, ty, &value, 1, &mut ctx).expect("retry");
    assert_eq!(version, 5);
    let decoded = deserialize(
        &schema,
        ty,
        &bytes,
        &mut SerializationContext::default().with_schema_version(Some(5)),
    )
    .expect("decode");
    assert_eq!(
        decoded.get_field("badge").and_then(|b| b.get_field("label")),
        Some(&Value::from("gold"))
    );

    let err = deserialize(
        &schema,
        ty,
        &bytes,
        &mut SerializationContext::default().with_schema_version(Some(4)),
    )
    .expect_err("old reader rejects Badge");
    assert!(matches!(err, SerError::SchemaVersionMismatch { minimum: 5, .. }));
}

fn parse_rank(value: Value) -> Result<Value, SerError> {
    match value.as_str() {
        Some("bronze") => Ok(Value::Enum(1)),
        Some("silver") => Ok(Value::Enum(2)),
        Some("gold") => Ok(Value::Enum(3)),
        _ => Err(SerError::InvalidValue {
            type_name: "Rank".into(),
            reason: format!("unknown rank {value:?}"),
        }),
    }
}

fn legacy_schema() -> Schema {
    SchemaBuilder::new()
        .add_struct(StructBuilder::new("LegacyColor").member(1, "code", "i32"))
        .add_struct(
            StructBuilder::new("Player")
                .member(1, "rank", "string")
                .member(2, "color", "LegacyColor")
                .member(3, "level", "string"),
        )
        .build()
        .expect("legacy")
}

fn current_schema() -> Schema {
    SchemaBuilder::new()
        .enumeration("Rank", "u8")
        .enumeration("Color", "i32")
        .add_struct(StructBuilder::new("LegacyColor").member(1, "code", "i32"))
        .add_struct(
            StructBuilder::new("Player")
                .member(1, "rank", "Rank")
                .member(2, "color", "Color")
                .member(3, "level", "i32"),
        )
        .converter("Rank", WireType::String, "string", SourceDeserialization::Normal, parse_rank)
        .converter(
            "Color",
            WireType::Struct,
            "LegacyColor",
            SourceDeserialization::Members,
            |legacy: Value| {
                let code = legacy.get_field("code").and_then(Value::as_i64).unwrap_or(0);
                Ok(Value::Enum(code))
            },
        )
        .build()
        .expect("current")
}

#[test]
fn test_converters_accept_legacy_encodings() {
    let legacy = legacy_schema();
    let current = current_schema();
    let legacy_color = legacy.type_id("LegacyColor").expect("LegacyColor");
    let value = Value::Struct(
        legacy
            .new_struct("Player")
            .expect("Player")
            .with("rank", "silver")
            .with("color", tagwire::StructValue::new(legacy_color).with("code", 7i32)),
    );
    let bytes = encode(&legacy, "Player", &value);

    let decoded = decode(&current, "Player", &bytes).expect("converted");
    assert_eq!(decoded.get_field("rank"), Some(&Value::Enum(2)));
    assert_eq!(decoded.get_field("color"), Some(&Value::Enum(7)));
}

#[test]
fn test_converter_error_propagates() {
    let legacy = legacy_schema();
    let current = current_schema();
    let value = Value::Struct(legacy.new_struct("Player").expect("Player").with("rank", "tin"));
    let bytes = encode(&legacy, "Player", &value);
    let err = decode(&current, "Player", &bytes).expect_err("unknown rank");
    assert!(matches!(err, SerError::InvalidValue { .. }), "got {err:?}");
}

#[test]
fn test_missing_converter_is_protocol_mismatch() {
    let legacy = legacy_schema();
    let current = current_schema();
    let value = Value::Struct(legacy.new_struct("Player").expect("Player").with("level", "ten"));
    let bytes = encode(&legacy, "Player", &value);
    match decode(&current, "Player", &bytes).expect_err("no converter for level") {
        SerError::ProtocolMismatch {
            member,
            expected,
            found,
            ..
        } => {
            assert_eq!(member, "level");
            assert_eq!(expected, WireType::VarInt);
            assert_eq!(found, WireType::String);
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

fn wide_schema() -> Schema {
    SchemaBuilder::new()
        .add_struct(
            StructBuilder::new("Stats")
                .member(1, "rank", "i32")
                .member(2, "after", "string"),
        )
        .build()
        .expect("wide")
}

fn narrow_schema(hook: Option<FailureHook>) -> Schema {
    let mut rank = MemberDef::new(1, "rank", "Rank");
    if let Some(hook) = hook {
        rank = rank.on_failure(hook);
    }
    SchemaBuilder::new()
        .enumeration("Rank", "u8")
        .add_struct(
            StructBuilder::new("Stats")
                .field(rank)
                .member(2, "after", "string"),
        )
        .build()
        .expect("narrow")
}

#[test]
fn test_member_failure_without_hook() {
    let wide = wide_schema();
    let value = Value::Struct(wide.new_struct("Stats").expect("Stats").with("rank", 1000i32));
    let bytes = encode(&wide, "Stats", &value);
    let err = decode(&narrow_schema(None), "Stats", &bytes).expect_err("1000 is not a u8 enum");
    assert!(matches!(err, SerError::MemberDecodeFailure { .. }), "got {err:?}");
}

#[test]
fn test_member_failure_hook_substitutes() {
    let wide = wide_schema();
    let value = Value::Struct(
        wide.new_struct("Stats")
            .expect("Stats")
            .with("rank", 1000i32)
            .with("after", "still read"),
    );
    let bytes = encode(&wide, "Stats", &value);

    let calls = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&calls);
    let hook = FailureHook::new(move |payload, err, ctx| {
        seen.fetch_add(1, Ordering::SeqCst);
        assert_eq!(payload, &[0xD0, 0x0F], "zigzag(1000) as a varint");
        assert!(matches!(err, SerError::MemberDecodeFailure { .. }));
        assert_eq!(ctx.depth(), 0);
        Ok(Value::Enum(0))
    });
    let narrow = narrow_schema(Some(hook));

    let decoded = decode(&narrow, "Stats", &bytes).expect("recovered");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(decoded.get_field("rank"), Some(&Value::Enum(0)));
    assert_eq!(decoded.get_field("after"), Some(&Value::from("still read")));
}

fn labelled_list_schema(hook: FailureHook) -> Schema {
    SchemaBuilder::new()
        .add_struct(
            StructBuilder::new("Node")
                .class()
                .member(1, "value", "i32")
                .field(MemberDef::new(2, "next", "Node").on_failure(hook))
                .member(3, "label", "string"),
        )
        .build()
        .expect("build")
}

fn labelled_chain(schema: &Schema, len: usize) -> Value {
    let mut value = Value::Null;
    for i in (0..len).rev() {
        value = Value::Struct(
            schema
                .new_struct("Node")
                .expect("Node")
                .with("value", i as i32)
                .with("next", value)
                .with("label", format!("n{i}")),
        );
    }
    value
}

#[test]
fn test_member_failure_hook_restores_nested_depth() {
    let calls = Arc::new(AtomicUsize::new(0));
    let depth_seen = Arc::new(AtomicUsize::new(usize::MAX));
    let (seen_calls, seen_depth) = (Arc::clone(&calls), Arc::clone(&depth_seen));
    let hook = FailureHook::new(move |payload, err, ctx| {
        seen_calls.fetch_add(1, Ordering::SeqCst);
        seen_depth.store(ctx.depth() as usize, Ordering::SeqCst);
        assert!(matches!(err, SerError::DepthExceeded { max_depth: 3 }), "got {err:?}");
        assert!(!payload.is_empty());
        Ok(Value::Null)
    });
    let schema = labelled_list_schema(hook);
    let ty = schema.type_id("Node").expect("Node");
    assert!(schema.is_in_cycle(ty));

    let bytes = encode(&schema, "Node", &labelled_chain(&schema, 5));
    let mut ctx = SerializationContext::default().with_max_depth(3);
    let decoded = deserialize(&schema, ty, &bytes, &mut ctx).expect("recovered");

    // The third node's `next` is entered at depth 3 and fails; the counter is
    // back at 3 when the hook runs and the node's label is still read.
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(depth_seen.load(Ordering::SeqCst), 3);
    assert_eq!(ctx.depth(), 0);
    assert_eq!(decoded, labelled_chain(&schema, 3));

    let mut third = &decoded;
    for _ in 0..2 {
        third = third.get_field("next").expect("next");
    }
    assert_eq!(third.get_field("label"), Some(&Value::from("n2")));
    assert_eq!(third.get_field("next"), Some(&Value::Null));
}

#[test]
fn test_on_deserialized_hook() {
    let schema = SchemaBuilder::new()
        .add_struct(
            StructBuilder::new("Name")
                .member(1, "first", "string")
                .member(2, "last", "string")
                .on_deserialized(OnDeserializedHook::new(|sv, params| {
                    let first = sv.get("first").and_then(Value::as_str).unwrap_or_default();
                    let last = sv.get("last").and_then(Value::as_str).unwrap_or_default();
                    let full = format!("{first} {last}");
                    sv.set("full", full);
                    sv.set("version", i64::from(params.schema_version.unwrap_or(0)));
                    Ok(())
                })),
        )
        .build()
        .expect("build");
    let ty = schema.type_id("Name").expect("Name");
    let value = Value::Struct(
        schema
            .new_struct("Name")
            .expect("Name")
            .with("first", "Grace")
            .with("last", "Hopper"),
    );
    let mut ctx = SerializationContext::default().with_schema_version(Some(9));
    let bytes = serialize(&schema, ty, &value, &mut ctx).expect("encode");
    let decoded = deserialize(&schema, ty, &bytes, &mut ctx).expect("decode");
    assert_eq!(decoded.get_field("full"), Some(&Value::from("Grace Hopper")));
    assert_eq!(decoded.get_field("version"), Some(&Value::I64(9)));
}
