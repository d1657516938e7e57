// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Error types for schema compilation and tagged encode/decode.

use crate::wire::WireType;
use thiserror::Error;

/// Fatal schema compilation failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("duplicate type name '{0}'")]
    DuplicateType(String),

    #[error("type '{referrer}' refers to unknown type '{name}'")]
    UnknownType { referrer: String, name: String },

    #[error("duplicate tag id {tag} in '{type_name}'")]
    DuplicateTag { type_name: String, tag: u32 },

    #[error("invalid tag id {tag} in '{type_name}' (tag ids start at 1)")]
    InvalidTag { type_name: String, tag: u32 },

    #[error("duplicate member name '{member}' in '{type_name}'")]
    DuplicateMember { type_name: String, member: String },

    #[error("invalid member '{member}' in '{type_name}': {reason}")]
    InvalidMember {
        type_name: String,
        member: String,
        reason: String,
    },

    #[error("duplicate derived typecode {typecode} in '{type_name}'")]
    DuplicateTypecode { type_name: String, typecode: i32 },

    #[error("invalid derived typecode {typecode} in '{type_name}' (must be positive)")]
    InvalidTypecode { type_name: String, typecode: i32 },

    #[error("derived type '{derived}' of '{base}' must be a concrete struct")]
    InvalidDerivedType { base: String, derived: String },

    #[error("'{type_name}' cannot wrap '{inner}' as nullable")]
    InvalidNullable { type_name: String, inner: String },

    #[error("enum '{type_name}' has non-integer underlying type '{underlying}'")]
    InvalidEnum { type_name: String, underlying: String },

    #[error("invalid config reference '{type_name}': {reason}")]
    InvalidReference { type_name: String, reason: String },

    #[error("invalid decode converter on '{type_name}': {reason}")]
    InvalidConverter { type_name: String, reason: String },

    #[error("edge {from} -> {to} points backwards; input is not topologically ordered")]
    NotTopologicallyOrdered { from: usize, to: usize },

    #[error("type graph depth {depth} exceeds maximum allowed {max} (ignoring types in cycles)")]
    DepthLimitExceeded { depth: usize, max: usize },
}

/// Encode, decode and traversal failures.
#[derive(Debug, Error)]
pub enum SerError {
    #[error("schema build failed: {0}")]
    SchemaBuild(#[from] SchemaError),

    #[error("wire type mismatch in '{member}' of '{type_name}': expected {expected}, got {found}")]
    ProtocolMismatch {
        member: String,
        type_name: String,
        expected: WireType,
        found: WireType,
    },

    #[error("invalid wire type byte 0x{byte:02x} at offset {offset}")]
    InvalidWireType { offset: usize, byte: u8 },

    #[error("type '{type_name}' needs schema version {minimum}, active is {current:?}")]
    SchemaVersionMismatch {
        type_name: String,
        current: Option<u32>,
        minimum: u32,
    },

    #[error("unknown derived typecode {typecode} for '{type_name}'")]
    UnknownDerivedType { type_name: String, typecode: i64 },

    #[error("maximum serialization depth {max_depth} exceeded")]
    DepthExceeded { max_depth: u32 },

    #[error("invalid collection size {count} in '{member}' (maximum allowed is {max})")]
    CollectionTooLarge {
        member: String,
        count: i64,
        max: usize,
    },

    #[error("invalid {what} length {len} at offset {offset} (maximum allowed is {max})")]
    PayloadTooLarge {
        what: &'static str,
        offset: usize,
        len: i64,
        max: usize,
    },

    #[error("unresolved reference to '{target}' with key {key}: {reason}")]
    UnresolvedReference {
        target: String,
        key: String,
        reason: &'static str,
    },

    #[error("failed to decode member '{member}': {reason}")]
    MemberDecodeFailure { member: String, reason: String },

    #[error("read failed at offset {offset}: {reason}")]
    ReadFailed { offset: usize, reason: &'static str },

    #[error("value does not match type '{type_name}': {reason}")]
    InvalidValue { type_name: String, reason: String },

    #[error("unknown type id {0}")]
    UnknownTypeId(u32),
}

pub type SerResult<T> = core::result::Result<T, SerError>;
