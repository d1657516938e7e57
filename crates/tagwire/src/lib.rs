// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # tagwire - schema-driven tagged binary serialization
//!
//! Encodes and decodes dynamically typed object graphs to a compact,
//! self-describing tagged wire format, driven by a schema compiled once and
//! shared read-only between threads.
//!
//! ## Quick Start
//!
//! ```rust
//! use tagwire::{
//!     deserialize, serialize, SchemaBuilder, SerializationContext, StructBuilder, Value,
//! };
//!
//! # fn main() -> Result<(), tagwire::SerError> {
//! let schema = SchemaBuilder::new()
//!     .add_struct(
//!         StructBuilder::new("Player")
//!             .member(1, "name", "string")
//!             .member(2, "level", "i32"),
//!     )
//!     .build()?;
//!
//! let player = schema.new_struct("Player")?.with("name", "Alice").with("level", 7i32);
//! let ty = player.type_id();
//! let value = Value::Struct(player);
//!
//! let mut ctx = SerializationContext::default();
//! let bytes = serialize(&schema, ty, &value, &mut ctx)?;
//! assert_eq!(deserialize(&schema, ty, &bytes, &mut ctx)?, value);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! SchemaBuilder -> descriptors -> type graph analysis -> Schema (immutable)
//!                                  (cycles, depth)         |
//!                 +----------------------------------------+--------------+
//!                 |                      |                                |
//!            serialize             deserialize                     traverse_refs
//!        (WireWriter, tags)   (WireReader, skip, converters)   (reference subset only)
//! ```
//!
//! Only types that sit on a cycle of the type graph carry a runtime depth
//! counter; everything else is bounded statically when the schema is built.
//!
//! ## Key Types
//!
//! | Type | Description |
//! |------|-------------|
//! | [`SchemaBuilder`] | Declares types by name and compiles them |
//! | [`Schema`] | Compiled descriptors plus graph analysis results |
//! | [`Value`] | Dynamic value passed to and returned by the engine |
//! | [`SerializationContext`] | Per-call limits, version, exclusion flags, resolver |
//! | [`SerializationSettings`] | TOML-loadable defaults for contexts |

/// Per-call context, exclusion presets and reference resolvers.
pub mod context;
/// Serialization settings loaded from TOML.
pub mod config;
/// Encode/decode engine, tables and version helpers.
pub mod engine;
/// Error types.
pub mod error;
/// Type graph analysis (Tarjan SCC, condensed longest path).
pub mod graph;
/// Type descriptors and the schema builder.
pub mod schema;
/// Reference traversal.
pub mod traverse;
/// Dynamic value model.
pub mod value;
/// Wire types, varints, reader/writer and skipping.
pub mod wire;

pub use config::{ConfigError, SerializationSettings};
pub use context::{ConfigResolver, ReferenceResolver, SerializationContext, SerializationFlags};
pub use engine::{
    clone_value, deserialize, deserialize_table, is_compatible_with_version, peek_derived_type,
    peek_typecode, serialize, serialize_table, serialize_with_first_compatible_version,
    VersionCompatibility,
};
pub use error::{SchemaError, SerError, SerResult};
pub use schema::{
    AbstractBuilder, FailureHook, MemberDef, MemberFlags, OnDeserializedHook, PrimitiveKind,
    Schema, SchemaBuilder, SourceDeserialization, StructBuilder, TypeId,
};
pub use traverse::{
    resolve_refs, resolve_refs_in_table, traverse_refs, traverse_refs_in_table, ReferenceVisitor,
    ResolveVisitor,
};
pub use value::{RefValue, StructValue, Value};
pub use wire::WireType;
