// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Wire primitives: wire-type markers, varints, bounded reader/writer.

mod cursor;
mod skip;
pub mod varint;
mod wire_type;

pub use cursor::{WireReader, WireWriter};
pub use skip::skip_wire_type;
pub use wire_type::WireType;
