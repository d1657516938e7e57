// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Schema-less skipping of encoded values.
//!
//! Used for unknown tags, excluded members and failure-hook payload capture.
//! Runs on an explicit work stack so that hostile nesting cannot exhaust the
//! native stack; every pending item consumes at least one input byte, which
//! bounds the total work by the buffer length.

use super::{WireReader, WireType};
use crate::error::{SerError, SerResult};

enum Pending {
    Value(WireType),
    Members,
    Elements { wire: WireType, remaining: u32 },
    Pairs { key: WireType, value: WireType, remaining: u32 },
    TableItems { remaining: u32 },
}

fn read_count(reader: &mut WireReader<'_>) -> SerResult<Option<u32>> {
    let offset = reader.offset();
    let count = reader.read_var_int32()?;
    match count {
        -1 => Ok(None),
        c if c < -1 => Err(SerError::ReadFailed {
            offset,
            reason: "negative collection count",
        }),
        c => Ok(Some(c as u32)),
    }
}

/// Advance `reader` past one value announced by `wire`.
pub fn skip_wire_type(reader: &mut WireReader<'_>, wire: WireType) -> SerResult<()> {
    let mut stack = vec![Pending::Value(wire)];

    while let Some(item) = stack.pop() {
        match item {
            Pending::Value(wire) => skip_one(reader, wire, &mut stack)?,
            Pending::Members => {
                let member_wire = reader.read_wire_type()?;
                if member_wire != WireType::EndStruct {
                    reader.read_var_uint32()?;
                    stack.push(Pending::Members);
                    stack.push(Pending::Value(member_wire));
                }
            }
            Pending::Elements { wire, remaining } => {
                if remaining > 0 {
                    stack.push(Pending::Elements {
                        wire,
                        remaining: remaining - 1,
                    });
                    stack.push(Pending::Value(wire));
                }
            }
            Pending::Pairs {
                key,
                value,
                remaining,
            } => {
                if remaining > 0 {
                    stack.push(Pending::Pairs {
                        key,
                        value,
                        remaining: remaining - 1,
                    });
                    stack.push(Pending::Value(value));
                    stack.push(Pending::Value(key));
                }
            }
            Pending::TableItems { remaining } => {
                if remaining > 0 {
                    stack.push(Pending::TableItems {
                        remaining: remaining - 1,
                    });
                    stack.push(Pending::Members);
                }
            }
        }
    }
    Ok(())
}

fn skip_one(
    reader: &mut WireReader<'_>,
    wire: WireType,
    stack: &mut Vec<Pending>,
) -> SerResult<()> {
    match wire {
        WireType::VarInt | WireType::VarInt128 => reader.skip_var_int()?,
        WireType::Bits32 => {
            reader.read_bytes(4)?;
        }
        WireType::Bits64 => {
            reader.read_bytes(8)?;
        }
        WireType::Bits128 => {
            reader.read_bytes(16)?;
        }
        WireType::String | WireType::Bytes => {
            reader.read_byte_string(usize::MAX)?;
        }
        WireType::NullableVarInt
        | WireType::NullableVarInt128
        | WireType::NullableBits32
        | WireType::NullableBits64
        | WireType::NullableBits128
        | WireType::NullableStruct => {
            if reader.read_presence()? {
                if let Some(inner) = wire.non_nullable() {
                    stack.push(Pending::Value(inner));
                }
            }
        }
        WireType::Struct => stack.push(Pending::Members),
        WireType::AbstractStruct => {
            if reader.read_var_int()? != 0 {
                stack.push(Pending::Members);
            }
        }
        WireType::ValueCollection => {
            if let Some(remaining) = read_count(reader)? {
                let wire = reader.read_wire_type()?;
                stack.push(Pending::Elements { wire, remaining });
            }
        }
        WireType::KeyValueCollection => {
            if let Some(remaining) = read_count(reader)? {
                let key = reader.read_wire_type()?;
                let value = reader.read_wire_type()?;
                stack.push(Pending::Pairs {
                    key,
                    value,
                    remaining,
                });
            }
        }
        WireType::ObjectTable => {
            if let Some(remaining) = read_count(reader)? {
                stack.push(Pending::TableItems { remaining });
            }
        }
        WireType::EndStruct => {
            return Err(SerError::ReadFailed {
                offset: reader.offset(),
                reason: "unexpected end-of-struct marker",
            })
        }
    }
    Ok(())
}
