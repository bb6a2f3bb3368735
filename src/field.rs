// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

use serde_json::Value;

/// One typed field of an AMP message, in wire order.
#[derive(Debug, Clone, PartialEq)]
pub enum Field {
    /// Opaque byte sequence.
    Blob(Vec<u8>),
    /// UTF-8 string, no NUL terminator on the wire.
    Str(String),
    /// 64-bit signed integer, little-endian on the wire.
    BigInt(i64),
    /// Serialized JSON value.
    Json(Value),
}

impl Field {
    pub(crate) fn tag(&self) -> u8 {
        match self {
            Field::Blob(_) => 0,
            Field::Str(_) => 1,
            Field::BigInt(_) => 2,
            Field::Json(_) => 3,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Field::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bigint(&self) -> Option<i64> {
        match self {
            Field::BigInt(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_blob(&self) -> Option<&[u8]> {
        match self {
            Field::Blob(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Field::Json(v) => Some(v),
            _ => None,
        }
    }
}

/// An ordered sequence of [`Field`]s. Field order is insertion order and is
/// preserved across encode/decode.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Message(Vec<Field>);

impl Message {
    pub fn new() -> Message {
        Message(Vec::new())
    }

    pub fn from_fields(fields: Vec<Field>) -> Message {
        Message(fields)
    }

    pub fn push(&mut self, field: Field) {
        self.0.push(field);
    }

    pub fn fields(&self) -> &[Field] {
        &self.0
    }

    pub fn into_fields(self) -> Vec<Field> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn first(&self) -> Option<&Field> {
        self.0.first()
    }

    /// Removes and returns the first field, shifting the rest down. Used by
    /// SUB to strip the topic and by REQ/REP to strip the correlation id
    /// from the front... except REQ/REP append/strip at the *back*, see
    /// [`Message::pop`].
    pub(crate) fn pop_front(&mut self) -> Option<Field> {
        if self.0.is_empty() {
            None
        } else {
            Some(self.0.remove(0))
        }
    }

    pub(crate) fn pop(&mut self) -> Option<Field> {
        self.0.pop()
    }
}

impl From<Vec<Field>> for Message {
    fn from(fields: Vec<Field>) -> Message {
        Message(fields)
    }
}
