// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! The AMP wire codec: a length-prefixed, typed-field message format.
//!
//! ```text
//! byte 0         : metaByte = (version<<4) | fieldCount      // version = 1
//! for each field : header byte = (isBigArg<<7) | typeTag
//!                  length field : 1 byte if isBigArg=0, else 4 bytes big-endian
//!                  payload      : length bytes
//! ```

use byteorder::{BigEndian, ByteOrder, LittleEndian};

use crate::error::{AxonError, Result};
use crate::field::{Field, Message};

const VERSION: u8 = 1;
pub const MAX_FIELDS: usize = 15;

const TAG_BLOB: u8 = 0;
const TAG_STRING: u8 = 1;
const TAG_BIGINT: u8 = 2;
const TAG_JSON: u8 = 3;

const BIG_ARG_FLAG: u8 = 0x80;

/// Encodes `msg` into a single contiguous frame. Fails with
/// [`AxonError::TooManyFields`] if `msg` carries more than
/// [`MAX_FIELDS`] fields, and with [`AxonError::EmptyMessage`] if it
/// carries none (a message is only allowed to be empty transiently,
/// during construction).
pub fn encode(msg: &Message) -> Result<Vec<u8>> {
    let fields = msg.fields();

    if fields.is_empty() {
        return Err(AxonError::EmptyMessage);
    }
    if fields.len() > MAX_FIELDS {
        return Err(AxonError::TooManyFields);
    }

    let meta = (VERSION << 4) | (fields.len() as u8);
    let mut out = Vec::with_capacity(16);
    out.push(meta);

    for field in fields {
        encode_field(&mut out, field)?;
    }

    Ok(out)
}

fn encode_field(out: &mut Vec<u8>, field: &Field) -> Result<()> {
    let payload = match field {
        Field::Blob(b) => b.clone(),
        Field::Str(s) => s.as_bytes().to_vec(),
        Field::BigInt(i) => {
            let mut buf = [0u8; 8];
            LittleEndian::write_i64(&mut buf, *i);
            buf.to_vec()
        }
        Field::Json(v) => serde_json::to_vec(v).map_err(|_| AxonError::Malformed)?,
    };

    let is_big = payload.len() > u8::MAX as usize;
    let header = (if is_big { BIG_ARG_FLAG } else { 0 }) | field.tag();
    out.push(header);

    if is_big {
        if payload.len() > u32::MAX as usize {
            return Err(AxonError::Malformed);
        }
        let mut len_buf = [0u8; 4];
        BigEndian::write_u32(&mut len_buf, payload.len() as u32);
        out.extend_from_slice(&len_buf);
    } else {
        out.push(payload.len() as u8);
    }

    out.extend_from_slice(&payload);
    Ok(())
}

/// Decodes exactly one frame from the front of `buf`, returning the message
/// and the number of bytes consumed so the caller can loop while a read
/// buffer still holds more (possibly coalesced) frames. Fails with
/// [`AxonError::Malformed`] if the buffer is truncated mid-frame or a
/// declared length runs past the end of the buffer.
///
/// This collapses [`FrameStatus::Incomplete`] into the same error as a
/// genuinely bad frame, matching the documented contract. The read loop
/// that feeds a growing per-connection buffer from the network uses
/// [`try_decode`] directly so it can tell "wait for more bytes" apart from
/// "this peer sent garbage, drop it".
pub fn decode(buf: &[u8]) -> Result<(Message, usize)> {
    match try_decode(buf) {
        FrameStatus::Frame(msg, consumed) => Ok((msg, consumed)),
        FrameStatus::Incomplete | FrameStatus::Malformed => Err(AxonError::Malformed),
    }
}

/// Outcome of attempting to decode one frame from the front of a buffer
/// that may hold a partial read off the wire.
pub(crate) enum FrameStatus {
    Frame(Message, usize),
    /// Not enough bytes yet for a full frame; wait for the next read.
    Incomplete,
    /// The bytes present can never form a valid frame, regardless of how
    /// many more arrive.
    Malformed,
}

pub(crate) fn try_decode(buf: &[u8]) -> FrameStatus {
    if buf.is_empty() {
        return FrameStatus::Incomplete;
    }

    let meta = buf[0];
    let count = (meta & 0x0F) as usize;

    if count == 0 {
        return FrameStatus::Malformed;
    }

    let mut pos = 1usize;
    let mut fields = Vec::with_capacity(count);

    for _ in 0..count {
        match decode_field(&buf[pos..]) {
            FieldStatus::Field(field, consumed) => {
                fields.push(field);
                pos += consumed;
            }
            FieldStatus::Incomplete => return FrameStatus::Incomplete,
            FieldStatus::Malformed => return FrameStatus::Malformed,
        }
    }

    FrameStatus::Frame(Message::from_fields(fields), pos)
}

enum FieldStatus {
    Field(Field, usize),
    Incomplete,
    Malformed,
}

fn decode_field(buf: &[u8]) -> FieldStatus {
    if buf.is_empty() {
        return FieldStatus::Incomplete;
    }

    let header = buf[0];
    let is_big = header & BIG_ARG_FLAG != 0;
    let tag = header & !BIG_ARG_FLAG;
    let mut pos = 1usize;

    let len = if is_big {
        if buf.len() < pos + 4 {
            return FieldStatus::Incomplete;
        }
        let l = BigEndian::read_u32(&buf[pos..pos + 4]) as usize;
        pos += 4;
        l
    } else {
        if buf.len() < pos + 1 {
            return FieldStatus::Incomplete;
        }
        let l = buf[pos] as usize;
        pos += 1;
        l
    };

    if buf.len() < pos + len {
        return FieldStatus::Incomplete;
    }

    let payload = &buf[pos..pos + len];
    pos += len;

    let field = match tag {
        TAG_BLOB => Field::Blob(payload.to_vec()),
        TAG_STRING => match String::from_utf8(payload.to_vec()) {
            Ok(s) => Field::Str(s),
            Err(_) => return FieldStatus::Malformed,
        },
        TAG_BIGINT => {
            if len != 8 {
                return FieldStatus::Malformed;
            }
            Field::BigInt(LittleEndian::read_i64(payload))
        }
        TAG_JSON => match serde_json::from_slice(payload) {
            Ok(value) => Field::Json(value),
            Err(_) => return FieldStatus::Malformed,
        },
        _ => return FieldStatus::Malformed,
    };

    FieldStatus::Field(field, pos)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn roundtrip(msg: Message) {
        let encoded = encode(&msg).unwrap();
        let (decoded, consumed) = decode(&encoded).unwrap();

        assert_eq!(consumed, encoded.len());
        assert_eq!(decoded, msg);
    }

    #[test]
    fn roundtrips_every_field_type() {
        roundtrip(Message::from_fields(vec![
            Field::Blob(vec![1, 2, 3]),
            Field::Str("topic1".into()),
            Field::BigInt(-42),
            Field::Json(json!({"payload": "A"})),
        ]));
    }

    #[test]
    fn roundtrips_large_blob_using_big_arg() {
        let big = vec![7u8; 1000];
        roundtrip(Message::from_fields(vec![Field::Blob(big)]));
    }

    #[test]
    fn rejects_more_than_fifteen_fields() {
        let fields = (0..16).map(Field::BigInt).collect();
        let msg = Message::from_fields(fields);

        assert!(matches!(encode(&msg), Err(AxonError::TooManyFields)));
    }

    #[test]
    fn rejects_empty_message() {
        assert!(matches!(encode(&Message::new()), Err(AxonError::EmptyMessage)));
    }

    #[test]
    fn decodes_coalesced_frames_independently() {
        let m1 = Message::from_fields(vec![Field::BigInt(1)]);
        let m2 = Message::from_fields(vec![Field::Str("second".into())]);
        let e1 = encode(&m1).unwrap();
        let e2 = encode(&m2).unwrap();

        let mut both = e1.clone();
        both.extend_from_slice(&e2);

        let (decoded1, consumed1) = decode(&both).unwrap();
        assert_eq!(consumed1, e1.len());
        assert_eq!(decoded1, m1);

        let (decoded2, consumed2) = decode(&both[consumed1..]).unwrap();
        assert_eq!(consumed2, e2.len());
        assert_eq!(decoded2, m2);
    }

    #[test]
    fn truncated_frame_is_malformed() {
        let msg = Message::from_fields(vec![Field::Str("hello".into())]);
        let encoded = encode(&msg).unwrap();

        assert!(matches!(
            decode(&encoded[..encoded.len() - 2]),
            Err(AxonError::Malformed)
        ));
    }

    #[test]
    fn length_past_buffer_end_is_malformed() {
        // meta: version 1, one field; field header: BLOB, small-arg; length
        // 200 but only 5 payload bytes actually follow.
        let mut buf = vec![(1 << 4) | 1, TAG_BLOB, 200];
        buf.extend_from_slice(&[0u8; 5]);

        assert!(matches!(decode(&buf), Err(AxonError::Malformed)));
    }
}
