// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! REQ send/receive framing: appends a correlation id field before
//! encoding a request, and strips it again from whatever comes back on
//! the same connection so the endpoint knows which pending slot to
//! fulfil.
//!
//! The id is reduced from the original `"<pid>:<seq>"` to just the
//! decimal `seq`: there is exactly one process here, so `pid` never
//! disambiguates anything.

use crate::field::{Field, Message};

pub fn append_correlation_id(mut msg: Message, id: &str) -> Message {
    msg.push(Field::Str(id.to_owned()));
    msg
}

/// Strips the trailing correlation id field from a received frame. If
/// the last field isn't a STRING, the frame cannot be a REQ/REP reply
/// and is left untouched (callers drop it as unroutable).
pub fn strip_correlation_id(mut msg: Message) -> Option<(String, Message)> {
    match msg.pop() {
        Some(Field::Str(id)) => Some((id, msg)),
        Some(other) => {
            msg.push(other);
            None
        }
        None => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn appends_and_strips_round_trip() {
        let msg = Message::from_fields(vec![Field::Str("hello".into())]);
        let framed = append_correlation_id(msg, "42");

        let (id, stripped) = strip_correlation_id(framed).unwrap();

        assert_eq!(id, "42");
        assert_eq!(stripped.fields(), &[Field::Str("hello".into())]);
    }

    #[test]
    fn non_string_trailing_field_is_left_alone() {
        let msg = Message::from_fields(vec![Field::BigInt(7)]);
        assert!(strip_correlation_id(msg).is_none());
    }
}
