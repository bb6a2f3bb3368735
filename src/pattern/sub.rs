// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! SUB receive framing: by convention the first field of a published
//! message is a STRING topic, used for subscription dispatch and then
//! stripped before the generic message callback sees it.

use crate::field::{Field, Message};

/// Splits `msg` into `(topic, rest)` when its first field is a STRING.
/// Returns `(None, msg)` unchanged when it isn't — per the design, a
/// non-STRING first field means no subscription fires, but the generic
/// message callback still sees the whole, untouched message.
pub fn split_topic(mut msg: Message) -> (Option<String>, Message) {
    match msg.first() {
        Some(Field::Str(_)) => {
            let topic = match msg.pop_front() {
                Some(Field::Str(s)) => Some(s),
                _ => unreachable!("first() just confirmed a Str field"),
            };
            (topic, msg)
        }
        _ => (None, msg),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_a_leading_string_topic() {
        let msg = Message::from_fields(vec![
            Field::Str("weather.paris".into()),
            Field::BigInt(21),
        ]);

        let (topic, rest) = split_topic(msg);

        assert_eq!(topic.as_deref(), Some("weather.paris"));
        assert_eq!(rest.fields(), &[Field::BigInt(21)]);
    }

    #[test]
    fn leaves_non_string_first_field_untouched() {
        let msg = Message::from_fields(vec![Field::BigInt(1), Field::Str("x".into())]);
        let (topic, rest) = split_topic(msg.clone());

        assert_eq!(topic, None);
        assert_eq!(rest, msg);
    }
}
