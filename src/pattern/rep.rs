// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! REP receive/reply framing. The wire mechanism is identical to REQ's —
//! strip the trailing correlation id on the way in, append it again on
//! the way out — so this module reuses [`crate::pattern::req`] rather
//! than duplicating it; what's distinct about REP is *when* the append
//! happens: only if the user's request callback actually produced a
//! reply, and always back over the socket the request arrived on.

use crate::field::Message;

pub use crate::pattern::req::strip_correlation_id;

pub fn append_correlation_id(reply: Message, id: &str) -> Message {
    crate::pattern::req::append_correlation_id(reply, id)
}
