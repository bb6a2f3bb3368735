// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! In-process messaging over plain TCP, with PUB/SUB, PUSH/PULL and
//! REQ/REP socket patterns sharing one wire format (AMP: a
//! length-prefixed, typed-field binary frame).
//!
//! ```no_run
//! use axon::{Endpoint, Field};
//!
//! let puller = Endpoint::create("pull").unwrap();
//! puller.on_message(|msg| println!("got {} fields", msg.len())).unwrap();
//! puller.bind(0).unwrap();
//!
//! let pusher = Endpoint::create("push").unwrap();
//! pusher.connect("127.0.0.1", 9000).unwrap();
//! pusher.send(vec![Field::Str("hello".into())]).unwrap();
//! ```

mod callbacks;
mod codec;
mod config;
mod connection_set;
mod correlator;
mod endpoint;
mod error;
mod field;
mod global;
mod pattern;
mod subscription;
mod transport;

pub use config::Config;
pub use endpoint::Endpoint;
pub use error::{AxonError, Result};
pub use field::{Field, Message};
