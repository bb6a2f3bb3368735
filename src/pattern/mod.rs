// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! Role-specific message framing. All six roles share the same wire
//! format and the same AMP codec; what differs is which fields get
//! added or removed around a user's payload and how an incoming frame
//! gets dispatched. PUB and PUSH add or remove nothing, so they have no
//! dedicated submodule here — their behavior is just "which
//! `ConnectionSet` method does `send` call", handled directly in
//! [`crate::endpoint`]. PULL shares SUB's topic-split/dispatch path
//! (see [`Role::subscribes`]) even though it never sends.

pub mod rep;
pub mod req;
pub mod sub;

use crate::error::{AxonError, Result};

/// The six socket roles an endpoint can be created with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Pub,
    Sub,
    Push,
    Pull,
    Req,
    Rep,
}

impl Role {
    pub fn parse(s: &str) -> Result<Role> {
        match s {
            "pub" => Ok(Role::Pub),
            "sub" => Ok(Role::Sub),
            "push" => Ok(Role::Push),
            "pull" => Ok(Role::Pull),
            "req" => Ok(Role::Req),
            "rep" => Ok(Role::Rep),
            other => Err(AxonError::InvalidRole(other.to_owned())),
        }
    }

    /// Whether `subscribe`/`unsubscribe` and topic dispatch apply to this
    /// role. SUB and PULL are treated identically here, matching the
    /// original source's own `axon_subscribe` role check.
    pub fn subscribes(self) -> bool {
        matches!(self, Role::Sub | Role::Pull)
    }
}
