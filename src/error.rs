// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

use std::io;

use thiserror::Error;

/// Every way an endpoint operation can fail, per the error surface in the
/// library's design: bind failures and the per-endpoint error callback are
/// the only errors ever visible outside a single call; everything else
/// (codec drops, send failures on broadcast, dialer retries) stays inside
/// the transport.
#[derive(Debug, Error)]
pub enum AxonError {
    #[error("invalid role: {0}")]
    InvalidRole(String),

    #[error("invalid subscription pattern: {0}")]
    InvalidPattern(String),

    #[error("sock: unable to create listenner socket")]
    ListenerSocketCreate(#[source] io::Error),

    #[error("sock: unable to set socket option SO_REUSEADDR")]
    SetReuseAddr(#[source] io::Error),

    #[error("sock: unable to bind socket")]
    BindFailed(#[source] io::Error),

    #[error("sock: unable to listen socket")]
    ListenFailed(#[source] io::Error),

    #[error("amp: message is malformed")]
    Malformed,

    #[error("amp: a message may carry at most 15 fields")]
    TooManyFields,

    #[error("amp: a message must carry at least one field")]
    EmptyMessage,

    #[error("send failed")]
    SendFailed(#[source] io::Error),

    #[error("request timed out")]
    Timeout,

    #[error("operation not applicable to this role")]
    NotApplicable,

    #[error("endpoint is releasing or already released")]
    EndpointClosed,

    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, AxonError>;
