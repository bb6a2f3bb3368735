// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! Everything that moves bytes on and off the wire for one endpoint: the
//! connection set, plus the Listener and Dialer workers that keep it
//! populated.

mod dialer;
mod listener;

use std::sync::{Arc, Mutex};

pub use dialer::Dialer;
pub use listener::Listener;

use crate::config::Config;
use crate::connection_set::{ConnectionSet, PeerId};
use crate::field::Message;

/// Everything a Listener or Dialer worker needs to report back to the
/// endpoint that owns it: decoded frames, peer lifecycle, bind results,
/// and errors. Implemented by the pattern handler that owns the
/// endpoint's dispatch logic.
pub trait FrameSink: Send + Sync {
    fn on_frame(&self, peer: PeerId, msg: Message);
    fn on_peer_closed(&self, peer: PeerId);
    fn on_bind(&self, port: u16);
    fn on_error(&self, message: String);
}

/// Owns the connection set and every Listener/Dialer worker backing one
/// endpoint. An endpoint can simultaneously bind and connect any number
/// of times; every accepted or dialed peer lands in the same
/// [`ConnectionSet`].
pub struct Transport {
    pub connections: Arc<ConnectionSet>,
    config: Config,
    sink: Arc<dyn FrameSink>,
    listeners: Mutex<Vec<Listener>>,
    dialers: Mutex<Vec<Dialer>>,
}

impl Transport {
    pub fn new(config: Config, sink: Arc<dyn FrameSink>) -> Transport {
        Transport {
            connections: Arc::new(ConnectionSet::new(&config)),
            config,
            sink,
            listeners: Mutex::new(Vec::new()),
            dialers: Mutex::new(Vec::new()),
        }
    }

    /// Spawns a Listener worker for `port` (0 picks an ephemeral port).
    /// Socket setup happens on the worker thread itself; failures are
    /// reported asynchronously through `on_error`, success through
    /// `on_bind`, matching the Listener's own failure contract.
    pub fn bind(&self, port: u16) {
        let listener = Listener::spawn(
            port,
            self.connections.clone(),
            self.sink.clone(),
            self.config.clone(),
        );
        self.listeners.lock().unwrap().push(listener);
    }

    /// Spawns a Dialer worker for `host:port`. The dialer retries forever
    /// on connect failure, so this never reports an error back through
    /// `on_error` for a merely-unreachable peer.
    pub fn connect(&self, host: &str, port: u16) {
        let dialer = Dialer::spawn(
            host.to_owned(),
            port,
            self.connections.clone(),
            self.sink.clone(),
            self.config.clone(),
        );
        self.dialers.lock().unwrap().push(dialer);
    }

    /// A registry check, not a liveness probe: true iff a Dialer for this
    /// exact host/port was created, regardless of whether its TCP
    /// connection currently happens to be up.
    pub fn is_connected(&self, host: &str, port: u16) -> bool {
        self.dialers
            .lock()
            .unwrap()
            .iter()
            .any(|d| d.host() == host && d.port() == port)
    }

    /// Signals every worker to stop and joins them. Blocks for up to
    /// `select_timeout` per worker, the bound each worker's poll loop
    /// uses as its cancellation window.
    pub fn release(&self) {
        let listeners = std::mem::take(&mut *self.listeners.lock().unwrap());
        for listener in listeners {
            listener.shutdown();
        }

        let dialers = std::mem::take(&mut *self.dialers.lock().unwrap());
        for dialer in dialers {
            dialer.shutdown();
        }
    }
}
