// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! The public façade: a single `Endpoint` type parameterised by [`Role`]
//! at creation, the way the library's single abstraction is described —
//! one socket-like object whose operations are either meaningful for its
//! role or fail with [`AxonError::NotApplicable`].

use std::io;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::callbacks::Callbacks;
use crate::codec;
use crate::config::Config;
use crate::connection_set::{ConnectionSet, PeerId};
use crate::correlator::RequestCorrelator;
use crate::error::{AxonError, Result};
use crate::field::{Field, Message};
use crate::global::IdSequence;
use crate::pattern::{self, Role};
use crate::subscription::SubscriptionTable;
use crate::transport::{FrameSink, Transport};

type MessageCallback = dyn Fn(Message) + Send + Sync;
type RequestCallback = dyn Fn(Message) -> Option<Message> + Send + Sync;

const STATE_NEW: u8 = 0;
const STATE_ACTIVE: u8 = 1;
const STATE_RELEASING: u8 = 2;
const STATE_DEAD: u8 = 3;

/// Everything an endpoint's background workers need a handle to, wrapped
/// in one `Arc` so it can be handed to the `Transport` as a
/// [`FrameSink`] before the `Endpoint` itself — which owns the
/// `Transport` — even exists.
struct Shared {
    role: Role,
    callbacks: Callbacks,
    message_callback: Mutex<Option<Arc<MessageCallback>>>,
    request_callback: Mutex<Option<Arc<RequestCallback>>>,
    subscriptions: SubscriptionTable,
    correlator: RequestCorrelator,
    sequence: IdSequence,
    connections: Mutex<Option<Arc<ConnectionSet>>>,
}

impl Shared {
    fn new(role: Role) -> Shared {
        Shared {
            role,
            callbacks: Callbacks::new(),
            message_callback: Mutex::new(None),
            request_callback: Mutex::new(None),
            subscriptions: SubscriptionTable::new(),
            correlator: RequestCorrelator::new(),
            sequence: IdSequence::new(),
            connections: Mutex::new(None),
        }
    }

    fn connections(&self) -> Option<Arc<ConnectionSet>> {
        self.connections.lock().unwrap().clone()
    }

    fn fire_message(&self, msg: Message) {
        if let Some(cb) = self.message_callback.lock().unwrap().as_ref() {
            cb(msg);
        }
    }

    fn invoke_request(&self, msg: Message) -> Option<Message> {
        self.request_callback
            .lock()
            .unwrap()
            .as_ref()
            .and_then(|cb| cb(msg))
    }
}

impl FrameSink for Shared {
    fn on_frame(&self, peer: PeerId, msg: Message) {
        match self.role {
            Role::Sub | Role::Pull => {
                // The generic message callback always sees the complete,
                // untouched frame (topic field included); only the
                // per-subscription callbacks get the topic-stripped rest.
                self.fire_message(msg.clone());
                let (topic, rest) = pattern::sub::split_topic(msg);
                if let Some(topic) = &topic {
                    self.subscriptions.dispatch(topic, &rest);
                }
            }
            Role::Req => {
                match pattern::req::strip_correlation_id(msg) {
                    Some((id, rest)) => {
                        log::trace!("req {id} fulfilled by peer {peer:?}");
                        self.correlator.fulfil(&id, rest);
                    }
                    // A reply with no trailing STRING id can't be routed
                    // to any pending request; it's dropped.
                    None => log::debug!("dropping unroutable reply from peer {peer:?}"),
                }
            }
            Role::Rep => {
                if let Some((id, rest)) = pattern::rep::strip_correlation_id(msg) {
                    if let Some(reply) = self.invoke_request(rest) {
                        let framed = pattern::rep::append_correlation_id(reply, &id);
                        match codec::encode(&framed) {
                            Ok(encoded) => {
                                if let Some(conns) = self.connections() {
                                    if let Err(e) = conns.unicast(peer, &encoded) {
                                        log::warn!("reply to peer {peer:?} failed: {e}");
                                    }
                                }
                            }
                            Err(e) => log::error!("failed to encode reply for peer {peer:?}: {e}"),
                        }
                    }
                } else {
                    log::debug!("dropping request with no correlation id from peer {peer:?}");
                }
            }
            Role::Pub | Role::Push => {
                self.fire_message(msg);
            }
        }
    }

    fn on_peer_closed(&self, _peer: PeerId) {}

    fn on_bind(&self, port: u16) {
        self.callbacks.fire_bind(port);
    }

    fn on_error(&self, message: String) {
        self.callbacks.fire_error(message);
    }
}

/// One messaging socket: PUB, SUB, PUSH, PULL, REQ, or REP, chosen at
/// [`Endpoint::create`]. `bind` and `connect` may both be called, any
/// number of times, on the same endpoint.
pub struct Endpoint {
    shared: Arc<Shared>,
    transport: Transport,
    state: AtomicU8,
}

impl Endpoint {
    pub fn create(role: &str) -> Result<Endpoint> {
        Endpoint::create_with_config(role, Config::default())
    }

    pub fn create_with_config(role: &str, config: Config) -> Result<Endpoint> {
        let role = Role::parse(role)?;
        let shared = Arc::new(Shared::new(role));
        let transport = Transport::new(config, shared.clone());
        *shared.connections.lock().unwrap() = Some(transport.connections.clone());

        Ok(Endpoint {
            shared,
            transport,
            state: AtomicU8::new(STATE_NEW),
        })
    }

    fn ensure_alive(&self) -> Result<()> {
        match self.state.load(Ordering::SeqCst) {
            STATE_RELEASING | STATE_DEAD => Err(AxonError::EndpointClosed),
            _ => {
                self.state
                    .compare_exchange(
                        STATE_NEW,
                        STATE_ACTIVE,
                        Ordering::SeqCst,
                        Ordering::SeqCst,
                    )
                    .ok();
                Ok(())
            }
        }
    }

    pub fn bind(&self, port: u16) -> Result<()> {
        self.ensure_alive()?;
        self.transport.bind(port);
        Ok(())
    }

    pub fn connect(&self, host: &str, port: u16) -> Result<()> {
        self.ensure_alive()?;
        self.transport.connect(host, port);
        Ok(())
    }

    pub fn is_connected(&self, host: &str, port: u16) -> bool {
        self.transport.is_connected(host, port)
    }

    pub fn on_bind<F: Fn(u16) + Send + Sync + 'static>(&self, cb: F) {
        self.shared.callbacks.set_on_bind(cb);
    }

    pub fn on_error<F: Fn(String) + Send + Sync + 'static>(&self, cb: F) {
        self.shared.callbacks.set_on_error(cb);
    }

    /// Registers the generic message callback. Valid for every role
    /// except REP, which receives requests through [`Endpoint::on_request`]
    /// instead, since a REP callback must be able to hand back a reply.
    pub fn on_message<F: Fn(Message) + Send + Sync + 'static>(&self, cb: F) -> Result<()> {
        if self.shared.role == Role::Rep {
            return Err(AxonError::NotApplicable);
        }
        *self.shared.message_callback.lock().unwrap() = Some(Arc::new(cb));
        Ok(())
    }

    /// Registers the request callback for a REP endpoint. The callback
    /// receives the request with its correlation id already stripped,
    /// and returns `Some(reply)` to unicast a reply back over the
    /// connection the request arrived on, or `None` to send nothing.
    pub fn on_request<F: Fn(Message) -> Option<Message> + Send + Sync + 'static>(
        &self,
        cb: F,
    ) -> Result<()> {
        if self.shared.role != Role::Rep {
            return Err(AxonError::NotApplicable);
        }
        *self.shared.request_callback.lock().unwrap() = Some(Arc::new(cb));
        Ok(())
    }

    pub fn subscribe<F: Fn(Message) + Send + Sync + 'static>(
        &self,
        pattern: &str,
        cb: F,
    ) -> Result<()> {
        if !self.shared.role.subscribes() {
            return Err(AxonError::NotApplicable);
        }
        self.shared.subscriptions.subscribe(pattern, cb)
    }

    pub fn unsubscribe(&self, pattern: &str) -> Result<()> {
        if !self.shared.role.subscribes() {
            return Err(AxonError::NotApplicable);
        }
        self.shared.subscriptions.unsubscribe(pattern);
        Ok(())
    }

    /// Sends a message. Valid for PUB (broadcast to every connected
    /// peer) and PUSH (round-robin to one peer); REQ has its own
    /// [`Endpoint::request`] since it needs a reply and a timeout.
    pub fn send(&self, fields: Vec<Field>) -> Result<()> {
        self.ensure_alive()?;

        match self.shared.role {
            Role::Pub => {
                let encoded = codec::encode(&Message::from_fields(fields))?;
                self.connections()?.broadcast(&encoded);
                Ok(())
            }
            Role::Push => {
                let encoded = codec::encode(&Message::from_fields(fields))?;
                let (id, _) = self
                    .connections()?
                    .wait_for_round_robin_peer()
                    .ok_or_else(no_peer_available)?;
                self.connections()?.unicast(id, &encoded).map_err(|e| {
                    log::warn!("push send to peer {id:?} failed: {e}");
                    AxonError::SendFailed(e)
                })
            }
            _ => Err(AxonError::NotApplicable),
        }
    }

    /// Sends a request and blocks until a matching reply arrives or
    /// `timeout` elapses. REQ only.
    pub fn request(&self, fields: Vec<Field>, timeout: Duration) -> Result<Message> {
        self.ensure_alive()?;

        if self.shared.role != Role::Req {
            return Err(AxonError::NotApplicable);
        }

        let id = self.shared.sequence.next().to_string();
        let framed = pattern::req::append_correlation_id(Message::from_fields(fields), &id);
        let encoded = codec::encode(&framed)?;

        // Pick a peer before registering a completion slot: if none is
        // available, there is nothing to clean up and no leaked slot.
        let (peer_id, _) = self
            .connections()?
            .wait_for_round_robin_peer()
            .ok_or_else(no_peer_available)?;

        // The slot must exist before the send goes out, so an
        // improbably fast reply can never arrive before there's
        // anywhere for it to land.
        let rx = self.shared.correlator.register(id.clone());

        if let Err(e) = self.connections()?.unicast(peer_id, &encoded) {
            // The send itself failed; a reply can never arrive for this
            // id, so drop the slot now instead of waiting out the full
            // timeout only to report the wrong error kind.
            log::warn!("request {id} send failed: {e}");
            self.shared.correlator.cancel(&id);
            return Err(AxonError::SendFailed(e));
        }

        self.shared.correlator.await_reply(&id, rx, timeout)
    }

    /// Cancels every worker, closes every socket, and frees
    /// subscriptions. Idempotent; safe to call more than once.
    pub fn release(&self) {
        let previous = self.state.swap(STATE_RELEASING, Ordering::SeqCst);
        if previous == STATE_RELEASING || previous == STATE_DEAD {
            self.state.store(previous, Ordering::SeqCst);
            return;
        }

        log::info!("releasing {:?} endpoint", self.shared.role);
        self.transport.release();
        self.state.store(STATE_DEAD, Ordering::SeqCst);
    }

    fn connections(&self) -> Result<Arc<ConnectionSet>> {
        self.shared.connections().ok_or(AxonError::EndpointClosed)
    }
}

impl Drop for Endpoint {
    fn drop(&mut self) {
        self.release();
    }
}

fn no_peer_available() -> AxonError {
    AxonError::SendFailed(io::Error::new(io::ErrorKind::NotConnected, "no peer available"))
}
