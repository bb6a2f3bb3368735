// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! The Listener worker: binds one TCP port, accepts incoming peers, and
//! multiplexes reads across all of them on a single thread via `mio`.

use std::collections::HashMap;
use std::io;
use std::net::{SocketAddr, TcpListener as StdTcpListener};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use mio::net::TcpListener as MioTcpListener;
use mio::{Events, Interest, Poll, Token};
use socket2::{Domain, Socket, Type};

use crate::codec;
use crate::config::Config;
use crate::connection_set::{read_available, ConnectionSet, PeerId, PeerSocket};
use crate::error::AxonError;
use crate::transport::FrameSink;

const ACCEPT_TOKEN: Token = Token(usize::MAX);
const READ_CHUNK: usize = 64 * 1024;

pub struct Listener {
    shutdown: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl Listener {
    pub fn spawn(
        port: u16,
        connections: Arc<ConnectionSet>,
        sink: Arc<dyn FrameSink>,
        config: Config,
    ) -> Listener {
        let shutdown = Arc::new(AtomicBool::new(false));
        let worker_shutdown = shutdown.clone();

        let join = thread::Builder::new()
            .name(format!("axon-listener-{port}"))
            .spawn(move || run(port, connections, sink, config, worker_shutdown))
            .expect("failed to spawn listener thread");

        Listener {
            shutdown,
            join: Some(join),
        }
    }

    pub fn shutdown(mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

fn bind_reuseaddr(port: u16) -> Result<StdTcpListener, AxonError> {
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    let socket = Socket::new(Domain::IPV4, Type::STREAM, None)
        .map_err(AxonError::ListenerSocketCreate)?;
    socket
        .set_reuse_address(true)
        .map_err(AxonError::SetReuseAddr)?;
    socket.bind(&addr.into()).map_err(AxonError::BindFailed)?;
    socket.listen(128).map_err(AxonError::ListenFailed)?;
    socket.set_nonblocking(true).map_err(AxonError::ListenFailed)?;
    Ok(socket.into())
}

struct PeerState {
    socket: Arc<PeerSocket>,
    buf: Vec<u8>,
}

fn run(
    port: u16,
    connections: Arc<ConnectionSet>,
    sink: Arc<dyn FrameSink>,
    config: Config,
    shutdown: Arc<AtomicBool>,
) {
    let std_listener = match bind_reuseaddr(port) {
        Ok(l) => l,
        Err(e) => {
            sink.on_error(e.to_string());
            return;
        }
    };

    let actual_port = match std_listener.local_addr() {
        Ok(addr) => addr.port(),
        Err(e) => {
            sink.on_error(format!("sock: unable to read listener address: {e}"));
            return;
        }
    };

    let mut mio_listener = MioTcpListener::from_std(std_listener);
    let mut poll = match Poll::new() {
        Ok(p) => p,
        Err(e) => {
            sink.on_error(format!("sock: unable to create poll: {e}"));
            return;
        }
    };

    if let Err(e) =
        poll.registry()
            .register(&mut mio_listener, ACCEPT_TOKEN, Interest::READABLE)
    {
        sink.on_error(format!("sock: unable to register listener: {e}"));
        return;
    }

    sink.on_bind(actual_port);
    log::debug!("listener bound on port {}", actual_port);

    let mut events = Events::with_capacity(128);
    let mut peers: HashMap<usize, PeerState> = HashMap::new();
    let mut peer_ids: HashMap<usize, PeerId> = HashMap::new();
    let mut next_token = 0usize;
    let mut read_buf = vec![0u8; READ_CHUNK];

    while !shutdown.load(Ordering::SeqCst) {
        if let Err(e) = poll.poll(&mut events, Some(config.select_timeout)) {
            if e.kind() == io::ErrorKind::Interrupted {
                continue;
            }
            sink.on_error(format!("sock: poll failed: {e}"));
            break;
        }

        for event in events.iter() {
            if event.token() == ACCEPT_TOKEN {
                loop {
                    match mio_listener.accept() {
                        Ok((mut stream, _addr)) => {
                            let token = next_token;
                            next_token += 1;

                            if let Err(e) = poll.registry().register(
                                &mut stream,
                                Token(token),
                                Interest::READABLE,
                            ) {
                                log::debug!("failed to register accepted peer: {e}");
                                continue;
                            }

                            let (id, socket) = connections.add(stream);
                            peer_ids.insert(token, id);
                            peers.insert(
                                token,
                                PeerState {
                                    socket,
                                    buf: Vec::new(),
                                },
                            );
                        }
                        Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                        Err(e) => {
                            log::warn!("accept failed: {e}");
                            break;
                        }
                    }
                }
            } else {
                let token = event.token().0;
                let closed = match peers.get_mut(&token) {
                    Some(state) => !pump(&state.socket, &mut state.buf, &mut read_buf, &sink, peer_ids[&token]),
                    None => false,
                };

                if closed {
                    if let Some(mut state) = peers.remove(&token) {
                        let _ = poll
                            .registry()
                            .deregister(&mut *state.socket.lock().unwrap());
                    }
                    if let Some(id) = peer_ids.remove(&token) {
                        connections.remove(id);
                        sink.on_peer_closed(id);
                    }
                }
            }
        }
    }

    for (token, state) in peers.iter() {
        let _ = poll.registry().deregister(&mut *state.socket.lock().unwrap());
        if let Some(id) = peer_ids.get(token) {
            connections.remove(*id);
        }
    }
}

/// Reads whatever is available from `socket`, feeding it through
/// `decode-and-dispatch`. Returns `false` once the peer has closed or
/// sent something un-recoverable, `true` to keep the peer registered.
fn pump(
    socket: &Arc<PeerSocket>,
    buf: &mut Vec<u8>,
    scratch: &mut [u8],
    sink: &Arc<dyn FrameSink>,
    id: PeerId,
) -> bool {
    loop {
        match read_available(socket, scratch) {
            Ok(0) => return false,
            Ok(n) => buf.extend_from_slice(&scratch[..n]),
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
            Err(e) => {
                log::warn!("peer read failed: {e}");
                return false;
            }
        }
    }

    loop {
        match codec::try_decode(buf) {
            codec::FrameStatus::Frame(msg, consumed) => {
                buf.drain(..consumed);
                sink.on_frame(id, msg);
            }
            codec::FrameStatus::Incomplete => break,
            codec::FrameStatus::Malformed => {
                log::warn!("dropping peer {:?}: malformed frame", id);
                return false;
            }
        }
    }

    true
}
