// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! The Dialer worker: holds one outbound connection open, reconnecting
//! with back-off for as long as the endpoint lives.

use std::io;
use std::net::ToSocketAddrs;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use mio::net::TcpStream;
use mio::{Events, Interest, Poll, Token};

use crate::codec;
use crate::config::Config;
use crate::connection_set::{read_available, ConnectionSet, PeerId};
use crate::global::BackOff;
use crate::transport::FrameSink;

const PEER_TOKEN: Token = Token(0);
const READ_CHUNK: usize = 64 * 1024;

pub struct Dialer {
    host: String,
    port: u16,
    shutdown: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl Dialer {
    pub fn spawn(
        host: String,
        port: u16,
        connections: Arc<ConnectionSet>,
        sink: Arc<dyn FrameSink>,
        config: Config,
    ) -> Dialer {
        let shutdown = Arc::new(AtomicBool::new(false));
        let worker_shutdown = shutdown.clone();
        let worker_host = host.clone();

        let join = thread::Builder::new()
            .name(format!("axon-dialer-{host}-{port}"))
            .spawn(move || run(worker_host, port, connections, sink, config, worker_shutdown))
            .expect("failed to spawn dialer thread");

        Dialer {
            host,
            port,
            shutdown,
            join: Some(join),
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn shutdown(mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

impl Drop for Dialer {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

fn run(
    host: String,
    port: u16,
    connections: Arc<ConnectionSet>,
    sink: Arc<dyn FrameSink>,
    config: Config,
    shutdown: Arc<AtomicBool>,
) {
    // The reconnect back-off never gives up: an unreachable peer is a
    // normal, expected state for a dialer, not an error worth surfacing.
    let mut backoff = BackOff::new(
        config.backoff_initial,
        config.backoff_multiplier,
        config.backoff_cap,
        u32::MAX,
    );

    while !shutdown.load(Ordering::SeqCst) {
        match connect_once(&host, port, &connections, &sink, &config, &shutdown) {
            Ok(()) => {
                // Ran until the peer dropped or shutdown fired; if we're
                // still alive, reset the back-off and try again right away.
                backoff = BackOff::new(
                    config.backoff_initial,
                    config.backoff_multiplier,
                    config.backoff_cap,
                    u32::MAX,
                );
            }
            Err(e) => {
                log::debug!("dialer {}:{} connect failed: {}", host, port, e);
                if let Some(delay) = backoff.next_delay() {
                    thread::sleep(delay);
                }
            }
        }
    }
}

fn connect_once(
    host: &str,
    port: u16,
    connections: &Arc<ConnectionSet>,
    sink: &Arc<dyn FrameSink>,
    config: &Config,
    shutdown: &Arc<AtomicBool>,
) -> io::Result<()> {
    let addr = (host, port)
        .to_socket_addrs()?
        .next()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "no address resolved"))?;

    let mut stream = TcpStream::connect(addr)?;
    let mut poll = Poll::new()?;
    poll.registry()
        .register(&mut stream, PEER_TOKEN, Interest::READABLE)?;

    let (id, socket) = connections.add(stream);

    let mut events = Events::with_capacity(16);
    let mut buf = Vec::new();
    let mut scratch = vec![0u8; READ_CHUNK];
    let mut alive = true;

    while alive && !shutdown.load(Ordering::SeqCst) {
        match poll.poll(&mut events, Some(config.select_timeout)) {
            Ok(()) => {}
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }

        for event in events.iter() {
            if event.token() == PEER_TOKEN {
                alive = pump(&socket, &mut buf, &mut scratch, sink, id);
            }
        }
    }

    connections.remove(id);
    sink.on_peer_closed(id);
    Ok(())
}

fn pump(
    socket: &Arc<crate::connection_set::PeerSocket>,
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
                log::warn!("dialer peer read failed: {e}");
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
                log::warn!("dropping dialer peer {:?}: malformed frame", id);
                return false;
            }
        }
    }

    true
}
